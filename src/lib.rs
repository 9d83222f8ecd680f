//! # acta-forge – Template-driven DOCX assembly for IT-asset actas
//!
//! This crate fills Word templates (assignment, return, decommission and
//! sale actas) with employee, device and asset data. The generation stages
//! are:
//!
//! 1. **Open** – `.docx` zip → owned XML trees ([`package`], [`dom`])
//! 2. **Resolve** – template mapping + context → placeholder values ([`mapping`], [`registry`])
//! 3. **Table** – device rows → display rows → Word table at its anchor ([`devices`], [`table`])
//! 4. **Substitute** – `{{TOKEN}}` replacement in body, headers and footers ([`placeholders`])
//! 5. **Pictures** – photo placeholders → inline JPEG drawings ([`images`])
//! 6. **Write** – category directory + collision-free file name ([`pipeline`])
//!
//! Captured photos go through [`normalize`] once, at capture time.
//! Templates can be checked at upload time with [`inspect`].
//! A C-compatible FFI surface is exposed via the [`ffi`] module.

pub mod context;
pub mod devices;
pub mod dom;
pub mod error;
pub mod ffi;
pub mod images;
pub mod inspect;
pub mod mapping;
pub mod normalize;
pub mod package;
pub mod pipeline;
pub mod placeholders;
pub mod registry;
pub mod table;
pub mod templates;
pub mod wordml;

// Re-exports for convenience
pub use context::{DeviceRow, EmployeeInfo, GenerationContext};
pub use error::{DocxError, GenerateError};
pub use mapping::{SemanticKey, Template, TemplateCategory};
pub use normalize::{ImageNormalizer, NormalizeConfig, ObjectDetector};
pub use package::DocxPackage;
pub use pipeline::{generate_document, render_document, GenerationRequest, GeneratorConfig};
