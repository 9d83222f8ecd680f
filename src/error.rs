//! Error types for every layer of the engine.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reading, editing or writing a DOCX package.
#[derive(Error, Debug)]
pub enum DocxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("Package part not found: {0}")]
    MissingPart(String),

    #[error("Package part {part} is too large ({size} bytes)")]
    PartTooLarge { part: String, size: u64 },
}

impl DocxError {
    pub(crate) fn xml(part: &str, err: impl std::fmt::Display) -> Self {
        DocxError::Xml {
            part: part.to_string(),
            message: err.to_string(),
        }
    }
}

/// Failures loading a template's variable mapping.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Mapping is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown semantic key '{key}' for placeholder '{placeholder}'")]
    UnknownKey { placeholder: String, key: String },

    #[error("Unsupported mapping shape: {0}")]
    Shape(String),
}

/// Failures inside the image normalisation pipeline. Never surfaced to the
/// caller of [`crate::normalize::ImageNormalizer::normalize`].
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error("Object detector error: {0}")]
    Detector(String),
}

impl From<image::ImageError> for NormalizeError {
    fn from(e: image::ImageError) -> Self {
        NormalizeError::Decode(e.to_string())
    }
}

/// Top-level generation failures.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Template not found (tried: {})", display_paths(.tried))]
    TemplateNotFound { tried: Vec<PathBuf> },

    #[error("Document error: {0}")]
    Docx(#[from] DocxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Request(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
