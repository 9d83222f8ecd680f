//! Pipeline – ties together template lookup, variable resolution, table
//! injection, scalar substitution and picture insertion into a single call.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::context::GenerationContext;
use crate::error::{DocxError, GenerateError};
use crate::images::insert_image;
use crate::mapping::{MappingEntry, MappingSource, SemanticKey, Template, TemplateCategory};
use crate::package::DocxPackage;
use crate::placeholders::{substitute, SubstitutionStats};
use crate::registry::resolve_with;
use crate::table::{inject_table, table_target, DEFAULT_TABLE_PLACEHOLDER};

/// Configuration for document generation. Every field has a default, so a
/// partial JSON file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Root that relative template paths are resolved against.
    pub base_dir: PathBuf,
    /// Where category default templates live (default: `<base_dir>/templates`).
    pub templates_dir: Option<PathBuf>,
    /// Root of the per-category output directories
    /// (default: `<base_dir>/generated`).
    pub output_dir: Option<PathBuf>,
    /// Display width of inserted pictures.
    pub image_width_inches: f64,
    /// Table placeholder used when the template has no usable mapping.
    pub fallback_table_placeholder: String,
    /// Picture placeholders used when the mapping declares no image keys.
    pub device_image_placeholder: String,
    pub serial_image_placeholder: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            templates_dir: None,
            output_dir: None,
            image_width_inches: 2.5,
            fallback_table_placeholder: DEFAULT_TABLE_PLACEHOLDER.to_string(),
            device_image_placeholder: SemanticKey::DeviceImage.as_str().to_string(),
            serial_image_placeholder: SemanticKey::SerialImage.as_str().to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, GenerateError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| GenerateError::Config(format!("{}: {e}", path.display())))
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.templates_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("templates"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("generated"))
    }
}

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// One generation call as JSON: used by the CLI and the C ABI. Image bytes
/// travel as base64 strings inside `context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub template: Template,
    #[serde(default)]
    pub context: GenerationContext,
    /// Overrides the caller's configuration when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<GeneratorConfig>,
}

impl GenerationRequest {
    pub fn from_json(json: &str) -> Result<Self, GenerateError> {
        serde_json::from_str(json).map_err(|e| GenerateError::Request(e.to_string()))
    }

    /// The request's own configuration, or `fallback`.
    pub fn config_or<'a>(&'a self, fallback: &'a GeneratorConfig) -> &'a GeneratorConfig {
        self.config.as_ref().unwrap_or(fallback)
    }

    pub fn generate(&self, fallback: &GeneratorConfig) -> Result<PathBuf, GenerateError> {
        generate_document(&self.template, &self.context, self.config_or(fallback))
    }
}

// ---------------------------------------------------------------------------
// Template lookup
// ---------------------------------------------------------------------------

/// Resolve the template file: the stored path as absolute, then relative to
/// `base_dir`, then relative to the working directory, then the category's
/// default file under `templates_dir`.
pub fn resolve_template_path(template: &Template, config: &GeneratorConfig) -> Result<PathBuf, GenerateError> {
    let mut tried: Vec<PathBuf> = Vec::new();
    let mut push = |p: PathBuf| {
        if !tried.contains(&p) {
            tried.push(p);
        }
    };

    if let Some(stored) = template.file_path.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let stored = Path::new(stored);
        if stored.is_absolute() {
            push(stored.to_path_buf());
        } else {
            push(config.base_dir.join(stored));
            if let Ok(cwd) = std::env::current_dir() {
                push(cwd.join(stored));
            }
        }
    }
    push(config.templates_dir().join(template.category.default_template_file()));

    match tried.iter().find(|p| p.is_file()) {
        Some(found) => {
            log::debug!("Using template file {}", found.display());
            Ok(found.clone())
        }
        None => Err(GenerateError::TemplateNotFound { tried }),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// What [`render_document`] did to the package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub legacy_mapping: bool,
    pub table_inserted: bool,
    pub substitution: SubstitutionStats,
    pub images_inserted: usize,
}

/// Placeholder → bytes for every picture the context carries. Without
/// declared image keys the configured fallback placeholders are used.
fn picture_slots<'a>(
    images: &[MappingEntry],
    ctx: &'a GenerationContext,
    config: &GeneratorConfig,
) -> Vec<(String, &'a [u8])> {
    let Some(decom) = ctx.decommission.as_ref() else {
        return Vec::new();
    };
    let bytes_for = |key: SemanticKey| -> Option<&'a [u8]> {
        match key {
            SemanticKey::DeviceImage => decom.device_image.as_deref(),
            SemanticKey::SerialImage => decom.serial_image.as_deref(),
            _ => None,
        }
    };

    let declared: Vec<(String, SemanticKey)> = if images.is_empty() {
        vec![
            (config.device_image_placeholder.clone(), SemanticKey::DeviceImage),
            (config.serial_image_placeholder.clone(), SemanticKey::SerialImage),
        ]
    } else {
        images.iter().map(|e| (e.placeholder.clone(), e.key)).collect()
    };
    declared
        .into_iter()
        .filter_map(|(placeholder, key)| bytes_for(key).map(|b| (placeholder, b)))
        .collect()
}

/// Fill an opened template in place: device table first (its anchor must
/// not be mistaken for a scalar), then scalars everywhere, then pictures.
pub fn render_document(
    pkg: &mut DocxPackage,
    template: &Template,
    ctx: &GenerationContext,
    config: &GeneratorConfig,
) -> Result<RenderReport, DocxError> {
    let source = template.load_mapping();
    let resolved = resolve_with(source.clone(), template.category, ctx);
    let mut report = RenderReport {
        legacy_mapping: source == MappingSource::Legacy,
        ..RenderReport::default()
    };

    if let Some(target) = table_target(&source, template.category, &config.fallback_table_placeholder) {
        report.table_inserted = inject_table(pkg, &target, &ctx.devices)?;
    }

    report.substitution = substitute(pkg, &resolved.scalars)?;

    for (placeholder, bytes) in picture_slots(&resolved.images, ctx, config) {
        if insert_image(pkg, &placeholder, bytes, config.image_width_inches)? {
            report.images_inserted += 1;
        }
    }

    log::debug!("Rendered '{}': {:?}", template.name, report);
    Ok(report)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn file_safe(id: &str) -> String {
    let cleaned: String = id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "sin_id".to_string()
    } else {
        cleaned
    }
}

/// `<output_dir>/<category dir>/<prefix>_<id>_<YYYYmmdd_HHMMSS>.docx`, with a
/// `_N` suffix if that file already exists.
pub fn output_path(
    config: &GeneratorConfig,
    category: TemplateCategory,
    source_id: &str,
    at: NaiveDateTime,
) -> PathBuf {
    let dir = config.output_dir().join(category.output_dir_name());
    let stem = format!(
        "{}_{}_{}",
        category.file_prefix(),
        file_safe(source_id),
        at.format("%Y%m%d_%H%M%S")
    );
    let mut candidate = dir.join(format!("{stem}.docx"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}_{n}.docx"));
        n += 1;
    }
    candidate
}

/// Full pipeline: locate the template, fill it and write the result.
/// Returns the path of the generated document.
pub fn generate_document(
    template: &Template,
    ctx: &GenerationContext,
    config: &GeneratorConfig,
) -> Result<PathBuf, GenerateError> {
    let template_path = resolve_template_path(template, config)?;
    let mut pkg = DocxPackage::open(&template_path)?;

    let report = render_document(&mut pkg, template, ctx, config)?;
    if !report.table_inserted && !ctx.devices.is_empty() {
        log::debug!("No device table inserted for '{}'", template.name);
    }

    let out = output_path(config, template.category, &ctx.source_id, Local::now().naive_local());
    pkg.save(&out)?;
    log::info!("Generated {}", out.display());
    Ok(out)
}
