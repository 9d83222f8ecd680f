//! Template inspection: list the `{{NAME}}` tokens a template contains and
//! compare them against its declared mapping. Meant for upload time, where a
//! declared placeholder that the document lacks can still be fixed.

use serde::Serialize;

use crate::dom::Tag;
use crate::error::DocxError;
use crate::mapping::VariableMapping;
use crate::package::DocxPackage;
use crate::wordml;

/// Result of inspecting one template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateReport {
    /// Every distinct token name, in document order (body, then headers and
    /// footers).
    pub tokens: Vec<String>,
    /// Mapped placeholders the document does not contain.
    pub missing_placeholders: Vec<String>,
    /// Tokens present in the document but absent from the mapping.
    pub unmapped_tokens: Vec<String>,
    /// Placeholder of the mapping's table key, if one is declared.
    pub table_placeholder: Option<String>,
    /// Whether that table placeholder occurs in the document.
    pub table_placeholder_present: bool,
}

impl TemplateReport {
    /// A declared table placeholder is missing from the document. Generation
    /// would ship the template without its device table.
    pub fn table_missing(&self) -> bool {
        self.table_placeholder.is_some() && !self.table_placeholder_present
    }

    /// Every mapped placeholder occurs in the document.
    pub fn is_complete(&self) -> bool {
        self.missing_placeholders.is_empty()
    }
}

/// Token names inside `{{ ... }}` pairs, trimmed. Empty pairs are skipped.
pub fn extract_tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = after[..end].trim();
        if !name.is_empty() && !name.contains('{') {
            out.push(name.to_string());
        }
        rest = &after[end + 2..];
    }
    out
}

/// Distinct tokens of every story part. Paragraph text is flattened first so
/// tokens split across runs are found.
pub fn collect_tokens(pkg: &DocxPackage) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for name in pkg.story_part_names() {
        let Some(tree) = pkg.part(&name) else {
            continue;
        };
        let Some(root) = tree.document_element() else {
            continue;
        };
        for p in tree.descendants(root) {
            if !tree.is(p, Tag::P) {
                continue;
            }
            for token in extract_tokens(&wordml::paragraph_text(tree, p)) {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        }
    }
    tokens
}

fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Inspect an opened package against an optional mapping.
pub fn inspect_package(pkg: &DocxPackage, mapping: Option<&VariableMapping>) -> TemplateReport {
    let tokens = collect_tokens(pkg);
    let Some(mapping) = mapping else {
        return TemplateReport {
            tokens,
            ..TemplateReport::default()
        };
    };

    let present = |placeholder: &str| tokens.iter().any(|t| same_name(t, placeholder));

    let mut missing_placeholders = Vec::new();
    for entry in mapping.entries() {
        if !present(&entry.placeholder) && !missing_placeholders.contains(&entry.placeholder) {
            missing_placeholders.push(entry.placeholder.clone());
        }
    }

    let unmapped_tokens = tokens
        .iter()
        .filter(|t| !mapping.entries().iter().any(|e| same_name(&e.placeholder, t)))
        .cloned()
        .collect();

    let table_placeholder = mapping.table_entry().map(|e| e.placeholder.clone());
    let table_placeholder_present = table_placeholder.as_deref().map(present).unwrap_or(false);

    let report = TemplateReport {
        tokens,
        missing_placeholders,
        unmapped_tokens,
        table_placeholder,
        table_placeholder_present,
    };
    if report.table_missing() {
        log::warn!(
            "Table placeholder {{{{{}}}}} is mapped but not in the template",
            report.table_placeholder.as_deref().unwrap_or_default()
        );
    }
    report
}

/// Inspect a `.docx` held in memory.
pub fn inspect_bytes(docx: &[u8], mapping: Option<&VariableMapping>) -> Result<TemplateReport, DocxError> {
    let pkg = DocxPackage::from_bytes(docx)?;
    Ok(inspect_package(&pkg, mapping))
}
