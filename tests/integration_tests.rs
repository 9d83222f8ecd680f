//! Integration tests for the acta generation pipeline.
//!
//! These tests validate:
//! - Device rows are transformed and ordered as the acta tables expect
//! - Scalar substitution reaches body, tables, headers and footers, and is idempotent
//! - Device tables land at their anchor, including inside nested tables
//! - Photo normalisation degrades instead of failing
//! - End-to-end generation resolves templates and writes to the right place

use std::fs;

use acta_forge::context::{DeviceRow, EmployeeInfo, GenerationContext};
use acta_forge::devices::{transform, DASH};
use acta_forge::dom::{NodeId, Tag, XmlTree};
use acta_forge::error::{GenerateError, NormalizeError};
use acta_forge::mapping::{Template, TemplateCategory};
use acta_forge::normalize::{Detection, ImageNormalizer, NormalizeConfig, ObjectDetector};
use acta_forge::package::{DocxPackage, DOCUMENT_PART};
use acta_forge::pipeline::{generate_document, render_document, resolve_template_path, GenerationRequest, GeneratorConfig};
use acta_forge::placeholders::{has_unresolved, substitute, PlaceholderMap};
use acta_forge::registry::resolve;
use acta_forge::table::inject;
use acta_forge::templates::{self, build_docx};
use acta_forge::wordml;
use chrono::NaiveDate;
use image::{DynamicImage, GenericImageView};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

// =====================================================================
// Helpers
// =====================================================================

fn context() -> GenerationContext {
    GenerationContext {
        source_id: "42".into(),
        employee: EmployeeInfo {
            name: "Ana Pérez".into(),
            dni: "12345678".into(),
            company: Some("Acme SAC".into()),
            ..EmployeeInfo::default()
        },
        devices: vec![
            DeviceRow::new("LAPTOP").with_brand("Dell").with_serial("ABC123").with_hostname("tt-lap-01"),
            DeviceRow::new("MONITOR").with_serial("MON1").with_status("USADO"),
        ],
        date: NaiveDate::from_ymd_opt(2024, 3, 5),
        ..GenerationContext::default()
    }
}

fn open(body: &str) -> DocxPackage {
    DocxPackage::from_bytes(&build_docx(body, &[])).unwrap()
}

fn body_text(pkg: &DocxPackage) -> String {
    let tree = pkg.part(DOCUMENT_PART).unwrap();
    tree.text_content(tree.document_element().unwrap())
}

fn story_digests(pkg: &DocxPackage) -> Vec<Vec<u8>> {
    pkg.story_part_names()
        .iter()
        .map(|name| Sha256::digest(pkg.part_bytes(name).unwrap().unwrap()).to_vec())
        .collect()
}

fn tables(tree: &XmlTree) -> Vec<NodeId> {
    let root = tree.document_element().unwrap();
    tree.descendants(root).into_iter().filter(|&n| tree.is(n, Tag::Tbl)).collect()
}

// =====================================================================
// Device transformation
// =====================================================================

#[test]
fn laptop_and_monitor_scenario() {
    let rows = transform(&[
        DeviceRow::new("LAPTOP").with_serial("ABC123"),
        DeviceRow::new("MONITOR").with_serial("MON1").with_status("USADO"),
    ]);
    let labels: Vec<&str> = rows.iter().map(|r| r.equipment.as_str()).collect();
    assert_eq!(labels, vec!["LAPTOP", "MONITOR", "CABLE DE PODER", "CABLE HDMI"]);
    assert_eq!(rows[0].serial, "ABC123");
    assert!(rows[2..].iter().all(|r| r.status == "USADO"));
}

#[test]
fn kit_becomes_keyboard_and_mouse() {
    let rows = transform(&[
        DeviceRow::new("KEYBOARD_MOUSE_KIT")
            .with_brand("logitech")
            .with_model("K120 / M90")
            .with_serial("KIT-9")
            .with_status("nuevo"),
    ]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().filter(|r| r.equipment == "TECLADO").count(), 1);
    assert_eq!(rows.iter().filter(|r| r.equipment == "MOUSE").count(), 1);
    for row in &rows {
        assert_eq!(row.serial, "KIT-9");
        assert_eq!(row.status, "NUEVO");
    }
}

#[test]
fn backpack_serial_is_always_redacted() {
    for serial in ["", "BP-123", "-"] {
        let rows = transform(&[DeviceRow::new("BACKPACK").with_serial(serial)]);
        assert_eq!(rows[0].serial, DASH);
    }
}

// =====================================================================
// Scalar substitution
// =====================================================================

#[test]
fn split_run_token_collapses_to_single_run() {
    let mut pkg = open(templates::SPLIT_RUN_BODY);
    let mut map = PlaceholderMap::new();
    map.insert("NOMBRE", "ANA PÉREZ");
    map.insert("DNI", "12345678");
    substitute(&mut pkg, &map).unwrap();

    let tree = pkg.document().unwrap();
    let body = wordml::story_root(tree).unwrap();
    let first = tree.child_elements(body, Tag::P)[0];
    let runs = wordml::paragraph_runs(tree, first);
    assert_eq!(runs.len(), 1);
    assert_eq!(wordml::run_text(tree, runs[0]), "Señor(a): ANA PÉREZ");
}

#[test]
fn substitution_reaches_headers_footers_and_is_idempotent() {
    let docx = build_docx(
        templates::NESTED_TABLE_BODY,
        &[
            ("header1", r#"<w:p><w:r><w:t>{{ nombre }}</w:t></w:r></w:p>"#),
            ("footer1", r#"<w:p><w:r><w:t>DNI {{D</w:t></w:r><w:r><w:t>NI}}</w:t></w:r></w:p>"#),
        ],
    );
    let mut pkg = DocxPackage::from_bytes(&docx).unwrap();
    let mut map = PlaceholderMap::new();
    map.insert("NOMBRE", "ANA");
    map.insert("DNI", "123");
    map.insert("OBSERVACIONES", "Ninguna");

    substitute(&mut pkg, &map).unwrap();
    assert!(!has_unresolved(&pkg, &map));
    let first = story_digests(&pkg);

    let again = substitute(&mut pkg, &map).unwrap();
    assert_eq!(again.total(), 0);
    assert_eq!(story_digests(&pkg), first);

    let footer = pkg.part("word/footer1.xml").unwrap();
    assert_eq!(footer.text_content(footer.document_element().unwrap()), "DNI 123");
}

// =====================================================================
// Table injection
// =====================================================================

#[test]
fn no_table_key_falls_back_to_tabla_anchor() {
    let mut pkg = open(templates::ASSIGNMENT_BODY);
    let mut template = Template::new("acta", TemplateCategory::AssignmentComputer);
    template.variables = Some(json!([
        {"name": "NOMBRE", "map_to": "EMPLOYEE_NAME"},
        {"name": "DNI", "map_to": "EMPLOYEE_DNI"},
    ]));
    let ctx = context();

    assert!(inject(&mut pkg, &template, &ctx.devices).unwrap());
    assert_eq!(tables(pkg.document().unwrap()).len(), 1);

    substitute(&mut pkg, &resolve(&template, &ctx).scalars).unwrap();
    let text = body_text(&pkg);
    assert!(text.contains("Yo, ANA PÉREZ, identificado(a) con DNI 12345678"));
    assert!(!text.contains("{{TABLA}}"));
    assert!(text.contains("CABLE HDMI"));
}

#[test]
fn no_table_key_and_no_anchor_means_no_table_but_scalars_still_resolve() {
    let mut pkg = open(templates::SPLIT_RUN_BODY);
    let mut template = Template::new("acta", TemplateCategory::AssignmentComputer);
    template.variables = Some(json!([
        {"name": "NOMBRE", "map_to": "EMPLOYEE_NAME"},
        {"name": "DNI", "map_to": "EMPLOYEE_DNI"},
    ]));
    let ctx = context();
    let before = pkg.part_bytes(DOCUMENT_PART).unwrap().unwrap();

    assert!(!inject(&mut pkg, &template, &ctx.devices).unwrap());
    assert!(tables(pkg.document().unwrap()).is_empty());
    assert_eq!(pkg.part_bytes(DOCUMENT_PART).unwrap().unwrap(), before);

    substitute(&mut pkg, &resolve(&template, &ctx).scalars).unwrap();
    let text = body_text(&pkg);
    assert!(text.contains("ANA PÉREZ"));
    assert!(text.contains("12345678"));
}

#[test]
fn decommission_reports_never_get_a_table() {
    let mut pkg = open(templates::ASSIGNMENT_BODY);
    let mut template = Template::new("baja", TemplateCategory::ActaBaja);
    template.variables = Some(json!({"TABLA": "DECOMMISSION_TABLE"}));

    assert!(!inject(&mut pkg, &template, &context().devices).unwrap());
    assert!(tables(pkg.document().unwrap()).is_empty());
}

#[test]
fn declared_table_key_injects_in_nested_cell() {
    let mut pkg = open(templates::NESTED_TABLE_BODY);
    let mut template = Template::new("acta", TemplateCategory::AssignmentComputer);
    template.variables = Some(json!({"TABLA_EQUIPOS": "ASSIGNMENT_COMPUTER_TABLE"}));

    assert!(inject(&mut pkg, &template, &context().devices).unwrap());
    let tree = pkg.document().unwrap();
    assert_eq!(tables(tree).len(), 3);
    let text = body_text(&pkg);
    assert!(!text.contains("TABLA_EQUIPOS"));
    assert!(text.contains("CABLE HDMI"));
    assert!(text.contains("TT-LAP-01"));
}

#[test]
fn deeply_nested_tables_do_not_exhaust_the_stack() {
    let depth = 300;
    let mut body = String::new();
    for _ in 0..depth {
        body.push_str("<w:tbl><w:tr><w:tc>");
    }
    body.push_str("<w:p><w:r><w:t>{{TABLA}}</w:t></w:r></w:p>");
    for _ in 0..depth {
        body.push_str("</w:tc></w:tr></w:tbl>");
    }
    let mut pkg = open(&body);
    let template = Template::new("acta", TemplateCategory::ReturnComputer);

    assert!(inject(&mut pkg, &template, &[DeviceRow::new("LAPTOP")]).unwrap());
    assert_eq!(tables(pkg.document().unwrap()).len(), depth + 1);
}

#[test]
fn sale_table_omits_hostname_column() {
    let mut pkg = open(templates::NESTED_TABLE_BODY);
    let mut template = Template::new("venta", TemplateCategory::ActaVenta);
    template.variables = Some(json!({"TABLA_EQUIPOS": "SALE_TABLE"}));

    assert!(inject(&mut pkg, &template, &[DeviceRow::new("LAPTOP").with_hostname("h1")]).unwrap());
    let text = body_text(&pkg);
    assert!(!text.contains("HOSTNAME"));
    assert!(!text.contains("H1"));
}

// =====================================================================
// Image normalisation
// =====================================================================

struct UnavailableModel;

impl ObjectDetector for UnavailableModel {
    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>, NormalizeError> {
        Err(NormalizeError::Detector("inference failed".into()))
    }
}

#[test]
fn detector_failure_still_produces_normalized_output() {
    let normalizer = ImageNormalizer::new(Arc::new(UnavailableModel), NormalizeConfig::default());
    let input = templates::sample_png_with_box(120, 200, (30, 60, 90, 140));
    let out = normalizer.normalize(&input);

    assert_ne!(out, input);
    let img = image::load_from_memory(&out).unwrap();
    let (w, h) = img.dimensions();
    assert!(w >= h, "expected landscape output, got {w}x{h}");
}

#[test]
fn normalization_never_blocks_on_bad_bytes() {
    let normalizer = ImageNormalizer::default();
    assert_eq!(normalizer.normalize(&[0xFF, 0xD8, 0x00]), vec![0xFF, 0xD8, 0x00]);
}

// =====================================================================
// End-to-end generation
// =====================================================================

#[test]
fn generate_writes_into_category_directory() {
    let dir = tempfile::tempdir().unwrap();
    let templates_dir = dir.path().join("templates");
    fs::create_dir_all(&templates_dir).unwrap();
    fs::write(templates_dir.join("acta_template.docx"), build_docx(templates::ASSIGNMENT_BODY, &[])).unwrap();

    let config = GeneratorConfig {
        base_dir: dir.path().to_path_buf(),
        ..GeneratorConfig::default()
    };
    let template = Template::new("acta", TemplateCategory::AssignmentComputer);
    let out = generate_document(&template, &context(), &config).unwrap();

    assert_eq!(out.parent().unwrap(), dir.path().join("generated").join("assignments"));
    let name = out.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("acta_42_"), "{name}");
    assert!(name.ends_with(".docx"));

    let pkg = DocxPackage::open(&out).unwrap();
    let text = body_text(&pkg);
    assert!(text.contains("ANA PÉREZ"));
    assert!(text.contains("ACME SAC"));
    assert!(!text.contains("{{"));
    assert_eq!(tables(pkg.document().unwrap()).len(), 1);
}

#[test]
fn stored_relative_path_is_resolved_against_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("uploads")).unwrap();
    let stored = dir.path().join("uploads").join("custom.docx");
    fs::write(&stored, build_docx(templates::ASSIGNMENT_BODY, &[])).unwrap();

    let config = GeneratorConfig {
        base_dir: dir.path().to_path_buf(),
        ..GeneratorConfig::default()
    };
    let mut template = Template::new("custom", TemplateCategory::Otros);
    template.file_path = Some("uploads/custom.docx".into());
    assert_eq!(resolve_template_path(&template, &config).unwrap(), stored);

    template.file_path = Some(stored.display().to_string());
    assert_eq!(resolve_template_path(&template, &config).unwrap(), stored);
}

#[test]
fn missing_template_is_the_only_hard_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = GeneratorConfig {
        base_dir: dir.path().to_path_buf(),
        ..GeneratorConfig::default()
    };
    let template = Template::new("baja", TemplateCategory::ActaBaja);
    let err = generate_document(&template, &context(), &config).unwrap_err();
    match err {
        GenerateError::TemplateNotFound { tried } => {
            assert!(tried.iter().any(|p| p.ends_with("INFORME_DE_BAJA.docx")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn json_request_with_base64_photo_renders_picture() {
    let photo = templates::sample_png(40, 30);
    let request = json!({
        "template": {
            "name": "baja",
            "category": "ACTA_BAJA",
            "variables": "{\"FOTO_EQUIPO\": \"DEVICE_IMAGE_PATH\", \"MOTIVO\": \"PURCHASE_REASON\"}"
        },
        "context": {
            "source_id": "9",
            "employee": {"name": "Luis", "dni": "1"},
            "devices": [{"type": "LAPTOP", "brand": "hp", "model": "probook"}],
            "decommission": {
                "fabrication_year": 2018,
                "purchase_reason": "Renovación",
                "device_image": base64_encode(&photo)
            }
        }
    });
    let request = GenerationRequest::from_json(&request.to_string()).unwrap();
    let mut pkg = open(templates::IMAGE_BODY);
    let report = render_document(&mut pkg, &request.template, &request.context, &GeneratorConfig::default()).unwrap();

    assert_eq!(report.images_inserted, 1);
    assert!(!report.table_inserted);
    assert!(pkg.contains("word/media/acta_image1.jpeg"));
    assert!(body_text(&pkg).contains("Motivo: Renovación"));
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.encode(bytes)
}
