//! Sample WordprocessingML templates for testing and demonstration.
//!
//! [`build_docx`] wraps a body fragment (and optional header/footer
//! fragments) into a minimal but complete `.docx` package. The `*_BODY`
//! constants exercise the placeholder shapes real actas contain.

use std::io::{Cursor, Write};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::DocxError;
use crate::wordml::W_NS;

const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Legacy-style assignment acta: scalar tokens in several spellings and a
/// `{{TABLA}}` anchor.
pub const ASSIGNMENT_BODY: &str = concat!(
    r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>ACTA DE ENTREGA DE EQUIPOS</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">Callao, {{FECHA_LARGA}}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">Yo, {{NOMBRE}}, identificado(a) con DNI {{ DNI }}, colaborador(a) de {{EMPRESA}} en la sede {{SEDE}}, recibo los siguientes equipos:</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>{{TABLA}}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">Serie: {{SERIE_LAPTOP}}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">Firma: {{ nombre }}</w:t></w:r></w:p>"#,
    r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr>"#,
);

/// A token split across two runs, as Word often saves it after editing.
pub const SPLIT_RUN_BODY: &str = concat!(
    r#"<w:p><w:r><w:rPr><w:rFonts w:ascii="Arial"/><w:b/><w:color w:val="1F3864"/></w:rPr><w:t xml:space="preserve">Señor(a): {{NOM</w:t></w:r>"#,
    r#"<w:r><w:rPr><w:i/></w:rPr><w:t>BRE}}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">DNI: {{DNI}}</w:t></w:r></w:p>"#,
);

/// Layout table whose inner (nested) table holds the device-table anchor.
pub const NESTED_TABLE_BODY: &str = concat!(
    r#"<w:p><w:r><w:t xml:space="preserve">Colaborador: {{NOMBRE}}</w:t></w:r></w:p>"#,
    r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/></w:tblPr><w:tblGrid><w:gridCol w:w="9000"/></w:tblGrid>"#,
    r#"<w:tr><w:tc><w:tcPr><w:tcW w:w="9000" w:type="dxa"/></w:tcPr>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">DNI {{DNI}}</w:t></w:r></w:p>"#,
    r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/></w:tblPr><w:tblGrid><w:gridCol w:w="8000"/></w:tblGrid>"#,
    r#"<w:tr><w:tc><w:tcPr><w:tcW w:w="8000" w:type="dxa"/></w:tcPr>"#,
    r#"<w:p><w:r><w:t>{{TABLA_EQUIPOS}}</w:t></w:r></w:p>"#,
    r#"</w:tc></w:tr></w:tbl>"#,
    r#"<w:p/>"#,
    r#"</w:tc></w:tr></w:tbl>"#,
    r#"<w:p><w:r><w:t>Observaciones: {{OBSERVACIONES}}</w:t></w:r></w:p>"#,
);

/// Decommission report with one picture anchor.
pub const IMAGE_BODY: &str = concat!(
    r#"<w:p><w:r><w:t>INFORME DE BAJA</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">Equipo: {{MARCA}} {{MODELO}}</w:t></w:r></w:p>"#,
    r#"<w:p><w:pPr><w:spacing w:before="240" w:after="240"/></w:pPr><w:r><w:t>{{FOTO_EQUIPO}}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">Motivo: {{MOTIVO}}</w:t></w:r></w:p>"#,
);

fn content_types(stories: &[(&str, &str)]) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        r#"<Default Extension="xml" ContentType="application/xml"/>"#,
        r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    ));
    for (stem, _) in stories {
        let kind = if stem.starts_with("header") { "header" } else { "footer" };
        xml.push_str(&format!(
            r#"<Override PartName="/word/{stem}.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.{kind}+xml"/>"#
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn document_rels(stories: &[(&str, &str)]) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    ));
    for (i, (stem, _)) in stories.iter().enumerate() {
        let kind = if stem.starts_with("header") { "header" } else { "footer" };
        xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/{kind}" Target="{stem}.xml"/>"#,
            i + 1
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

const PACKAGE_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#,
);

fn story_xml(root: &str, inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><{root} xmlns:w="{W_NS}" xmlns:r="{R_NS}">{inner}</{root}>"#
    )
}

/// Package a body fragment, plus `(stem, fragment)` header/footer parts,
/// as `.docx` bytes. Stems starting with `header` become `w:hdr` parts,
/// anything else a `w:ftr` part.
pub fn try_build_docx(body: &str, stories: &[(&str, &str)]) -> Result<Vec<u8>, DocxError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types(stories).as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(PACKAGE_RELS.as_bytes())?;
    zip.start_file("word/_rels/document.xml.rels", options)?;
    zip.write_all(document_rels(stories).as_bytes())?;

    zip.start_file("word/document.xml", options)?;
    zip.write_all(story_xml("w:document", &format!("<w:body>{body}</w:body>")).as_bytes())?;

    for (stem, inner) in stories {
        let root = if stem.starts_with("header") { "w:hdr" } else { "w:ftr" };
        zip.start_file(format!("word/{stem}.xml"), options)?;
        zip.write_all(story_xml(root, inner).as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}

/// [`try_build_docx`] for fixtures. Writing to memory does not fail; should
/// it ever, the empty result is rejected by [`crate::package::DocxPackage`].
pub fn build_docx(body: &str, stories: &[(&str, &str)]) -> Vec<u8> {
    try_build_docx(body, stories).unwrap_or_default()
}

fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    match DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png) {
        Ok(()) => out.into_inner(),
        Err(e) => {
            log::warn!("Failed to encode sample PNG: {e}");
            Vec::new()
        }
    }
}

/// A uniform grey PNG.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
}

/// A white PNG with a dark filled rectangle `(x0, y0, x1, y1)`.
pub fn sample_png_with_box(width: u32, height: u32, (x0, y0, x1, y1): (u32, u32, u32, u32)) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            Rgb([20, 20, 20])
        } else {
            Rgb([255, 255, 255])
        }
    });
    encode_png(img)
}
