//! Image placeholder substitution: replace the paragraph holding an image
//! placeholder with a centred inline picture.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;

use crate::dom::{NodeId, XmlTree};
use crate::error::{DocxError, NormalizeError};
use crate::package::{DocxPackage, DOCUMENT_PART};
use crate::placeholders::find_paragraph;
use crate::wordml::{self, PPR_ORDER};

pub const EMU_PER_INCH: f64 = 914_400.0;
/// Quality of pictures embedded into documents.
pub const EMBED_JPEG_QUALITY: u8 = 95;
/// Paragraph spacing around a picture (twentieths of a point): 2pt.
const PICTURE_SPACING: &str = "40";

/// A picture re-encoded for embedding.
#[derive(Debug, Clone)]
pub struct PreparedPicture {
    pub jpeg: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

/// Decode any supported image and re-encode it as an RGB JPEG.
pub fn prepare_picture(bytes: &[u8]) -> Result<PreparedPicture, NormalizeError> {
    let img = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| NormalizeError::Decode(e.to_string()))?
        .decode()?;
    let rgb = img.to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, EMBED_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| NormalizeError::Encode(e.to_string()))?;

    Ok(PreparedPicture {
        jpeg,
        width_px: rgb.width(),
        height_px: rgb.height(),
    })
}

/// Extent in EMU for a picture shown `width_inches` wide.
pub fn extent_emu(width_px: u32, height_px: u32, width_inches: f64) -> (i64, i64) {
    let cx = (width_inches * EMU_PER_INCH).round() as i64;
    let cy = if width_px == 0 {
        cx
    } else {
        (cx as f64 * height_px as f64 / width_px as f64).round() as i64
    };
    (cx, cy)
}

fn next_doc_pr_id(tree: &XmlTree) -> u32 {
    let Some(root) = tree.document_element() else {
        return 1000;
    };
    tree.descendants(root)
        .into_iter()
        .filter(|&n| tree.is_named(n, "wp:docPr"))
        .filter_map(|n| tree.element(n)?.attr("id")?.parse::<u32>().ok())
        .fold(999, u32::max)
        + 1
}

fn drawing_markup(rel_id: &str, doc_pr_id: u32, cx: i64, cy: i64) -> String {
    format!(
        concat!(
            r#"<w:r><w:drawing>"#,
            r#"<wp:inline xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
            r#"<wp:docPr id="{id}" name="Picture {id}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="0" name="image{id}.jpeg"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#,
        ),
        cx = cx,
        cy = cy,
        id = doc_pr_id,
        rel = rel_id,
    )
}

/// Clear the paragraph's runs, centre it and tighten its spacing.
fn prepare_paragraph(tree: &mut XmlTree, p: NodeId) {
    for r in wordml::paragraph_runs(tree, p) {
        tree.remove(r);
    }
    let ppr = wordml::ensure_properties(tree, p, "w:pPr");
    wordml::set_property(
        tree,
        ppr,
        PPR_ORDER,
        "w:spacing",
        &[
            ("w:before", PICTURE_SPACING),
            ("w:after", PICTURE_SPACING),
            ("w:line", "240"),
            ("w:lineRule", "auto"),
        ],
    );
    wordml::set_property(tree, ppr, PPR_ORDER, "w:jc", &[("w:val", "center")]);
}

/// Replace the first body paragraph holding `placeholder` with the picture.
/// Returns false when the placeholder is absent or the bytes are not an
/// image; neither is an error.
pub fn insert_image(
    pkg: &mut DocxPackage,
    placeholder: &str,
    image_bytes: &[u8],
    width_inches: f64,
) -> Result<bool, DocxError> {
    let anchor = {
        let tree = pkg.document()?;
        wordml::story_root(tree).and_then(|story| find_paragraph(tree, story, placeholder))
    };
    let Some(anchor) = anchor else {
        log::debug!("Image placeholder {{{{{placeholder}}}}} not in document");
        return Ok(false);
    };

    let picture = match prepare_picture(image_bytes) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Skipping image for {{{{{placeholder}}}}}: {e}");
            return Ok(false);
        }
    };
    let (cx, cy) = extent_emu(picture.width_px, picture.height_px, width_inches);
    let rel_id = pkg.add_media("jpeg", "image/jpeg", picture.jpeg)?;

    let tree = pkg.document_mut()?;
    let doc_pr_id = next_doc_pr_id(tree);
    let fragment = XmlTree::parse_fragment(&drawing_markup(&rel_id, doc_pr_id, cx, cy))?;
    let run_root = fragment
        .document_element()
        .ok_or_else(|| DocxError::xml(DOCUMENT_PART, "empty drawing fragment"))?;

    prepare_paragraph(tree, anchor);
    let run = tree.import(&fragment, run_root);
    tree.append_child(anchor, run);

    log::debug!("Inserted picture {rel_id} at {{{{{placeholder}}}}} ({cx}x{cy} EMU)");
    Ok(true)
}
