//! DOCX package – the zip container around the WordprocessingML parts.
//!
//! Entries are kept in archive order. The main document and every
//! header/footer part are parsed into [`XmlTree`]s up front; all other parts
//! stay as raw bytes and are only parsed when the engine has to edit them
//! (relationships and content types when a picture is added).

use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::dom::XmlTree;
use crate::error::DocxError;

pub const DOCUMENT_PART: &str = "word/document.xml";
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
pub const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// Largest part we are willing to inflate into memory.
const MAX_PART_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
enum PartData {
    Raw(Vec<u8>),
    Xml(XmlTree),
}

#[derive(Debug, Clone)]
struct PartEntry {
    name: String,
    data: PartData,
}

/// An opened `.docx` file held entirely in memory.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    entries: Vec<PartEntry>,
}

/// Parts that carry story text: the body plus every header and footer.
fn is_story_part(name: &str) -> bool {
    if name == DOCUMENT_PART {
        return true;
    }
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    !file.contains('/')
        && file.ends_with(".xml")
        && (file.starts_with("header") || file.starts_with("footer"))
}

impl DocxPackage {
    pub fn open(path: &Path) -> Result<Self, DocxError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocxError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let declared = file.size();
            if declared > MAX_PART_SIZE {
                return Err(DocxError::PartTooLarge { part: name, size: declared });
            }
            let mut data = Vec::with_capacity(declared as usize);
            (&mut file).take(MAX_PART_SIZE + 1).read_to_end(&mut data)?;
            if data.len() as u64 > MAX_PART_SIZE {
                return Err(DocxError::PartTooLarge { part: name, size: data.len() as u64 });
            }

            let data = if is_story_part(&name) {
                PartData::Xml(XmlTree::parse(&name, &data)?)
            } else {
                PartData::Raw(data)
            };
            entries.push(PartEntry { name, data });
        }

        if !entries.iter().any(|e| e.name == DOCUMENT_PART) {
            return Err(DocxError::MissingPart(DOCUMENT_PART.to_string()));
        }
        log::debug!("Opened package with {} parts", entries.len());
        Ok(Self { entries })
    }

    /// Serialise the package to a deflated zip archive.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocxError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in &self.entries {
            zip.start_file(entry.name.as_str(), options)?;
            match &entry.data {
                PartData::Raw(bytes) => zip.write_all(bytes)?,
                PartData::Xml(tree) => zip.write_all(&tree.to_bytes(&entry.name)?)?,
            }
        }

        Ok(zip.finish()?.into_inner())
    }

    pub fn save(&self, path: &Path) -> Result<(), DocxError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Part access
    // -----------------------------------------------------------------------

    pub fn part_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Body first, then headers and footers in name order.
    pub fn story_part_names(&self) -> Vec<String> {
        let mut others: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.name != DOCUMENT_PART && is_story_part(&e.name))
            .map(|e| e.name.clone())
            .collect();
        others.sort();
        let mut names = vec![DOCUMENT_PART.to_string()];
        names.extend(others);
        names
    }

    /// A parsed part, if `name` exists and has been parsed.
    pub fn part(&self, name: &str) -> Option<&XmlTree> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| match &e.data {
                PartData::Xml(tree) => Some(tree),
                PartData::Raw(_) => None,
            })
    }

    /// Mutable access to a part, parsing it on first use.
    pub fn part_mut(&mut self, name: &str) -> Result<Option<&mut XmlTree>, DocxError> {
        let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) else {
            return Ok(None);
        };
        if let PartData::Raw(bytes) = &entry.data {
            entry.data = PartData::Xml(XmlTree::parse(name, bytes)?);
        }
        Ok(match &mut entry.data {
            PartData::Xml(tree) => Some(tree),
            PartData::Raw(_) => None,
        })
    }

    pub fn document(&self) -> Result<&XmlTree, DocxError> {
        self.part(DOCUMENT_PART)
            .ok_or_else(|| DocxError::MissingPart(DOCUMENT_PART.to_string()))
    }

    pub fn document_mut(&mut self) -> Result<&mut XmlTree, DocxError> {
        self.part_mut(DOCUMENT_PART)?
            .ok_or_else(|| DocxError::MissingPart(DOCUMENT_PART.to_string()))
    }

    /// The serialised bytes of one part as they would be written.
    pub fn part_bytes(&self, name: &str) -> Result<Option<Vec<u8>>, DocxError> {
        match self.entries.iter().find(|e| e.name == name) {
            None => Ok(None),
            Some(PartEntry { data: PartData::Raw(bytes), .. }) => Ok(Some(bytes.clone())),
            Some(PartEntry { data: PartData::Xml(tree), .. }) => Ok(Some(tree.to_bytes(name)?)),
        }
    }

    fn push_part(&mut self, name: &str, data: PartData) {
        self.entries.push(PartEntry {
            name: name.to_string(),
            data,
        });
    }

    // -----------------------------------------------------------------------
    // Media
    // -----------------------------------------------------------------------

    /// Store `bytes` under `word/media/`, register an image relationship from
    /// the main document and make sure the extension has a content type.
    /// Returns the new relationship id.
    pub fn add_media(
        &mut self,
        extension: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, DocxError> {
        let mut n = 1;
        while self.contains(&format!("word/media/acta_image{n}.{extension}")) {
            n += 1;
        }
        let target = format!("media/acta_image{n}.{extension}");
        self.push_part(&format!("word/{target}"), PartData::Raw(bytes));

        self.ensure_default_content_type(extension, content_type)?;
        let rel_id = self.add_relationship(IMAGE_REL_TYPE, &target)?;
        log::debug!("Added media word/{target} as {rel_id}");
        Ok(rel_id)
    }

    fn ensure_default_content_type(&mut self, extension: &str, content_type: &str) -> Result<(), DocxError> {
        if !self.contains(CONTENT_TYPES_PART) {
            let xml = format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="{CONTENT_TYPES_NS}"></Types>"#);
            self.push_part(CONTENT_TYPES_PART, PartData::Raw(xml.into_bytes()));
        }
        let tree = self
            .part_mut(CONTENT_TYPES_PART)?
            .ok_or_else(|| DocxError::MissingPart(CONTENT_TYPES_PART.to_string()))?;
        let types = tree
            .document_element()
            .ok_or_else(|| DocxError::xml(CONTENT_TYPES_PART, "no root element"))?;

        let declared = tree.children(types).iter().any(|&c| {
            tree.element(c)
                .filter(|el| el.name() == "Default")
                .and_then(|el| el.attr("Extension"))
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        });
        if !declared {
            let default = tree.create_element(
                "Default",
                &[("Extension", extension), ("ContentType", content_type)],
            );
            tree.insert_child(types, 0, default);
        }
        Ok(())
    }

    fn add_relationship(&mut self, rel_type: &str, target: &str) -> Result<String, DocxError> {
        if !self.contains(DOCUMENT_RELS_PART) {
            let xml = format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{RELATIONSHIPS_NS}"></Relationships>"#);
            self.push_part(DOCUMENT_RELS_PART, PartData::Raw(xml.into_bytes()));
        }
        let tree = self
            .part_mut(DOCUMENT_RELS_PART)?
            .ok_or_else(|| DocxError::MissingPart(DOCUMENT_RELS_PART.to_string()))?;
        let root = tree
            .document_element()
            .ok_or_else(|| DocxError::xml(DOCUMENT_RELS_PART, "no root element"))?;

        let next = tree
            .children(root)
            .iter()
            .filter_map(|&c| tree.element(c)?.attr("Id"))
            .filter_map(|id| id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let id = format!("rId{next}");
        tree.append_element(
            root,
            "Relationship",
            &[("Id", id.as_str()), ("Type", rel_type), ("Target", target)],
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{build_docx, ASSIGNMENT_BODY};

    #[test]
    fn story_part_detection() {
        assert!(is_story_part("word/document.xml"));
        assert!(is_story_part("word/header1.xml"));
        assert!(is_story_part("word/footer2.xml"));
        assert!(!is_story_part("word/_rels/header1.xml.rels"));
        assert!(!is_story_part("word/styles.xml"));
    }

    #[test]
    fn round_trip_keeps_every_part() {
        let bytes = build_docx(ASSIGNMENT_BODY, &[("header1", "<w:p><w:r><w:t>H</w:t></w:r></w:p>")]);
        let pkg = DocxPackage::from_bytes(&bytes).unwrap();
        let names: Vec<String> = pkg.part_names().iter().map(|s| s.to_string()).collect();

        let again = DocxPackage::from_bytes(&pkg.to_bytes().unwrap()).unwrap();
        let names_again: Vec<String> = again.part_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, names_again);
        assert_eq!(
            again.story_part_names(),
            vec!["word/document.xml".to_string(), "word/header1.xml".to_string()]
        );
    }

    #[test]
    fn oversized_part_header_is_an_error() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file(DOCUMENT_PART, stored).unwrap();
        zip.write_all(b"<w:document/>").unwrap();
        let mut bytes = zip.finish().unwrap().into_inner();

        // Claim a ~4 GiB uncompressed size in both the local and central headers.
        let huge = 0xFFFF_FFF0u32.to_le_bytes();
        for (sig, offset) in [(b"PK\x03\x04", 22), (b"PK\x01\x02", 24)] {
            let at = bytes.windows(4).position(|w| w == sig).unwrap();
            bytes[at + offset..at + offset + 4].copy_from_slice(&huge);
        }

        assert!(matches!(
            DocxPackage::from_bytes(&bytes),
            Err(DocxError::PartTooLarge { .. }) | Err(DocxError::Zip(_))
        ));
    }

    #[test]
    fn missing_document_part_is_rejected() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("other.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<a/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(
            DocxPackage::from_bytes(&bytes),
            Err(DocxError::MissingPart(_))
        ));
    }

    #[test]
    fn add_media_registers_relationship_and_content_type() {
        let mut pkg = DocxPackage::from_bytes(&build_docx(ASSIGNMENT_BODY, &[])).unwrap();
        let first = pkg.add_media("jpeg", "image/jpeg", vec![1, 2, 3]).unwrap();
        let second = pkg.add_media("jpeg", "image/jpeg", vec![4]).unwrap();
        assert_ne!(first, second);
        assert!(pkg.contains("word/media/acta_image1.jpeg"));
        assert!(pkg.contains("word/media/acta_image2.jpeg"));

        let rels = String::from_utf8(pkg.part_bytes(DOCUMENT_RELS_PART).unwrap().unwrap()).unwrap();
        assert!(rels.contains(&format!(r#"Id="{first}""#)));
        assert!(rels.contains(r#"Target="media/acta_image2.jpeg""#));

        let types = String::from_utf8(pkg.part_bytes(CONTENT_TYPES_PART).unwrap().unwrap()).unwrap();
        assert_eq!(types.matches(r#"Extension="jpeg""#).count(), 1);
    }
}
