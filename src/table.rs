//! Dynamic table injection: find the table placeholder paragraph in the
//! body and splice a freshly built device table in its place.

use crate::context::DeviceRow;
use crate::devices::{self, DisplayRow, DASH, NOT_AVAILABLE};
use crate::dom::{NodeId, XmlTree};
use crate::error::DocxError;
use crate::mapping::{MappingSource, SemanticKey, Template, TemplateCategory};
use crate::package::DocxPackage;
use crate::placeholders::find_paragraph;
use crate::wordml;

/// Placeholder looked for when a template has no declared mapping.
pub const DEFAULT_TABLE_PLACEHOLDER: &str = "TABLA";

const HEADER_FILL: &str = "FF0000";
const HEADER_TEXT: &str = "FFFFFF";
/// Data rows are 8pt (half-points).
const DATA_FONT_SIZE: &str = "16";
const BORDER_COLOR: &str = "000000";

/// Column set of the generated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
    /// 8 columns including hostname.
    Standard,
    /// 7 columns, no hostname.
    Sale,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Quantity,
    Equipment,
    Status,
    Brand,
    Model,
    Serial,
    Hostname,
    InventoryCode,
}

impl Column {
    fn centered(&self) -> bool {
        matches!(self, Column::Quantity | Column::Status)
    }

    fn value(&self, row: &DisplayRow) -> String {
        let or_na = |v: &str| {
            if v.trim().is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                v.to_string()
            }
        };
        let or_na_dash = |v: &str| {
            if v.trim().is_empty() || v.trim() == DASH {
                NOT_AVAILABLE.to_string()
            } else {
                v.to_string()
            }
        };
        match self {
            Column::Quantity => "1".to_string(),
            Column::Equipment => or_na(&row.equipment),
            Column::Status => or_na(&row.status),
            Column::Brand => or_na(&row.brand),
            Column::Model => or_na(&row.model),
            Column::Serial => or_na(&row.serial),
            Column::Hostname => or_na_dash(&row.hostname),
            Column::InventoryCode => or_na_dash(&row.inventory_code),
        }
    }
}

impl TableLayout {
    /// Sale layout when the key is the sale table or the placeholder name
    /// says so.
    pub fn for_target(key: Option<SemanticKey>, placeholder: &str) -> Self {
        let name = placeholder.to_uppercase();
        if key == Some(SemanticKey::SaleTable) || name.contains("SALE_TABLE") || name.contains("TABLA_VENTA") {
            TableLayout::Sale
        } else {
            TableLayout::Standard
        }
    }

    fn columns(&self) -> &'static [(Column, &'static str, u32)] {
        match self {
            TableLayout::Standard => &[
                (Column::Quantity, "CANT.", 600),
                (Column::Equipment, "EQUIPO", 1400),
                (Column::Status, "ESTADO", 1000),
                (Column::Brand, "MARCA", 1100),
                (Column::Model, "MODELO", 1300),
                (Column::Serial, "SERIE", 1300),
                (Column::Hostname, "HOSTNAME", 1200),
                (Column::InventoryCode, "CÓDIGO DE\nINVENTARIO", 1300),
            ],
            TableLayout::Sale => &[
                (Column::Quantity, "CANT.", 600),
                (Column::Equipment, "EQUIPO", 1500),
                (Column::Status, "ESTADO", 1000),
                (Column::Brand, "MARCA", 1200),
                (Column::Model, "MODELO", 1500),
                (Column::Serial, "NUMERO\nSERIE", 1500),
                (Column::InventoryCode, "CÓDIGO DE\nINVENTARIO", 1500),
            ],
        }
    }

    pub fn headers(&self) -> Vec<&'static str> {
        self.columns().iter().map(|(_, h, _)| *h).collect()
    }

    /// Cell texts for one row, in column order.
    pub fn cells(&self, row: &DisplayRow) -> Vec<String> {
        self.columns().iter().map(|(c, _, _)| c.value(row)).collect()
    }
}

/// Where the table goes and how it looks.
#[derive(Debug, Clone, PartialEq)]
pub struct TableTarget {
    pub placeholder: String,
    pub key: Option<SemanticKey>,
}

impl TableTarget {
    pub fn layout(&self) -> TableLayout {
        TableLayout::for_target(self.key, &self.placeholder)
    }
}

/// Decide which placeholder (if any) receives the device table.
///
/// The first declared table key wins; otherwise the fallback name applies.
/// Decommission reports never get a table.
pub fn table_target(source: &MappingSource, category: TemplateCategory, fallback: &str) -> Option<TableTarget> {
    if category.is_decommission() {
        return None;
    }
    let declared = match source {
        MappingSource::Declared(mapping) => mapping.table_entry(),
        MappingSource::Legacy => None,
    };
    Some(match declared {
        Some(e) => TableTarget {
            placeholder: e.placeholder.clone(),
            key: Some(e.key),
        },
        None => TableTarget {
            placeholder: fallback.to_string(),
            key: None,
        },
    })
}

// ---------------------------------------------------------------------------
// Table construction
// ---------------------------------------------------------------------------

fn append_cell(tree: &mut XmlTree, tr: NodeId, width: u32, text: &str, header: bool, centered: bool) {
    let tc = tree.append_element(tr, "w:tc", &[]);
    let tcpr = tree.append_element(tc, "w:tcPr", &[]);
    let width = width.to_string();
    tree.append_element(tcpr, "w:tcW", &[("w:w", width.as_str()), ("w:type", "dxa")]);
    if header {
        tree.append_element(tcpr, "w:shd", &[("w:val", "clear"), ("w:color", "auto"), ("w:fill", HEADER_FILL)]);
    }
    tree.append_element(tcpr, "w:vAlign", &[("w:val", "center")]);

    let p = tree.append_element(tc, "w:p", &[]);
    if header || centered {
        let ppr = tree.append_element(p, "w:pPr", &[]);
        tree.append_element(ppr, "w:jc", &[("w:val", "center")]);
    }
    let r = tree.append_element(p, "w:r", &[]);
    let rpr = tree.append_element(r, "w:rPr", &[]);
    if header {
        tree.append_element(rpr, "w:b", &[]);
        tree.append_element(rpr, "w:color", &[("w:val", HEADER_TEXT)]);
    } else {
        tree.append_element(rpr, "w:sz", &[("w:val", DATA_FONT_SIZE)]);
        tree.append_element(rpr, "w:szCs", &[("w:val", DATA_FONT_SIZE)]);
    }
    wordml::set_run_text(tree, r, text);
}

/// Build a detached `w:tbl` with one header row and one row per device.
pub fn build_table(tree: &mut XmlTree, layout: TableLayout, rows: &[DisplayRow]) -> NodeId {
    let columns = layout.columns();
    let tbl = tree.create_element("w:tbl", &[]);

    let tblpr = tree.append_element(tbl, "w:tblPr", &[]);
    tree.append_element(tblpr, "w:tblW", &[("w:w", "0"), ("w:type", "auto")]);
    tree.append_element(tblpr, "w:jc", &[("w:val", "center")]);
    let borders = tree.append_element(tblpr, "w:tblBorders", &[]);
    for side in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
        tree.append_element(
            borders,
            side,
            &[("w:val", "single"), ("w:sz", "4"), ("w:space", "0"), ("w:color", BORDER_COLOR)],
        );
    }
    tree.append_element(tblpr, "w:tblLayout", &[("w:type", "fixed")]);

    let grid = tree.append_element(tbl, "w:tblGrid", &[]);
    for (_, _, width) in columns {
        let width = width.to_string();
        tree.append_element(grid, "w:gridCol", &[("w:w", width.as_str())]);
    }

    let header = tree.append_element(tbl, "w:tr", &[]);
    let trpr = tree.append_element(header, "w:trPr", &[]);
    tree.append_element(trpr, "w:tblHeader", &[]);
    for (_, label, width) in columns {
        append_cell(tree, header, *width, label, true, true);
    }

    for row in rows {
        let tr = tree.append_element(tbl, "w:tr", &[]);
        for (column, _, width) in columns {
            append_cell(tree, tr, *width, &column.value(row), false, column.centered());
        }
    }
    tbl
}

// ---------------------------------------------------------------------------
// Injection
// ---------------------------------------------------------------------------

/// Replace the paragraph holding `target` with the device table. Returns
/// false (document untouched) when the placeholder is not in the body.
pub fn inject_table(pkg: &mut DocxPackage, target: &TableTarget, devices: &[DeviceRow]) -> Result<bool, DocxError> {
    let tree = pkg.document_mut()?;
    let Some(story) = wordml::story_root(tree) else {
        return Ok(false);
    };
    let Some(anchor) = find_paragraph(tree, story, &target.placeholder) else {
        log::warn!(
            "Table placeholder {{{{{}}}}} not found in document; it will remain visible",
            target.placeholder
        );
        return Ok(false);
    };

    let rows = devices::transform(devices);
    let layout = target.layout();
    let tbl = build_table(tree, layout, &rows);
    tree.insert_before(anchor, tbl);
    let spacer = wordml::new_paragraph(tree);
    tree.insert_before(anchor, spacer);
    tree.remove(anchor);

    log::debug!(
        "Inserted {:?} device table at {{{{{}}}}} with {} rows",
        layout,
        target.placeholder,
        rows.len()
    );
    Ok(true)
}

/// Inject the device table for `template`. True iff a table was inserted.
pub fn inject(pkg: &mut DocxPackage, template: &Template, devices: &[DeviceRow]) -> Result<bool, DocxError> {
    let source = template.load_mapping();
    match table_target(&source, template.category, DEFAULT_TABLE_PLACEHOLDER) {
        Some(target) => inject_table(pkg, &target, devices),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Tag;
    use crate::mapping::VariableMapping;
    use crate::templates::{build_docx, NESTED_TABLE_BODY};

    fn texts(tree: &XmlTree, tr: NodeId) -> Vec<String> {
        wordml::row_cells(tree, tr)
            .into_iter()
            .map(|tc| tree.text_content(tc))
            .collect()
    }

    #[test]
    fn layout_selection() {
        assert_eq!(TableLayout::for_target(Some(SemanticKey::SaleTable), "X"), TableLayout::Sale);
        assert_eq!(TableLayout::for_target(None, "tabla_venta"), TableLayout::Sale);
        assert_eq!(TableLayout::for_target(Some(SemanticKey::DeviceTable), "TABLA"), TableLayout::Standard);
        assert_eq!(TableLayout::Standard.headers().len(), 8);
        assert_eq!(TableLayout::Sale.headers().len(), 7);
        assert!(!TableLayout::Sale.headers().contains(&"HOSTNAME"));
    }

    #[test]
    fn cells_fill_missing_values() {
        let rows = devices::transform(&[DeviceRow::new("LAPTOP").with_brand("dell")]);
        let cells = TableLayout::Standard.cells(&rows[0]);
        assert_eq!(cells, vec!["1", "LAPTOP", "USADO", "DELL", "N/A", "-", "N/A", "N/A"]);
    }

    #[test]
    fn built_table_has_header_and_rows() {
        let mut tree = XmlTree::new();
        let rows = devices::transform(&[DeviceRow::new("MONITOR").with_serial("M1")]);
        let tbl = build_table(&mut tree, TableLayout::Standard, &rows);
        let trs = wordml::table_rows(&tree, tbl);
        assert_eq!(trs.len(), 4);
        assert_eq!(texts(&tree, trs[0])[0], "CANT.");
        assert_eq!(texts(&tree, trs[0])[7], "CÓDIGO DEINVENTARIO");
        assert_eq!(texts(&tree, trs[2])[1], "CABLE DE PODER");

        let header_cell = wordml::row_cells(&tree, trs[0])[0];
        let tcpr = tree.first_child(header_cell, Tag::TcPr).unwrap();
        let shd = tree.first_child_named(tcpr, "w:shd").unwrap();
        assert_eq!(tree.element(shd).unwrap().attr("w:fill"), Some("FF0000"));
    }

    #[test]
    fn target_rules() {
        let legacy = MappingSource::Legacy;
        assert_eq!(
            table_target(&legacy, TemplateCategory::AssignmentComputer, "TABLA").unwrap().placeholder,
            "TABLA"
        );
        assert!(table_target(&legacy, TemplateCategory::ActaBaja, "TABLA").is_none());

        let no_table = MappingSource::Declared(VariableMapping::parse(r#"{"N":"EMPLOYEE_NAME"}"#).unwrap());
        assert_eq!(
            table_target(&no_table, TemplateCategory::AssignmentComputer, "TABLA"),
            Some(TableTarget { placeholder: "TABLA".into(), key: None })
        );

        let sale = MappingSource::Declared(VariableMapping::parse(r#"{"N":"EMPLOYEE_NAME","VENTA":"SALE_TABLE"}"#).unwrap());
        assert_eq!(
            table_target(&sale, TemplateCategory::ActaVenta, "TABLA").unwrap().key,
            Some(SemanticKey::SaleTable)
        );

        let decom = MappingSource::Declared(VariableMapping::parse(r#"{"EQ":"DECOMMISSION_TABLE"}"#).unwrap());
        assert!(table_target(&decom, TemplateCategory::ActaBaja, "TABLA").is_none());
    }

    #[test]
    fn injects_into_nested_cell_and_removes_anchor() {
        let mut pkg = DocxPackage::from_bytes(&build_docx(NESTED_TABLE_BODY, &[])).unwrap();
        let target = TableTarget {
            placeholder: "TABLA_EQUIPOS".into(),
            key: Some(SemanticKey::DeviceTable),
        };
        let inserted = inject_table(&mut pkg, &target, &[DeviceRow::new("LAPTOP")]).unwrap();
        assert!(inserted);

        let tree = pkg.document().unwrap();
        let root = tree.document_element().unwrap();
        let text = tree.text_content(root);
        assert!(!text.contains("TABLA_EQUIPOS"));
        assert!(text.contains("HOSTNAME"));

        // The new table sits in the inner cell, followed by the spacer paragraph.
        let tables: Vec<NodeId> = tree.descendants(root).into_iter().filter(|&n| tree.is(n, Tag::Tbl)).collect();
        assert_eq!(tables.len(), 3);
        let new_tbl = tables[2];
        let cell = tree.parent(new_tbl).unwrap();
        assert!(tree.is(cell, Tag::Tc));
        let siblings = tree.children(cell);
        let pos = siblings.iter().position(|&c| c == new_tbl).unwrap();
        assert!(tree.is(siblings[pos + 1], Tag::P));
    }

    #[test]
    fn missing_placeholder_returns_false() {
        let mut pkg = DocxPackage::from_bytes(&build_docx(NESTED_TABLE_BODY, &[])).unwrap();
        let before = pkg.part_bytes("word/document.xml").unwrap();
        let target = TableTarget {
            placeholder: "NOT_THERE".into(),
            key: None,
        };
        assert!(!inject_table(&mut pkg, &target, &[]).unwrap());
        assert_eq!(pkg.part_bytes("word/document.xml").unwrap(), before);
    }
}
