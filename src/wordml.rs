//! WordprocessingML helpers over [`XmlTree`]: paragraphs, runs, tables and
//! property elements.
//!
//! These mirror the small slice of the object model the engine needs: a
//! paragraph's text is the concatenation of its direct runs, a run's text is
//! its `w:t` content with tabs and breaks rendered as `\t` and `\n`.

use crate::dom::{NodeId, Tag, XmlTree};

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Schema order of `w:pPr` children (CT_PPrBase + trailing elements).
pub const PPR_ORDER: &[&str] = &[
    "w:pStyle", "w:keepNext", "w:keepLines", "w:pageBreakBefore", "w:framePr",
    "w:widowControl", "w:numPr", "w:suppressLineNumbers", "w:pBdr", "w:shd",
    "w:tabs", "w:suppressAutoHyphens", "w:kinsoku", "w:wordWrap",
    "w:overflowPunct", "w:topLinePunct", "w:autoSpaceDE", "w:autoSpaceDN",
    "w:bidi", "w:adjustRightInd", "w:snapToGrid", "w:spacing", "w:ind",
    "w:contextualSpacing", "w:mirrorIndents", "w:suppressOverlap", "w:jc",
    "w:textDirection", "w:textAlignment", "w:textboxTightWrap", "w:outlineLvl",
    "w:divId", "w:cnfStyle", "w:rPr", "w:sectPr", "w:pPrChange",
];

/// Schema order of `w:rPr` children.
pub const RPR_ORDER: &[&str] = &[
    "w:rStyle", "w:rFonts", "w:b", "w:bCs", "w:i", "w:iCs", "w:caps",
    "w:smallCaps", "w:strike", "w:dstrike", "w:outline", "w:shadow", "w:emboss",
    "w:imprint", "w:noProof", "w:snapToGrid", "w:vanish", "w:webHidden",
    "w:color", "w:spacing", "w:w", "w:kern", "w:position", "w:sz", "w:szCs",
    "w:highlight", "w:u", "w:effect", "w:bdr", "w:shd", "w:fitText",
    "w:vertAlign", "w:rtl", "w:cs", "w:em", "w:lang", "w:eastAsianLayout",
    "w:specVanish", "w:oMath",
];

/// Schema order of `w:tcPr` children.
pub const TCPR_ORDER: &[&str] = &[
    "w:cnfStyle", "w:tcW", "w:gridSpan", "w:hMerge", "w:vMerge", "w:tcBorders",
    "w:shd", "w:noWrap", "w:tcMar", "w:textDirection", "w:tcFitText", "w:vAlign",
    "w:hideMark",
];

// ---------------------------------------------------------------------------
// Stories
// ---------------------------------------------------------------------------

/// The element whose children are the story's block content: `w:body` for
/// the main document, the root itself for headers and footers.
pub fn story_root(tree: &XmlTree) -> Option<NodeId> {
    let root = tree.document_element()?;
    if tree.is(root, Tag::Document) {
        tree.first_child(root, Tag::Body)
    } else if tree.element(root)?.tag().is_story_container() {
        Some(root)
    } else {
        None
    }
}

/// Every paragraph of a story in search order: the container's own
/// paragraphs first, then each table depth-first, row-major, with a cell's
/// paragraphs visited before the tables nested in that cell.
pub fn walk_paragraphs(tree: &XmlTree, container: NodeId) -> Vec<NodeId> {
    enum Item {
        Table(NodeId),
        Cell(NodeId),
    }

    let mut out = tree.child_elements(container, Tag::P);
    let mut stack: Vec<Item> = tree
        .child_elements(container, Tag::Tbl)
        .into_iter()
        .rev()
        .map(Item::Table)
        .collect();

    while let Some(item) = stack.pop() {
        match item {
            Item::Table(tbl) => {
                let cells: Vec<NodeId> = table_rows(tree, tbl)
                    .into_iter()
                    .flat_map(|tr| row_cells(tree, tr))
                    .collect();
                stack.extend(cells.into_iter().rev().map(Item::Cell));
            }
            Item::Cell(tc) => {
                out.extend(tree.child_elements(tc, Tag::P));
                stack.extend(
                    tree.child_elements(tc, Tag::Tbl)
                        .into_iter()
                        .rev()
                        .map(Item::Table),
                );
            }
        }
    }
    out
}

pub fn table_rows(tree: &XmlTree, tbl: NodeId) -> Vec<NodeId> {
    tree.child_elements(tbl, Tag::Tr)
}

pub fn row_cells(tree: &XmlTree, tr: NodeId) -> Vec<NodeId> {
    tree.child_elements(tr, Tag::Tc)
}

// ---------------------------------------------------------------------------
// Paragraphs and runs
// ---------------------------------------------------------------------------

pub fn paragraph_runs(tree: &XmlTree, p: NodeId) -> Vec<NodeId> {
    tree.child_elements(p, Tag::R)
}

pub fn run_text(tree: &XmlTree, r: NodeId) -> String {
    let mut out = String::new();
    for &child in tree.children(r) {
        match tree.element(child).map(|el| el.tag()) {
            Some(Tag::T) => out.push_str(&tree.text_content(child)),
            Some(Tag::Tab) => out.push('\t'),
            Some(Tag::Br) | Some(Tag::Cr) => out.push('\n'),
            _ => {}
        }
    }
    out
}

pub fn paragraph_text(tree: &XmlTree, p: NodeId) -> String {
    paragraph_runs(tree, p)
        .into_iter()
        .map(|r| run_text(tree, r))
        .collect()
}

/// Replace the run's text content, keeping its `w:rPr` and any non-text
/// children. Tabs and newlines become `w:tab` and `w:br`.
pub fn set_run_text(tree: &mut XmlTree, r: NodeId, text: &str) {
    let old: Vec<NodeId> = tree
        .children(r)
        .iter()
        .copied()
        .filter(|&c| tree.element(c).map(|el| el.tag().is_run_text()).unwrap_or(false))
        .collect();
    for child in old {
        tree.remove(child);
    }

    let mut segment = String::new();
    for ch in text.chars() {
        match ch {
            '\t' | '\n' => {
                append_text_segment(tree, r, &segment);
                segment.clear();
                let name = if ch == '\t' { "w:tab" } else { "w:br" };
                tree.append_element(r, name, &[]);
            }
            _ => segment.push(ch),
        }
    }
    append_text_segment(tree, r, &segment);
}

fn append_text_segment(tree: &mut XmlTree, r: NodeId, segment: &str) {
    if segment.is_empty() {
        return;
    }
    let t = tree.append_element(r, "w:t", &[("xml:space", "preserve")]);
    tree.set_text(t, segment);
}

/// A detached `w:r` holding `text`.
pub fn new_run(tree: &mut XmlTree, text: &str) -> NodeId {
    let r = tree.create_element("w:r", &[]);
    set_run_text(tree, r, text);
    r
}

/// A detached, empty `w:p`.
pub fn new_paragraph(tree: &mut XmlTree) -> NodeId {
    tree.create_element("w:p", &[])
}

// ---------------------------------------------------------------------------
// Property containers
// ---------------------------------------------------------------------------

/// Return the property container (`w:pPr`, `w:rPr`, `w:tcPr`, ...) of
/// `owner`, creating it as the first child if absent.
pub fn ensure_properties(tree: &mut XmlTree, owner: NodeId, name: &str) -> NodeId {
    if let Some(existing) = tree.first_child_named(owner, name) {
        return existing;
    }
    let pr = tree.create_element(name, &[]);
    tree.insert_child(owner, 0, pr);
    pr
}

/// Set (or replace) the property element `name` inside `pr`, keeping the
/// children in `order`.
pub fn set_property(
    tree: &mut XmlTree,
    pr: NodeId,
    order: &[&str],
    name: &str,
    attrs: &[(&str, &str)],
) -> NodeId {
    if let Some(existing) = tree.first_child_named(pr, name) {
        tree.remove(existing);
    }
    let rank = |n: &str| order.iter().position(|o| *o == n).unwrap_or(order.len());
    let target = rank(name);
    let index = tree
        .children(pr)
        .iter()
        .position(|&c| {
            tree.element(c)
                .map(|el| rank(el.name()) > target)
                .unwrap_or(false)
        })
        .unwrap_or(tree.children(pr).len());

    let prop = tree.create_element(name, attrs);
    tree.insert_child(pr, index, prop);
    prop
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> XmlTree {
        let xml = format!(r#"<w:document xmlns:w="{W_NS}"><w:body>{body}</w:body></w:document>"#);
        XmlTree::parse("word/document.xml", xml.as_bytes()).unwrap()
    }

    #[test]
    fn run_text_renders_tabs_and_breaks() {
        let tree = doc("<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/></w:r><w:r><w:t>c</w:t></w:r></w:p>");
        let body = story_root(&tree).unwrap();
        let p = tree.child_elements(body, Tag::P)[0];
        assert_eq!(paragraph_text(&tree, p), "a\tb\nc");
    }

    #[test]
    fn set_run_text_keeps_properties() {
        let mut tree = doc("<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>old</w:t></w:r></w:p>");
        let body = story_root(&tree).unwrap();
        let p = tree.child_elements(body, Tag::P)[0];
        let r = paragraph_runs(&tree, p)[0];
        set_run_text(&mut tree, r, "new\tline");
        assert_eq!(run_text(&tree, r), "new\tline");
        assert!(tree.first_child(r, Tag::RPr).is_some());
    }

    #[test]
    fn walk_visits_body_then_tables_depth_first() {
        let tree = doc(concat!(
            "<w:tbl><w:tr>",
            "<w:tc><w:p><w:r><w:t>c1</w:t></w:r></w:p>",
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>nested</w:t></w:r></w:p></w:tc></w:tr></w:tbl></w:tc>",
            "<w:tc><w:p><w:r><w:t>c2</w:t></w:r></w:p></w:tc>",
            "</w:tr></w:tbl>",
            "<w:p><w:r><w:t>body</w:t></w:r></w:p>",
        ));
        let body = story_root(&tree).unwrap();
        let texts: Vec<String> = walk_paragraphs(&tree, body)
            .into_iter()
            .map(|p| paragraph_text(&tree, p))
            .collect();
        assert_eq!(texts, vec!["body", "c1", "nested", "c2"]);
    }

    #[test]
    fn set_property_respects_schema_order() {
        let mut tree = doc("<w:p><w:pPr><w:pStyle w:val=\"x\"/><w:rPr/></w:pPr></w:p>");
        let body = story_root(&tree).unwrap();
        let p = tree.child_elements(body, Tag::P)[0];
        let ppr = ensure_properties(&mut tree, p, "w:pPr");
        set_property(&mut tree, ppr, PPR_ORDER, "w:jc", &[("w:val", "center")]);
        set_property(&mut tree, ppr, PPR_ORDER, "w:spacing", &[("w:before", "40")]);
        let names: Vec<&str> = tree
            .children(ppr)
            .iter()
            .filter_map(|&c| tree.element(c).map(|el| el.name()))
            .collect();
        assert_eq!(names, vec!["w:pStyle", "w:spacing", "w:jc", "w:rPr"]);
    }

    #[test]
    fn header_root_is_its_own_story() {
        let xml = format!(r#"<w:hdr xmlns:w="{W_NS}"><w:p/></w:hdr>"#);
        let tree = XmlTree::parse("word/header1.xml", xml.as_bytes()).unwrap();
        assert_eq!(story_root(&tree), tree.document_element());
    }
}
