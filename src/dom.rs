//! XML tree – an owned, mutable arena of nodes for one WordprocessingML part.
//!
//! Parts are read with `quick-xml` into a flat arena addressed by [`NodeId`].
//! Every walk over the tree (parse, serialise, descendant scans, subtree
//! copies) uses an explicit stack, so adversarially deep documents (tables
//! nested thousands of levels) cannot exhaust the call stack.
//!
//! The edit API is deliberately small: create, append, insert-before,
//! remove (detach) and subtree copy. Detached nodes stay in the arena but are
//! unreachable from the root and are never serialised.

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::DocxError;

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// The WordprocessingML elements the engine understands. Everything else is
/// carried through untouched as [`Tag::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Document,
    Body,
    Header,
    Footer,
    P,
    PPr,
    R,
    RPr,
    T,
    Tab,
    Br,
    Cr,
    Tbl,
    TblPr,
    TblGrid,
    Tr,
    Tc,
    TcPr,
    Drawing,
    SectPr,
    Other,
}

impl Tag {
    pub fn from_name(name: &str) -> Self {
        match name {
            "w:document" => Tag::Document,
            "w:body" => Tag::Body,
            "w:hdr" => Tag::Header,
            "w:ftr" => Tag::Footer,
            "w:p" => Tag::P,
            "w:pPr" => Tag::PPr,
            "w:r" => Tag::R,
            "w:rPr" => Tag::RPr,
            "w:t" => Tag::T,
            "w:tab" => Tag::Tab,
            "w:br" => Tag::Br,
            "w:cr" => Tag::Cr,
            "w:tbl" => Tag::Tbl,
            "w:tblPr" => Tag::TblPr,
            "w:tblGrid" => Tag::TblGrid,
            "w:tr" => Tag::Tr,
            "w:tc" => Tag::Tc,
            "w:tcPr" => Tag::TcPr,
            "w:drawing" => Tag::Drawing,
            "w:sectPr" => Tag::SectPr,
            _ => Tag::Other,
        }
    }

    /// Elements that hold a story: the document body or a header/footer root.
    pub fn is_story_container(&self) -> bool {
        matches!(self, Tag::Body | Tag::Header | Tag::Footer)
    }

    /// Run children that contribute to the run's rendered text.
    pub fn is_run_text(&self) -> bool {
        matches!(self, Tag::T | Tag::Tab | Tag::Br | Tag::Cr)
    }
}

// ---------------------------------------------------------------------------
// Node types
// ---------------------------------------------------------------------------

/// Index of a node inside its [`XmlTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// The payload of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The synthetic root holding the document element.
    Document,
    Element(ElementNode),
    Text(String),
    CData(String),
    Comment(String),
}

/// An element with its qualified name and attributes (in source order).
#[derive(Debug, Clone)]
pub struct ElementNode {
    name: String,
    tag: Tag,
    pub attributes: Vec<(String, String)>,
}

impl ElementNode {
    pub fn new(name: &str, attributes: Vec<(String, String)>) -> Self {
        Self {
            name: name.to_string(),
            tag: Tag::from_name(name),
            attributes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct XmlDecl {
    version: String,
    encoding: Option<String>,
    standalone: Option<String>,
}

/// Pre-order copy of a subtree: each entry carries the index of its parent
/// entry, `None` for the subtree root.
type Snapshot = Vec<(NodeKind, Option<usize>)>;

/// An owned XML document.
#[derive(Debug, Clone)]
pub struct XmlTree {
    slots: Vec<Slot>,
    decl: Option<XmlDecl>,
}

impl Default for XmlTree {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Parsing and serialisation
// ---------------------------------------------------------------------------

impl XmlTree {
    /// An empty tree holding only the synthetic root.
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            decl: None,
        }
    }

    /// Parse one package part. `part` is only used in error messages.
    pub fn parse(part: &str, xml: &[u8]) -> Result<Self, DocxError> {
        let mut reader = Reader::from_reader(xml);
        reader.trim_text(false);

        let mut tree = XmlTree::new();
        let mut open = vec![tree.root()];
        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                DocxError::xml(part, format!("at position {}: {e}", reader.buffer_position()))
            })?;
            let parent = *open.last().unwrap_or(&NodeId(0));

            match event {
                Event::Decl(d) => tree.decl = Some(read_decl(&d, part)?),
                Event::Start(e) => {
                    let id = tree.push(NodeKind::Element(read_element(&e, part)?));
                    tree.append_child(parent, id);
                    open.push(id);
                }
                Event::Empty(e) => {
                    let id = tree.push(NodeKind::Element(read_element(&e, part)?));
                    tree.append_child(parent, id);
                }
                Event::End(_) => {
                    if open.len() <= 1 {
                        return Err(DocxError::xml(part, "unbalanced end tag"));
                    }
                    open.pop();
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| DocxError::xml(part, e))?;
                    // Formatting whitespace outside the document element is dropped.
                    let top_level_blank = open.len() == 1 && text.trim().is_empty();
                    if !text.is_empty() && !top_level_blank {
                        let id = tree.push(NodeKind::Text(text.into_owned()));
                        tree.append_child(parent, id);
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    let id = tree.push(NodeKind::CData(text));
                    tree.append_child(parent, id);
                }
                Event::Comment(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    let id = tree.push(NodeKind::Comment(text));
                    tree.append_child(parent, id);
                }
                Event::Eof => break,
                // Processing instructions and doctypes do not occur in DOCX parts.
                _ => {}
            }
            buf.clear();
        }

        if open.len() != 1 {
            return Err(DocxError::xml(part, "unexpected end of document"));
        }
        Ok(tree)
    }

    /// Parse a standalone markup fragment (namespace prefixes need not be
    /// declared). Used to build small canned structures such as drawings.
    pub fn parse_fragment(xml: &str) -> Result<Self, DocxError> {
        Self::parse("fragment", xml.as_bytes())
    }

    /// Serialise the tree back to bytes.
    pub fn to_bytes(&self, part: &str) -> Result<Vec<u8>, DocxError> {
        let mut writer = Writer::new(Vec::new());

        if let Some(decl) = &self.decl {
            writer
                .write_event(Event::Decl(BytesDecl::new(
                    &decl.version,
                    decl.encoding.as_deref(),
                    decl.standalone.as_deref(),
                )))
                .map_err(|e| DocxError::xml(part, e))?;
            writer.get_mut().extend_from_slice(b"\r\n");
        }

        // (node, closing) pairs; a closing entry emits the end tag.
        let mut stack: Vec<(NodeId, bool)> = self
            .children(self.root())
            .iter()
            .rev()
            .map(|&c| (c, false))
            .collect();

        while let Some((id, closing)) = stack.pop() {
            let slot = &self.slots[id.0];
            let event = match &slot.kind {
                NodeKind::Element(el) if closing => Event::End(BytesEnd::new(el.name())),
                NodeKind::Element(el) => {
                    let mut start = BytesStart::new(el.name());
                    for (k, v) in &el.attributes {
                        start.push_attribute((k.as_str(), v.as_str()));
                    }
                    if slot.children.is_empty() {
                        Event::Empty(start)
                    } else {
                        stack.push((id, true));
                        stack.extend(slot.children.iter().rev().map(|&c| (c, false)));
                        Event::Start(start)
                    }
                }
                NodeKind::Text(t) => Event::Text(BytesText::new(t)),
                NodeKind::CData(t) => Event::CData(BytesCData::new(t.as_str())),
                NodeKind::Comment(t) => Event::Comment(BytesText::from_escaped(t.as_str())),
                NodeKind::Document => continue,
            };
            writer
                .write_event(event)
                .map_err(|e| DocxError::xml(part, e))?;
        }

        Ok(writer.into_inner())
    }
}

fn read_element(e: &BytesStart, part: &str) -> Result<ElementNode, DocxError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DocxError::xml(part, err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| DocxError::xml(part, err))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(ElementNode::new(&name, attributes))
}

fn read_decl(d: &BytesDecl, part: &str) -> Result<XmlDecl, DocxError> {
    let lossy = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
    let version = d.version().map_err(|e| DocxError::xml(part, e))?;
    let encoding = match d.encoding() {
        Some(Ok(enc)) => Some(lossy(&enc)),
        Some(Err(e)) => return Err(DocxError::xml(part, e)),
        None => None,
    };
    let standalone = match d.standalone() {
        Some(Ok(sa)) => Some(lossy(&sa)),
        Some(Err(e)) => return Err(DocxError::xml(part, e)),
        None => None,
    };
    Ok(XmlDecl {
        version: lossy(&version),
        encoding,
        standalone,
    })
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

impl XmlTree {
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element (`w:document`, `w:hdr`, ...).
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&c| self.element(c).is_some())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.slots[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementNode> {
        match &self.slots[id.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementNode> {
        match &mut self.slots[id.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is(&self, id: NodeId, tag: Tag) -> bool {
        self.element(id).map(|el| el.tag() == tag).unwrap_or(false)
    }

    pub fn is_named(&self, id: NodeId, name: &str) -> bool {
        self.element(id).map(|el| el.name() == name).unwrap_or(false)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.slots[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0].parent
    }

    /// Direct element children carrying `tag`.
    pub fn child_elements(&self, id: NodeId, tag: Tag) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is(c, tag))
            .collect()
    }

    pub fn first_child(&self, id: NodeId, tag: Tag) -> Option<NodeId> {
        self.children(id).iter().copied().find(|&c| self.is(c, tag))
    }

    pub fn first_child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.is_named(c, name))
    }

    /// All nodes below `id` in document order (pre-order, `id` excluded).
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Concatenated character data of every text node below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let NodeKind::Text(t) | NodeKind::CData(t) = self.kind(node) {
                out.push_str(t);
            }
        }
        out
    }

    /// True if `id` is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root() {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

impl XmlTree {
    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.slots.push(Slot {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.slots.len() - 1)
    }

    /// A new detached element.
    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attributes = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.push(NodeKind::Element(ElementNode::new(name, attributes)))
    }

    /// A new detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    /// Create an element and append it to `parent` in one step.
    pub fn append_element(&mut self, parent: NodeId, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let id = self.create_element(name, attrs);
        self.append_child(parent, id);
        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.slots[id.0].parent.take() {
            self.slots[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Append `child` as the last child of `parent`, moving it if attached.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.slots[child.0].parent = Some(parent);
        self.slots[parent.0].children.push(child);
    }

    /// Insert `child` at `index` among `parent`'s children (clamped).
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let children = &mut self.slots[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.slots[child.0].parent = Some(parent);
    }

    /// Insert `node` immediately before `anchor`. Returns false if `anchor`
    /// has no parent.
    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) -> bool {
        let Some(parent) = self.parent(anchor) else {
            return false;
        };
        self.detach(node);
        let index = self.slots[parent.0]
            .children
            .iter()
            .position(|&c| c == anchor)
            .unwrap_or(0);
        self.slots[parent.0].children.insert(index, node);
        self.slots[node.0].parent = Some(parent);
        true
    }

    /// Detach `id` from its parent. Returns false if it was already detached.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let attached = self.parent(id).is_some();
        self.detach(id);
        attached
    }

    /// Replace all children of `id` with one text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        for child in self.children(id).to_vec() {
            self.detach(child);
        }
        let t = self.create_text(text);
        self.append_child(id, t);
    }

    fn snapshot(&self, id: NodeId) -> Snapshot {
        let mut out = Vec::new();
        let mut stack = vec![(id, None)];
        while let Some((node, parent_idx)) = stack.pop() {
            let idx = out.len();
            out.push((self.slots[node.0].kind.clone(), parent_idx));
            stack.extend(self.children(node).iter().rev().map(|&c| (c, Some(idx))));
        }
        out
    }

    fn instantiate(&mut self, snapshot: Snapshot) -> NodeId {
        let mut ids: Vec<NodeId> = Vec::with_capacity(snapshot.len());
        for (kind, parent_idx) in snapshot {
            let id = self.push(kind);
            if let Some(p) = parent_idx {
                self.append_child(ids[p], id);
            }
            ids.push(id);
        }
        ids[0]
    }

    /// Deep-copy the subtree at `id`; the copy is detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let snapshot = self.snapshot(id);
        self.instantiate(snapshot)
    }

    /// Deep-copy a subtree of another tree into this one; the copy is detached.
    pub fn import(&mut self, other: &XmlTree, id: NodeId) -> NodeId {
        self.instantiate(other.snapshot(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve">A &amp; B </w:t></w:r></w:p></w:body></w:document>"#;

    #[test]
    fn parse_and_serialise_preserves_text_and_entities() {
        let tree = XmlTree::parse("word/document.xml", SAMPLE.as_bytes()).unwrap();
        let doc = tree.document_element().unwrap();
        assert!(tree.is(doc, Tag::Document));
        assert_eq!(tree.text_content(doc), "A & B ");

        let bytes = tree.to_bytes("word/document.xml").unwrap();
        let out = String::from_utf8(bytes).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(out.contains("A &amp; B "));
        assert!(out.contains(r#"xml:space="preserve""#));
    }

    #[test]
    fn insert_before_and_remove() {
        let mut tree = XmlTree::parse("t", b"<a><b/><c/></a>").unwrap();
        let a = tree.document_element().unwrap();
        let c = tree.children(a)[1];
        let x = tree.create_element("x", &[("k", "v\"q")]);
        assert!(tree.insert_before(c, x));
        assert!(tree.remove(c));
        assert!(!tree.is_attached(c));

        let out = String::from_utf8(tree.to_bytes("t").unwrap()).unwrap();
        assert_eq!(out, r#"<a><b/><x k="v&quot;q"/></a>"#);
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 20_000;
        let mut xml = String::new();
        for _ in 0..depth {
            xml.push_str("<n>");
        }
        xml.push_str("leaf");
        for _ in 0..depth {
            xml.push_str("</n>");
        }
        let tree = XmlTree::parse("deep", xml.as_bytes()).unwrap();
        let root = tree.document_element().unwrap();
        assert_eq!(tree.text_content(root), "leaf");
        let out = tree.to_bytes("deep").unwrap();
        assert_eq!(out.len(), xml.len());
    }

    #[test]
    fn clone_and_import_subtrees() {
        let mut tree = XmlTree::parse("t", b"<a><b><c>1</c><d>2</d></b></a>").unwrap();
        let a = tree.document_element().unwrap();
        let b = tree.children(a)[0];
        let copy = tree.clone_subtree(b);
        tree.append_child(a, copy);
        assert_eq!(tree.text_content(a), "1212");

        let frag = XmlTree::parse_fragment("<w:x><w:y>z</w:y></w:x>").unwrap();
        let imported = tree.import(&frag, frag.document_element().unwrap());
        tree.append_child(a, imported);
        let out = String::from_utf8(tree.to_bytes("t").unwrap()).unwrap();
        assert!(out.ends_with("<w:x><w:y>z</w:y></w:x></a>"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(XmlTree::parse("bad", b"<a><b></a>").is_err());
    }
}
