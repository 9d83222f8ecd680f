//! Placeholder resolution: scalar `{{TOKEN}}` substitution over every story
//! of a package.
//!
//! Each paragraph goes through two phases. Phase A replaces tokens that sit
//! entirely inside one run, leaving the run's formatting alone. Phase B
//! handles tokens split across runs: the paragraph's text is flattened,
//! substituted and written back as a single run that keeps the first run's
//! basic formatting. A final raw pass over every `w:t` element catches text
//! outside ordinary paragraphs (text boxes, content controls).

use crate::dom::{NodeId, Tag, XmlTree};
use crate::error::DocxError;
use crate::package::DocxPackage;
use crate::wordml;

/// The four ways a placeholder may be written in a template:
/// `{{NAME}}`, `{{ NAME }}`, `{{name}}`, `{{ name }}`. Duplicates (names
/// already in lower case) are dropped.
pub fn surface_variants(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    let mut out = Vec::with_capacity(4);
    for token in [
        format!("{{{{{name}}}}}"),
        format!("{{{{ {name} }}}}"),
        format!("{{{{{lower}}}}}"),
        format!("{{{{ {lower} }}}}"),
    ] {
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

/// Ordered token → value table. Re-inserting a token replaces its value in
/// place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderMap {
    entries: Vec<(String, String)>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a literal token (delimiters included).
    pub fn insert_token(&mut self, token: impl Into<String>, value: impl Into<String>) {
        let token = token.into();
        let value = value.into();
        if token.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(t, _)| *t == token) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((token, value)),
        }
    }

    /// Register `name` under all of its surface variants.
    pub fn insert(&mut self, name: &str, value: &str) {
        for token in surface_variants(name) {
            self.insert_token(token, value);
        }
    }

    pub fn remove_token(&mut self, token: &str) {
        self.entries.retain(|(t, _)| t != token);
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }

    pub fn contains_any(&self, text: &str) -> bool {
        self.entries.iter().any(|(t, _)| text.contains(t.as_str()))
    }

    /// Replace every registered token in `text`, in registration order.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (token, value) in &self.entries {
            if out.contains(token.as_str()) {
                out = out.replace(token.as_str(), value);
            }
        }
        out
    }
}

/// What a substitution pass touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstitutionStats {
    /// Runs rewritten in place (phase A).
    pub runs: usize,
    /// Paragraphs collapsed into a single run (phase B).
    pub collapsed_paragraphs: usize,
    /// `w:t` elements rewritten by the raw pass.
    pub raw_texts: usize,
}

impl SubstitutionStats {
    pub fn total(&self) -> usize {
        self.runs + self.collapsed_paragraphs + self.raw_texts
    }
}

/// Run properties carried over when a paragraph is collapsed.
const KEPT_RUN_PROPERTIES: &[&str] = &["w:rFonts", "w:b", "w:bCs", "w:i", "w:iCs", "w:sz", "w:szCs"];

/// Substitute tokens in one paragraph. Returns `(runs rewritten, collapsed)`.
pub fn substitute_paragraph(tree: &mut XmlTree, p: NodeId, map: &PlaceholderMap) -> (usize, bool) {
    // Phase A
    let mut rewritten = 0;
    for r in wordml::paragraph_runs(tree, p) {
        let text = wordml::run_text(tree, r);
        if map.contains_any(&text) {
            wordml::set_run_text(tree, r, &map.apply(&text));
            rewritten += 1;
        }
    }

    // Phase B
    let full = wordml::paragraph_text(tree, p);
    if !map.contains_any(&full) {
        return (rewritten, false);
    }
    let resolved = map.apply(&full);
    let runs = wordml::paragraph_runs(tree, p);
    let rpr = runs
        .first()
        .and_then(|&r| tree.first_child(r, Tag::RPr))
        .map(|src| copy_basic_run_properties(tree, src));

    for r in runs {
        tree.remove(r);
    }
    let run = tree.append_element(p, "w:r", &[]);
    if let Some(rpr) = rpr {
        tree.append_child(run, rpr);
    }
    wordml::set_run_text(tree, run, &resolved);
    log::debug!("Collapsed split placeholder paragraph into one run");
    (rewritten, true)
}

fn copy_basic_run_properties(tree: &mut XmlTree, src: NodeId) -> NodeId {
    let rpr = tree.create_element("w:rPr", &[]);
    let kept: Vec<NodeId> = tree
        .children(src)
        .iter()
        .copied()
        .filter(|&c| {
            tree.element(c)
                .map(|el| KEPT_RUN_PROPERTIES.contains(&el.name()))
                .unwrap_or(false)
        })
        .collect();
    for child in kept {
        let copy = tree.clone_subtree(child);
        tree.append_child(rpr, copy);
    }
    rpr
}

/// Structured pass over one story part (body, header or footer).
pub fn substitute_story(tree: &mut XmlTree, map: &PlaceholderMap, stats: &mut SubstitutionStats) {
    let Some(story) = wordml::story_root(tree) else {
        return;
    };
    for p in wordml::walk_paragraphs(tree, story) {
        let (runs, collapsed) = substitute_paragraph(tree, p, map);
        stats.runs += runs;
        if collapsed {
            stats.collapsed_paragraphs += 1;
        }
    }
}

/// First paragraph of the story whose text holds a surface variant of
/// `name`: direct paragraphs first, then table cells depth-first.
pub fn find_paragraph(tree: &XmlTree, story: NodeId, name: &str) -> Option<NodeId> {
    let variants = surface_variants(name);
    wordml::walk_paragraphs(tree, story).into_iter().find(|&p| {
        let text = wordml::paragraph_text(tree, p);
        variants.iter().any(|v| text.contains(v.as_str()))
    })
}

/// Raw pass: plain substring replacement inside every `w:t` of the part.
pub fn substitute_raw_text(tree: &mut XmlTree, map: &PlaceholderMap) -> usize {
    let Some(root) = tree.document_element() else {
        return 0;
    };
    let mut replaced = 0;
    for node in tree.descendants(root) {
        if !tree.is(node, Tag::T) {
            continue;
        }
        let text = tree.text_content(node);
        if map.contains_any(&text) {
            tree.set_text(node, &map.apply(&text));
            if let Some(el) = tree.element_mut(node) {
                el.set_attr("xml:space", "preserve");
            }
            replaced += 1;
        }
    }
    replaced
}

/// Substitute `map` into the body, every header and every footer of `pkg`.
pub fn substitute(pkg: &mut DocxPackage, map: &PlaceholderMap) -> Result<SubstitutionStats, DocxError> {
    let mut stats = SubstitutionStats::default();
    if map.is_empty() {
        return Ok(stats);
    }
    for name in pkg.story_part_names() {
        let Some(tree) = pkg.part_mut(&name)? else {
            continue;
        };
        substitute_story(tree, map, &mut stats);
        stats.raw_texts += substitute_raw_text(tree, map);
    }
    log::debug!(
        "Substitution: {} runs, {} collapsed paragraphs, {} raw texts",
        stats.runs,
        stats.collapsed_paragraphs,
        stats.raw_texts
    );
    Ok(stats)
}

/// True if any token of `map` is still present in any story of `pkg`.
pub fn has_unresolved(pkg: &DocxPackage, map: &PlaceholderMap) -> bool {
    pkg.story_part_names().iter().any(|name| {
        pkg.part(name)
            .and_then(|tree| tree.document_element().map(|root| tree.text_content(root)))
            .map(|text| map.contains_any(&text))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wordml::W_NS;

    fn doc(body: &str) -> XmlTree {
        let xml = format!(r#"<w:document xmlns:w="{W_NS}"><w:body>{body}</w:body></w:document>"#);
        XmlTree::parse("word/document.xml", xml.as_bytes()).unwrap()
    }

    fn map() -> PlaceholderMap {
        let mut m = PlaceholderMap::new();
        m.insert("NOMBRE", "ANA PÉREZ");
        m.insert("DNI", "12345678");
        m
    }

    #[test]
    fn variants_cover_spacing_and_case() {
        assert_eq!(
            surface_variants("NOMBRE"),
            vec!["{{NOMBRE}}", "{{ NOMBRE }}", "{{nombre}}", "{{ nombre }}"]
        );
        assert_eq!(surface_variants("dni").len(), 2);
    }

    #[test]
    fn reinsert_keeps_position_and_updates_value() {
        let mut m = PlaceholderMap::new();
        m.insert_token("{{A}}", "1");
        m.insert_token("{{B}}", "2");
        m.insert_token("{{A}}", "3");
        let tokens: Vec<(&str, &str)> = m.iter().collect();
        assert_eq!(tokens, vec![("{{A}}", "3"), ("{{B}}", "2")]);
    }

    #[test]
    fn phase_a_keeps_run_formatting() {
        let mut tree = doc(r#"<w:p><w:r><w:rPr><w:b/><w:color w:val="FF0000"/></w:rPr><w:t>Sr. {{ nombre }}</w:t></w:r></w:p>"#);
        let mut stats = SubstitutionStats::default();
        substitute_story(&mut tree, &map(), &mut stats);
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.collapsed_paragraphs, 0);

        let out = String::from_utf8(tree.to_bytes("d").unwrap()).unwrap();
        assert!(out.contains("Sr. ANA PÉREZ"));
        assert!(out.contains(r#"<w:color w:val="FF0000"/>"#));
    }

    #[test]
    fn phase_b_collapses_split_tokens_into_one_run() {
        let mut tree = doc(concat!(
            r#"<w:p><w:r><w:rPr><w:rFonts w:ascii="Arial"/><w:b/><w:color w:val="00FF00"/><w:sz w:val="20"/></w:rPr><w:t>Nombre: {{NOM</w:t></w:r>"#,
            r#"<w:r><w:t>BRE}}, DNI {{DNI}}</w:t></w:r></w:p>"#,
        ));
        let mut stats = SubstitutionStats::default();
        substitute_story(&mut tree, &map(), &mut stats);
        assert_eq!(stats.collapsed_paragraphs, 1);

        let body = wordml::story_root(&tree).unwrap();
        let p = tree.child_elements(body, Tag::P)[0];
        let runs = wordml::paragraph_runs(&tree, p);
        assert_eq!(runs.len(), 1);
        assert_eq!(wordml::run_text(&tree, runs[0]), "Nombre: ANA PÉREZ, DNI 12345678");

        let rpr = tree.first_child(runs[0], Tag::RPr).unwrap();
        let kept: Vec<&str> = tree
            .children(rpr)
            .iter()
            .filter_map(|&c| tree.element(c).map(|el| el.name()))
            .collect();
        assert_eq!(kept, vec!["w:rFonts", "w:b", "w:sz"]);
    }

    #[test]
    fn raw_pass_reaches_text_boxes() {
        let mut tree = doc(concat!(
            r#"<w:p><w:r><w:pict><v:shape><v:textbox><w:txbxContent>"#,
            r#"<w:p><w:r><w:t>{{DNI}}</w:t></w:r></w:p>"#,
            r#"</w:txbxContent></v:textbox></v:shape></w:pict></w:r></w:p>"#,
        ));
        let mut stats = SubstitutionStats::default();
        substitute_story(&mut tree, &map(), &mut stats);
        assert_eq!(stats.total(), 0);
        assert_eq!(substitute_raw_text(&mut tree, &map()), 1);
        let root = tree.document_element().unwrap();
        assert_eq!(tree.text_content(root), "12345678");
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let mut tree = doc(r#"<w:p><w:r><w:t>{{NOM</w:t></w:r><w:r><w:t>BRE}}</w:t></w:r></w:p>"#);
        let mut stats = SubstitutionStats::default();
        substitute_story(&mut tree, &map(), &mut stats);
        let first = tree.to_bytes("d").unwrap();

        let mut again = SubstitutionStats::default();
        substitute_story(&mut tree, &map(), &mut again);
        assert_eq!(substitute_raw_text(&mut tree, &map()), 0);
        assert_eq!(again, SubstitutionStats::default());
        assert_eq!(tree.to_bytes("d").unwrap(), first);
    }
}
