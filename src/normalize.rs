//! Canonical form of a markup part, used only for comparison.
//!
//! Two trees that differ only in run fragmentation, attribute order, namespace
//! prefixes or generation artifacts (revision-save ids, paragraph ids,
//! timestamps, proofing marks) serialize to the same string. The output
//! re-parses to itself: normalizing a canonical string is the identity.

use std::collections::HashMap;

use crate::docx::{MC_NS, W14_NS, W15_NS, WML_NS, is_run_container, is_wml};
use crate::error::Error;
use crate::model::RunProperties;
use crate::xml::{self, Element, Node, XML_NS};

/// Prefixes used in canonical output for the namespaces Word documents share.
const CANONICAL_PREFIXES: &[(&str, &str)] = &[
    (WML_NS, "w"),
    (
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
        "r",
    ),
    ("http://schemas.openxmlformats.org/drawingml/2006/main", "a"),
    ("http://schemas.openxmlformats.org/drawingml/2006/picture", "pic"),
    (
        "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing",
        "wp",
    ),
    ("http://schemas.openxmlformats.org/officeDocument/2006/math", "m"),
    (MC_NS, "mc"),
    ("urn:schemas-microsoft-com:vml", "v"),
    ("urn:schemas-microsoft-com:office:office", "o"),
    ("urn:schemas-microsoft-com:office:word", "w10"),
    (W14_NS, "w14"),
    (W15_NS, "w15"),
    ("http://schemas.microsoft.com/office/word/2010/wordprocessingShape", "wps"),
    ("http://schemas.microsoft.com/office/word/2010/wordprocessingGroup", "wpg"),
    ("http://schemas.microsoft.com/office/word/2010/wordprocessingCanvas", "wpc"),
    ("http://schemas.openxmlformats.org/package/2006/relationships", "rel"),
    ("http://schemas.openxmlformats.org/package/2006/content-types", "ct"),
    (XML_NS, "xml"),
];

/// Elements whose text content is authored text; whitespace inside them is significant.
pub(crate) const TEXT_ELEMENTS: &[&str] = &["t", "delText", "instrText", "delInstrText"];

fn is_text_element(el: &Element) -> bool {
    match el.ns.as_deref() {
        Some(WML_NS) => TEXT_ELEMENTS.contains(&el.name.as_str()),
        Some("http://schemas.openxmlformats.org/officeDocument/2006/math")
        | Some("http://schemas.openxmlformats.org/drawingml/2006/main") => el.name == "t",
        _ => false,
    }
}

fn is_volatile_attr(a: &xml::Attribute) -> bool {
    match a.ns.as_deref() {
        Some(WML_NS) => a.name.starts_with("rsid") || a.name == "date",
        Some(W14_NS) => matches!(a.name.as_str(), "paraId" | "textId"),
        _ => false,
    }
}

fn is_volatile_element(el: &Element) -> bool {
    match el.ns.as_deref() {
        Some(WML_NS) => matches!(
            el.name.as_str(),
            "proofErr" | "lastRenderedPageBreak" | "rsids" | "rsid"
        ),
        Some(W14_NS) => el.name == "docId",
        Some(W15_NS) => el.name == "docId",
        _ => false,
    }
}

/// Word's caret bookmark; it moves every time a document is saved.
fn is_go_back_start(el: &Element) -> bool {
    is_wml(el, "bookmarkStart") && el.attr(Some(WML_NS), "name") == Some("_GoBack")
}

/// Normalize a part held as bytes.
pub fn normalize_part(part: &str, bytes: &[u8]) -> Result<String, Error> {
    let mut root = xml::parse(part, bytes)?;
    canonicalize(&mut root);
    Ok(to_canonical_string(&root))
}

/// Normalize markup held as a string.
pub fn normalize_str(markup: &str) -> Result<String, Error> {
    let mut root = xml::parse_str("<string>", markup)?;
    canonicalize(&mut root);
    Ok(to_canonical_string(&root))
}

/// Rewrite the tree in place into its canonical shape.
pub fn canonicalize(root: &mut Element) {
    let mut go_back_ids = Vec::new();
    root.walk(&mut |e| {
        if is_go_back_start(e)
            && let Some(id) = e.attr(Some(WML_NS), "id")
        {
            go_back_ids.push(id.to_string());
        }
    });
    strip(root, &go_back_ids);
    merge_runs(root);
    fix_space_preserve(root);
}

fn strip(el: &mut Element, go_back_ids: &[String]) {
    let text_bearing = is_text_element(el);
    el.attributes.retain(|a| !is_volatile_attr(a));
    el.children.retain(|n| match n {
        Node::Element(c) => {
            !is_volatile_element(c)
                && !is_go_back_start(c)
                && !(is_wml(c, "bookmarkEnd")
                    && c.attr(Some(WML_NS), "id")
                        .is_some_and(|id| go_back_ids.iter().any(|g| g == id)))
        }
        Node::Text(t) => text_bearing || !t.trim().is_empty(),
        Node::Comment(_) | Node::ProcessingInstruction { .. } => false,
    });
    // Adjacent text nodes can appear once comments between them are gone.
    let mut merged: Vec<Node> = Vec::with_capacity(el.children.len());
    for node in el.children.drain(..) {
        if let Node::Text(t) = &node
            && let Some(Node::Text(prev)) = merged.last_mut()
        {
            prev.push_str(t);
            continue;
        }
        merged.push(node);
    }
    el.children = merged;

    for child in el.elements_mut() {
        strip(child, go_back_ids);
    }
    el.retain_elements(|c| {
        !(is_wml(c, "rPr") || is_wml(c, "pPr"))
            || c.has_element_children()
            || !c.attributes.is_empty()
    });
}

fn run_content(run: &Element) -> impl Iterator<Item = &Node> {
    run.children
        .iter()
        .filter(|n| !matches!(n, Node::Element(e) if is_wml(e, "rPr")))
}

fn mergeable(a: &Element, b: &Element) -> bool {
    is_wml(a, "r")
        && is_wml(b, "r")
        && a.attributes.len() == b.attributes.len()
        && a.attributes
            .iter()
            .all(|x| b.attr(x.ns.as_deref(), &x.name) == Some(x.value.as_str()))
        && RunProperties::new(a.child(WML_NS, "rPr")) == RunProperties::new(b.child(WML_NS, "rPr"))
}

/// Collapse consecutive runs with equal properties, in every run container,
/// recursively. Text of adjacent text elements is concatenated; other markers
/// keep their order.
pub fn merge_runs(el: &mut Element) {
    for child in el.elements_mut() {
        merge_runs(child);
    }
    if !(is_wml(el, "p") || is_run_container(el)) {
        return;
    }
    let mut out: Vec<Node> = Vec::with_capacity(el.children.len());
    for node in el.children.drain(..) {
        if let Node::Element(next) = &node
            && let Some(Node::Element(prev)) = out.last_mut()
            && mergeable(prev, next)
        {
            append_run(prev, next);
            continue;
        }
        out.push(node);
    }
    el.children = out;
}

fn append_run(into: &mut Element, from: &Element) {
    for node in run_content(from) {
        if let Node::Element(next) = node
            && is_text_element(next)
            && let Some(Node::Element(last)) = into.children.last_mut()
            && last.ns == next.ns
            && last.name == next.name
        {
            let text = next.text();
            match last.children.iter_mut().find_map(|c| match c {
                Node::Text(t) => Some(t),
                _ => None,
            }) {
                Some(t) => t.push_str(&text),
                None => last.children.push(Node::Text(text)),
            }
            continue;
        }
        into.children.push(node.clone());
    }
}

/// `xml:space="preserve"` on text elements exactly when it changes meaning.
fn fix_space_preserve(el: &mut Element) {
    el.walk_mut(&mut |e| {
        if !is_text_element(e) {
            return;
        }
        let text = e.text();
        let needs = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
        if needs {
            e.set_attr(Some(XML_NS), "space", "preserve");
        } else {
            e.remove_attr(Some(XML_NS), "space");
        }
    });
}

struct CanonicalWriter {
    prefixes: HashMap<String, String>,
    next_generated: usize,
    out: String,
}

impl CanonicalWriter {
    fn prefix_for(&mut self, uri: &str) -> String {
        if let Some(p) = self.prefixes.get(uri) {
            return p.clone();
        }
        let p = CANONICAL_PREFIXES
            .iter()
            .find(|(u, _)| *u == uri)
            .map(|(_, p)| p.to_string())
            .unwrap_or_else(|| {
                let p = format!("ns{}", self.next_generated);
                self.next_generated += 1;
                p
            });
        self.prefixes.insert(uri.to_string(), p.clone());
        p
    }

    fn write(&mut self, el: &Element, scope: &mut Vec<(String, String)>) {
        let mark = scope.len();

        let mut needed: Vec<&str> = Vec::new();
        if let Some(ns) = el.ns.as_deref() {
            needed.push(ns);
        }
        for a in &el.attributes {
            if let Some(ns) = a.ns.as_deref()
                && !needed.contains(&ns)
            {
                needed.push(ns);
            }
        }
        let mut decls: Vec<(String, String)> = Vec::new();
        for uri in needed {
            if uri == XML_NS {
                continue;
            }
            let prefix = self.prefix_for(uri);
            let visible = scope.iter().rev().find(|(p, _)| *p == prefix);
            if visible.map(|(_, u)| u.as_str()) != Some(uri) {
                decls.push((prefix.clone(), uri.to_string()));
                scope.push((prefix, uri.to_string()));
            }
        }
        decls.sort();

        let mut attrs: Vec<(String, String, &str)> = el
            .attributes
            .iter()
            .map(|a| {
                let uri = a.ns.clone().unwrap_or_default();
                let qname = match a.ns.as_deref() {
                    Some(ns) => format!("{}:{}", self.prefix_for(ns), a.name),
                    None => a.name.clone(),
                };
                (uri, qname, a.value.as_str())
            })
            .collect();
        // Fixed key order: unqualified first, then by namespace URI, then local name.
        attrs.sort_by(|x, y| x.0.cmp(&y.0).then_with(|| x.1.cmp(&y.1)));

        let qname = match el.ns.as_deref() {
            Some(ns) => format!("{}:{}", self.prefix_for(ns), el.name),
            None => el.name.clone(),
        };

        self.out.push('<');
        self.out.push_str(&qname);
        for (prefix, uri) in &decls {
            self.out.push_str(" xmlns:");
            self.out.push_str(prefix);
            self.out.push_str("=\"");
            xml::escape_attr(uri, &mut self.out);
            self.out.push('"');
        }
        for (_, name, value) in attrs {
            self.out.push(' ');
            self.out.push_str(&name);
            self.out.push_str("=\"");
            xml::escape_attr(value, &mut self.out);
            self.out.push('"');
        }
        self.out.push('>');
        for child in &el.children {
            match child {
                Node::Element(c) => self.write(c, scope),
                Node::Text(t) => xml::escape_text(t, &mut self.out),
                _ => {}
            }
        }
        self.out.push_str("</");
        self.out.push_str(&qname);
        self.out.push('>');

        scope.truncate(mark);
    }
}

/// Exclusive canonical serialization: explicit end tags, sorted attributes,
/// canonical prefixes declared where first used, no XML declaration.
pub fn to_canonical_string(root: &Element) -> String {
    let mut writer = CanonicalWriter {
        prefixes: HashMap::new(),
        next_generated: 0,
        out: String::new(),
    };
    writer.write(root, &mut Vec::new());
    writer.out
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: &str = WML_NS;

    fn doc(body: &str) -> String {
        format!(r#"<w:document xmlns:w="{W}"><w:body>{body}</w:body></w:document>"#)
    }

    #[test]
    fn merges_adjacent_runs_with_equal_properties() {
        let src = doc(concat!(
            r#"<w:p><w:r><w:rPr><w:b/><w:sz w:val="24" w:x="1"/></w:rPr><w:t xml:space="preserve">Hello </w:t></w:r>"#,
            r#"<w:r><w:rPr><w:b/><w:sz w:x="1" w:val="24"/></w:rPr><w:t>World</w:t></w:r></w:p>"#,
        ));
        let out = normalize_str(&src).unwrap();
        assert!(
            out.contains(r#"<w:r><w:rPr><w:b></w:b><w:sz w:val="24" w:x="1"></w:sz></w:rPr><w:t>Hello World</w:t></w:r>"#),
            "got {out}"
        );
        assert_eq!(out.matches("<w:r>").count(), 1);
    }

    #[test]
    fn keeps_markers_discrete_when_merging() {
        let src = doc(concat!(
            r#"<w:p><w:r><w:t>a</w:t><w:tab/></w:r><w:r><w:t>b</w:t></w:r>"#,
            r#"<w:r><w:br/><w:t>c</w:t></w:r></w:p>"#,
        ));
        let out = normalize_str(&src).unwrap();
        assert!(
            out.contains("<w:r><w:t>a</w:t><w:tab></w:tab><w:t>b</w:t><w:br></w:br><w:t>c</w:t></w:r>"),
            "got {out}"
        );
    }

    #[test]
    fn does_not_merge_runs_with_different_properties() {
        let src = doc(r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>a</w:t></w:r><w:r><w:t>b</w:t></w:r></w:p>"#);
        let out = normalize_str(&src).unwrap();
        assert_eq!(out.matches("<w:r>").count(), 2);
    }

    #[test]
    fn merges_across_removed_proofing_marks_and_inside_tables() {
        let src = doc(concat!(
            r#"<w:tbl><w:tr><w:tc><w:p w:rsidR="00AB12CD"><w:r w:rsidRPr="0011"><w:t>x</w:t></w:r>"#,
            r#"<w:proofErr w:type="spellStart"/><w:r w:rsidRPr="0022"><w:t>y</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        ));
        let out = normalize_str(&src).unwrap();
        assert!(out.contains("<w:p><w:r><w:t>xy</w:t></w:r></w:p>"), "got {out}");
        assert!(!out.contains("rsid"));
        assert!(!out.contains("proofErr"));
    }

    #[test]
    fn prefixes_and_attribute_order_do_not_matter() {
        let a = format!(
            r#"<x:document xmlns:x="{W}"><x:body><x:p><x:pPr><x:ind x:left="10" x:right="20"/></x:pPr></x:p></x:body></x:document>"#
        );
        let b = doc(r#"<w:p><w:pPr><w:ind w:right="20" w:left="10"/></w:pPr></w:p>"#);
        assert_eq!(normalize_str(&a).unwrap(), normalize_str(&b).unwrap());
    }

    #[test]
    fn different_structures_do_not_collide() {
        let a = doc(r#"<w:p><w:r><w:t>ab</w:t></w:r></w:p>"#);
        let b = doc(r#"<w:p><w:r><w:t>a</w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t>b</w:t></w:r></w:p>"#);
        assert_ne!(normalize_str(&a).unwrap(), normalize_str(&b).unwrap());
    }

    #[test]
    fn normalization_is_idempotent() {
        let src = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{W}" xmlns:w14="{W14_NS}" xmlns:foo="urn:foo">
  <!-- generated -->
  <w:body>
    <w:p w14:paraId="1A2B3C4D" w14:textId="77777777">
      <w:pPr><w:rPr></w:rPr></w:pPr>
      <w:bookmarkStart w:id="0" w:name="_GoBack"/>
      <w:r><w:t xml:space="preserve"> lead</w:t></w:r>
      <w:r><w:t>tail&amp;&lt;</w:t><w:lastRenderedPageBreak/></w:r>
      <w:bookmarkEnd w:id="0"/>
      <w:ins w:id="3" w:author="A" w:date="2024-01-01T00:00:00Z"><w:r><w:t>new</w:t></w:r></w:ins>
      <foo:ext foo:a="x&#9;y"/>
    </w:p>
  </w:body>
</w:document>"#
        );
        let once = normalize_str(&src).unwrap();
        let twice = normalize_str(&once).unwrap();
        assert_eq!(once, twice);
        assert!(once.contains(r#"<w:t xml:space="preserve"> leadtail&amp;&lt;</w:t>"#), "got {once}");
        assert!(!once.contains("_GoBack"));
        assert!(!once.contains("bookmarkEnd"));
        assert!(!once.contains("w:date"));
        assert!(!once.contains("paraId"));
        assert!(!once.contains("<w:pPr>"));
        assert!(once.contains(r#"<ns0:ext xmlns:ns0="urn:foo" ns0:a="x&#x9;y"></ns0:ext>"#), "got {once}");
    }

    #[test]
    fn reports_malformed_input() {
        assert!(matches!(
            normalize_str("<w:document"),
            Err(Error::MalformedMarkup { .. })
        ));
    }
}
