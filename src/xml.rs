//! Owned, mutable XML element tree.
//!
//! `roxmltree` gives a fast read-only view; restoration needs to rewrite
//! style references and property elements in place, so parts are lifted
//! into this tree once and serialized back when the package is written.

use crate::error::Error;

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub ns: Option<String>,
    pub prefix: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, value: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub ns: Option<String>,
    pub prefix: Option<String>,
    pub name: String,
    /// Namespace declarations made on this element: (prefix, uri).
    /// A `None` prefix is the default namespace.
    pub namespaces: Vec<(Option<String>, String)>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(ns: Option<&str>, prefix: Option<&str>, name: &str) -> Self {
        Self {
            ns: ns.map(String::from),
            prefix: prefix.map(String::from),
            name: name.to_string(),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is(&self, ns: &str, name: &str) -> bool {
        self.name == name && self.ns.as_deref() == Some(ns)
    }

    pub fn attr(&self, ns: Option<&str>, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.ns.as_deref() == ns)
            .map(|a| a.value.as_str())
    }

    /// Sets an attribute, keeping its position when it already exists.
    /// New attributes borrow the element's own prefix when they share its namespace.
    pub fn set_attr(&mut self, ns: Option<&str>, name: &str, value: &str) {
        if let Some(a) = self
            .attributes
            .iter_mut()
            .find(|a| a.name == name && a.ns.as_deref() == ns)
        {
            a.value = value.to_string();
            return;
        }
        let prefix = match ns {
            Some(XML_NS) => Some("xml".to_string()),
            Some(uri) if self.ns.as_deref() == Some(uri) => self.prefix.clone(),
            _ => None,
        };
        self.attributes.push(Attribute {
            ns: ns.map(String::from),
            prefix,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    pub fn remove_attr(&mut self, ns: Option<&str>, name: &str) -> Option<String> {
        let idx = self
            .attributes
            .iter()
            .position(|a| a.name == name && a.ns.as_deref() == ns)?;
        Some(self.attributes.remove(idx).value)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, ns: &str, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(ns, name))
    }

    pub fn child_mut(&mut self, ns: &str, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(ns, name))
    }

    /// Removes every direct child element matching `keep == false`.
    pub fn retain_elements(&mut self, mut keep: impl FnMut(&Element) -> bool) {
        self.children.retain(|n| match n {
            Node::Element(e) => keep(e),
            _ => true,
        });
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
                _ => {}
            }
        }
    }

    pub fn has_element_children(&self) -> bool {
        self.elements().next().is_some()
    }

    /// Depth-first visit of this element and all descendants.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        f(self);
        for child in self.elements() {
            child.walk(f);
        }
    }

    /// Depth-first mutable visit; `f` runs on a parent before its children.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in self.elements_mut() {
            child.walk_mut(f);
        }
    }

    /// Structural equality: same expanded name, same attribute set regardless
    /// of order or prefix, pairwise equal children.
    pub fn same_structure(&self, other: &Element) -> bool {
        if self.name != other.name || self.ns != other.ns {
            return false;
        }
        if self.attributes.len() != other.attributes.len() {
            return false;
        }
        let all_attrs_match = self.attributes.iter().all(|a| {
            other.attr(a.ns.as_deref(), &a.name) == Some(a.value.as_str())
        });
        if !all_attrs_match {
            return false;
        }
        let mine: Vec<&Node> = self.children.iter().filter(|n| significant(n)).collect();
        let theirs: Vec<&Node> = other.children.iter().filter(|n| significant(n)).collect();
        mine.len() == theirs.len()
            && mine.iter().zip(theirs.iter()).all(|(a, b)| match (a, b) {
                (Node::Element(x), Node::Element(y)) => x.same_structure(y),
                (Node::Text(x), Node::Text(y)) => x == y,
                _ => false,
            })
    }
}

fn significant(node: &Node) -> bool {
    match node {
        Node::Element(_) => true,
        Node::Text(t) => !t.trim().is_empty(),
        _ => false,
    }
}

/// Parse a part's bytes into an owned tree. Failures carry the part name and
/// the row:column reported by the parser.
pub fn parse(part: &str, bytes: &[u8]) -> Result<Element, Error> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::MalformedMarkup {
        part: part.to_string(),
        position: format!("byte {}", e.valid_up_to()),
        message: "part is not valid UTF-8".into(),
    })?;
    parse_str(part, text.trim_start_matches('\u{feff}'))
}

pub fn parse_str(part: &str, text: &str) -> Result<Element, Error> {
    let doc = roxmltree::Document::parse(text).map_err(|e| {
        let pos = e.pos();
        Error::MalformedMarkup {
            part: part.to_string(),
            position: format!("{}:{}", pos.row, pos.col),
            message: e.to_string(),
        }
    })?;
    Ok(lift(doc.root_element(), None))
}

fn lift(node: roxmltree::Node, parent: Option<roxmltree::Node>) -> Element {
    let tag = node.tag_name();
    let ns = tag.namespace();
    let prefix = ns.and_then(|uri| node.lookup_prefix(uri));

    let inherited: Vec<(Option<&str>, &str)> = parent
        .map(|p| p.namespaces().map(|n| (n.name(), n.uri())).collect())
        .unwrap_or_default();
    let namespaces = node
        .namespaces()
        .filter(|n| n.name() != Some("xml"))
        .filter(|n| !inherited.contains(&(n.name(), n.uri())))
        .map(|n| (n.name().map(String::from), n.uri().to_string()))
        .collect();

    let attributes = node
        .attributes()
        .map(|a| Attribute {
            ns: a.namespace().map(String::from),
            prefix: a.namespace().and_then(|uri| node.lookup_prefix(uri)).map(String::from),
            name: a.name().to_string(),
            value: a.value().to_string(),
        })
        .collect();

    let mut children = Vec::new();
    for child in node.children() {
        match child.node_type() {
            roxmltree::NodeType::Element => children.push(Node::Element(lift(child, Some(node)))),
            roxmltree::NodeType::Text => {
                if let Some(t) = child.text() {
                    children.push(Node::Text(t.to_string()));
                }
            }
            roxmltree::NodeType::Comment => {
                if let Some(t) = child.text() {
                    children.push(Node::Comment(t.to_string()));
                }
            }
            roxmltree::NodeType::PI => {
                if let Some(pi) = child.pi() {
                    children.push(Node::ProcessingInstruction {
                        target: pi.target.to_string(),
                        value: pi.value.map(String::from),
                    });
                }
            }
            roxmltree::NodeType::Root => {}
        }
    }

    Element {
        ns: ns.map(String::from),
        prefix: prefix.map(String::from),
        name: tag.name().to_string(),
        namespaces,
        attributes,
        children,
    }
}

pub fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

pub fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

/// Serialize a part for output: original prefixes and declarations are kept,
/// and any binding an element needs but does not see in scope is declared on it.
pub fn to_document_string(root: &Element) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n");
    let mut scope: Vec<(Option<String>, String)> = vec![(Some("xml".into()), XML_NS.into())];
    write_element(root, &mut scope, &mut out);
    out
}

pub fn to_bytes(root: &Element) -> Vec<u8> {
    to_document_string(root).into_bytes()
}

fn bound(scope: &[(Option<String>, String)], prefix: &Option<String>) -> Option<String> {
    scope
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.clone())
}

fn write_element(el: &Element, scope: &mut Vec<(Option<String>, String)>, out: &mut String) {
    let mark = scope.len();
    let mut decls: Vec<(Option<String>, String)> = Vec::new();
    for (prefix, uri) in &el.namespaces {
        scope.push((prefix.clone(), uri.clone()));
        decls.push((prefix.clone(), uri.clone()));
    }

    let mut require = |prefix: &Option<String>,
                       ns: &Option<String>,
                       scope: &mut Vec<(Option<String>, String)>| {
        if bound(scope, prefix) != *ns {
            let uri = ns.clone().unwrap_or_default();
            scope.push((prefix.clone(), uri.clone()));
            decls.push((prefix.clone(), uri));
        }
    };

    require(&el.prefix, &el.ns, scope);

    // Namespaced attributes must be prefixed; synthesize one if the source had none.
    let mut attrs: Vec<(Option<String>, &Attribute)> = Vec::with_capacity(el.attributes.len());
    let mut synthetic = 0usize;
    for a in &el.attributes {
        let prefix = match (&a.ns, &a.prefix) {
            (None, _) => None,
            (Some(_), Some(p)) => Some(p.clone()),
            (Some(uri), None) => {
                let existing = scope
                    .iter()
                    .rev()
                    .find(|(p, u)| p.is_some() && u == uri)
                    .and_then(|(p, _)| p.clone());
                existing.or_else(|| {
                    synthetic += 1;
                    Some(format!("ns{synthetic}"))
                })
            }
        };
        if a.ns.is_some() {
            require(&prefix, &a.ns, scope);
        }
        attrs.push((prefix, a));
    }

    out.push('<');
    push_qname(&el.prefix, &el.name, out);
    for (prefix, uri) in &decls {
        match prefix {
            Some(p) => {
                out.push_str(" xmlns:");
                out.push_str(p);
            }
            None => out.push_str(" xmlns"),
        }
        out.push_str("=\"");
        escape_attr(uri, out);
        out.push('"');
    }
    for (prefix, a) in attrs {
        out.push(' ');
        push_qname(&prefix, &a.name, out);
        out.push_str("=\"");
        escape_attr(&a.value, out);
        out.push('"');
    }

    if el.children.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        for child in &el.children {
            match child {
                Node::Element(e) => write_element(e, scope, out),
                Node::Text(t) => escape_text(t, out),
                Node::Comment(c) => {
                    out.push_str("<!--");
                    out.push_str(c);
                    out.push_str("-->");
                }
                Node::ProcessingInstruction { target, value } => {
                    out.push_str("<?");
                    out.push_str(target);
                    if let Some(v) = value {
                        out.push(' ');
                        out.push_str(v);
                    }
                    out.push_str("?>");
                }
            }
        }
        out.push_str("</");
        push_qname(&el.prefix, &el.name, out);
        out.push('>');
    }

    scope.truncate(mark);
}

fn push_qname(prefix: &Option<String>, name: &str, out: &mut String) {
    if let Some(p) = prefix {
        out.push_str(p);
        out.push(':');
    }
    out.push_str(name);
}
