use crate::xml::{Element, Node};

use super::styles::normalize_name;
use super::{WML_NS, is_wml, wml, wml_attr};

/// How an abstract numbering scheme is recognised across documents. Ids are
/// per-document, so schemes are matched by what they look like.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum NumberingIdentity {
    Named(String),
    StyleLink(String),
    /// Level-0 format and text, e.g. "decimal|%1.".
    Signature(String),
}

#[derive(Clone, Debug)]
pub(crate) struct AbstractNumbering {
    pub(crate) id: String,
    pub(crate) identity: NumberingIdentity,
    pub(crate) element: Element,
}

#[derive(Clone, Debug)]
pub(crate) struct NumberingInstance {
    pub(crate) id: String,
    pub(crate) abstract_id: String,
    pub(crate) element: Element,
}

#[derive(Clone, Debug)]
pub(crate) struct Numbering {
    pub(crate) root: Element,
    pub(crate) abstracts: Vec<AbstractNumbering>,
    pub(crate) instances: Vec<NumberingInstance>,
}

fn identity_of(node: &Element) -> NumberingIdentity {
    if let Some(name) = wml_attr(node, "name") {
        return NumberingIdentity::Named(normalize_name(name));
    }
    if let Some(link) = wml_attr(node, "styleLink").or_else(|| wml_attr(node, "numStyleLink")) {
        return NumberingIdentity::StyleLink(link.to_string());
    }
    let level0 = node
        .elements()
        .filter(|l| is_wml(l, "lvl"))
        .find(|l| l.attr(Some(WML_NS), "ilvl").unwrap_or("0") == "0");
    let num_fmt = level0.and_then(|l| wml_attr(l, "numFmt")).unwrap_or("decimal");
    let lvl_text = level0.and_then(|l| wml_attr(l, "lvlText")).unwrap_or("");
    NumberingIdentity::Signature(format!("{num_fmt}|{lvl_text}"))
}

impl Numbering {
    pub(crate) fn parse(root: &Element) -> Self {
        let mut abstracts = Vec::new();
        let mut instances = Vec::new();
        for node in root.elements() {
            if node.ns.as_deref() != Some(WML_NS) {
                continue;
            }
            match node.name.as_str() {
                "abstractNum" => {
                    let Some(abs_id) = node.attr(Some(WML_NS), "abstractNumId") else {
                        continue;
                    };
                    abstracts.push(AbstractNumbering {
                        id: abs_id.to_string(),
                        identity: identity_of(node),
                        element: node.clone(),
                    });
                }
                "num" => {
                    let Some(num_id) = node.attr(Some(WML_NS), "numId") else {
                        continue;
                    };
                    let Some(abs_id) = wml_attr(node, "abstractNumId") else {
                        continue;
                    };
                    instances.push(NumberingInstance {
                        id: num_id.to_string(),
                        abstract_id: abs_id.to_string(),
                        element: node.clone(),
                    });
                }
                _ => {}
            }
        }
        Numbering {
            root: root.clone(),
            abstracts,
            instances,
        }
    }

    /// An empty numbering part with the usual `w` binding.
    pub(crate) fn empty() -> Self {
        let mut root = Element::new(Some(WML_NS), Some("w"), "numbering");
        root.namespaces.push((Some("w".into()), WML_NS.into()));
        Numbering {
            root,
            abstracts: Vec::new(),
            instances: Vec::new(),
        }
    }

    pub(crate) fn instance(&self, num_id: &str) -> Option<&NumberingInstance> {
        self.instances.iter().find(|n| n.id == num_id)
    }

    pub(crate) fn abstract_of(&self, num_id: &str) -> Option<&AbstractNumbering> {
        let inst = self.instance(num_id)?;
        self.abstracts.iter().find(|a| a.id == inst.abstract_id)
    }

    /// Paragraph properties of level `ilvl` of instance `num_id`. A level
    /// redefined in the instance's `lvlOverride` wins over the abstract one.
    pub(crate) fn level_paragraph_properties(&self, num_id: &str, ilvl: &str) -> Option<&Element> {
        let is_level =
            |l: &&Element| is_wml(l, "lvl") && l.attr(Some(WML_NS), "ilvl").unwrap_or("0") == ilvl;
        let overridden = self
            .instance(num_id)?
            .element
            .elements()
            .filter(|o| is_wml(o, "lvlOverride") && o.attr(Some(WML_NS), "ilvl") == Some(ilvl))
            .find_map(|o| o.elements().find(is_level));
        let level = match overridden {
            Some(level) => level,
            None => self.abstract_of(num_id)?.element.elements().find(is_level)?,
        };
        wml(level, "pPr")
    }

    pub(crate) fn find_abstract(&self, identity: &NumberingIdentity) -> Option<&AbstractNumbering> {
        self.abstracts.iter().find(|a| a.identity == *identity)
    }

    fn next_id(values: impl Iterator<Item = u32>) -> u32 {
        values.max().map_or(1, |m| m + 1)
    }

    pub(crate) fn next_num_id(&self) -> String {
        Self::next_id(self.instances.iter().filter_map(|n| n.id.parse().ok())).to_string()
    }

    pub(crate) fn next_abstract_id(&self) -> String {
        // Abstract ids start at 0 in Word output.
        let ids: Vec<u32> = self.abstracts.iter().filter_map(|a| a.id.parse().ok()).collect();
        if ids.is_empty() {
            "0".into()
        } else {
            Self::next_id(ids.into_iter()).to_string()
        }
    }

    /// Add an abstract scheme; schema order requires all abstractNum before any num.
    pub(crate) fn push_abstract(&mut self, mut element: Element, id: &str) {
        element.set_attr(Some(WML_NS), "abstractNumId", id);
        // nsid identifies a list to Word; a transplanted scheme keeps its own.
        let insert_at = self
            .root
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if is_wml(e, "num") || is_wml(e, "numIdMacAtCleanup")))
            .unwrap_or(self.root.children.len());
        self.root
            .children
            .insert(insert_at, Node::Element(element.clone()));
        self.abstracts.push(AbstractNumbering {
            id: id.to_string(),
            identity: identity_of(&element),
            element,
        });
    }

    /// Add a concrete instance pointing at `abstract_id`, carrying `overrides`
    /// (lvlOverride children of the source instance).
    pub(crate) fn push_instance(&mut self, num_id: &str, abstract_id: &str, overrides: Vec<Element>) {
        let mut num = Element::new(Some(WML_NS), self.root.prefix.as_deref(), "num");
        num.set_attr(Some(WML_NS), "numId", num_id);
        let mut abs = Element::new(Some(WML_NS), self.root.prefix.as_deref(), "abstractNumId");
        abs.set_attr(Some(WML_NS), "val", abstract_id);
        num.children.push(Node::Element(abs));
        num.children
            .extend(overrides.into_iter().map(Node::Element));

        let insert_at = self
            .root
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if is_wml(e, "numIdMacAtCleanup")))
            .unwrap_or(self.root.children.len());
        self.root.children.insert(insert_at, Node::Element(num.clone()));
        self.instances.push(NumberingInstance {
            id: num_id.to_string(),
            abstract_id: abstract_id.to_string(),
            element: num,
        });
    }

    pub(crate) fn level_overrides(inst: &NumberingInstance) -> Vec<Element> {
        inst.element
            .elements()
            .filter(|e| is_wml(e, "lvlOverride"))
            .cloned()
            .collect()
    }

    pub(crate) fn has_definitions(&self) -> bool {
        !self.instances.is_empty() || wml(&self.root, "abstractNum").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_str;

    fn numbering(body: &str) -> Numbering {
        let root = parse_str(
            "word/numbering.xml",
            &format!(r#"<w:numbering xmlns:w="{WML_NS}">{body}</w:numbering>"#),
        )
        .unwrap();
        Numbering::parse(&root)
    }

    #[test]
    fn identities_prefer_name_then_link_then_signature() {
        let n = numbering(concat!(
            r#"<w:abstractNum w:abstractNumId="0"><w:name w:val="Legal List"/></w:abstractNum>"#,
            r#"<w:abstractNum w:abstractNumId="1"><w:numStyleLink w:val="Bullets"/></w:abstractNum>"#,
            r#"<w:abstractNum w:abstractNumId="2"><w:lvl w:ilvl="0"><w:numFmt w:val="upperRoman"/><w:lvlText w:val="%1)"/></w:lvl></w:abstractNum>"#,
            r#"<w:num w:numId="7"><w:abstractNumId w:val="2"/></w:num>"#,
        ));
        assert_eq!(n.abstracts[0].identity, NumberingIdentity::Named("legal list".into()));
        assert_eq!(n.abstracts[1].identity, NumberingIdentity::StyleLink("Bullets".into()));
        assert_eq!(
            n.abstract_of("7").unwrap().identity,
            NumberingIdentity::Signature("upperRoman|%1)".into())
        );
        assert_eq!(n.next_num_id(), "8");
        assert_eq!(n.next_abstract_id(), "3");
    }

    #[test]
    fn level_properties_honour_overrides() {
        let n = numbering(concat!(
            r#"<w:abstractNum w:abstractNumId="0">"#,
            r#"<w:lvl w:ilvl="0"><w:pPr><w:ind w:left="720"/></w:pPr></w:lvl>"#,
            r#"<w:lvl w:ilvl="1"><w:pPr><w:ind w:left="1440"/></w:pPr></w:lvl></w:abstractNum>"#,
            r#"<w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>"#,
            r#"<w:num w:numId="2"><w:abstractNumId w:val="0"/>"#,
            r#"<w:lvlOverride w:ilvl="1"><w:lvl w:ilvl="1"><w:pPr><w:ind w:left="360"/></w:pPr></w:lvl></w:lvlOverride></w:num>"#,
        ));
        let left = |num: &str, ilvl: &str| {
            n.level_paragraph_properties(num, ilvl)
                .and_then(|p| wml(p, "ind"))
                .and_then(|i| i.attr(Some(WML_NS), "left"))
                .map(String::from)
        };
        assert_eq!(left("1", "1").as_deref(), Some("1440"));
        assert_eq!(left("2", "1").as_deref(), Some("360"));
        assert_eq!(left("2", "0").as_deref(), Some("720"));
        assert_eq!(left("3", "0"), None);
        assert_eq!(left("1", "4"), None);
    }

    #[test]
    fn pushed_abstracts_precede_instances() {
        let mut n = numbering(r#"<w:abstractNum w:abstractNumId="0"/><w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>"#);
        let extra = parse_str("x", &format!(r#"<w:abstractNum xmlns:w="{WML_NS}" w:abstractNumId="9"/>"#)).unwrap();
        n.push_abstract(extra, "1");
        n.push_instance("2", "1", Vec::new());
        let names: Vec<(&str, Option<&str>)> = n
            .root
            .elements()
            .map(|e| (e.name.as_str(), e.attr(Some(WML_NS), "abstractNumId").or(e.attr(Some(WML_NS), "numId"))))
            .collect();
        assert_eq!(
            names,
            vec![("abstractNum", Some("0")), ("abstractNum", Some("1")), ("num", Some("1")), ("num", Some("2"))]
        );
    }
}
