use std::collections::{BTreeMap, HashMap};

use crate::error::Error;
use crate::model::StyleKind;
use crate::xml::Element;

use super::{WML_NS, is_wml, wml, wml_attr};

/// Run properties that flip rather than override when applied on top of a style.
const TOGGLES: &[&str] = &[
    "b", "bCs", "i", "iCs", "caps", "smallCaps", "strike", "dstrike", "outline", "shadow",
    "emboss", "imprint", "vanish",
];

pub(crate) fn is_toggle(name: &str) -> bool {
    TOGGLES.contains(&name)
}

#[derive(Clone, Debug)]
pub(crate) struct StyleDefinition {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
    pub(crate) kind: StyleKind,
    pub(crate) is_default: bool,
    pub(crate) based_on: Option<String>,
    pub(crate) paragraph_properties: Option<Element>,
    pub(crate) run_properties: Option<Element>,
}

/// Properties accumulated along a based-on chain, keyed by element local name.
/// `defined` counts how many links of the chain set each property, which is
/// what toggle properties need.
#[derive(Clone, Debug, Default)]
pub(crate) struct PropertySet {
    pub(crate) values: BTreeMap<String, Element>,
    pub(crate) defined: HashMap<String, usize>,
}

impl PropertySet {
    fn apply(&mut self, props: &Element) {
        for child in props.elements() {
            if child.ns.as_deref() != Some(WML_NS) {
                continue;
            }
            *self.defined.entry(child.name.clone()).or_default() += 1;
            self.values.insert(child.name.clone(), child.clone());
        }
    }

    /// True when `direct` is already provided by this set and removing it changes nothing.
    pub(crate) fn provides(&self, direct: &Element) -> bool {
        let Some(inherited) = self.values.get(&direct.name) else {
            return false;
        };
        if is_toggle(&direct.name) && self.defined.get(&direct.name).copied().unwrap_or(0) != 1 {
            return false;
        }
        inherited.same_structure(direct)
    }

    /// This set with the children of `props` applied on top.
    pub(crate) fn with(&self, props: &Element) -> PropertySet {
        let mut out = self.clone();
        out.apply(props);
        out
    }

    pub(crate) fn merged(&self, over: &PropertySet) -> PropertySet {
        let mut out = self.clone();
        for (name, el) in &over.values {
            out.values.insert(name.clone(), el.clone());
            *out.defined.entry(name.clone()).or_default() +=
                over.defined.get(name).copied().unwrap_or(1);
        }
        out
    }
}

/// Arena of style definitions indexed by id. Based-on links form a DAG that
/// is cycle-checked when the sheet is loaded.
#[derive(Clone, Debug, Default)]
pub(crate) struct StyleSheet {
    styles: Vec<StyleDefinition>,
    by_id: HashMap<String, usize>,
}

/// Trimmed, whitespace-collapsed, case-folded style name.
pub(crate) fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl StyleSheet {
    pub(crate) fn parse(part: &str, root: &Element) -> Result<Self, Error> {
        let mut sheet = StyleSheet::default();
        for node in root.elements().filter(|n| is_wml(n, "style")) {
            let Some(kind) = node
                .attr(Some(WML_NS), "type")
                .and_then(StyleKind::from_attr)
            else {
                continue;
            };
            let Some(style_id) = node.attr(Some(WML_NS), "styleId") else {
                continue;
            };
            let is_default = node
                .attr(Some(WML_NS), "default")
                .is_some_and(|v| v == "1" || v == "true" || v == "on");
            let def = StyleDefinition {
                id: style_id.to_string(),
                name: wml_attr(node, "name").map(String::from),
                kind,
                is_default,
                based_on: wml_attr(node, "basedOn").map(String::from),
                paragraph_properties: wml(node, "pPr").cloned(),
                run_properties: wml(node, "rPr").cloned(),
            };
            // Word keeps the first definition of a duplicated id.
            if sheet.by_id.contains_key(&def.id) {
                log::debug!("{part}: duplicate style id '{}' ignored", def.id);
                continue;
            }
            sheet.by_id.insert(def.id.clone(), sheet.styles.len());
            sheet.styles.push(def);
        }
        sheet.check_cycles(part)?;
        Ok(sheet)
    }

    fn check_cycles(&self, part: &str) -> Result<(), Error> {
        // 0 = unvisited, 1 = on the current chain, 2 = known acyclic
        let mut state = vec![0u8; self.styles.len()];
        for start in 0..self.styles.len() {
            let mut chain = Vec::new();
            let mut current = Some(start);
            while let Some(idx) = current {
                match state[idx] {
                    2 => break,
                    1 => {
                        return Err(Error::MalformedMarkup {
                            part: part.to_string(),
                            position: format!("w:style[@w:styleId='{}']", self.styles[idx].id),
                            message: "cycle in based-on chain".into(),
                        });
                    }
                    _ => {}
                }
                state[idx] = 1;
                chain.push(idx);
                current = self.styles[idx]
                    .based_on
                    .as_ref()
                    .and_then(|parent| self.by_id.get(parent).copied());
            }
            for idx in chain {
                state[idx] = 2;
            }
        }
        Ok(())
    }

    pub(crate) fn get(&self, id: &str) -> Option<&StyleDefinition> {
        self.by_id.get(id).map(|&i| &self.styles[i])
    }

    pub(crate) fn len(&self) -> usize {
        self.styles.len()
    }

    pub(crate) fn default_for(&self, kind: StyleKind) -> Option<&StyleDefinition> {
        self.styles.iter().find(|s| s.kind == kind && s.is_default)
    }

    /// Exact name first, then the normalized name.
    pub(crate) fn find_by_name(&self, kind: StyleKind, name: &str) -> Option<&StyleDefinition> {
        let of_kind = || self.styles.iter().filter(move |s| s.kind == kind);
        if let Some(s) = of_kind().find(|s| s.name.as_deref() == Some(name)) {
            return Some(s);
        }
        let wanted = normalize_name(name);
        of_kind().find(|s| s.name.as_deref().map(normalize_name).as_deref() == Some(wanted.as_str()))
    }

    /// Chain from the root ancestor down to `id`. Unknown parents end the chain.
    fn chain(&self, id: &str) -> Vec<&StyleDefinition> {
        let mut chain = Vec::new();
        let mut current = self.get(id);
        while let Some(style) = current {
            chain.push(style);
            current = style.based_on.as_deref().and_then(|p| self.get(p));
        }
        chain.reverse();
        chain
    }

    /// Effective paragraph properties of a style: an iterative merge along the
    /// based-on chain, closer ancestors overriding further ones.
    pub(crate) fn paragraph_properties(&self, id: &str) -> PropertySet {
        let mut set = PropertySet::default();
        for style in self.chain(id) {
            if let Some(ppr) = &style.paragraph_properties {
                set.apply(ppr);
            }
        }
        set
    }

    pub(crate) fn run_properties(&self, id: &str) -> PropertySet {
        let mut set = PropertySet::default();
        for style in self.chain(id) {
            if let Some(rpr) = &style.run_properties {
                set.apply(rpr);
            }
        }
        set
    }
}
