use std::collections::{HashMap, HashSet};

use crate::docx::numbering::{Numbering, NumberingInstance};
use crate::docx::styles::StyleSheet;
use crate::docx::{WML_NS, is_wml, wml_val};
use crate::model::StyleKind;
use crate::xml::{Element, Node};

use super::Warning;

/// Maps target style and numbering ids onto the reference's definitions.
/// Resolutions are cached, so every reference to the same target id gets the
/// same answer and warns once.
pub(crate) struct Remapper<'r> {
    reference: &'r StyleSheet,
    target: &'r StyleSheet,
    target_numbering: &'r Numbering,
    /// Output numbering: the reference definitions plus whatever had to be added.
    pub(crate) numbering: Numbering,
    pub(crate) numbering_changed: bool,
    styles: HashMap<(StyleKind, String), Option<String>>,
    nums: HashMap<String, String>,
    claimed: HashSet<String>,
    pub(crate) warnings: Vec<Warning>,
}

impl<'r> Remapper<'r> {
    pub(crate) fn new(
        reference: &'r StyleSheet,
        reference_numbering: &Numbering,
        target: &'r StyleSheet,
        target_numbering: &'r Numbering,
    ) -> Self {
        Self {
            reference,
            target,
            target_numbering,
            numbering: reference_numbering.clone(),
            numbering_changed: false,
            styles: HashMap::new(),
            nums: HashMap::new(),
            claimed: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Reference style id for a target reference, or None when the reference
    /// element has to go.
    pub(crate) fn style(&mut self, kind: StyleKind, id: &str) -> Option<String> {
        let key = (kind, id.to_string());
        if let Some(cached) = self.styles.get(&key) {
            return cached.clone();
        }
        let resolved = self.resolve_style(kind, id);
        self.styles.insert(key, resolved.clone());
        resolved
    }

    /// Reference style matching a target style by name, or by id when the
    /// target does not define it.
    fn counterpart(&self, kind: StyleKind, id: &str) -> Option<String> {
        let name = self
            .target
            .get(id)
            .filter(|s| s.kind == kind)
            .and_then(|s| s.name.as_deref());
        let found = match name {
            Some(name) => self.reference.find_by_name(kind, name),
            None => self.reference.get(id).filter(|s| s.kind == kind),
        }?;
        if found.id != id {
            log::debug!("{} style '{id}' -> '{}'", kind.as_str(), found.id);
        }
        Some(found.id.clone())
    }

    fn resolve_style(&mut self, kind: StyleKind, id: &str) -> Option<String> {
        if let Some(found) = self.counterpart(kind, id) {
            return Some(found);
        }
        let fallback = self.reference.default_for(kind).map(|s| s.id.clone());
        log::warn!(
            "{} style '{id}' has no counterpart in the reference; using {}",
            kind.as_str(),
            fallback.as_deref().unwrap_or("no style"),
        );
        self.warnings.push(Warning::UnresolvedStyleReference {
            kind,
            id: id.to_string(),
            fallback: fallback.clone(),
        });
        fallback
    }

    /// Point the style references of a scheme copied from the target at
    /// reference styles. Links with no counterpart are dropped, never
    /// defaulted.
    fn remap_scheme(&mut self, scheme: &mut Element) {
        self.relink(scheme, StyleKind::Numbering, "styleLink");
        self.relink(scheme, StyleKind::Numbering, "numStyleLink");
        for lvl in scheme.elements_mut().filter(|e| is_wml(e, "lvl")) {
            self.relink(lvl, StyleKind::Paragraph, "pStyle");
            for props in lvl.elements_mut() {
                if is_wml(props, "pPr") {
                    self.relink(props, StyleKind::Paragraph, "pStyle");
                } else if is_wml(props, "rPr") {
                    self.relink(props, StyleKind::Character, "rStyle");
                }
            }
        }
    }

    fn relink(&mut self, el: &mut Element, kind: StyleKind, child: &str) {
        let Some(id) = el.child(WML_NS, child).and_then(wml_val).map(String::from) else {
            return;
        };
        match self.counterpart(kind, &id) {
            Some(mapped) => {
                if let Some(link) = el.child_mut(WML_NS, child) {
                    link.set_attr(Some(WML_NS), "val", &mapped);
                }
            }
            None => {
                log::warn!(
                    "numbering {child} '{id}' has no counterpart in the reference; removed"
                );
                self.warnings.push(Warning::UnresolvedStyleReference {
                    kind,
                    id,
                    fallback: None,
                });
                el.children
                    .retain(|n| !matches!(n, Node::Element(e) if is_wml(e, child)));
            }
        }
    }

    /// Reference numbering id for a target `numId`.
    pub(crate) fn num(&mut self, num_id: &str) -> String {
        if num_id == "0" {
            return num_id.to_string();
        }
        if let Some(mapped) = self.nums.get(num_id) {
            return mapped.clone();
        }
        let mapped = self.resolve_num(num_id);
        self.nums.insert(num_id.to_string(), mapped.clone());
        mapped
    }

    fn resolve_num(&mut self, num_id: &str) -> String {
        let target_numbering = self.target_numbering;
        let (Some(instance), Some(scheme)) = (
            target_numbering.instance(num_id),
            target_numbering.abstract_of(num_id),
        ) else {
            log::debug!("numId {num_id} is not defined by the target; left unchanged");
            return num_id.to_string();
        };
        let overrides = Numbering::level_overrides(instance);

        if let Some(abstract_id) = self
            .numbering
            .find_abstract(&scheme.identity)
            .map(|a| a.id.clone())
        {
            if overrides.is_empty()
                && let Some(existing) = self.unclaimed_instance(&abstract_id)
            {
                self.claimed.insert(existing.clone());
                return existing;
            }
            return self.synthesize(&abstract_id, overrides);
        }

        let new_abstract = self.numbering.next_abstract_id();
        let mut element = scheme.element.clone();
        self.remap_scheme(&mut element);
        self.numbering.push_abstract(element, &new_abstract);
        let new_num = self.synthesize(&new_abstract, overrides);
        log::warn!("numbering {num_id} has no counterpart in the reference; transplanted as {new_num}");
        self.warnings.push(Warning::TransplantedNumbering {
            num_id: num_id.to_string(),
            new_num_id: new_num.clone(),
        });
        new_num
    }

    fn unclaimed_instance(&self, abstract_id: &str) -> Option<String> {
        self.numbering
            .instances
            .iter()
            .filter(|n| n.abstract_id == abstract_id && !self.claimed.contains(&n.id))
            .find(|n| Numbering::level_overrides(n).is_empty())
            .map(|n: &NumberingInstance| n.id.clone())
    }

    fn synthesize(&mut self, abstract_id: &str, overrides: Vec<Element>) -> String {
        let id = self.numbering.next_num_id();
        self.numbering.push_instance(&id, abstract_id, overrides);
        self.numbering_changed = true;
        self.claimed.insert(id.clone());
        id
    }

    /// Rewrite every `pStyle`, `rStyle`, `tblStyle` and `numId` below `root`.
    pub(crate) fn apply(&mut self, root: &mut Element) {
        root.walk_mut(&mut |el| {
            let (kind, child) = match el.name.as_str() {
                "pPr" => (StyleKind::Paragraph, "pStyle"),
                "rPr" => (StyleKind::Character, "rStyle"),
                "tblPr" => (StyleKind::Table, "tblStyle"),
                "numPr" => {
                    if is_wml(el, "numPr")
                        && let Some(num_id) = el.child_mut(WML_NS, "numId")
                        && let Some(val) = wml_val(num_id).map(String::from)
                    {
                        let mapped = self.num(&val);
                        num_id.set_attr(Some(WML_NS), "val", &mapped);
                    }
                    return;
                }
                _ => return,
            };
            if el.ns.as_deref() != Some(WML_NS) {
                return;
            }
            let Some(id) = el.child(WML_NS, child).and_then(wml_val).map(String::from) else {
                return;
            };
            match self.style(kind, &id) {
                Some(mapped) => {
                    if let Some(reference) = el.child_mut(WML_NS, child) {
                        reference.set_attr(Some(WML_NS), "val", &mapped);
                    }
                }
                None => el.children.retain(|n| !matches!(n, Node::Element(e) if is_wml(e, child))),
            }
        });
    }
}
