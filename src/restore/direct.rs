use crate::docx::numbering::Numbering;
use crate::docx::styles::{PropertySet, StyleSheet};
use crate::docx::{WML_NS, is_wml, wml, wml_attr, wml_mut};
use crate::model::StyleKind;
use crate::xml::{Element, Node};

/// Paragraph property children that carry references or structure rather than formatting.
const KEEP_IN_PPR: &[&str] = &["pStyle", "numPr", "rPr", "sectPr", "pPrChange"];
const KEEP_IN_RPR: &[&str] = &["rStyle", "rPrChange"];

/// Drop direct paragraph and run properties that the applied style chain
/// already provides with the same value. List paragraphs compare against the
/// style chain with their numbering level applied on top, the order Word
/// resolves them in. Returns how many were removed.
pub(crate) fn strip_redundant(root: &mut Element, styles: &StyleSheet, numbering: &Numbering) -> usize {
    let mut removed = 0;
    let ctx = Context { styles, numbering };
    visit(root, &ctx, None, &mut removed);
    removed
}

struct Context<'a> {
    styles: &'a StyleSheet,
    numbering: &'a Numbering,
}

fn paragraph_style(p: &Element, styles: &StyleSheet) -> Option<String> {
    wml(p, "pPr")
        .and_then(|ppr| wml_attr(ppr, "pStyle"))
        .map(String::from)
        .or_else(|| styles.default_for(StyleKind::Paragraph).map(|s| s.id.clone()))
}

/// Level properties of the list a paragraph belongs to, through its own
/// `numPr` or the one its style carries.
fn list_level<'n>(p: &Element, provided: &PropertySet, numbering: &'n Numbering) -> Option<&'n Element> {
    let num_pr = wml(p, "pPr")
        .and_then(|ppr| wml(ppr, "numPr"))
        .or_else(|| provided.values.get("numPr"))?;
    let num_id = wml_attr(num_pr, "numId").filter(|id| *id != "0")?;
    let ilvl = wml_attr(num_pr, "ilvl").unwrap_or("0");
    numbering.level_paragraph_properties(num_id, ilvl)
}

fn visit(el: &mut Element, ctx: &Context, para_style: Option<&str>, removed: &mut usize) {
    let styles = ctx.styles;
    if is_wml(el, "p") {
        let style = paragraph_style(el, styles);
        if let Some(style) = &style {
            let mut provided = styles.paragraph_properties(style);
            if let Some(level) = list_level(el, &provided, ctx.numbering) {
                provided = provided.with(level);
            }
            if let Some(ppr) = wml_mut(el, "pPr") {
                *removed += strip(ppr, &provided, KEEP_IN_PPR);
            }
            drop_if_empty(el, "pPr");
        }
        for child in el.elements_mut() {
            visit(child, ctx, style.as_deref(), removed);
        }
        return;
    }

    if is_wml(el, "r")
        && let Some(para_style) = para_style
    {
        let mut provided = styles.run_properties(para_style);
        if let Some(char_style) = wml(el, "rPr").and_then(|rpr| wml_attr(rpr, "rStyle")) {
            provided = provided.merged(&styles.run_properties(char_style));
        }
        if let Some(rpr) = wml_mut(el, "rPr") {
            *removed += strip(rpr, &provided, KEEP_IN_RPR);
        }
        drop_if_empty(el, "rPr");
    }

    for child in el.elements_mut() {
        visit(child, ctx, para_style, removed);
    }
}

fn strip(props: &mut Element, provided: &PropertySet, keep: &[&str]) -> usize {
    let before = props.children.len();
    props.retain_elements(|child| {
        child.ns.as_deref() != Some(WML_NS) || keep.contains(&child.name.as_str()) || !provided.provides(child)
    });
    before - props.children.len()
}

fn drop_if_empty(parent: &mut Element, name: &str) {
    parent.children.retain(|n| match n {
        Node::Element(e) if is_wml(e, name) => e.has_element_children() || !e.attributes.is_empty(),
        _ => true,
    });
}
