use std::collections::HashMap;

use crate::docx::{WML_NS, is_wml};
use crate::error::Error;
use crate::package::{
    ContentTypes, Package, Relationship, Relationships, relative_target, rels_path, resolve_target,
};
use crate::xml::{Element, Node};

/// Formatting parts replaced wholesale, by relationship kind from the main document.
pub(crate) const REPLACED_KINDS: &[&str] = &[
    "styles",
    "stylesWithEffects",
    "numbering",
    "fontTable",
    "theme",
];

const NUMBERING_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";
const NUMBERING_CT: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";
const SETTINGS_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings";
const SETTINGS_CT: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";

/// Settings children that change layout and are taken from the reference.
const SPLICED_SETTINGS: &[&str] = &[
    "defaultTabStop",
    "autoHyphenation",
    "consecutiveHyphenLimit",
    "hyphenationZone",
    "doNotHyphenateCaps",
    "characterSpacingControl",
    "compat",
    "themeFontLang",
    "clrSchemeMapping",
    "mathPr",
    "decimalSymbol",
    "listSeparator",
];

/// Resolved part of the first internal relationship of `kind` from the main
/// document, if it exists in the package.
pub(crate) fn main_related(pkg: &Package, kind: &str) -> Result<Option<String>, Error> {
    Ok(pkg
        .related_part(pkg.main_document(), kind)?
        .filter(|p| pkg.has_part(p)))
}

/// A free part name close to `wanted`: `word/fonts/font1.odttf` becomes
/// `word/fonts/font1_1.odttf` when taken.
fn free_name(pkg: &Package, wanted: &str) -> String {
    if !pkg.has_part(wanted) {
        return wanted.to_string();
    }
    let (stem, ext) = match wanted.rsplit_once('.') {
        Some((s, e)) if !e.contains('/') => (s, format!(".{e}")),
        _ => (wanted, String::new()),
    };
    (1..)
        .map(|n| format!("{stem}_{n}{ext}"))
        .find(|name| !pkg.has_part(name))
        .unwrap_or_else(|| wanted.to_string())
}

/// Record `content_type` for `part`. Markup always gets an override; a
/// `Default` is only added for other extensions.
fn register_type(types: &mut ContentTypes, part: &str, content_type: &str) {
    if types.content_type_of(part) == Some(content_type) {
        return;
    }
    match part.rsplit_once('.').map(|(_, ext)| ext) {
        Some(ext)
            if !ext.contains('/')
                && !ext.eq_ignore_ascii_case("xml")
                && !types.defaults.iter().any(|(d, _)| d.eq_ignore_ascii_case(ext)) =>
        {
            types.ensure_default(ext, content_type)
        }
        _ => types.set_override(part, content_type),
    }
}

/// Remove the target's formatting parts together with their relationship
/// parts and the parts only they referenced (embedded fonts, theme media).
/// Returns the relationship id each removed kind used, for reuse.
pub(crate) fn remove_formatting(target: &mut Package) -> Result<HashMap<String, String>, Error> {
    let main = target.main_document().to_string();
    let mut rels = target.relationships(&main)?;
    let mut types = target.content_types()?;
    let mut old_ids = HashMap::new();

    let doomed: Vec<Relationship> = rels
        .items
        .iter()
        .filter(|r| !r.external && REPLACED_KINDS.contains(&r.kind()))
        .cloned()
        .collect();
    for r in doomed {
        let part = resolve_target(&main, &r.target);
        let children: Vec<String> = target
            .relationships(&part)?
            .items
            .iter()
            .filter(|c| !c.external)
            .map(|c| resolve_target(&part, &c.target))
            .collect();
        target.remove_part(&part);
        target.remove_part(&rels_path(&part));
        types.remove_override(&part);
        for child in children {
            if !target.is_referenced(&child) {
                target.remove_part(&child);
                target.remove_part(&rels_path(&child));
                types.remove_override(&child);
            }
        }
        rels.remove(&r.id);
        log::debug!("removed target {} part {part}", r.kind());
        old_ids.entry(r.kind().to_string()).or_insert(r.id);
    }

    target.set_relationships(&main, &rels);
    target.set_content_types(&types);
    Ok(old_ids)
}

struct Installer<'a> {
    reference: &'a Package,
    reference_types: ContentTypes,
    target: &'a mut Package,
    types: ContentTypes,
}

impl Installer<'_> {
    /// Copy `data` to `dest` as the counterpart of the reference part `src`,
    /// along with everything `src` references.
    fn copy(&mut self, src: &str, dest: &str, data: Vec<u8>) -> Result<(), Error> {
        self.target.set_part(dest, data);
        if let Some(ct) = self.reference_types.content_type_of(src) {
            register_type(&mut self.types, dest, ct);
        }

        let src_rels = self.reference.relationships(src)?;
        if src_rels.items.is_empty() {
            return Ok(());
        }
        let mut out = Relationships::default();
        for r in &src_rels.items {
            let mut copied = r.clone();
            if !r.external {
                let child = resolve_target(src, &r.target);
                if let Some(bytes) = self.reference.part(&child) {
                    let child_dest = free_name(
                        self.target,
                        &resolve_target(dest, &relative_target(src, &child)),
                    );
                    self.target.set_part(&child_dest, bytes.to_vec());
                    if let Some(ct) = self.reference_types.content_type_of(&child) {
                        register_type(&mut self.types, &child_dest, ct);
                    }
                    copied.target = relative_target(dest, &child_dest);
                }
            }
            out.items.push(copied);
        }
        self.target.set_relationships(dest, &out);
        Ok(())
    }
}

/// Copy the reference's formatting parts into `target` and wire them to the
/// target's main document. `numbering` replaces the reference numbering
/// bytes when definitions were added during remapping.
pub(crate) fn install_formatting(
    reference: &Package,
    target: &mut Package,
    old_ids: &HashMap<String, String>,
    mut numbering: Option<Vec<u8>>,
) -> Result<(), Error> {
    let ref_main = reference.main_document().to_string();
    let main = target.main_document().to_string();
    let ref_rels = reference.relationships(&ref_main)?;
    let mut rels = target.relationships(&main)?;
    let types = target.content_types()?;

    let mut installer = Installer {
        reference,
        reference_types: reference.content_types()?,
        target,
        types,
    };

    let add_rel = |rels: &mut Relationships, kind: &str, rel_type: &str, target: String| {
        let id = old_ids
            .get(kind)
            .filter(|id| rels.get(id).is_none())
            .cloned()
            .unwrap_or_else(|| rels.next_id());
        rels.items.push(Relationship {
            id,
            rel_type: rel_type.to_string(),
            target,
            external: false,
        });
    };

    for &kind in REPLACED_KINDS {
        let Some(r) = ref_rels.of_type(kind).find(|r| !r.external) else {
            continue;
        };
        let src = resolve_target(&ref_main, &r.target);
        let Some(bytes) = reference.part(&src) else {
            log::warn!("reference {kind} relationship points at missing part {src}");
            continue;
        };
        let data = match (kind, numbering.take()) {
            ("numbering", Some(updated)) => updated,
            (_, pending) => {
                numbering = pending;
                bytes.to_vec()
            }
        };
        let dest = free_name(
            installer.target,
            &resolve_target(&main, &relative_target(&ref_main, &src)),
        );
        installer.copy(&src, &dest, data)?;
        add_rel(&mut rels, kind, &r.rel_type, relative_target(&main, &dest));
        log::debug!("installed reference {kind} part {src} as {dest}");
    }

    // Transplanted numbering with no reference numbering part to carry it.
    if let Some(data) = numbering {
        let dest = free_name(installer.target, &resolve_target(&main, "numbering.xml"));
        installer.target.set_part(&dest, data);
        installer.types.set_override(&dest, NUMBERING_CT);
        add_rel(&mut rels, "numbering", NUMBERING_REL, relative_target(&main, &dest));
    }

    let Installer { target, types, .. } = installer;
    target.set_relationships(&main, &rels);
    target.set_content_types(&types);
    Ok(())
}

fn settings_children<'e>(root: &'e Element) -> impl Iterator<Item = &'e Element> {
    root.elements().filter(|e| e.ns.as_deref() == Some(WML_NS))
}

/// Replace the layout-affecting settings of `target` with the reference's,
/// keeping everything else (footnote separators, document variables,
/// attached template).
pub(crate) fn splice_settings(root: &mut Element, reference: &Element) {
    let ref_order: Vec<&str> = settings_children(reference)
        .map(|e| e.name.as_str())
        .collect();

    for name in SPLICED_SETTINGS {
        let replacement = settings_children(reference).find(|e| e.name == *name).cloned();
        let existing = root
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if is_wml(e, name)));
        match (replacement, existing) {
            (Some(el), Some(idx)) => root.children[idx] = Node::Element(el),
            (Some(el), None) => {
                // Before the first element that follows it in the reference.
                let later: Vec<&str> = ref_order
                    .iter()
                    .skip_while(|n| **n != *name)
                    .skip(1)
                    .copied()
                    .collect();
                let at = root
                    .children
                    .iter()
                    .position(|n| {
                        matches!(n, Node::Element(e) if e.ns.as_deref() == Some(WML_NS) && later.contains(&e.name.as_str()))
                    })
                    .unwrap_or(root.children.len());
                root.children.insert(at, Node::Element(el));
            }
            (None, Some(idx)) => {
                root.children.remove(idx);
            }
            (None, None) => {}
        }
    }
}

/// Apply [`splice_settings`] to the target package, creating a settings part
/// when the target has none.
pub(crate) fn install_settings(reference: &Package, target: &mut Package) -> Result<(), Error> {
    let Some(ref_part) = main_related(reference, "settings")? else {
        return Ok(());
    };
    let ref_root = reference.xml_part(&ref_part)?;

    if let Some(part) = main_related(target, "settings")? {
        let mut root = target.xml_part(&part)?;
        splice_settings(&mut root, &ref_root);
        target.set_xml_part(&part, &root);
        return Ok(());
    }

    let mut root = Element::new(Some(WML_NS), ref_root.prefix.as_deref(), "settings");
    root.namespaces = ref_root.namespaces.clone();
    splice_settings(&mut root, &ref_root);

    let main = target.main_document().to_string();
    let dest = free_name(target, &resolve_target(&main, "settings.xml"));
    target.set_xml_part(&dest, &root);
    let mut rels = target.relationships(&main)?;
    let id = rels.next_id();
    rels.items.push(Relationship {
        id,
        rel_type: SETTINGS_REL.to_string(),
        target: relative_target(&main, &dest),
        external: false,
    });
    target.set_relationships(&main, &rels);
    let mut types = target.content_types()?;
    types.set_override(&dest, SETTINGS_CT);
    target.set_content_types(&types);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{parse_str, to_document_string};

    fn settings(body: &str) -> Element {
        parse_str("s", &format!(r#"<w:settings xmlns:w="{WML_NS}">{body}</w:settings>"#)).unwrap()
    }

    #[test]
    fn splices_layout_settings_in_reference_order() {
        let mut target = settings(concat!(
            r#"<w:zoom w:percent="100"/><w:defaultTabStop w:val="720"/>"#,
            r#"<w:autoHyphenation/><w:footnotePr><w:footnote w:id="-1"/></w:footnotePr>"#,
            r#"<w:rsids><w:rsidRoot w:val="00A1"/></w:rsids>"#,
        ));
        let reference = settings(concat!(
            r#"<w:zoom w:percent="90"/><w:defaultTabStop w:val="420"/>"#,
            r#"<w:characterSpacingControl w:val="compressPunctuation"/>"#,
            r#"<w:compat><w:compatSetting w:name="compatibilityMode" w:val="15"/></w:compat>"#,
            r#"<w:rsids><w:rsidRoot w:val="00B2"/></w:rsids>"#,
        ));
        splice_settings(&mut target, &reference);
        let names: Vec<&str> = target.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["zoom", "defaultTabStop", "footnotePr", "characterSpacingControl", "compat", "rsids"]
        );
        let out = to_document_string(&target);
        assert!(out.contains(r#"<w:zoom w:percent="100"/>"#));
        assert!(out.contains(r#"<w:defaultTabStop w:val="420"/>"#));
        assert!(out.contains(r#"<w:rsidRoot w:val="00A1"/>"#));
    }

    #[test]
    fn markup_is_registered_by_override_and_media_by_extension() {
        const STYLES_CT: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
        let mut types = ContentTypes::default();
        register_type(&mut types, "word/styles.xml", STYLES_CT);
        register_type(&mut types, "word/media/image1.emf", "image/x-emf");
        register_type(&mut types, "word/media/image2.emf", "image/x-emf");

        assert_eq!(types.defaults, [("emf".to_string(), "image/x-emf".to_string())]);
        assert_eq!(types.overrides, [("word/styles.xml".to_string(), STYLES_CT.to_string())]);
        assert_eq!(types.content_type_of("docProps/core.xml"), None);
    }

    #[test]
    fn free_names_avoid_collisions() {
        let mut bytes = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut bytes));
            let opts = zip::write::SimpleFileOptions::default();
            for name in ["word/document.xml", "word/fonts/f.odttf", "word/fonts/f_1.odttf"] {
                zip.start_file(name, opts).unwrap();
                std::io::Write::write_all(&mut zip, b"<x/>").unwrap();
            }
            zip.finish().unwrap();
        }
        let pkg = Package::from_bytes(&bytes).unwrap();
        assert_eq!(free_name(&pkg, "word/styles.xml"), "word/styles.xml");
        assert_eq!(free_name(&pkg, "word/fonts/f.odttf"), "word/fonts/f_2.odttf");
    }
}
