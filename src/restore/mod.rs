//! Restoration: the target's content under the reference's formatting.
//!
//! The target's formatting parts are replaced with the reference's, and every
//! style and numbering reference in the target's content is remapped onto the
//! reference definitions by name. Text, tables, drawings, links and bookmarks
//! pass through untouched.

mod direct;
mod parts;
mod remap;

use std::path::Path;

use serde::Serialize;

use crate::docx::numbering::Numbering;
use crate::docx::parse_content;
use crate::docx::styles::StyleSheet;
use crate::error::Error;
use crate::model::{ContentSummary, StyleKind};
use crate::package::{Package, resolve_target};
use crate::xml;

use parts::main_related;
use remap::Remapper;

/// Relationship kinds of the content-bearing parts besides the main document.
const CONTENT_KINDS: &[&str] = &["header", "footer", "footnotes", "endnotes", "comments"];

/// A loaded reference document. Immutable once built and shareable across threads.
#[derive(Debug)]
pub struct Reference {
    package: Package,
    styles: StyleSheet,
    numbering: Numbering,
}

impl Reference {
    pub fn open(path: &Path) -> Result<Self, Error> {
        Self::from_package(Package::open(path)?)
    }

    pub fn from_package(package: Package) -> Result<Self, Error> {
        let styles = load_styles(&package)?;
        let numbering = load_numbering(&package)?;
        log::debug!(
            "reference: {} styles, {} numbering instances",
            styles.len(),
            numbering.instances.len()
        );
        Ok(Self {
            package,
            styles,
            numbering,
        })
    }

    pub fn package(&self) -> &Package {
        &self.package
    }
}

#[derive(Clone, Debug)]
pub struct RestoreOptions {
    /// Remove direct properties the applied styles already provide.
    pub strip_redundant_formatting: bool,
    /// Take layout-affecting settings (compatibility, tab stops, hyphenation) from the reference.
    pub splice_settings: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            strip_redundant_formatting: true,
            splice_settings: true,
        }
    }
}

/// Non-fatal findings of a restoration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "camelCase")]
pub enum Warning {
    /// A style reference with no counterpart in the reference; `fallback` is
    /// the default style used instead, None when the reference was removed.
    #[serde(rename_all = "camelCase")]
    UnresolvedStyleReference {
        kind: StyleKind,
        id: String,
        fallback: Option<String>,
    },
    /// A numbering scheme copied from the target because the reference has none like it.
    #[serde(rename_all = "camelCase")]
    TransplantedNumbering { num_id: String, new_num_id: String },
    /// A relationship whose target part no longer exists after restoration.
    #[serde(rename_all = "camelCase")]
    DanglingRelationship {
        source: String,
        id: String,
        target: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnresolvedStyleReference { kind, id, fallback } => match fallback {
                Some(fb) => write!(f, "{} style '{id}' not found in reference, using '{fb}'", kind.as_str()),
                None => write!(f, "{} style '{id}' not found in reference, removed", kind.as_str()),
            },
            Warning::TransplantedNumbering { num_id, new_num_id } => {
                write!(f, "numbering {num_id} kept from target as {new_num_id}")
            }
            Warning::DanglingRelationship { source, id, target } => {
                write!(f, "relationship {id} of '{source}' points at missing part '{target}'")
            }
        }
    }
}

#[derive(Debug)]
pub struct Restored {
    pub package: Package,
    pub warnings: Vec<Warning>,
    /// Content of the output; equal to the target's.
    pub summary: ContentSummary,
}

fn load_styles(pkg: &Package) -> Result<StyleSheet, Error> {
    match main_related(pkg, "styles")? {
        Some(part) => StyleSheet::parse(&part, &pkg.xml_part(&part)?),
        None => Ok(StyleSheet::default()),
    }
}

fn load_numbering(pkg: &Package) -> Result<Numbering, Error> {
    match main_related(pkg, "numbering")? {
        Some(part) => Ok(Numbering::parse(&pkg.xml_part(&part)?)),
        None => Ok(Numbering::empty()),
    }
}

/// The main document followed by headers, footers, notes and comments.
pub fn content_parts(pkg: &Package) -> Result<Vec<String>, Error> {
    let main = pkg.main_document();
    let mut parts = vec![main.to_string()];
    let rels = pkg.relationships(main)?;
    for r in rels
        .items
        .iter()
        .filter(|r| !r.external && CONTENT_KINDS.contains(&r.kind()))
    {
        let part = resolve_target(main, &r.target);
        if pkg.has_part(&part) && !parts.contains(&part) {
            parts.push(part);
        }
    }
    Ok(parts)
}

/// Text and element counts over every content-bearing part.
pub fn content_summary(pkg: &Package) -> Result<ContentSummary, Error> {
    let mut summary = ContentSummary::default();
    for part in content_parts(pkg)? {
        let root = pkg.xml_part(&part)?;
        summary.absorb(parse_content(&part, &root)?.summary());
    }
    Ok(summary)
}

/// The restored content must match the target's exactly.
fn verify_content(before: &ContentSummary, after: &ContentSummary) -> Result<(), Error> {
    let changed = before.differences(after);
    if changed.is_empty() {
        return Ok(());
    }
    log::error!("content changed during restoration: {}", changed.join(", "));
    Err(Error::ContentChanged { changed })
}

/// Restore `target` to the reference's formatting.
pub fn restore(
    reference: &Reference,
    mut target: Package,
    options: &RestoreOptions,
) -> Result<Restored, Error> {
    let dangling_before = target.dangling_relationships();
    let target_styles = load_styles(&target)?;
    let target_numbering = load_numbering(&target)?;

    let parts = content_parts(&target)?;
    let mut trees = Vec::with_capacity(parts.len());
    let mut before = ContentSummary::default();
    for part in &parts {
        let root = target.xml_part(part)?;
        let content = parse_content(part, &root)?;
        log::debug!(
            "{part}: {} style references, numbering {:?}",
            content.style_references().len(),
            content.numbering_references()
        );
        before.absorb(content.summary());
        trees.push(root);
    }

    let mut remapper = Remapper::new(
        &reference.styles,
        &reference.numbering,
        &target_styles,
        &target_numbering,
    );
    let mut stripped = 0;
    for root in &mut trees {
        remapper.apply(root);
        if options.strip_redundant_formatting {
            stripped += direct::strip_redundant(root, &reference.styles, &remapper.numbering);
        }
    }
    log::debug!("removed {stripped} redundant direct properties");

    let numbering = if remapper.numbering_changed && remapper.numbering.has_definitions() {
        Some(xml::to_bytes(&remapper.numbering.root))
    } else {
        None
    };
    let mut warnings = std::mem::take(&mut remapper.warnings);

    for (part, root) in parts.iter().zip(&trees) {
        target.set_xml_part(part, root);
    }
    let old_ids = parts::remove_formatting(&mut target)?;
    parts::install_formatting(&reference.package, &mut target, &old_ids, numbering)?;
    if options.splice_settings {
        parts::install_settings(&reference.package, &mut target)?;
    }

    for (source, id, part) in target.dangling_relationships() {
        if dangling_before
            .iter()
            .any(|(s, i, _)| *s == source && *i == id)
        {
            continue;
        }
        log::warn!("relationship {id} of '{source}' now points at missing part '{part}'");
        warnings.push(Warning::DanglingRelationship {
            source,
            id,
            target: part,
        });
    }

    let summary = content_summary(&target)?;
    verify_content(&before, &summary)?;

    Ok(Restored {
        package: target,
        warnings,
        summary,
    })
}
