//! Zip container access: named parts, relationships and content types.
//!
//! Every entry of the archive is held in memory in its original order. Parts
//! the caller does not touch are written back byte-for-byte; a part only
//! disappears through an explicit [`Package::remove_part`].

use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use crate::error::Error;
use crate::xml::{self, Element};

pub const CONTENT_TYPES: &str = "[Content_Types].xml";
const PACKAGE_RELS: &str = "_rels/.rels";
const DEFAULT_MAIN: &str = "word/document.xml";

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CT_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartKind {
    Content,
    Formatting,
    Relationships,
    ContentTypes,
    Media,
    Other,
}

#[derive(Clone, Debug)]
pub struct Package {
    entries: Vec<(String, Vec<u8>)>,
    main: String,
}

impl Package {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::Io(
                std::io::Error::new(e.kind(), format!("{}: {}", e, path.display())),
            ),
            _ => Error::Io(e),
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|_| Error::PackageCorrupt("file is not a ZIP archive".into()))?;

        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| Error::PackageCorrupt(format!("entry {i}: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| Error::PackageCorrupt(format!("{name}: {e}")))?;
            entries.push((name, data));
        }

        let mut pkg = Package {
            entries,
            main: String::new(),
        };
        pkg.main = pkg.locate_main_document()?;
        Ok(pkg)
    }

    fn locate_main_document(&self) -> Result<String, Error> {
        let from_rels = self
            .relationships("")
            .ok()
            .and_then(|rels| {
                rels.of_type("officeDocument")
                    .next()
                    .map(|r| resolve_target("", &r.target))
            })
            .filter(|name| self.has_part(name));
        match from_rels {
            Some(name) => Ok(name),
            None if self.has_part(DEFAULT_MAIN) => Ok(DEFAULT_MAIN.to_string()),
            None => Err(Error::MissingPart(DEFAULT_MAIN.into())),
        }
    }

    /// Name of the main document (body) part.
    pub fn main_document(&self) -> &str {
        &self.main
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    /// Replace a part's bytes, or append a new part.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, d)) => *d = data,
            None => self.entries.push((name.to_string(), data)),
        }
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn require_part(&self, name: &str) -> Result<&[u8], Error> {
        self.part(name)
            .ok_or_else(|| Error::MissingPart(name.to_string()))
    }

    pub fn xml_part(&self, name: &str) -> Result<Element, Error> {
        xml::parse(name, self.require_part(name)?)
    }

    pub fn set_xml_part(&mut self, name: &str, root: &Element) {
        self.set_part(name, xml::to_bytes(root));
    }

    /// Relationships of `part` (`""` for the package-level relationships).
    /// A part without a relationships part has an empty set.
    pub fn relationships(&self, part: &str) -> Result<Relationships, Error> {
        let path = rels_path(part);
        match self.part(&path) {
            Some(bytes) => Relationships::parse(&path, bytes),
            None => Ok(Relationships::default()),
        }
    }

    pub fn set_relationships(&mut self, part: &str, rels: &Relationships) {
        let path = rels_path(part);
        self.set_part(&path, rels.to_xml().into_bytes());
    }

    pub fn content_types(&self) -> Result<ContentTypes, Error> {
        match self.part(CONTENT_TYPES) {
            Some(bytes) => ContentTypes::parse(bytes),
            None => Ok(ContentTypes::default()),
        }
    }

    pub fn set_content_types(&mut self, types: &ContentTypes) {
        self.set_part(CONTENT_TYPES, types.to_xml().into_bytes());
    }

    /// Resolve the first internal relationship of `kind` ("styles", "numbering", ...)
    /// from `source` to a part name.
    pub fn related_part(&self, source: &str, kind: &str) -> Result<Option<String>, Error> {
        let rels = self.relationships(source)?;
        Ok(rels
            .of_type(kind)
            .find(|r| !r.external)
            .map(|r| resolve_target(source, &r.target)))
    }

    /// Every internal relationship in the package: (source part, relationship, resolved target).
    fn internal_links(&self) -> Vec<(String, Relationship, String)> {
        let mut links = Vec::new();
        let rels_parts: Vec<&str> = self
            .part_names()
            .filter(|n| n.ends_with(".rels"))
            .collect();
        for rels_name in rels_parts {
            let Some(source) = source_of_rels(rels_name) else {
                continue;
            };
            let Ok(rels) = self.relationships(&source) else {
                log::debug!("{rels_name}: unreadable relationships part skipped");
                continue;
            };
            for r in rels.items.into_iter().filter(|r| !r.external) {
                let target = resolve_target(&source, &r.target);
                links.push((source.clone(), r, target));
            }
        }
        links
    }

    /// Internal relationships whose target part does not exist: (source part, id, target).
    pub fn dangling_relationships(&self) -> Vec<(String, String, String)> {
        self.internal_links()
            .into_iter()
            .filter(|(source, _, _)| self.has_part(source) || source.is_empty())
            .filter(|(_, _, target)| !self.has_part(target))
            .map(|(source, r, target)| (source, r.id, target))
            .collect()
    }

    /// True when some relationship of a part that still exists targets `part`.
    pub fn is_referenced(&self, part: &str) -> bool {
        self.internal_links()
            .iter()
            .any(|(source, _, target)| target == part && (source.is_empty() || self.has_part(source)))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let cursor = self.write_zip(Cursor::new(Vec::new()))?;
        Ok(cursor.into_inner())
    }

    /// Serialize to `path`. The archive is written to a sibling temporary file
    /// and renamed into place, so a failure never leaves a partial output.
    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".partial");
        let tmp = path.with_file_name(tmp_name);

        let written = std::fs::File::create(&tmp)
            .map_err(Error::Io)
            .and_then(|file| self.write_zip(file))
            .and_then(|file| file.sync_all().map_err(Error::Io));
        if let Err(e) = written {
            std::fs::remove_file(&tmp).ok();
            return Err(e);
        }
        std::fs::rename(&tmp, path).inspect_err(|_| {
            std::fs::remove_file(&tmp).ok();
        })?;
        Ok(())
    }

    fn write_zip<W: Write + Seek>(&self, sink: W) -> Result<W, Error> {
        let mut zip = zip::ZipWriter::new(sink);
        let deflated = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        let stored = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);

        let ordered = self
            .entries
            .iter()
            .filter(|(n, _)| n == CONTENT_TYPES)
            .chain(self.entries.iter().filter(|(n, _)| n != CONTENT_TYPES));
        for (name, data) in ordered {
            let opts = if classify_part(name) == PartKind::Media {
                stored
            } else {
                deflated
            };
            zip.start_file(name.as_str(), opts)?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?)
    }
}

pub fn classify_part(name: &str) -> PartKind {
    if name == CONTENT_TYPES {
        return PartKind::ContentTypes;
    }
    if name.ends_with(".rels") {
        return PartKind::Relationships;
    }
    if name.starts_with("word/media/") || name.starts_with("word/embeddings/") {
        return PartKind::Media;
    }
    let file = name.rsplit('/').next().unwrap_or(name);
    let stem = file.trim_end_matches(".xml");
    let stem = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    match stem {
        "styles" | "stylesWithEffects" | "numbering" | "fontTable" | "settings" => {
            PartKind::Formatting
        }
        "theme" if name.contains("/theme/") => PartKind::Formatting,
        "document" | "header" | "footer" | "footnotes" | "endnotes" | "comments" => {
            PartKind::Content
        }
        _ => PartKind::Other,
    }
}

/// "word/document.xml" → "word/_rels/document.xml.rels"; "" → "_rels/.rels".
pub fn rels_path(part: &str) -> String {
    if part.is_empty() {
        return PACKAGE_RELS.to_string();
    }
    let (dir, file) = match part.rsplit_once('/') {
        Some((d, f)) => (d, f),
        None => ("", part),
    };
    if dir.is_empty() {
        format!("_rels/{}.rels", file)
    } else {
        format!("{}/_rels/{}.rels", dir, file)
    }
}

fn source_of_rels(rels: &str) -> Option<String> {
    if rels == PACKAGE_RELS {
        return Some(String::new());
    }
    let (dir, file) = rels.rsplit_once("_rels/")?;
    let file = file.strip_suffix(".rels")?;
    Some(format!("{dir}{file}"))
}

/// Resolve a relationship target against the part that owns the relationship.
pub fn resolve_target(source: &str, target: &str) -> String {
    let joined = if let Some(abs) = target.strip_prefix('/') {
        abs.to_string()
    } else {
        match source.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/{target}"),
            None => target.to_string(),
        }
    };
    let mut parts: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Relative target from the directory of `source` to `part`.
pub fn relative_target(source: &str, part: &str) -> String {
    let from: Vec<&str> = match source.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let to: Vec<&str> = part.split('/').collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut segs: Vec<&str> = vec![".."; from.len() - common];
    segs.extend(&to[common..]);
    segs.join("/")
}

#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// Last path segment of the type URI ("styles", "image", "hyperlink", ...).
    pub fn kind(&self) -> &str {
        self.rel_type.rsplit('/').next().unwrap_or(&self.rel_type)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Relationships {
    pub items: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(part: &str, bytes: &[u8]) -> Result<Self, Error> {
        let root = xml::parse(part, bytes)?;
        let items = root
            .elements()
            .filter(|e| e.name == "Relationship")
            .filter_map(|e| {
                Some(Relationship {
                    id: e.attr(None, "Id")?.to_string(),
                    rel_type: e.attr(None, "Type").unwrap_or_default().to_string(),
                    target: e.attr(None, "Target")?.to_string(),
                    external: e.attr(None, "TargetMode") == Some("External"),
                })
            })
            .collect();
        Ok(Self { items })
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn of_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.items.iter().filter(move |r| r.kind() == kind)
    }

    pub fn remove(&mut self, id: &str) -> Option<Relationship> {
        let idx = self.items.iter().position(|r| r.id == id)?;
        Some(self.items.remove(idx))
    }

    /// First `rIdN` not already taken.
    pub fn next_id(&self) -> String {
        let mut n = self.items.len() + 1;
        loop {
            let id = format!("rId{n}");
            if self.get(&id).is_none() {
                return id;
            }
            n += 1;
        }
    }

    pub fn to_xml(&self) -> String {
        let mut root = Element::new(Some(RELS_NS), None, "Relationships");
        root.namespaces.push((None, RELS_NS.to_string()));
        for r in &self.items {
            let mut el = Element::new(Some(RELS_NS), None, "Relationship");
            el.set_attr(None, "Id", &r.id);
            el.set_attr(None, "Type", &r.rel_type);
            el.set_attr(None, "Target", &r.target);
            if r.external {
                el.set_attr(None, "TargetMode", "External");
            }
            root.children.push(xml::Node::Element(el));
        }
        xml::to_document_string(&root)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContentTypes {
    /// (extension, content type)
    pub defaults: Vec<(String, String)>,
    /// (part name without leading slash, content type)
    pub overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let root = xml::parse(CONTENT_TYPES, bytes)?;
        let mut types = ContentTypes::default();
        for e in root.elements() {
            let ct = e.attr(None, "ContentType").unwrap_or_default().to_string();
            match e.name.as_str() {
                "Default" => {
                    if let Some(ext) = e.attr(None, "Extension") {
                        types.defaults.push((ext.to_ascii_lowercase(), ct));
                    }
                }
                "Override" => {
                    if let Some(part) = e.attr(None, "PartName") {
                        types
                            .overrides
                            .push((part.trim_start_matches('/').to_string(), ct));
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    pub fn content_type_of(&self, part: &str) -> Option<&str> {
        if let Some((_, ct)) = self.overrides.iter().find(|(p, _)| p == part) {
            return Some(ct);
        }
        let ext = part.rsplit_once('.')?.1.to_ascii_lowercase();
        self.defaults
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, ct)| ct.as_str())
    }

    pub fn set_override(&mut self, part: &str, content_type: &str) {
        match self.overrides.iter_mut().find(|(p, _)| p == part) {
            Some((_, ct)) => *ct = content_type.to_string(),
            None => self
                .overrides
                .push((part.to_string(), content_type.to_string())),
        }
    }

    pub fn remove_override(&mut self, part: &str) {
        self.overrides.retain(|(p, _)| p != part);
    }

    pub fn ensure_default(&mut self, ext: &str, content_type: &str) {
        let ext = ext.to_ascii_lowercase();
        if !self.defaults.iter().any(|(e, _)| *e == ext) {
            self.defaults.push((ext, content_type.to_string()));
        }
    }

    pub fn to_xml(&self) -> String {
        let mut root = Element::new(Some(CT_NS), None, "Types");
        root.namespaces.push((None, CT_NS.to_string()));
        for (ext, ct) in &self.defaults {
            let mut el = Element::new(Some(CT_NS), None, "Default");
            el.set_attr(None, "Extension", ext);
            el.set_attr(None, "ContentType", ct);
            root.children.push(xml::Node::Element(el));
        }
        for (part, ct) in &self.overrides {
            let mut el = Element::new(Some(CT_NS), None, "Override");
            el.set_attr(None, "PartName", &format!("/{part}"));
            el.set_attr(None, "ContentType", ct);
            root.children.push(xml::Node::Element(el));
        }
        xml::to_document_string(&root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute_targets() {
        assert_eq!(resolve_target("word/document.xml", "styles.xml"), "word/styles.xml");
        assert_eq!(
            resolve_target("word/document.xml", "../customXml/item1.xml"),
            "customXml/item1.xml"
        );
        assert_eq!(resolve_target("word/document.xml", "/word/media/a.png"), "word/media/a.png");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn relative_target_inverts_resolution() {
        for part in ["word/styles.xml", "word/theme/theme1.xml", "customXml/item1.xml"] {
            let rel = relative_target("word/document.xml", part);
            assert_eq!(resolve_target("word/document.xml", &rel), part);
        }
    }

    #[test]
    fn rels_paths() {
        assert_eq!(rels_path("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_path(""), "_rels/.rels");
        assert_eq!(source_of_rels("word/_rels/document.xml.rels").as_deref(), Some("word/document.xml"));
        assert_eq!(source_of_rels("_rels/.rels").as_deref(), Some(""));
    }

    #[test]
    fn classifies_parts() {
        assert_eq!(classify_part("word/document.xml"), PartKind::Content);
        assert_eq!(classify_part("word/header2.xml"), PartKind::Content);
        assert_eq!(classify_part("word/theme/theme1.xml"), PartKind::Formatting);
        assert_eq!(classify_part("word/numbering.xml"), PartKind::Formatting);
        assert_eq!(classify_part("word/media/image1.png"), PartKind::Media);
        assert_eq!(classify_part("word/_rels/document.xml.rels"), PartKind::Relationships);
        assert_eq!(classify_part("docProps/app.xml"), PartKind::Other);
    }

    #[test]
    fn relationships_round_trip_through_xml() {
        let rels = Relationships {
            items: vec![
                Relationship {
                    id: "rId1".into(),
                    rel_type: "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles".into(),
                    target: "styles.xml".into(),
                    external: false,
                },
                Relationship {
                    id: "rId2".into(),
                    rel_type: "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink".into(),
                    target: "https://example.com/?a=1&b=2".into(),
                    external: true,
                },
            ],
        };
        let parsed = Relationships::parse("x.rels", rels.to_xml().as_bytes()).unwrap();
        assert_eq!(parsed.items, rels.items);
        assert_eq!(parsed.next_id(), "rId3");
        assert_eq!(parsed.of_type("styles").count(), 1);
    }
}
