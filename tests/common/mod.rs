#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;

pub const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub fn init() {
    let _ = env_logger::try_init();
}

/// Builds small in-memory DOCX packages for tests.
pub struct DocxBuilder {
    body: String,
    styles: Option<String>,
    numbering: Option<String>,
    settings: Option<String>,
    extra: Vec<(String, Vec<u8>)>,
    xml_default: bool,
}

impl DocxBuilder {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            styles: None,
            numbering: None,
            settings: None,
            extra: Vec::new(),
            xml_default: true,
        }
    }

    /// `<w:style>` elements for word/styles.xml.
    pub fn styles(mut self, styles: &str) -> Self {
        self.styles = Some(styles.to_string());
        self
    }

    /// `<w:abstractNum>`/`<w:num>` elements for word/numbering.xml.
    pub fn numbering(mut self, numbering: &str) -> Self {
        self.numbering = Some(numbering.to_string());
        self
    }

    /// Children of `<w:settings>`.
    pub fn settings(mut self, settings: &str) -> Self {
        self.settings = Some(settings.to_string());
        self
    }

    /// Leave `Default Extension="xml"` out of `[Content_Types].xml`, so
    /// every markup part needs its own override.
    pub fn without_xml_default(mut self) -> Self {
        self.xml_default = false;
        self
    }

    /// An unrelated part carried along untouched.
    pub fn part(mut self, name: &str, data: &[u8]) -> Self {
        self.extra.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut overrides = String::from(
            r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
        );
        let mut rels = String::new();
        let mut parts: Vec<(String, Vec<u8>)> = Vec::new();

        let mut add = |name: &str, rel_kind: &str, ct: &str, xml: String, id: usize| {
            overrides.push_str(&format!(r#"<Override PartName="/word/{name}" ContentType="{ct}"/>"#));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{id}" Type="{R}/{rel_kind}" Target="{name}"/>"#
            ));
            parts.push((format!("word/{name}"), xml.into_bytes()));
        };
        if let Some(styles) = &self.styles {
            add(
                "styles.xml",
                "styles",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:styles xmlns:w="{W}">{styles}</w:styles>"#),
                1,
            );
        }
        if let Some(numbering) = &self.numbering {
            add(
                "numbering.xml",
                "numbering",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:numbering xmlns:w="{W}">{numbering}</w:numbering>"#),
                2,
            );
        }
        if let Some(settings) = &self.settings {
            add(
                "settings.xml",
                "settings",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:settings xmlns:w="{W}">{settings}</w:settings>"#),
                3,
            );
        }

        let xml_default = if self.xml_default {
            r#"<Default Extension="xml" ContentType="application/xml"/>"#
        } else {
            ""
        };
        let content_types = format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                "{}",
                r#"<Default Extension="png" ContentType="image/png"/>"#,
                "{}</Types>"
            ),
            xml_default, overrides
        );
        let package_rels = concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
            r#"</Relationships>"#
        );
        let document_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        );
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W}" xmlns:r="{R}"><w:body>{}</w:body></w:document>"#,
            self.body
        );

        let mut entries: Vec<(String, Vec<u8>)> = vec![
            ("[Content_Types].xml".into(), content_types.into_bytes()),
            ("_rels/.rels".into(), package_rels.as_bytes().to_vec()),
            ("word/document.xml".into(), document.into_bytes()),
            ("word/_rels/document.xml.rels".into(), document_rels.into_bytes()),
        ];
        entries.extend(parts);
        entries.extend(self.extra.iter().cloned());
        zip_entries(&entries)
    }

    pub fn write_to(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

pub fn zip_entries(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(name.as_str(), SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn paragraph(style: Option<&str>, text: &str) -> String {
    let ppr = style
        .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{s}"/></w:pPr>"#))
        .unwrap_or_default();
    format!(r#"<w:p>{ppr}<w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

pub fn paragraph_style(id: &str, name: &str, extra: &str) -> String {
    format!(r#"<w:style w:type="paragraph" w:styleId="{id}"><w:name w:val="{name}"/>{extra}</w:style>"#)
}

/// Reference formatting: Normal (default, 11pt) and "heading 1" as `s1`.
pub fn reference_styles() -> String {
    [
        r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:rPr><w:sz w:val="22"/></w:rPr></w:style>"#
            .to_string(),
        paragraph_style(
            "s1",
            "heading 1",
            r#"<w:basedOn w:val="Normal"/><w:pPr><w:jc w:val="center"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/></w:rPr>"#,
        ),
    ]
    .concat()
}

/// A reference with the standard styles and a given body.
pub fn reference(body: &str) -> DocxBuilder {
    DocxBuilder::new(body).styles(&reference_styles())
}

/// Text of the main document part.
pub fn document_xml(pkg: &docxide_restore::Package) -> String {
    String::from_utf8(pkg.part("word/document.xml").unwrap().to_vec()).unwrap()
}
