mod common;

use common::{DocxBuilder, document_xml, paragraph, paragraph_style};
use docxide_restore::restore::restore;
use docxide_restore::{
    CompareOptions, Package, Reference, RestoreOptions, StyleKind, Warning, content_summary,
};

fn reference_package(builder: &DocxBuilder) -> Reference {
    Reference::from_package(Package::from_bytes(&builder.build()).unwrap()).unwrap()
}

fn target_styles() -> String {
    [
        r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:rPr><w:sz w:val="18"/><w:color w:val="FF0000"/></w:rPr></w:style>"#
            .to_string(),
        paragraph_style("s2", "Heading 1", r#"<w:rPr><w:i/></w:rPr>"#),
    ]
    .concat()
}

const TABLE: &str = concat!(
    r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/></w:tblPr>"#,
    r#"<w:tr><w:tc><w:p><w:r><w:t>cell one</w:t></w:r></w:p></w:tc>"#,
    r#"<w:tc><w:p><w:r><w:t>cell two</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
);

#[test]
fn content_is_preserved_and_styles_are_remapped_by_name() {
    common::init();
    let reference = reference_package(&common::reference(&paragraph(Some("s1"), "Reference title")));
    let body = [
        paragraph(Some("s2"), "Quarterly report"),
        r#"<w:p><w:bookmarkStart w:id="7" w:name="intro"/><w:r><w:t xml:space="preserve">Intro </w:t></w:r><w:bookmarkEnd w:id="7"/></w:p>"#.to_string(),
        TABLE.to_string(),
        paragraph(None, "Closing words"),
    ]
    .concat();
    let target = Package::from_bytes(&DocxBuilder::new(&body).styles(&target_styles()).build()).unwrap();
    let before = content_summary(&target).unwrap();

    let restored = restore(&reference, target, &RestoreOptions::default()).unwrap();

    assert!(restored.warnings.is_empty(), "{:?}", restored.warnings);
    assert_eq!(restored.summary, before);
    assert_eq!(content_summary(&restored.package).unwrap(), before);
    assert_eq!(before.paragraphs, 5);
    assert_eq!(before.tables, 1);
    assert_eq!(before.bookmarks, 2);

    let doc = document_xml(&restored.package);
    assert!(doc.contains(r#"<w:pStyle w:val="s1"/>"#), "got {doc}");
    assert!(!doc.contains(r#"w:val="s2""#), "got {doc}");
    assert!(doc.contains("Quarterly report"));
    assert!(doc.contains("cell two"));

    assert_eq!(
        restored.package.part("word/styles.xml"),
        reference.package().part("word/styles.xml")
    );
}

#[test]
fn unknown_styles_fall_back_to_the_reference_default_with_a_warning() {
    common::init();
    let reference = reference_package(&common::reference(""));
    let target = Package::from_bytes(
        &DocxBuilder::new(&paragraph(Some("Fancy"), "Decorated"))
            .styles(&[target_styles(), paragraph_style("Fancy", "Fancy Title", "")].concat())
            .build(),
    )
    .unwrap();

    let restored = restore(&reference, target, &RestoreOptions::default()).unwrap();

    assert_eq!(
        restored.warnings,
        [Warning::UnresolvedStyleReference {
            kind: StyleKind::Paragraph,
            id: "Fancy".into(),
            fallback: Some("Normal".into()),
        }]
    );
    let doc = document_xml(&restored.package);
    assert!(doc.contains(r#"<w:pStyle w:val="Normal"/>"#), "got {doc}");
    assert!(doc.contains("Decorated"));
}

#[test]
fn direct_formatting_equal_to_the_style_is_dropped() {
    common::init();
    let reference = reference_package(&common::reference(""));
    let body = concat!(
        r#"<w:p><w:pPr><w:pStyle w:val="s2"/><w:jc w:val="center"/></w:pPr>"#,
        r#"<w:r><w:rPr><w:b/><w:sz w:val="32"/><w:u w:val="single"/></w:rPr><w:t>Heading</w:t></w:r></w:p>"#,
    );
    let target = Package::from_bytes(&DocxBuilder::new(body).styles(&target_styles()).build()).unwrap();

    let restored = restore(&reference, target.clone(), &RestoreOptions::default()).unwrap();
    let doc = document_xml(&restored.package);
    assert!(doc.contains(r#"<w:pPr><w:pStyle w:val="s1"/></w:pPr>"#), "got {doc}");
    assert!(doc.contains(r#"<w:rPr><w:u w:val="single"/></w:rPr>"#), "got {doc}");

    let kept = RestoreOptions {
        strip_redundant_formatting: false,
        ..RestoreOptions::default()
    };
    let restored = restore(&reference, target, &kept).unwrap();
    let doc = document_xml(&restored.package);
    assert!(doc.contains(r#"<w:jc w:val="center"/>"#), "got {doc}");
    assert!(doc.contains("<w:b/>"), "got {doc}");
}

#[test]
fn numbering_without_a_reference_counterpart_is_transplanted() {
    common::init();
    let reference = reference_package(&common::reference(""));
    let body = concat!(
        r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="3"/></w:numPr></w:pPr>"#,
        r#"<w:r><w:t>First item</w:t></w:r></w:p>"#,
    );
    let target = Package::from_bytes(
        &DocxBuilder::new(body)
            .styles(&target_styles())
            .numbering(concat!(
                r#"<w:abstractNum w:abstractNumId="4"><w:lvl w:ilvl="0"><w:start w:val="1"/>"#,
                r#"<w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/></w:lvl></w:abstractNum>"#,
                r#"<w:num w:numId="3"><w:abstractNumId w:val="4"/></w:num>"#,
            ))
            .build(),
    )
    .unwrap();

    let restored = restore(&reference, target, &RestoreOptions::default()).unwrap();

    let new_id = match restored.warnings.as_slice() {
        [Warning::TransplantedNumbering { num_id, new_num_id }] => {
            assert_eq!(num_id, "3");
            new_num_id.clone()
        }
        other => panic!("expected one transplant warning, got {other:?}"),
    };
    let doc = document_xml(&restored.package);
    assert!(doc.contains(&format!(r#"<w:numId w:val="{new_id}"/>"#)), "got {doc}");

    let pkg = &restored.package;
    let numbering_part = pkg
        .related_part(pkg.main_document(), "numbering")
        .unwrap()
        .expect("numbering relationship");
    let numbering = String::from_utf8(pkg.part(&numbering_part).unwrap().to_vec()).unwrap();
    assert!(numbering.contains(r#"w:val="%1.""#), "got {numbering}");
    assert!(numbering.contains(&format!(r#"w:numId="{new_id}""#)), "got {numbering}");
    assert!(pkg.dangling_relationships().is_empty());
}

#[test]
fn numbering_matching_the_reference_reuses_its_instance() {
    common::init();
    let bullet = r#"<w:lvl w:ilvl="0"><w:numFmt w:val="bullet"/><w:lvlText w:val="•"/></w:lvl>"#;
    let reference = reference_package(&common::reference("").numbering(&format!(
        r#"<w:abstractNum w:abstractNumId="0">{bullet}</w:abstractNum><w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>"#
    )));
    let target = Package::from_bytes(
        &DocxBuilder::new(r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="9"/></w:numPr></w:pPr></w:p>"#)
            .numbering(&format!(
                r#"<w:abstractNum w:abstractNumId="5">{bullet}</w:abstractNum><w:num w:numId="9"><w:abstractNumId w:val="5"/></w:num>"#
            ))
            .build(),
    )
    .unwrap();

    let restored = restore(&reference, target, &RestoreOptions::default()).unwrap();
    assert!(restored.warnings.is_empty(), "{:?}", restored.warnings);
    let doc = document_xml(&restored.package);
    assert!(doc.contains(r#"<w:numId w:val="1"/>"#), "got {doc}");
    assert_eq!(
        restored.package.part("word/numbering.xml"),
        reference.package().part("word/numbering.xml")
    );
}

#[test]
fn layout_settings_come_from_the_reference() {
    common::init();
    let reference = reference_package(&common::reference("").settings(concat!(
        r#"<w:zoom w:percent="100"/><w:defaultTabStop w:val="720"/>"#,
        r#"<w:characterSpacingControl w:val="doNotCompress"/>"#,
    )));
    let target = Package::from_bytes(
        &DocxBuilder::new(&paragraph(None, "x"))
            .settings(r#"<w:zoom w:percent="120"/><w:defaultTabStop w:val="360"/><w:autoHyphenation/>"#)
            .build(),
    )
    .unwrap();

    let restored = restore(&reference, target, &RestoreOptions::default()).unwrap();
    let settings = String::from_utf8(restored.package.part("word/settings.xml").unwrap().to_vec()).unwrap();
    assert!(settings.contains(r#"<w:zoom w:percent="120"/>"#), "got {settings}");
    assert!(settings.contains(r#"<w:defaultTabStop w:val="720"/>"#), "got {settings}");
    assert!(settings.contains("characterSpacingControl"), "got {settings}");
    assert!(!settings.contains("autoHyphenation"), "got {settings}");
}

#[test]
fn restore_one_writes_beside_the_target_by_default() {
    common::init();
    let dir = tempfile::tempdir().unwrap();
    let reference = common::reference(&paragraph(Some("s1"), "Title")).write_to(dir.path(), "reference.docx");
    let target = DocxBuilder::new(&paragraph(Some("s2"), "Report"))
        .styles(&target_styles())
        .part("word/media/image1.png", &[1, 2, 3])
        .write_to(dir.path(), "report.docx");

    let outcome = docxide_restore::restore_one(&reference, &target, None).unwrap();

    assert_eq!(outcome.output_path, dir.path().join("report_formatted.docx"));
    assert!(outcome.warnings.is_empty());
    let output = Package::open(&outcome.output_path).unwrap();
    assert_eq!(output.part("word/media/image1.png"), Some(&[1u8, 2, 3][..]));

    // The output's formatting parts now match the reference exactly.
    let cmp = docxide_restore::compare(&reference, &outcome.output_path, &CompareOptions::default()).unwrap();
    assert!(cmp.is_identical(), "{:#?}", cmp.diffs);
}

#[test]
fn a_failed_restoration_writes_nothing() {
    common::init();
    let dir = tempfile::tempdir().unwrap();
    let reference = common::reference("").write_to(dir.path(), "reference.docx");
    let target = dir.path().join("broken.docx");
    std::fs::write(&target, b"not a zip").unwrap();

    assert!(docxide_restore::restore_one(&reference, &target, None).is_err());
    assert!(!dir.path().join("broken_formatted.docx").exists());
}

#[test]
fn malformed_target_markup_is_reported_with_its_part() {
    common::init();
    let reference = reference_package(&common::reference(""));
    let target = Package::from_bytes(&DocxBuilder::new("<w:p><w:r></w:p>").build()).unwrap();
    match restore(&reference, target, &RestoreOptions::default()) {
        Err(docxide_restore::Error::MalformedMarkup { part, .. }) => assert_eq!(part, "word/document.xml"),
        other => panic!("expected MalformedMarkup, got {other:?}"),
    }
}

#[test]
fn transplanted_numbering_links_only_to_reference_styles() {
    common::init();
    let reference = reference_package(&common::reference(""));
    let target = Package::from_bytes(
        &DocxBuilder::new(concat!(
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="3"/></w:numPr></w:pPr>"#,
            r#"<w:r><w:t>Item</w:t></w:r></w:p>"#,
        ))
        .styles(&[target_styles(), paragraph_style("ListX", "List X", "")].concat())
        .numbering(concat!(
            r#"<w:abstractNum w:abstractNumId="4">"#,
            r#"<w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/><w:pStyle w:val="ListX"/></w:lvl>"#,
            r#"<w:lvl w:ilvl="1"><w:numFmt w:val="decimal"/><w:lvlText w:val="%2."/><w:pStyle w:val="s2"/></w:lvl>"#,
            r#"</w:abstractNum><w:num w:numId="3"><w:abstractNumId w:val="4"/></w:num>"#,
        ))
        .build(),
    )
    .unwrap();

    let restored = restore(&reference, target, &RestoreOptions::default()).unwrap();

    assert!(
        restored.warnings.contains(&Warning::UnresolvedStyleReference {
            kind: StyleKind::Paragraph,
            id: "ListX".into(),
            fallback: None,
        }),
        "{:?}",
        restored.warnings
    );
    let numbering = String::from_utf8(restored.package.part("word/numbering.xml").unwrap().to_vec()).unwrap();
    assert!(!numbering.contains("ListX"), "got {numbering}");
    assert!(numbering.contains(r#"<w:pStyle w:val="s1"/>"#), "got {numbering}");
    let styles = String::from_utf8(restored.package.part("word/styles.xml").unwrap().to_vec()).unwrap();
    assert!(styles.contains(r#"w:styleId="s1""#));
}

#[test]
fn list_indents_overriding_the_numbering_level_are_kept() {
    common::init();
    let flush = r#"<w:pPr><w:ind w:left="0"/></w:pPr>"#;
    let reference = reference_package(
        &DocxBuilder::new("")
            .styles(&[common::reference_styles(), paragraph_style("ListParagraph", "List Paragraph", flush)].concat()),
    );
    let item = |ind: &str, text: &str| {
        format!(
            r#"<w:p><w:pPr><w:pStyle w:val="LP"/><w:numPr><w:ilvl w:val="0"/><w:numId w:val="3"/></w:numPr>{ind}</w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"#
        )
    };
    let body = [
        item(r#"<w:ind w:left="0"/>"#, "Flush item"),
        item(r#"<w:ind w:left="720" w:hanging="360"/>"#, "Indented item"),
    ]
    .concat();
    let target = Package::from_bytes(
        &DocxBuilder::new(&body)
            .styles(&paragraph_style("LP", "List Paragraph", flush))
            .numbering(concat!(
                r#"<w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/>"#,
                r#"<w:pPr><w:ind w:left="720" w:hanging="360"/></w:pPr></w:lvl></w:abstractNum>"#,
                r#"<w:num w:numId="3"><w:abstractNumId w:val="0"/></w:num>"#,
            ))
            .build(),
    )
    .unwrap();

    let restored = restore(&reference, target, &RestoreOptions::default()).unwrap();

    let doc = document_xml(&restored.package);
    assert!(doc.contains(r#"<w:pStyle w:val="ListParagraph"/>"#), "got {doc}");
    // Equal to the style but not to the list level, so still needed.
    assert_eq!(doc.matches(r#"<w:ind w:left="0"/>"#).count(), 1, "got {doc}");
    // Equal to the list level, so redundant.
    assert!(!doc.contains("w:hanging"), "got {doc}");
}

#[test]
fn formatting_parts_get_overrides_when_there_is_no_xml_default() {
    common::init();
    const STYLES_CT: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
    let reference = reference_package(&common::reference(""));
    let target = Package::from_bytes(
        &DocxBuilder::new(&paragraph(Some("s2"), "x"))
            .styles(&target_styles())
            .without_xml_default()
            .part("docProps/core.xml", b"<coreProperties/>")
            .build(),
    )
    .unwrap();

    let restored = restore(&reference, target, &RestoreOptions::default()).unwrap();

    let types = restored.package.content_types().unwrap();
    assert!(types.defaults.iter().all(|(ext, _)| ext != "xml"), "{:?}", types.defaults);
    assert_eq!(types.content_type_of("word/styles.xml"), Some(STYLES_CT));
    assert_eq!(types.content_type_of("docProps/core.xml"), None);
}
