pub(crate) mod numbering;
pub(crate) mod styles;

use crate::error::Error;
use crate::model::{
    Block, Document, Drawing, Inline, NumberingRef, Paragraph, Run, RunContent, RunProperties,
    Table, TableCell, TableRow,
};
use crate::xml::Element;

pub(crate) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(crate) const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub(crate) const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const MC_NS: &str = "http://schemas.openxmlformats.org/markup-compatibility/2006";
pub(crate) const W14_NS: &str = "http://schemas.microsoft.com/office/word/2010/wordml";
pub(crate) const W15_NS: &str = "http://schemas.microsoft.com/office/word/2012/wordml";

pub(crate) fn wml<'a>(node: &'a Element, name: &str) -> Option<&'a Element> {
    node.child(WML_NS, name)
}

pub(crate) fn wml_mut<'a>(node: &'a mut Element, name: &str) -> Option<&'a mut Element> {
    node.child_mut(WML_NS, name)
}

pub(crate) fn wml_val(node: &Element) -> Option<&str> {
    node.attr(Some(WML_NS), "val")
}

pub(crate) fn wml_attr<'a>(node: &'a Element, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(wml_val)
}

pub(crate) fn is_wml(node: &Element, name: &str) -> bool {
    node.is(WML_NS, name)
}

/// Elements that only wrap runs inside a paragraph.
pub(crate) fn is_run_container(node: &Element) -> bool {
    node.ns.as_deref() == Some(WML_NS)
        && matches!(
            node.name.as_str(),
            "hyperlink"
                | "ins"
                | "del"
                | "moveTo"
                | "moveFrom"
                | "smartTag"
                | "customXml"
                | "sdt"
                | "sdtContent"
                | "fldSimple"
                | "dir"
                | "bdo"
        )
}

/// Build the typed view of a content-bearing part (document, header, footer, notes, comments).
pub fn parse_content(part: &str, root: &Element) -> Result<Document, Error> {
    let container = if is_wml(root, "document") {
        wml(root, "body").ok_or_else(|| Error::MalformedMarkup {
            part: part.to_string(),
            position: "w:document".into(),
            message: "missing w:body".into(),
        })?
    } else {
        root
    };

    let blocks = if is_wml(root, "footnotes") || is_wml(root, "endnotes") || is_wml(root, "comments")
    {
        // Notes and comments hold their blocks one level down.
        root.elements().flat_map(parse_blocks).collect()
    } else {
        parse_blocks(container)
    };
    Ok(Document { blocks })
}

/// Flatten SDT and custom XML wrappers: descend and collect effective block children.
fn parse_blocks(parent: &Element) -> Vec<Block> {
    let mut blocks = Vec::new();
    for child in parent.elements() {
        if child.ns.as_deref() != Some(WML_NS) {
            continue;
        }
        match child.name.as_str() {
            "p" => blocks.push(Block::Paragraph(parse_paragraph(child))),
            "tbl" => blocks.push(Block::Table(parse_table(child))),
            "sdt" => {
                if let Some(content) = wml(child, "sdtContent") {
                    blocks.extend(parse_blocks(content));
                }
            }
            "customXml" | "ins" | "moveTo" => blocks.extend(parse_blocks(child)),
            "bookmarkStart" | "bookmarkEnd" => {
                if let Some(marker) = parse_bookmark(child) {
                    blocks.push(Block::Marker(marker));
                }
            }
            _ => {}
        }
    }
    blocks
}

fn parse_table(node: &Element) -> Table {
    let style_id = wml(node, "tblPr")
        .and_then(|pr| wml_attr(pr, "tblStyle"))
        .map(String::from);

    fn rows_of(parent: &Element, out: &mut Vec<TableRow>) {
        for child in parent.elements() {
            if is_wml(child, "tr") {
                out.push(TableRow {
                    cells: cells_of(child),
                });
            } else if is_wml(child, "sdt") {
                if let Some(content) = wml(child, "sdtContent") {
                    rows_of(content, out);
                }
            } else if is_wml(child, "customXml") {
                rows_of(child, out);
            }
        }
    }

    fn cells_of(row: &Element) -> Vec<TableCell> {
        let mut cells = Vec::new();
        for child in row.elements() {
            if is_wml(child, "tc") {
                cells.push(TableCell {
                    blocks: parse_blocks(child),
                });
            } else if is_wml(child, "sdt") || is_wml(child, "customXml") {
                let inner = wml(child, "sdtContent").unwrap_or(child);
                cells.extend(cells_of(inner));
            }
        }
        cells
    }

    let mut rows = Vec::new();
    rows_of(node, &mut rows);
    Table { style_id, rows }
}

fn parse_paragraph(node: &Element) -> Paragraph {
    let ppr = wml(node, "pPr");
    let style_id = ppr.and_then(|p| wml_attr(p, "pStyle")).map(String::from);
    let numbering = ppr.and_then(|p| wml(p, "numPr")).and_then(|num_pr| {
        let num_id = wml_attr(num_pr, "numId")?;
        let level = wml_attr(num_pr, "ilvl")
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(0);
        Some(NumberingRef {
            num_id: num_id.to_string(),
            level,
        })
    });
    Paragraph {
        style_id,
        numbering,
        direct_properties: ppr.cloned(),
        inlines: parse_inlines(node),
    }
}

fn parse_bookmark(node: &Element) -> Option<Inline> {
    let id = node.attr(Some(WML_NS), "id")?.to_string();
    if node.name == "bookmarkStart" {
        let name = node.attr(Some(WML_NS), "name").unwrap_or_default().to_string();
        Some(Inline::BookmarkStart { id, name })
    } else {
        Some(Inline::BookmarkEnd { id })
    }
}

fn parse_inlines(parent: &Element) -> Vec<Inline> {
    let mut inlines = Vec::new();
    for child in parent.elements() {
        if child.ns.as_deref() != Some(WML_NS) {
            if child.is(MC_NS, "AlternateContent") {
                if let Some(choice) = child.elements().find(|e| e.is(MC_NS, "Choice")) {
                    inlines.extend(parse_inlines(choice));
                }
            }
            continue;
        }
        match child.name.as_str() {
            "r" => inlines.push(Inline::Run(parse_run(child))),
            "hyperlink" => inlines.push(Inline::Hyperlink {
                rel_id: child.attr(Some(REL_NS), "id").map(String::from),
                anchor: child.attr(Some(WML_NS), "anchor").map(String::from),
                inlines: parse_inlines(child),
            }),
            "bookmarkStart" | "bookmarkEnd" => inlines.extend(parse_bookmark(child)),
            "sdt" => {
                if let Some(content) = wml(child, "sdtContent") {
                    inlines.extend(parse_inlines(content));
                }
            }
            _ if is_run_container(child) => inlines.extend(parse_inlines(child)),
            _ => {}
        }
    }
    inlines
}

fn parse_run(node: &Element) -> Run {
    let rpr = wml(node, "rPr");
    let style_id = rpr.and_then(|r| wml_attr(r, "rStyle")).map(String::from);
    let mut content = Vec::new();
    collect_run_content(node, &mut content);
    Run {
        style_id,
        properties: RunProperties::new(rpr),
        content,
    }
}

fn collect_run_content(node: &Element, content: &mut Vec<RunContent>) {
    for child in node.elements() {
        if child.is(MC_NS, "AlternateContent") {
            if let Some(choice) = child.elements().find(|e| e.is(MC_NS, "Choice")) {
                collect_run_content(choice, content);
            }
            continue;
        }
        if child.ns.as_deref() != Some(WML_NS) {
            continue;
        }
        let item = match child.name.as_str() {
            "rPr" => continue,
            "t" => RunContent::Text(child.text()),
            "tab" | "ptab" => RunContent::Tab,
            "br" | "cr" => RunContent::Break,
            "fldChar" => RunContent::FieldChar,
            "drawing" => RunContent::Drawing(parse_drawing(child)),
            "pict" | "object" => RunContent::Picture(text_box_blocks(child)),
            other => RunContent::Other(other.to_string()),
        };
        content.push(item);
    }
}

fn parse_drawing(node: &Element) -> Drawing {
    let mut embeds = Vec::new();
    node.walk(&mut |e| {
        if e.is(DML_NS, "blip") {
            for attr in ["embed", "link"] {
                if let Some(id) = e.attr(Some(REL_NS), attr) {
                    embeds.push(id.to_string());
                }
            }
        }
    });
    Drawing {
        embeds,
        text_box: text_box_blocks(node),
    }
}

/// Blocks of every text box below `node`, not descending into nested text boxes twice.
fn text_box_blocks(node: &Element) -> Vec<Block> {
    let mut blocks = Vec::new();
    for child in node.elements() {
        if is_wml(child, "txbxContent") {
            blocks.extend(parse_blocks(child));
        } else if child.is(MC_NS, "AlternateContent") {
            if let Some(choice) = child.elements().find(|e| e.is(MC_NS, "Choice")) {
                blocks.extend(text_box_blocks(choice));
            }
        } else {
            blocks.extend(text_box_blocks(child));
        }
    }
    blocks
}
