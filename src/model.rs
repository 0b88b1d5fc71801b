use serde::Serialize;

use crate::xml::Element;

/// Visual formatting of a run. Compared as a value: attribute order and
/// namespace prefixes do not matter, and an empty `rPr` equals no `rPr`.
#[derive(Clone, Debug, Default)]
pub struct RunProperties(Option<Element>);

impl RunProperties {
    pub fn new(rpr: Option<&Element>) -> Self {
        Self(rpr.filter(|e| e.has_element_children() || !e.attributes.is_empty()).cloned())
    }

    pub fn element(&self) -> Option<&Element> {
        self.0.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl PartialEq for RunProperties {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_structure(b),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NumberingRef {
    pub num_id: String,
    pub level: u8,
}

#[derive(Clone, Debug)]
pub enum RunContent {
    Text(String),
    Tab,
    Break,
    FieldChar,
    Drawing(Drawing),
    /// VML picture; may host a text box.
    Picture(Vec<Block>),
    Other(String),
}

#[derive(Clone, Debug, Default)]
pub struct Drawing {
    /// Relationship ids of embedded or linked images.
    pub embeds: Vec<String>,
    /// Paragraphs of text boxes anchored in the drawing.
    pub text_box: Vec<Block>,
}

#[derive(Clone, Debug)]
pub struct Run {
    pub style_id: Option<String>,
    pub properties: RunProperties,
    pub content: Vec<RunContent>,
}

#[derive(Clone, Debug)]
pub enum Inline {
    Run(Run),
    Hyperlink {
        rel_id: Option<String>,
        anchor: Option<String>,
        inlines: Vec<Inline>,
    },
    BookmarkStart {
        id: String,
        name: String,
    },
    BookmarkEnd {
        id: String,
    },
}

#[derive(Clone, Debug)]
pub struct Paragraph {
    pub style_id: Option<String>,
    pub numbering: Option<NumberingRef>,
    pub direct_properties: Option<Element>,
    pub inlines: Vec<Inline>,
}

#[derive(Clone, Debug)]
pub struct TableCell {
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Clone, Debug)]
pub struct Table {
    pub style_id: Option<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Clone, Debug)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    /// Range markers between blocks (bookmarks spanning paragraphs).
    Marker(Inline),
}

/// Typed view of a content-bearing part.
#[derive(Clone, Debug, Default)]
pub struct Document {
    pub blocks: Vec<Block>,
}

/// Content cardinalities of a part; restoration must leave these unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ContentSummary {
    pub text: String,
    pub paragraphs: usize,
    pub tables: usize,
    pub images: usize,
    pub bookmarks: usize,
    pub hyperlinks: usize,
}

impl ContentSummary {
    /// Fold the summary of another part into this one.
    pub fn absorb(&mut self, other: ContentSummary) {
        self.text.push_str(&other.text);
        self.paragraphs += other.paragraphs;
        self.tables += other.tables;
        self.images += other.images;
        self.bookmarks += other.bookmarks;
        self.hyperlinks += other.hyperlinks;
    }

    /// Names of the fields that differ from `other`, e.g. `["text", "tables"]`.
    pub fn differences(&self, other: &ContentSummary) -> Vec<&'static str> {
        [
            ("text", self.text != other.text),
            ("paragraphs", self.paragraphs != other.paragraphs),
            ("tables", self.tables != other.tables),
            ("images", self.images != other.images),
            ("bookmarks", self.bookmarks != other.bookmarks),
            ("hyperlinks", self.hyperlinks != other.hyperlinks),
        ]
        .into_iter()
        .filter_map(|(name, differs)| differs.then_some(name))
        .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleKind {
    Paragraph,
    Character,
    Table,
    Numbering,
}

impl StyleKind {
    pub fn from_attr(val: &str) -> Option<Self> {
        match val {
            "paragraph" => Some(StyleKind::Paragraph),
            "character" => Some(StyleKind::Character),
            "table" => Some(StyleKind::Table),
            "numbering" => Some(StyleKind::Numbering),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StyleKind::Paragraph => "paragraph",
            StyleKind::Character => "character",
            StyleKind::Table => "table",
            StyleKind::Numbering => "numbering",
        }
    }
}

impl Document {
    pub fn summary(&self) -> ContentSummary {
        let mut summary = ContentSummary::default();
        summarize_blocks(&self.blocks, &mut summary);
        summary
    }

    /// Every (kind, style id) referenced from the content, in document order, deduplicated.
    pub fn style_references(&self) -> Vec<(StyleKind, String)> {
        let mut refs = Vec::new();
        collect_style_refs(&self.blocks, &mut refs);
        refs
    }

    pub fn numbering_references(&self) -> Vec<String> {
        let mut ids = Vec::new();
        visit_paragraphs(&self.blocks, &mut |p| {
            if let Some(n) = &p.numbering
                && !ids.contains(&n.num_id)
            {
                ids.push(n.num_id.clone());
            }
        });
        ids
    }
}

fn summarize_blocks(blocks: &[Block], s: &mut ContentSummary) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => {
                s.paragraphs += 1;
                summarize_inlines(&p.inlines, s);
            }
            Block::Table(t) => {
                s.tables += 1;
                for cell in t.rows.iter().flat_map(|r| r.cells.iter()) {
                    summarize_blocks(&cell.blocks, s);
                }
            }
            Block::Marker(m) => summarize_inlines(std::slice::from_ref(m), s),
        }
    }
}

fn summarize_inlines(inlines: &[Inline], s: &mut ContentSummary) {
    for inline in inlines {
        match inline {
            Inline::Run(run) => {
                for c in &run.content {
                    match c {
                        RunContent::Text(t) => s.text.push_str(t),
                        RunContent::Drawing(d) => {
                            s.images += 1;
                            summarize_blocks(&d.text_box, s);
                        }
                        RunContent::Picture(blocks) => summarize_blocks(blocks, s),
                        _ => {}
                    }
                }
            }
            Inline::Hyperlink { inlines, .. } => {
                s.hyperlinks += 1;
                summarize_inlines(inlines, s);
            }
            Inline::BookmarkStart { .. } | Inline::BookmarkEnd { .. } => s.bookmarks += 1,
        }
    }
}

fn push_ref(refs: &mut Vec<(StyleKind, String)>, kind: StyleKind, id: &Option<String>) {
    if let Some(id) = id
        && !refs.iter().any(|(k, i)| *k == kind && i == id)
    {
        refs.push((kind, id.clone()));
    }
}

fn collect_style_refs(blocks: &[Block], refs: &mut Vec<(StyleKind, String)>) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => {
                push_ref(refs, StyleKind::Paragraph, &p.style_id);
                collect_inline_refs(&p.inlines, refs);
            }
            Block::Table(t) => {
                push_ref(refs, StyleKind::Table, &t.style_id);
                for cell in t.rows.iter().flat_map(|r| r.cells.iter()) {
                    collect_style_refs(&cell.blocks, refs);
                }
            }
            Block::Marker(_) => {}
        }
    }
}

fn collect_inline_refs(inlines: &[Inline], refs: &mut Vec<(StyleKind, String)>) {
    for inline in inlines {
        match inline {
            Inline::Run(run) => {
                push_ref(refs, StyleKind::Character, &run.style_id);
                for c in &run.content {
                    match c {
                        RunContent::Drawing(d) => collect_style_refs(&d.text_box, refs),
                        RunContent::Picture(blocks) => collect_style_refs(blocks, refs),
                        _ => {}
                    }
                }
            }
            Inline::Hyperlink { inlines, .. } => collect_inline_refs(inlines, refs),
            _ => {}
        }
    }
}

fn visit_paragraphs(blocks: &[Block], f: &mut impl FnMut(&Paragraph)) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => {
                f(p);
                for inline in &p.inlines {
                    visit_inline_paragraphs(inline, f);
                }
            }
            Block::Table(t) => {
                for cell in t.rows.iter().flat_map(|r| r.cells.iter()) {
                    visit_paragraphs(&cell.blocks, f);
                }
            }
            Block::Marker(_) => {}
        }
    }
}

fn visit_inline_paragraphs(inline: &Inline, f: &mut impl FnMut(&Paragraph)) {
    match inline {
        Inline::Run(run) => {
            for c in &run.content {
                match c {
                    RunContent::Drawing(d) => visit_paragraphs(&d.text_box, f),
                    RunContent::Picture(blocks) => visit_paragraphs(blocks, f),
                    _ => {}
                }
            }
        }
        Inline::Hyperlink { inlines, .. } => {
            for i in inlines {
                visit_inline_paragraphs(i, f);
            }
        }
        _ => {}
    }
}
