use serde::Serialize;

/// Kind of a difference between two canonical strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Structure,
    Style,
    Content,
    Other,
}

impl std::fmt::Display for DiffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DiffKind::Structure => "structure",
            DiffKind::Style => "style",
            DiffKind::Content => "content",
            DiffKind::Other => "other",
        })
    }
}

/// Where inside a tag the scanner is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TagRegion {
    #[default]
    Name,
    AttrName,
    AttrValue,
    /// Whitespace, `=` or `/` between the other regions.
    Between,
}

/// One side of a mismatch: the character found there (None at end of
/// input) and the lexical state just before it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SideContext {
    pub ch: Option<char>,
    pub in_tag: bool,
    pub in_quote: bool,
    pub region: TagRegion,
    /// Inside the character data of a text-bearing element.
    pub in_text: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffContext {
    pub reference: SideContext,
    pub candidate: SideContext,
}

/// Elements whose character data is document text, by canonical name.
const TEXT_TAGS: &[&str] = &["w:t", "w:delText", "w:instrText", "w:delInstrText", "m:t", "a:t"];

pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x303F      // punctuation
        | 0x3040..=0x30FF    // kana
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xAC00..=0xD7AF    // hangul
        | 0xF900..=0xFAFF
        | 0xFF00..=0xFFEF    // full-width forms
        | 0x20000..=0x2FA1F)
}

/// Classify a mismatch from its context alone.
pub fn classify(ctx: &DiffContext) -> DiffKind {
    let (r, c) = (&ctx.reference, &ctx.candidate);

    let in_text = |s: &SideContext| !s.in_tag && s.in_text;
    let cjk_text = |s: &SideContext| !s.in_tag && s.ch.is_some_and(is_cjk);
    if (in_text(r) && in_text(c)) || (cjk_text(r) && cjk_text(c)) {
        return DiffKind::Content;
    }

    let opens_tag = |s: &SideContext| matches!(s.ch, None | Some('<'));
    if opens_tag(r) || opens_tag(c) || r.in_tag != c.in_tag {
        return DiffKind::Structure;
    }

    let in_attr = |s: &SideContext| {
        s.in_tag && (s.in_quote || matches!(s.region, TagRegion::AttrName | TagRegion::AttrValue))
    };
    // `<w:b>` against `<w:b w:val="0">`: an attribute starts where the other tag ends.
    let starts_attr = |s: &SideContext| {
        s.in_tag && s.region == TagRegion::Name && s.ch.is_some_and(char::is_whitespace)
    };
    if in_attr(r) || in_attr(c) || starts_attr(r) || starts_attr(c) {
        return DiffKind::Style;
    }

    if r.in_tag && c.in_tag && r.region == TagRegion::Name && c.region == TagRegion::Name {
        return DiffKind::Structure;
    }
    DiffKind::Other
}

/// Incremental lexer state over one canonical string.
#[derive(Clone, Debug, Default)]
pub(crate) struct Scanner {
    in_tag: bool,
    quote: Option<char>,
    region: TagRegion,
    in_text: bool,
    tag_name: String,
    end_tag: bool,
    prev: char,
}

impl Scanner {
    pub(crate) fn context(&self, ch: Option<char>) -> SideContext {
        SideContext {
            ch,
            in_tag: self.in_tag,
            in_quote: self.quote.is_some(),
            region: self.region,
            in_text: self.in_text,
        }
    }

    pub(crate) fn in_text(&self) -> bool {
        !self.in_tag && self.in_text
    }

    pub(crate) fn advance(&mut self, c: char) {
        if !self.in_tag {
            if c == '<' {
                self.in_tag = true;
                self.in_text = false;
                self.region = TagRegion::Name;
                self.tag_name.clear();
                self.end_tag = false;
                self.prev = c;
            }
            return;
        }
        if let Some(q) = self.quote {
            if c == q {
                self.quote = None;
                self.region = TagRegion::Between;
            }
            self.prev = c;
            return;
        }
        match c {
            '"' | '\'' => {
                self.quote = Some(c);
                self.region = TagRegion::AttrValue;
            }
            '>' => {
                let self_closing = self.prev == '/';
                self.in_tag = false;
                self.in_text =
                    !self.end_tag && !self_closing && TEXT_TAGS.contains(&self.tag_name.as_str());
                self.region = TagRegion::Between;
            }
            '=' => self.region = TagRegion::Between,
            c if c.is_whitespace() => self.region = TagRegion::Between,
            '/' if self.region == TagRegion::Name && self.tag_name.is_empty() => {
                self.end_tag = true;
            }
            '/' => {}
            _ => match self.region {
                TagRegion::Name => self.tag_name.push(c),
                TagRegion::Between => self.region = TagRegion::AttrName,
                TagRegion::AttrName | TagRegion::AttrValue => {}
            },
        }
        self.prev = c;
    }
}
