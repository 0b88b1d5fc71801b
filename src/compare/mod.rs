//! Structural comparison of canonical markup.
//!
//! Similarity comes from sequence matching over the characters of both
//! canonical strings. Individual differences come from a synchronized walk
//! that skips over differing document text and reports formatting differences
//! once per mismatching span.

mod classify;
mod matcher;

pub use classify::{DiffContext, DiffKind, SideContext, TagRegion, classify, is_cjk};

use serde::Serialize;

use crate::error::Error;
use crate::normalize;
use crate::package::Package;
use classify::Scanner;
use matcher::SequenceMatcher;

/// Look-ahead used to realign both sides after a formatting difference.
const RESYNC_WINDOW: usize = 512;
/// Shorter common blocks inside a mismatching span are coincidence, not realignment.
const RESYNC_MIN_BLOCK: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareMode {
    /// Styles, numbering, font table, theme and settings.
    #[default]
    FormattingOnly,
    /// Formatting parts plus the main document part.
    Full,
}

#[derive(Clone, Debug)]
pub struct CompareOptions {
    pub mode: CompareMode,
    /// Upper bound on recorded diffs; counting continues past it.
    pub max_diffs: usize,
    /// Compare only this part, given by full name or file name (`styles.xml`).
    pub part: Option<String>,
    /// Characters of context kept on each side of a diff.
    pub context: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            mode: CompareMode::default(),
            max_diffs: 100,
            part: None,
            context: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    pub part: String,
    /// Character offset in the reference string.
    pub offset: usize,
    /// Byte offsets in the reference and candidate strings.
    pub reference_offset: usize,
    pub candidate_offset: usize,
    #[serde(rename = "type")]
    pub kind: DiffKind,
    pub reference_char: Option<char>,
    pub candidate_char: Option<char>,
    pub context_before: String,
    pub context_after: String,
    pub candidate_context_before: String,
    pub candidate_context_after: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartComparison {
    pub part: String,
    pub similarity: f64,
    pub reference_length: usize,
    pub candidate_length: usize,
    pub total_format_diffs: usize,
    pub skipped_content_diffs: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// 0 to 100.
    pub similarity: f64,
    pub diffs: Vec<Diff>,
    pub total_format_diffs: usize,
    pub skipped_content_diffs: usize,
    pub parts: Vec<PartComparison>,
}

impl ComparisonResult {
    pub fn is_identical(&self) -> bool {
        self.total_format_diffs == 0 && self.skipped_content_diffs == 0 && self.similarity >= 100.0
    }
}

/// One side of the walk: the string, its characters with byte offsets, and
/// the lexer state at the cursor.
struct Side<'s> {
    text: &'s str,
    chars: Vec<(usize, char)>,
    pos: usize,
    scanner: Scanner,
}

impl<'s> Side<'s> {
    fn new(text: &'s str) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            pos: 0,
            scanner: Scanner::default(),
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn byte_offset(&self) -> usize {
        self.chars.get(self.pos).map_or(self.text.len(), |&(b, _)| b)
    }

    fn step(&mut self) {
        if let Some(c) = self.current() {
            self.scanner.advance(c);
            self.pos += 1;
        }
    }

    fn skip_to_tag(&mut self) {
        while let Some(c) = self.current() {
            if c == '<' {
                break;
            }
            self.step();
        }
    }

    fn window(&self, len: usize) -> Vec<char> {
        self.chars[self.pos..]
            .iter()
            .take(len)
            .map(|&(_, c)| c)
            .collect()
    }

    fn context_before(&self, len: usize) -> String {
        let start = self.pos.saturating_sub(len);
        let from = self.chars.get(start).map_or(self.text.len(), |&(b, _)| b);
        self.text[from..self.byte_offset()].to_string()
    }

    fn context_after(&self, len: usize) -> String {
        let end = (self.pos + len).min(self.chars.len());
        let to = self.chars.get(end).map_or(self.text.len(), |&(b, _)| b);
        self.text[self.byte_offset()..to].to_string()
    }
}

struct Walk<'o> {
    part: &'o str,
    options: &'o CompareOptions,
    diffs: Vec<Diff>,
    total_format_diffs: usize,
    skipped_content_diffs: usize,
}

impl Walk<'_> {
    fn record(&mut self, kind: DiffKind, a: &Side, b: &Side) {
        self.total_format_diffs += 1;
        if self.diffs.len() >= self.options.max_diffs {
            return;
        }
        let ctx = self.options.context;
        self.diffs.push(Diff {
            part: self.part.to_string(),
            offset: a.pos,
            reference_offset: a.byte_offset(),
            candidate_offset: b.byte_offset(),
            kind,
            reference_char: a.current(),
            candidate_char: b.current(),
            context_before: a.context_before(ctx),
            context_after: a.context_after(ctx),
            candidate_context_before: b.context_before(ctx),
            candidate_context_after: b.context_after(ctx),
        });
    }
}

/// Advance both sides to where they agree again: the start of the first
/// common block of at least [`RESYNC_MIN_BLOCK`] characters within the next
/// few hundred, so later mismatches in the window are still walked. Falls
/// back to the longest block, or past the window when there is none.
fn resync(a: &mut Side, b: &mut Side) {
    let wa = a.window(RESYNC_WINDOW);
    let wb = b.window(RESYNC_WINDOW);
    let matcher = SequenceMatcher::without_autojunk(&wa, &wb);
    let m = matcher
        .matching_blocks()
        .into_iter()
        .find(|m| m.size >= RESYNC_MIN_BLOCK)
        .unwrap_or_else(|| matcher.longest());
    let (skip_a, skip_b) = if m.size == 0 {
        (wa.len(), wb.len())
    } else {
        (m.a, m.b)
    };
    // Always make progress on at least one side.
    let (skip_a, skip_b) = if skip_a == 0 && skip_b == 0 {
        (1, 1)
    } else {
        (skip_a, skip_b)
    };
    for _ in 0..skip_a {
        a.step();
    }
    for _ in 0..skip_b {
        b.step();
    }
}

/// Compare two canonical strings belonging to `part`.
pub fn compare_strings(
    part: &str,
    reference: &str,
    candidate: &str,
    options: &CompareOptions,
) -> ComparisonResult {
    let similarity = if reference == candidate {
        1.0
    } else {
        let a: Vec<char> = reference.chars().collect();
        let b: Vec<char> = candidate.chars().collect();
        SequenceMatcher::similarity(&a, &b)
    };

    let mut walk = Walk {
        part,
        options,
        diffs: Vec::new(),
        total_format_diffs: 0,
        skipped_content_diffs: 0,
    };
    let mut a = Side::new(reference);
    let mut b = Side::new(candidate);

    if reference != candidate {
        while !a.at_end() && !b.at_end() {
            if a.current() == b.current() {
                a.step();
                b.step();
                continue;
            }
            let ctx = DiffContext {
                reference: a.scanner.context(a.current()),
                candidate: b.scanner.context(b.current()),
            };
            match classify(&ctx) {
                DiffKind::Content => {
                    walk.skipped_content_diffs += 1;
                    a.skip_to_tag();
                    b.skip_to_tag();
                }
                kind => {
                    walk.record(kind, &a, &b);
                    resync(&mut a, &mut b);
                }
            }
        }
        if !a.at_end() || !b.at_end() {
            if a.scanner.in_text() && b.scanner.in_text() {
                walk.skipped_content_diffs += 1;
            } else {
                walk.record(DiffKind::Structure, &a, &b);
            }
        }
    }

    let similarity = similarity * 100.0;
    ComparisonResult {
        similarity,
        parts: vec![PartComparison {
            part: part.to_string(),
            similarity,
            reference_length: reference.chars().count(),
            candidate_length: candidate.chars().count(),
            total_format_diffs: walk.total_format_diffs,
            skipped_content_diffs: walk.skipped_content_diffs,
        }],
        diffs: walk.diffs,
        total_format_diffs: walk.total_format_diffs,
        skipped_content_diffs: walk.skipped_content_diffs,
    }
}

/// Relationship kinds of the formatting parts, in report order.
const FORMATTING_KINDS: &[&str] = &["styles", "numbering", "fontTable", "settings", "theme"];

fn part_for(pkg: &Package, kind: &str) -> Result<Option<String>, Error> {
    if kind == "officeDocument" {
        return Ok(Some(pkg.main_document().to_string()));
    }
    pkg.related_part(pkg.main_document(), kind)
}

fn file_name(part: &str) -> &str {
    part.rsplit('/').next().unwrap_or(part)
}

fn canonical(pkg: &Package, part: Option<&str>) -> Result<String, Error> {
    match part.and_then(|p| pkg.part(p).map(|bytes| (p, bytes))) {
        Some((name, bytes)) => normalize::normalize_part(name, bytes),
        None => Ok(String::new()),
    }
}

/// Compare two packages part by part.
pub fn compare_packages(
    reference: &Package,
    candidate: &Package,
    options: &CompareOptions,
) -> Result<ComparisonResult, Error> {
    let mut kinds: Vec<&str> = FORMATTING_KINDS.to_vec();
    if options.mode == CompareMode::Full {
        kinds.insert(0, "officeDocument");
    }

    let mut pairs: Vec<(String, Option<String>, Option<String>)> = Vec::new();
    for kind in kinds {
        let a = part_for(reference, kind)?;
        let b = part_for(candidate, kind)?;
        let label = match (&a, &b) {
            (Some(p), _) | (None, Some(p)) => p.clone(),
            (None, None) => continue,
        };
        pairs.push((label, a, b));
    }
    if let Some(wanted) = &options.part {
        pairs.retain(|(label, a, b)| {
            [Some(label), a.as_ref(), b.as_ref()]
                .into_iter()
                .flatten()
                .any(|p| p == wanted || file_name(p) == wanted)
        });
        if pairs.is_empty() {
            // Not a known formatting part; compare it by name on both sides.
            if reference.has_part(wanted) || candidate.has_part(wanted) {
                pairs.push((wanted.clone(), Some(wanted.clone()), Some(wanted.clone())));
            } else {
                return Err(Error::MissingPart(wanted.clone()));
            }
        }
    }

    let mut result = ComparisonResult {
        similarity: 100.0,
        diffs: Vec::new(),
        total_format_diffs: 0,
        skipped_content_diffs: 0,
        parts: Vec::new(),
    };
    let mut weighted = 0.0;
    let mut weight = 0usize;
    for (label, a, b) in pairs {
        let left = canonical(reference, a.as_deref())?;
        let right = canonical(candidate, b.as_deref())?;
        let remaining = CompareOptions {
            max_diffs: options.max_diffs.saturating_sub(result.diffs.len()),
            ..options.clone()
        };
        let part = compare_strings(&label, &left, &right, &remaining);
        log::debug!(
            "{label}: similarity {:.2}%, {} format diffs, {} content diffs skipped",
            part.similarity,
            part.total_format_diffs,
            part.skipped_content_diffs
        );

        let len = left.chars().count() + right.chars().count();
        weighted += part.similarity * len as f64;
        weight += len;
        result.total_format_diffs += part.total_format_diffs;
        result.skipped_content_diffs += part.skipped_content_diffs;
        result.diffs.extend(part.diffs);
        result.parts.extend(part.parts);
    }
    if weight > 0 {
        result.similarity = weighted / weight as f64;
    }
    Ok(result)
}
