//! Longest-matching-block sequence matching over characters.
//!
//! Matching blocks are found by repeatedly taking the longest common block of
//! a window and recursing on both sides of it. Characters that occur in more
//! than 1% of a long candidate are ignored as match seeds, which keeps markup
//! punctuation (`<`, `"`, `:`) from dominating the search.

use std::collections::HashMap;

/// Candidates shorter than this keep every character as a seed.
const AUTOJUNK_MIN_LEN: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Block {
    pub(crate) a: usize,
    pub(crate) b: usize,
    pub(crate) size: usize,
}

pub(crate) struct SequenceMatcher<'s> {
    a: &'s [char],
    b: &'s [char],
    b2j: HashMap<char, Vec<usize>>,
}

impl<'s> SequenceMatcher<'s> {
    pub(crate) fn new(a: &'s [char], b: &'s [char]) -> Self {
        Self::build(a, b, true)
    }

    /// Every character is a seed regardless of length. Meant for short windows.
    pub(crate) fn without_autojunk(a: &'s [char], b: &'s [char]) -> Self {
        Self::build(a, b, false)
    }

    fn build(a: &'s [char], b: &'s [char], autojunk: bool) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in b.iter().enumerate() {
            b2j.entry(c).or_default().push(j);
        }
        if autojunk && b.len() >= AUTOJUNK_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= limit);
        }
        Self { a, b, b2j }
    }

    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let (a, b) = (self.a, self.b);
        let mut best = Block {
            a: alo,
            b: blo,
            size: 0,
        };
        // prev[j - blo + 1] = length of the match ending at a[i-1], b[j]. Only
        // touched slots are reset, so a row costs as much as its seeds.
        let width = bhi.saturating_sub(blo) + 1;
        let mut prev = vec![0usize; width];
        let mut cur = vec![0usize; width];
        let mut prev_touched: Vec<usize> = Vec::new();
        let mut cur_touched: Vec<usize> = Vec::new();
        for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
            if let Some(positions) = self.b2j.get(c) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let slot = j - blo + 1;
                    let k = prev[slot - 1] + 1;
                    cur[slot] = k;
                    cur_touched.push(slot);
                    if k > best.size {
                        best = Block {
                            a: i + 1 - k,
                            b: j + 1 - k,
                            size: k,
                        };
                    }
                }
            }
            for &slot in &prev_touched {
                prev[slot] = 0;
            }
            prev_touched.clear();
            std::mem::swap(&mut prev, &mut cur);
            std::mem::swap(&mut prev_touched, &mut cur_touched);
        }

        // Seeds skipped popular characters; grow the block over them.
        while best.a > alo && best.b > blo && a[best.a - 1] == b[best.b - 1] {
            best.a -= 1;
            best.b -= 1;
            best.size += 1;
        }
        while best.a + best.size < ahi
            && best.b + best.size < bhi
            && a[best.a + best.size] == b[best.b + best.size]
        {
            best.size += 1;
        }
        best
    }

    /// Longest common block of the whole sequences.
    pub(crate) fn longest(&self) -> Block {
        self.longest_match(0, self.a.len(), 0, self.b.len())
    }

    /// Non-overlapping matching blocks in increasing order, adjacent blocks
    /// merged, terminated by a zero-size block at `(len(a), len(b))`.
    pub(crate) fn matching_blocks(&self) -> Vec<Block> {
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        let mut found = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.longest_match(alo, ahi, blo, bhi);
            if m.size == 0 {
                continue;
            }
            if alo < m.a && blo < m.b {
                queue.push((alo, m.a, blo, m.b));
            }
            if m.a + m.size < ahi && m.b + m.size < bhi {
                queue.push((m.a + m.size, ahi, m.b + m.size, bhi));
            }
            found.push(m);
        }
        found.sort_by_key(|m| (m.a, m.b));

        let mut merged: Vec<Block> = Vec::with_capacity(found.len() + 1);
        for m in found {
            match merged.last_mut() {
                Some(last) if last.a + last.size == m.a && last.b + last.size == m.b => {
                    last.size += m.size;
                }
                _ => merged.push(m),
            }
        }
        merged.push(Block {
            a: self.a.len(),
            b: self.b.len(),
            size: 0,
        });
        merged
    }

    /// Similarity ratio of `a` and `b`. The shared prefix and suffix are
    /// counted as matched up front, so only the differing middle is searched.
    pub(crate) fn similarity(a: &[char], b: &[char]) -> f64 {
        let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
        let (ra, rb) = (&a[prefix..], &b[prefix..]);
        let suffix = ra
            .iter()
            .rev()
            .zip(rb.iter().rev())
            .take_while(|(x, y)| x == y)
            .count();
        let (ma, mb) = (&ra[..ra.len() - suffix], &rb[..rb.len() - suffix]);
        let matched = if ma.is_empty() || mb.is_empty() {
            0
        } else {
            SequenceMatcher::new(ma, mb)
                .matching_blocks()
                .iter()
                .map(|m| m.size)
                .sum()
        };
        let total = a.len() + b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * (prefix + suffix + matched) as f64 / total as f64
    }
}
