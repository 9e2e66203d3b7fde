//! Structure-aware splitting for source code.
//!
//! Source is cut into segments at top-level definition lines (`fn`, `def`,
//! `class`, `impl`, ...). Doc comments, attributes, and decorators directly
//! above a definition travel with it. Segments are packed whole into chunks;
//! a segment larger than the budget is split line by line. When a chunk
//! closes, its last `overlap_lines` lines are carried into the next chunk
//! if they fit.

use std::sync::OnceLock;

use regex::Regex;

use super::CHARS_PER_TOKEN;
use crate::patterns::compile;

fn definition_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(r"^(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:unsafe\s+)?(?:fn|def|class|function|func|impl|struct|enum|trait|interface|mod|module|object)\b")
    })
}

fn is_attached_prefix(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("///")
        || t.starts_with("//!")
        || t.starts_with("#[")
        || t.starts_with('@')
        || t.starts_with("/**")
        || t.starts_with("* ")
        || t.starts_with("*/")
}

fn is_definition_start(line: &str) -> bool {
    !line.starts_with(char::is_whitespace) && definition_start().is_match(line)
}

fn segments(text: &str) -> Vec<Vec<&str>> {
    let mut segs: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if is_definition_start(line) && !current.is_empty() {
            let keep = current
                .iter()
                .rev()
                .take_while(|l| is_attached_prefix(l))
                .count();
            let attached = current.split_off(current.len() - keep);
            if !current.iter().all(|l| l.trim().is_empty()) {
                segs.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            current = attached;
        }
        current.push(line);
    }
    if current.iter().any(|l| !l.trim().is_empty()) {
        segs.push(current);
    }
    segs
}

fn char_len(lines: &[&str]) -> usize {
    if lines.is_empty() {
        return 0;
    }
    lines.iter().map(|l| l.chars().count()).sum::<usize>() + lines.len() - 1
}

struct Packer<'a> {
    budget_chars: usize,
    overlap_lines: usize,
    current: Vec<&'a str>,
    chunks: Vec<String>,
}

impl<'a> Packer<'a> {
    fn fits(&self, extra: &[&str]) -> bool {
        let joined = if self.current.is_empty() {
            char_len(extra)
        } else {
            char_len(&self.current) + 1 + char_len(extra)
        };
        joined <= self.budget_chars
    }

    /// Close the current chunk and seed the next one with overlap that
    /// leaves room for `next`.
    fn close(&mut self, next: &[&'a str]) {
        if self.current.iter().all(|l| l.trim().is_empty()) {
            self.current.clear();
            return;
        }
        let text = self.current.join("\n");
        let take = self.overlap_lines.min(self.current.len().saturating_sub(1));
        let tail: Vec<&'a str> = self.current[self.current.len() - take..].to_vec();
        self.chunks.push(text.trim_end().to_string());
        self.current.clear();
        if !tail.is_empty() && char_len(&tail) + 1 + char_len(next) <= self.budget_chars {
            self.current = tail;
        }
    }

    fn push_segment(&mut self, seg: &[&'a str]) {
        if self.fits(seg) {
            self.current.extend_from_slice(seg);
            return;
        }
        if !self.current.is_empty() {
            self.close(seg);
        }
        if self.fits(seg) {
            self.current.extend_from_slice(seg);
            return;
        }
        for &line in seg {
            let one = [line];
            if !self.fits(&one) && !self.current.is_empty() {
                self.close(&one);
            }
            self.current.push(line);
        }
    }

    fn finish(mut self) -> Vec<String> {
        if self.current.iter().any(|l| !l.trim().is_empty()) {
            self.chunks.push(self.current.join("\n").trim_end().to_string());
        }
        self.chunks
    }
}

/// Split source code into definition-aligned chunks of at most
/// `budget_tokens` (single lines longer than the budget are kept whole).
pub fn split_code(text: &str, budget_tokens: usize, overlap_lines: usize) -> Vec<String> {
    let mut packer = Packer {
        budget_chars: budget_tokens.max(1) * CHARS_PER_TOKEN,
        overlap_lines,
        current: Vec::new(),
        chunks: Vec::new(),
    };
    for seg in segments(text) {
        packer.push_segment(&seg);
    }
    packer.finish()
}
