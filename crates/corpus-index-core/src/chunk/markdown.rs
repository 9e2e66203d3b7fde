//! Header-aware splitting for documentation.

use super::text::split_text;
use super::estimate_tokens;

fn is_header(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes)
        && line[hashes..]
            .chars()
            .next()
            .is_some_and(|c| c == ' ' || c == '\t')
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Split on ATX headers outside fenced code; oversized sections fall back
/// to [`split_text`].
pub fn split_markdown(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_fence = false;

    for line in text.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
        } else if !in_fence && is_header(line) && !current.trim().is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current);
    }

    let mut out = Vec::new();
    for section in sections {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }
        if estimate_tokens(section) <= max_tokens {
            out.push(section.to_string());
        } else {
            out.extend(split_text(section, max_tokens, overlap_tokens));
        }
    }
    out
}
