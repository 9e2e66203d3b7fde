//! Generic token-window splitting with overlap.

use super::CHARS_PER_TOKEN;

/// Split `text` into windows of at most `max_tokens`, each starting
/// `overlap_tokens` before the end of the previous one.
///
/// Window ends are pulled back to the last newline or space in the second
/// half of the window when one exists. Overlap is capped at half a window so
/// every step advances.
pub fn split_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = (overlap_tokens * CHARS_PER_TOKEN).min(max_chars / 2);

    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = advance_chars(text, start, max_chars);
        let end = if hard_end < text.len() {
            let window = &text[start..hard_end];
            let floor = advance_chars(window, 0, max_chars / 2);
            window
                .rfind('\n')
                .or_else(|| window.rfind(' '))
                .filter(|&p| p >= floor && p > 0)
                .map(|p| start + p)
                .unwrap_or(hard_end)
        } else {
            hard_end
        };

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        if end >= text.len() {
            break;
        }

        let back = retreat_chars(text, end, overlap_chars);
        let next = if back > start { back } else { end };
        // Resume at a word boundary inside the overlap when possible.
        start = text[next..end]
            .find(char::is_whitespace)
            .map(|p| snap_to_char_boundary(text, next + p + 1))
            .filter(|&s| s < end)
            .unwrap_or(next);
    }
    pieces
}

/// Byte index `n` chars after `from`, clamped to the end.
fn advance_chars(s: &str, from: usize, n: usize) -> usize {
    s[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(s.len())
}

/// Byte index `n` chars before `to`, clamped to the start.
fn retreat_chars(s: &str, to: usize, n: usize) -> usize {
    if n == 0 {
        return to;
    }
    s[..to]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
pub(crate) fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
