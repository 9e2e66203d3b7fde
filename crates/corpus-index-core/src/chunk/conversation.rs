//! Message-aware splitting for chat transcripts.
//!
//! A message starts at a line beginning with a timestamp marker or after a
//! blank line. Messages are packed in order; a chunk closes when the next
//! message would exceed the budget or when the time gap between adjacent
//! timestamped messages is larger than the burst gap.
//!
//! Recognized markers: `[2024-01-15 10:02]`, `[2024-01-15 10:02:33]`,
//! `2024-01-15T10:02:33Z`, and time-only `[10:02]`. Time-only markers are
//! placed on the date of the previous marker, rolling over at midnight.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use super::{estimate_tokens, CHARS_PER_TOKEN};
use super::text::split_text;
use crate::patterns::compile;

#[derive(Debug, Clone)]
struct Message {
    text: String,
    at: Option<NaiveDateTime>,
}

fn datetime_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(r"^\s*\[?(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)\]?")
    })
}

fn time_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compile(r"^\s*\[(\d{1,2}:\d{2}(?::\d{2})?)\]"))
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let normalized = raw.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(dt);
        }
    }
    None
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

enum Marker {
    Full(NaiveDateTime),
    TimeOnly(NaiveTime),
}

fn leading_marker(line: &str) -> Option<Marker> {
    if let Some(c) = datetime_marker().captures(line) {
        return parse_datetime(&c[1]).map(Marker::Full);
    }
    let c = time_marker().captures(line)?;
    parse_time(&c[1]).map(Marker::TimeOnly)
}

fn parse_messages(text: &str) -> Vec<Message> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let mut messages: Vec<Message> = Vec::new();
    let mut current: Option<Message> = None;
    let mut last_at: Option<NaiveDateTime> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            if let Some(m) = current.take() {
                messages.push(m);
            }
            continue;
        }

        let at = leading_marker(line).map(|marker| match marker {
            Marker::Full(dt) => dt,
            Marker::TimeOnly(t) => {
                let day = last_at.map(|l| l.date()).unwrap_or(epoch);
                let mut candidate = day.and_time(t);
                if let Some(prev) = last_at {
                    if candidate < prev {
                        candidate += Duration::days(1);
                    }
                }
                candidate
            }
        });

        match (&mut current, at) {
            (Some(m), None) => {
                m.text.push('\n');
                m.text.push_str(line);
            }
            (slot, at) => {
                if let Some(m) = slot.take() {
                    messages.push(m);
                }
                if at.is_some() {
                    last_at = at;
                }
                *slot = Some(Message {
                    text: line.to_string(),
                    at,
                });
            }
        }
    }
    if let Some(m) = current {
        messages.push(m);
    }
    messages
}

/// Split a transcript into message-aligned chunks.
pub fn split_conversation(
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
    gap_minutes: i64,
) -> Vec<String> {
    let gap = Duration::minutes(gap_minutes.max(0));
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous_at: Option<NaiveDateTime> = None;

    for message in parse_messages(text) {
        let burst_break = matches!(
            (previous_at, message.at),
            (Some(prev), Some(now)) if now - prev > gap
        );
        if message.at.is_some() {
            previous_at = message.at;
        }

        let joined_len = current.chars().count() + 1 + message.text.chars().count();
        let over_budget = !current.is_empty() && joined_len.div_ceil(CHARS_PER_TOKEN) > max_tokens;
        if burst_break || over_budget {
            flush(&mut current, &mut chunks);
        }

        if estimate_tokens(&message.text) > max_tokens {
            flush(&mut current, &mut chunks);
            chunks.extend(split_text(&message.text, max_tokens, overlap_tokens));
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&message.text);
    }
    flush(&mut current, &mut chunks);
    chunks
}

fn flush(current: &mut String, chunks: &mut Vec<String>) {
    if !current.trim().is_empty() {
        chunks.push(std::mem::take(current));
    }
    current.clear();
}
