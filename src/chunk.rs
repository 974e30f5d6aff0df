//! Paragraph-boundary text chunker with overlap.
//!
//! Splits document text into [`TextChunk`]s that respect a configurable
//! `max_tokens` limit. Splitting happens on paragraph boundaries (`\n\n`)
//! to keep clauses together; paragraphs longer than the limit are cut at
//! word boundaries. Each chunk after the first starts with the last
//! `overlap_tokens` worth of the previous chunk so that a requirement
//! spanning a boundary is retrievable from either side.
//!
//! All lengths are counted in characters, never bytes, so accented French
//! text can't be split inside a code point.

use serde_json::{Map, Value};

use crate::config::ChunkingConfig;
use crate::models::TextChunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Chunk `text`, copying `metadata` into every chunk and adding a local
/// `chunk_id` (0-based index).
pub fn chunk_document(
    text: &str,
    metadata: &Map<String, Value>,
    config: &ChunkingConfig,
) -> Vec<TextChunk> {
    let max_chars = config.max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = config.overlap_tokens * CHARS_PER_TOKEN;

    split_text(text, max_chars, overlap_chars)
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut meta = metadata.clone();
            meta.insert("chunk_id".to_string(), Value::from(i as i64));
            TextChunk {
                text,
                metadata: meta,
            }
        })
        .collect()
}

/// Split text into ordered pieces of at most `max_chars` characters.
///
/// Returns an empty list for blank input.
pub fn split_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let overlap_chars = overlap_chars.min(max_chars / 2);
    let mut pieces = Vec::new();
    let mut buf = String::new();
    // `buf` may hold only the overlap carried from the previous piece
    let mut has_new = false;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_len = char_len(trimmed);

        if para_len > max_chars {
            if has_new {
                pieces.push(std::mem::take(&mut buf));
            }
            let parts = hard_split(trimmed, max_chars, overlap_chars);
            buf = parts
                .last()
                .map(|p| overlap_tail(p, overlap_chars))
                .unwrap_or_default();
            pieces.extend(parts);
            has_new = false;
            continue;
        }

        let would_be = if buf.is_empty() {
            para_len
        } else {
            char_len(&buf) + 2 + para_len
        };

        if would_be > max_chars {
            if has_new {
                let tail = overlap_tail(&buf, overlap_chars);
                pieces.push(std::mem::take(&mut buf));
                buf = tail;
                has_new = false;
            }
            if !buf.is_empty() && char_len(&buf) + 2 + para_len > max_chars {
                buf.clear();
            }
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(trimmed);
        has_new = true;
    }

    if has_new {
        pieces.push(buf);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cut one long paragraph into windows of `max_chars`, backing off to the
/// last whitespace in each window.
fn hard_split(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + max_chars).min(chars.len());
        if end < chars.len() {
            if let Some(pos) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                if pos > 0 {
                    end = start + pos;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        if end >= chars.len() {
            break;
        }

        let next = end.saturating_sub(overlap_chars);
        start = if next > start { next } else { end };
        // Start the overlap on a word boundary
        while start < end && !chars[start - 1].is_whitespace() {
            start += 1;
        }
    }
    out
}

/// The last `overlap_chars` characters of `text`, starting at a word.
fn overlap_tail(text: &str, overlap_chars: usize) -> String {
    if overlap_chars == 0 {
        return String::new();
    }
    let total = char_len(text);
    if total <= overlap_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(total - overlap_chars).collect();
    match tail.find(char::is_whitespace) {
        Some(i) => tail[i..].trim_start().to_string(),
        None => tail,
    }
}
