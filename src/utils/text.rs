//! Text processing helpers: sentence chunking, chunk identifiers, HTML cleanup
//! and channel link parsing.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

static CHANNEL_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://)?t\.me/(?:s/)?([a-zA-Z0-9_]+)").expect("valid channel link regex")
});

static CHANNEL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@([a-zA-Z0-9_]{4,})$").expect("valid mention regex"));

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid br regex"));

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

static HTML_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid entity regex")
});

/// Split text into sentences at whitespace that follows `.`, `!` or `?`.
///
/// The separating whitespace is dropped; empty sentences are skipped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = idx + c.len_utf8();
        let mut next_start = end;
        while let Some(&(ws_idx, ws)) = chars.peek() {
            if !ws.is_whitespace() {
                break;
            }
            next_start = ws_idx + ws.len_utf8();
            chars.next();
        }
        if next_start > end {
            let sentence = &text[start..end];
            if !sentence.trim().is_empty() {
                sentences.push(sentence);
            }
            start = next_start;
        }
    }

    let tail = &text[start..];
    if !tail.trim().is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Greedily pack sentences into chunks of at most `max_chunk_size` characters.
///
/// The limit applies to the summed sentence lengths; a sentence that is longer
/// than the limit on its own becomes a single chunk.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if current_len + len <= max_chunk_size || current.is_empty() {
            current.push(sentence);
            current_len += len;
        } else {
            chunks.push(current.join(" "));
            current = vec![sentence];
            current_len = len;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Stable identifier of a chunk: lowercase hex SHA-256 of its text
pub fn chunk_id(chunk: &str) -> String {
    hex::encode(Sha256::digest(chunk.as_bytes()))
}

/// Convert an HTML fragment to plain text
pub fn html_to_text(html: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(html, "\n");
    let stripped = HTML_TAG.replace_all(&with_breaks, "");
    decode_entities(&stripped).trim().to_string()
}

/// Decode named and numeric HTML entities. Unknown names are left as is.
pub fn decode_entities(text: &str) -> String {
    HTML_ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            decoded
                .map(|c| c.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Extract the public channel username from a `t.me` link or an `@mention`
pub fn parse_channel_link(input: &str) -> Option<String> {
    let input = input.trim();
    if let Some(caps) = CHANNEL_MENTION.captures(input) {
        return Some(caps[1].to_string());
    }
    CHANNEL_LINK
        .captures(input)
        .map(|caps| caps[1].to_string())
}
