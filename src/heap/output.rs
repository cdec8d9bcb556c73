//! Row rendering and output hygiene.
//!
//! Decoded rows leave the tool as either `INSERT` statements or
//! tab-separated CSV lines. This module owns the rendering rules
//! (identifier quoting, literal escaping, `\N` for NULL), the optional
//! GBK-to-UTF-8 transcoding of text payloads, and the advisory gibberish
//! filter the drop-scan scorer consults. The filter never drops a row; it
//! only annotates.

use serde::Serialize;

use crate::heap::constants::INVALID_CONSECUTIVE_ZERO;
use crate::heap::HeapError;

/// Emission format for decoded rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `INSERT INTO <name> VALUES(...);` statements.
    Insert,
    /// Tab-separated values, `\N` for NULL, no header.
    Csv,
}

/// Session encoding of the source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEncoding {
    Utf8,
    Gbk,
}

/// How bytea values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteaFormat {
    /// `\x` followed by lowercase hex (the database default).
    Hex,
    /// Legacy escape form with octal escapes.
    Escape,
}

/// One decoded row: column names with rendered text, `None` for NULL.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedRow {
    pub columns: Vec<(String, Option<String>)>,
    /// Some decoder degraded (bad varlena, missing TOAST value, ...).
    pub flagged: bool,
}

impl DecodedRow {
    /// Values only, dropped columns already filtered by the caller.
    pub fn values(&self) -> impl Iterator<Item = &Option<String>> {
        self.columns.iter().map(|(_, v)| v)
    }
}

/// Wrap an identifier in double quotes iff it contains an uppercase
/// character (such names were necessarily created quoted).
pub fn quoted_if_upper(ident: &str) -> String {
    if ident.chars().any(|c| c.is_ascii_uppercase()) {
        format!("\"{}\"", ident)
    } else {
        ident.to_string()
    }
}

/// Escape a string literal for an INSERT: internal single quotes doubled.
fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// True when a rendered value needs no quoting inside `VALUES(...)`.
///
/// Only plain numbers qualify; anything date-like (`2024-01-01` would
/// parse as arithmetic) or special (`NaN`) must be quoted.
fn is_bare_literal(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        && value.parse::<f64>().is_ok()
}

/// Render one row as an INSERT statement.
pub fn render_insert(table: &str, row: &DecodedRow) -> String {
    let mut vals = Vec::with_capacity(row.columns.len());
    for v in row.values() {
        match v {
            None => vals.push("NULL".to_string()),
            Some(text) => {
                if is_bare_literal(text) {
                    vals.push(text.clone());
                } else {
                    vals.push(quote_literal(text));
                }
            }
        }
    }
    format!(
        "INSERT INTO {} VALUES({});",
        quoted_if_upper(table),
        vals.join(",")
    )
}

/// Render one row as a tab-separated CSV line (no trailing newline).
pub fn render_csv(row: &DecodedRow) -> String {
    row.values()
        .map(|v| match v {
            None => "\\N".to_string(),
            Some(text) => text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\t")
}

/// Transcode a GBK byte payload to UTF-8.
///
/// An unmappable sequence reports the byte offset of the first bad byte;
/// callers re-decode lossily and flag the row.
pub fn gbk_to_utf8(raw: &[u8]) -> Result<String, HeapError> {
    let mut decoder = encoding_rs::GBK.new_decoder();
    let mut out = String::with_capacity(raw.len() * 2);
    let (result, read, had_errors) = decoder.decode_to_string(raw, &mut out, true);
    if had_errors || result != encoding_rs::CoderResult::InputEmpty {
        return Err(HeapError::EncodingError { offset: read });
    }
    Ok(out)
}

/// Lossy GBK decoding for the degraded path (bad bytes become U+FFFD).
pub fn gbk_to_utf8_lossy(raw: &[u8]) -> String {
    let (text, _, _) = encoding_rs::GBK.decode(raw);
    text.into_owned()
}

/// Code points a plausible decoded row may contain: ASCII, the CJK
/// blocks (ideographs, extensions, compatibility, punctuation, kana
/// extensions, fullwidth forms), Hangul, Thai, Latin supplements, Greek,
/// Cyrillic, Hebrew, Arabic, Devanagari, and general punctuation.
fn is_normal_char(c: u32) -> bool {
    if c <= 0x7F {
        return true;
    }

    if (0x4E00..=0x9FFF).contains(&c)
        || (0x3400..=0x4DBF).contains(&c)
        || (0x20000..=0x2A6DF).contains(&c)
        || (0x2A700..=0x2B73F).contains(&c)
        || (0x2B740..=0x2B81F).contains(&c)
        || (0x2B820..=0x2CEAF).contains(&c)
        || (0xF900..=0xFAFF).contains(&c)
        || (0xFE30..=0xFE4F).contains(&c)
        || (0x3000..=0x303F).contains(&c)
        || (0x31F0..=0x31FF).contains(&c)
        || (0xAC00..=0xD7AF).contains(&c)
        || (0x0E00..=0x0E7F).contains(&c)
        || (0xFF00..=0xFFEF).contains(&c)
    {
        return true;
    }

    if (0x0080..=0x00FF).contains(&c)
        || (0x0100..=0x017F).contains(&c)
        || (0x0180..=0x024F).contains(&c)
        || (0x0250..=0x02AF).contains(&c)
    {
        return true;
    }

    if (0x0370..=0x03FF).contains(&c)
        || (0x0400..=0x04FF).contains(&c)
        || (0x0590..=0x05FF).contains(&c)
        || (0x0600..=0x06FF).contains(&c)
        || (0x0900..=0x097F).contains(&c)
    {
        return true;
    }

    if (0x2000..=0x206F).contains(&c) || (0x2100..=0x214F).contains(&c) {
        return true;
    }

    false
}

/// Heuristic: does a rendered row look like a bogus decode?
///
/// True iff the text contains a run of 20 or more consecutive ASCII
/// zeros, or any code point outside the whitelisted ranges.
pub fn has_gibberish(text: &str) -> bool {
    let mut zero_run = 0usize;
    for c in text.chars() {
        if c == '0' {
            zero_run += 1;
            if zero_run >= INVALID_CONSECUTIVE_ZERO {
                return true;
            }
        } else {
            zero_run = 0;
        }
        if !is_normal_char(c as u32) {
            return true;
        }
    }
    false
}
