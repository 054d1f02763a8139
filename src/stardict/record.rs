//! Decoding of `.dict` records and the raw-bytes full-text scan.
//!
//! A record is a concatenation of typed fields. With a `sametypesequence`
//! schema the type tags are omitted on disk and the final field's length is
//! implied by the record size; without one, every field carries a leading
//! type character.

use std::borrow::Cow;

use byteorder::{BigEndian, ByteOrder};

use super::error::{DictError, Result};

/// One decoded field of a record.
///
/// `kind` is the type character. Lowercase types (`m`, `t`, `y`, `l`, `g`,
/// `x`, `k` and any other lowercase) are text, stored without their NUL
/// terminator; uppercase types (`W`, `P` and any other uppercase) are
/// binary, stored without their length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    pub kind: u8,
    pub data: Vec<u8>,
}

impl RecordField {
    pub fn is_text(&self) -> bool {
        is_text_type(self.kind)
    }

    /// The field body as text (lossily decoded); `None` for binary fields.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        self.is_text().then(|| String::from_utf8_lossy(&self.data))
    }
}

/// A fully decoded record: the fields in on-disk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub fields: Vec<RecordField>,
}

impl Record {
    /// Iterate the text fields, lossily decoded.
    pub fn text_fields(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.fields.iter().filter_map(|f| f.text())
    }
}

pub(crate) fn is_text_type(kind: u8) -> bool {
    !kind.is_ascii_uppercase()
}

/// Decode a raw record.
///
/// With a non-empty `sametypesequence`, every field's type comes from the
/// schema and the final field's extent is whatever remains of the record.
/// Otherwise each field is read as `tag, content`, the content length
/// encoded per the tag's kind; tagged records carry explicit terminators
/// and length prefixes for every field, the final one included.
pub fn decode(raw: &[u8], sametypesequence: &str) -> Result<Record> {
    let mut fields = Vec::new();
    let schema = sametypesequence.as_bytes();

    if !schema.is_empty() {
        let mut pos = 0usize;
        for (i, &kind) in schema.iter().enumerate() {
            let last = i == schema.len() - 1;
            if last {
                fields.push(RecordField {
                    kind,
                    data: raw[pos..].to_vec(),
                });
                pos = raw.len();
            } else if is_text_type(kind) {
                let (data, next) = take_text(raw, pos)?;
                fields.push(RecordField { kind, data });
                pos = next;
            } else {
                let (data, next) = take_binary(raw, pos)?;
                fields.push(RecordField { kind, data });
                pos = next;
            }
        }
    } else {
        let mut pos = 0usize;
        while pos < raw.len() {
            let kind = raw[pos];
            pos += 1;
            if is_text_type(kind) {
                let (data, next) = take_text(raw, pos)?;
                fields.push(RecordField { kind, data });
                pos = next;
            } else {
                let (data, next) = take_binary(raw, pos)?;
                fields.push(RecordField { kind, data });
                pos = next;
            }
        }
    }

    Ok(Record { fields })
}

/// NUL-terminated text at `pos`; a missing terminator is corruption.
fn take_text(raw: &[u8], pos: usize) -> Result<(Vec<u8>, usize)> {
    match raw[pos..].iter().position(|&b| b == 0) {
        Some(nul) => Ok((raw[pos..pos + nul].to_vec(), pos + nul + 1)),
        None => Err(DictError::Malformed(
            "record text field lacks its terminator".to_string(),
        )),
    }
}

/// Length-prefixed binary content at `pos` (u32, big-endian).
fn take_binary(raw: &[u8], pos: usize) -> Result<(Vec<u8>, usize)> {
    if pos + 4 > raw.len() {
        return Err(DictError::Malformed(
            "record binary field lacks its length prefix".to_string(),
        ));
    }
    let len = BigEndian::read_u32(&raw[pos..pos + 4]) as usize;
    let start = pos + 4;
    if start + len > raw.len() {
        return Err(DictError::Malformed(format!(
            "record binary field overruns the record ({} > {})",
            start + len,
            raw.len()
        )));
    }
    Ok((raw[start..start + len].to_vec(), start + len))
}

/// Scan a raw record for full-text needles without decoding it.
///
/// Binary fields are skipped; text fields are searched byte-wise. Returns
/// true as soon as every needle has been seen in some text field of this
/// record.
pub fn matches_needles(raw: &[u8], sametypesequence: &str, needles: &[String]) -> bool {
    if needles.is_empty() {
        return false;
    }
    let mut found = vec![false; needles.len()];
    let mut nfound = 0usize;

    let mut scan = |field: &[u8]| -> bool {
        for (j, needle) in needles.iter().enumerate() {
            if !found[j] && contains_subslice(field, needle.as_bytes()) {
                found[j] = true;
                nfound += 1;
            }
        }
        nfound == needles.len()
    };

    let schema = sametypesequence.as_bytes();
    if !schema.is_empty() {
        let mut pos = 0usize;
        for (i, &kind) in schema.iter().enumerate() {
            let last = i == schema.len() - 1;
            if last {
                if is_text_type(kind) && scan(&raw[pos..]) {
                    return true;
                }
                break;
            }
            if is_text_type(kind) {
                let nul = match raw[pos..].iter().position(|&b| b == 0) {
                    Some(n) => n,
                    None => return false,
                };
                if scan(&raw[pos..pos + nul]) {
                    return true;
                }
                pos += nul + 1;
            } else {
                if pos + 4 > raw.len() {
                    return false;
                }
                pos += 4 + BigEndian::read_u32(&raw[pos..pos + 4]) as usize;
                if pos > raw.len() {
                    return false;
                }
            }
        }
    } else {
        let mut pos = 0usize;
        while pos < raw.len() {
            let kind = raw[pos];
            pos += 1;
            if is_text_type(kind) {
                let end = match raw[pos..].iter().position(|&b| b == 0) {
                    Some(n) => pos + n,
                    None => return false,
                };
                if scan(&raw[pos..end]) {
                    return true;
                }
                pos = end + 1;
            } else {
                if pos + 4 > raw.len() {
                    return false;
                }
                pos += 4 + BigEndian::read_u32(&raw[pos..pos + 4]) as usize;
                if pos > raw.len() {
                    return false;
                }
            }
        }
    }
    false
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
