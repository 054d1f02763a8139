//! `.ifo` metadata parsing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;

use super::error::{DictError, Result};

const DICT_MAGIC: &[u8] = b"StarDict's dict ifo file";
const TREEDICT_MAGIC: &[u8] = b"StarDict's treedict ifo file";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Metadata parsed from a dictionary's `.ifo` file.
///
/// File structure:
/// - optional UTF-8 BOM
/// - magic line (`StarDict's dict ifo file`, or the treedict variant)
/// - `key=value` pairs, one per line (CR, LF or CRLF)
///
/// Values keep their trailing whitespace verbatim. Required keys are
/// `wordcount`, `bookname` and `idxfilesize` (`tdxfilesize` for treedicts);
/// a missing one fails the parse.
#[derive(Debug, Default, Clone)]
pub struct DictInfo {
    pub ifo_file_name: PathBuf,
    pub wordcount: usize,
    pub syn_wordcount: usize,
    pub index_file_size: u64,
    pub bookname: String,
    pub author: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    /// Per-record field schema; empty means records are self-describing.
    pub sametypesequence: String,
}

impl DictInfo {
    /// Parse the `.ifo` file at `path`. `treedict` selects the treedict
    /// magic string and the `tdxfilesize` size key.
    pub fn load_from_ifo_file(path: impl AsRef<Path>, treedict: bool) -> Result<Self> {
        let path = path.as_ref();
        let buf = std::fs::read(path)?;
        let file = path.display().to_string();

        let magic = if treedict { TREEDICT_MAGIC } else { DICT_MAGIC };
        let mut body: &[u8] = &buf;
        if body.starts_with(UTF8_BOM) {
            body = &body[UTF8_BOM.len()..];
        }
        if !body.starts_with(magic) {
            return Err(DictError::Malformed(format!(
                "no magic header ({}) in ifo file {}",
                String::from_utf8_lossy(magic),
                file
            )));
        }
        body = &body[magic.len()..];

        let pairs = parse_body(body, &file)?;

        let mut info = DictInfo {
            ifo_file_name: path.to_path_buf(),
            ..DictInfo::default()
        };

        info.wordcount = atoul(required(&pairs, "wordcount", &file)?) as usize;
        info.index_file_size = if treedict {
            atoul(required(&pairs, "tdxfilesize", &file)?)
        } else {
            atoul(required(&pairs, "idxfilesize", &file)?)
        };
        info.bookname = required(&pairs, "bookname", &file)?.clone();

        info.author = pairs.get(b"author".as_slice()).cloned();
        info.email = pairs.get(b"email".as_slice()).cloned();
        info.website = pairs.get(b"website".as_slice()).cloned();
        info.date = pairs.get(b"date".as_slice()).cloned();
        info.description = pairs.get(b"description".as_slice()).cloned();
        if let Some(sts) = pairs.get(b"sametypesequence".as_slice()) {
            info.sametypesequence = sts.clone();
        }
        if let Some(swc) = pairs.get(b"synwordcount".as_slice()) {
            info.syn_wordcount = atoul(swc) as usize;
        }

        debug!(
            "ifo parsed: bookname={:?}, wordcount={}, sametypesequence={:?}",
            info.bookname, info.wordcount, info.sametypesequence
        );
        Ok(info)
    }
}

fn required<'a>(
    pairs: &'a HashMap<Vec<u8>, String>,
    key: &'static str,
    file: &str,
) -> Result<&'a String> {
    pairs.get(key.as_bytes()).ok_or_else(|| DictError::MissingKey {
        key,
        file: file.to_string(),
    })
}

/// Scan `key=value` lines: skip whitespace, take the key up to `=`, then the
/// value up to the line end. A non-blank run with no `=` is a parse error.
fn parse_body(body: &[u8], file: &str) -> Result<HashMap<Vec<u8>, String>> {
    let mut pairs: HashMap<Vec<u8>, String> = HashMap::new();
    let mut pos = 0usize;

    while pos < body.len() {
        let key_start = match body[pos..].iter().position(|b| !b.is_ascii_whitespace()) {
            Some(off) => pos + off,
            None => break,
        };
        let eq = match body[key_start..].iter().position(|&b| b == b'=') {
            Some(off) => key_start + off,
            None => {
                return Err(DictError::Malformed(format!(
                    "invalid part of ifo file {} (no '=') near: {}",
                    file,
                    String::from_utf8_lossy(&body[key_start..body.len().min(key_start + 32)])
                )))
            }
        };
        let key = body[key_start..eq].to_vec();

        let val_start = match body[eq + 1..].iter().position(|b| !b.is_ascii_whitespace()) {
            Some(off) => eq + 1 + off,
            None => {
                // Nothing but whitespace follows: the value is empty.
                pairs.insert(key, String::new());
                break;
            }
        };
        let line_end = body[val_start..]
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .map(|off| val_start + off)
            .unwrap_or(body.len());

        pairs.insert(
            key,
            String::from_utf8_lossy(&body[val_start..line_end]).into_owned(),
        );
        if line_end == body.len() {
            break;
        }
        pos = line_end + 1;
    }

    Ok(pairs)
}

/// Leading-digits integer parse with `atol` semantics: garbage yields 0.
fn atoul(s: &str) -> u64 {
    s.bytes()
        .take_while(|b| b.is_ascii_digit())
        .fold(0u64, |acc, b| {
            acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
        })
}
