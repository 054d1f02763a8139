//! Headword index access: the common lookup surface and the fully-loaded
//! `.idx.gz` variant.

use std::cmp::Ordering;
use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use flate2::read::GzDecoder;
use log::debug;

use super::compare::ascii_strcasecmp;
use super::error::{DictError, Result};
use super::WordLookup;

/// One index entry: the headword plus its record's position in the `.dict`
/// stream.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub key: String,
    pub offset: u32,
    pub size: u32,
}

/// Lookup surface shared by the two on-disk index variants.
///
/// Keys come back owned: the paged variant reuses its page buffer across
/// calls, so borrowed keys would be invalidated by the next access.
pub trait IndexFile {
    /// The `idx`-th headword.
    fn key(&mut self, idx: usize) -> Result<String>;

    /// The `idx`-th entry with its record offset and size.
    fn entry(&mut self, idx: usize) -> Result<IndexEntry>;

    /// Headword lookup: matches under the comparator's case-insensitive
    /// primary level, returning every matching entry (byte-identical
    /// duplicates and ASCII case variants alike) and the insertion point on
    /// a miss.
    fn lookup(&mut self, word: &str) -> Result<WordLookup>;
}

/// An index fully decompressed from `.idx.gz` and kept in memory.
///
/// Entry layout: NUL-terminated key, then big-endian u32 offset and size.
pub struct WordListIndex {
    buf: Vec<u8>,
    /// Start offset of each entry in `buf`; one extra slot past the end.
    entries: Vec<usize>,
}

impl WordListIndex {
    /// Decompress and parse the whole index. `index_file_size` is the
    /// `.ifo`-declared size of the decompressed stream.
    pub fn load(path: &Path, wordcount: usize, index_file_size: u64) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut buf = Vec::with_capacity(index_file_size as usize);
        GzDecoder::new(file).read_to_end(&mut buf)?;
        if buf.len() as u64 != index_file_size {
            return Err(DictError::WrongSize {
                what: "decompressed .idx.gz",
                declared: index_file_size,
                actual: buf.len() as u64,
            });
        }

        let mut entries = Vec::with_capacity(wordcount + 1);
        let mut pos = 0usize;
        for _ in 0..wordcount {
            entries.push(pos);
            let nul = buf[pos..].iter().position(|&b| b == 0).ok_or_else(|| {
                DictError::Malformed("index entry key lacks its terminator".to_string())
            })?;
            pos += nul + 1 + 8;
            if pos > buf.len() {
                return Err(DictError::Malformed(
                    "index entry overruns the file".to_string(),
                ));
            }
        }
        entries.push(pos);

        debug!(
            "word list index loaded from {}: {} entries",
            path.display(),
            wordcount
        );
        Ok(WordListIndex { buf, entries })
    }

    fn word_count(&self) -> usize {
        self.entries.len() - 1
    }

    fn key_bytes(&self, idx: usize) -> Result<&[u8]> {
        let start = *self
            .entries
            .get(idx)
            .ok_or(DictError::IndexOutOfRange {
                index: idx,
                count: self.word_count(),
            })?;
        let nul = self.buf[start..]
            .iter()
            .position(|&b| b == 0)
            .expect("entry table was validated at load");
        Ok(&self.buf[start..start + nul])
    }
}

impl IndexFile for WordListIndex {
    fn key(&mut self, idx: usize) -> Result<String> {
        Ok(String::from_utf8_lossy(self.key_bytes(idx)?).into_owned())
    }

    fn entry(&mut self, idx: usize) -> Result<IndexEntry> {
        let key = self.key_bytes(idx)?;
        let tail = self.entries[idx] + key.len() + 1;
        let key = String::from_utf8_lossy(key).into_owned();
        let offset = BigEndian::read_u32(&self.buf[tail..tail + 4]);
        let size = BigEndian::read_u32(&self.buf[tail + 4..tail + 8]);
        Ok(IndexEntry { key, offset, size })
    }

    fn lookup(&mut self, word: &str) -> Result<WordLookup> {
        let word = word.as_bytes();
        let last = self.word_count() - 1;
        let mut res = WordLookup::default();

        if ascii_strcasecmp(word, self.key_bytes(0)?) == Ordering::Less {
            res.next_idx = Some(0);
            return Ok(res);
        }
        if ascii_strcasecmp(word, self.key_bytes(last)?) == Ordering::Greater {
            res.next_idx = None;
            return Ok(res);
        }

        let (mut from, mut to) = (0isize, last as isize);
        let mut hit = None;
        while from <= to {
            let mid = (from + to) / 2;
            match ascii_strcasecmp(word, self.key_bytes(mid as usize)?) {
                Ordering::Greater => from = mid + 1,
                Ordering::Less => to = mid - 1,
                Ordering::Equal => {
                    hit = Some(mid as usize);
                    break;
                }
            }
        }

        match hit {
            None => res.next_idx = Some(from as usize),
            Some(found_at) => {
                res.found = true;
                // Walk linearly behind and ahead of the match so every
                // duplicate headword is reported, not just the one the
                // binary search landed on.
                let mut head = found_at as isize - 1;
                while head >= 0
                    && ascii_strcasecmp(word, self.key_bytes(head as usize)?)
                        == Ordering::Equal
                {
                    res.indices.insert(head as usize);
                    head -= 1;
                }
                let mut tail = found_at;
                loop {
                    res.indices.insert(tail);
                    tail += 1;
                    if tail > last
                        || ascii_strcasecmp(word, self.key_bytes(tail)?) != Ordering::Equal
                    {
                        break;
                    }
                }
            }
        }
        Ok(res)
    }
}
