//! `.syn` synonym index: alternate headwords pointing into the main index.

use std::cmp::Ordering;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use super::compare::ascii_strcasecmp;
use super::error::{DictError, Result};
use super::mapfile::MapFile;
use super::WordLookup;

/// A memory-mapped `.syn` file.
///
/// Each entry is a NUL-terminated synonym string followed by a big-endian
/// u32 position in the main index. Entries are in comparator order on the
/// synonym. The mapping stays alive for the dictionary's lifetime.
pub struct SynFile {
    map: MapFile,
    /// Start offset of each entry in the mapping.
    entries: Vec<usize>,
}

impl SynFile {
    pub fn load(path: &Path, syn_wordcount: usize) -> Result<Self> {
        let map = MapFile::open(path)?;
        let data = map.data();

        let mut entries = Vec::with_capacity(syn_wordcount);
        let mut pos = 0usize;
        for _ in 0..syn_wordcount {
            entries.push(pos);
            let nul = data[pos..].iter().position(|&b| b == 0).ok_or_else(|| {
                DictError::Malformed("synonym entry lacks its terminator".to_string())
            })?;
            pos += nul + 1 + 4;
            if pos > data.len() {
                return Err(DictError::Malformed(
                    "synonym entry overruns the file".to_string(),
                ));
            }
        }

        debug!(
            "synonym index loaded from {}: {} entries",
            path.display(),
            syn_wordcount
        );
        Ok(SynFile { map, entries })
    }

    fn key_bytes(&self, idx: usize) -> &[u8] {
        let start = self.entries[idx];
        let data = self.map.data();
        let nul = data[start..]
            .iter()
            .position(|&b| b == 0)
            .expect("entry table was validated at load");
        &data[start..start + nul]
    }

    /// The main-index position a synonym entry refers to.
    fn referenced_index(&self, idx: usize) -> usize {
        let start = self.entries[idx];
        let data = self.map.data();
        let key_len = self.key_bytes(idx).len();
        BigEndian::read_u32(&data[start + key_len + 1..start + key_len + 5]) as usize
    }

    /// Exact lookup on the synonym strings. Matches insert the *referenced*
    /// main-index positions, not positions within the `.syn` file.
    pub fn lookup(&self, word: &str) -> WordLookup {
        let word = word.as_bytes();
        let mut res = WordLookup::default();
        if self.entries.is_empty() {
            return res;
        }
        let last = self.entries.len() - 1;

        if ascii_strcasecmp(word, self.key_bytes(0)) == Ordering::Less {
            res.next_idx = Some(0);
            return res;
        }
        if ascii_strcasecmp(word, self.key_bytes(last)) == Ordering::Greater {
            res.next_idx = None;
            return res;
        }

        let (mut from, mut to) = (0isize, last as isize);
        let mut hit = None;
        while from <= to {
            let mid = (from + to) / 2;
            match ascii_strcasecmp(word, self.key_bytes(mid as usize)) {
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
                let mut head = found_at as isize - 1;
                while head >= 0
                    && ascii_strcasecmp(word, self.key_bytes(head as usize))
                        == Ordering::Equal
                {
                    res.indices.insert(self.referenced_index(head as usize));
                    head -= 1;
                }
                let mut tail = found_at;
                loop {
                    res.indices.insert(self.referenced_index(tail));
                    tail += 1;
                    if tail > last
                        || ascii_strcasecmp(word, self.key_bytes(tail)) != Ordering::Equal
                    {
                        break;
                    }
                }
            }
        }
        res
    }
}
