//! Paged access to an uncompressed `.idx` file, with the `.oft` page-offset
//! cache.
//!
//! The index is never held in memory as a whole. Entries are grouped into
//! 32-entry pages; a page-offset table (built by one scan of the file, or
//! restored from the `.oft` cache) gives each page's byte position, and a
//! single page buffer is reloaded on demand. Three anchor pages plus the
//! very last entry are kept decoded so the outer binary search rarely
//! touches the disk.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, info, warn};

use super::compare::ascii_strcasecmp;
use super::error::{DictError, Result};
use super::idx::{IndexEntry, IndexFile};
use super::mapfile::MapFile;
use super::WordLookup;

const ENTRIES_PER_PAGE: usize = 32;
const CACHE_MAGIC: &[u8] = b"StarDict's Cache, Version: 0.2";
const CACHE_SENTINEL: u32 = 0x51a4_d1c1;
/// Longest legal key (255 bytes plus NUL) plus the two u32 entry fields.
const FIRST_KEY_BUF: usize = 256 + 8;

#[derive(Debug, Clone)]
struct PageEntry {
    key: Vec<u8>,
    offset: u32,
    size: u32,
}

#[derive(Default)]
struct Page {
    idx: Option<usize>,
    entries: Vec<PageEntry>,
}

struct Anchor {
    idx: usize,
    key: Vec<u8>,
}

/// Paged `.idx` reader.
pub struct OffsetIndex {
    idxfile: File,
    wordcount: usize,
    /// Byte position of each page; the final slot is the end of the file,
    /// needed to size the last page.
    wordoffset: Vec<u32>,
    page: Page,
    first: Anchor,
    last: Anchor,
    middle: Anchor,
    real_last: Anchor,
}

impl OffsetIndex {
    /// Open the index at `path`, restoring or rebuilding the page-offset
    /// table. `index_file_size` is the `.ifo`-declared file size; `verbose`
    /// reports cache writes.
    pub fn load(
        path: &Path,
        wordcount: usize,
        index_file_size: u64,
        verbose: bool,
    ) -> Result<Self> {
        let npages = (wordcount - 1) / ENTRIES_PER_PAGE + 2;
        let mut wordoffset = vec![0u32; npages];

        if !load_cache(path, &mut wordoffset) {
            build_page_table(path, wordcount, index_file_size, &mut wordoffset)?;
            if !save_cache(path, &wordoffset, verbose) {
                warn!("cache update failed for {}", path.display());
            }
        }

        let idxfile = File::open(path)?;
        let mut index = OffsetIndex {
            idxfile,
            wordcount,
            wordoffset,
            page: Page::default(),
            first: Anchor {
                idx: 0,
                key: Vec::new(),
            },
            last: Anchor {
                idx: npages - 2,
                key: Vec::new(),
            },
            middle: Anchor {
                idx: (npages - 2) / 2,
                key: Vec::new(),
            },
            real_last: Anchor {
                idx: wordcount - 1,
                key: Vec::new(),
            },
        };
        index.first.key = index.read_first_on_page_key(0)?;
        index.last.key = index.read_first_on_page_key(npages - 2)?;
        index.middle.key = index.read_first_on_page_key((npages - 2) / 2)?;
        index.real_last.key = index.key_at(wordcount - 1)?;
        Ok(index)
    }

    /// Load the page holding 32 consecutive entries, reusing the buffer
    /// when it is already resident. Returns the entry count of the page
    /// (the final page may be short).
    fn load_page(&mut self, page_idx: usize) -> Result<usize> {
        let mut nentr = ENTRIES_PER_PAGE;
        if page_idx == self.wordoffset.len() - 2 {
            let rem = self.wordcount % ENTRIES_PER_PAGE;
            if rem != 0 {
                nentr = rem;
            }
        }

        if self.page.idx != Some(page_idx) {
            let size =
                (self.wordoffset[page_idx + 1] - self.wordoffset[page_idx]) as usize;
            let mut data = vec![0u8; size];
            self.idxfile
                .seek(SeekFrom::Start(u64::from(self.wordoffset[page_idx])))?;
            self.idxfile.read_exact(&mut data)?;

            let mut entries = Vec::with_capacity(nentr);
            let mut pos = 0usize;
            for _ in 0..nentr {
                let nul = data[pos..].iter().position(|&b| b == 0).ok_or_else(|| {
                    DictError::Malformed("index page entry lacks its terminator".to_string())
                })?;
                let key = data[pos..pos + nul].to_vec();
                pos += nul + 1;
                if pos + 8 > data.len() {
                    return Err(DictError::Malformed(
                        "index page entry overruns the page".to_string(),
                    ));
                }
                let offset = BigEndian::read_u32(&data[pos..pos + 4]);
                let size = BigEndian::read_u32(&data[pos + 4..pos + 8]);
                pos += 8;
                entries.push(PageEntry { key, offset, size });
            }
            self.page = Page {
                idx: Some(page_idx),
                entries,
            };
        }

        Ok(nentr)
    }

    /// One short read for a page's first key, bypassing the page buffer.
    fn read_first_on_page_key(&mut self, page_idx: usize) -> Result<Vec<u8>> {
        let page_size =
            (self.wordoffset[page_idx + 1] - self.wordoffset[page_idx]) as usize;
        let mut buf = vec![0u8; page_size.min(FIRST_KEY_BUF)];
        self.idxfile
            .seek(SeekFrom::Start(u64::from(self.wordoffset[page_idx])))?;
        self.idxfile.read_exact(&mut buf)?;
        let nul = buf.iter().position(|&b| b == 0).ok_or_else(|| {
            DictError::Malformed("index key exceeds the 255-byte limit".to_string())
        })?;
        buf.truncate(nul);
        Ok(buf)
    }

    /// A page's first key, served from an anchor when possible.
    fn get_first_on_page_key(&mut self, page_idx: usize) -> Result<Vec<u8>> {
        if page_idx < self.middle.idx {
            if page_idx == self.first.idx {
                Ok(self.first.key.clone())
            } else {
                self.read_first_on_page_key(page_idx)
            }
        } else if page_idx > self.middle.idx {
            if page_idx == self.last.idx {
                Ok(self.last.key.clone())
            } else {
                self.read_first_on_page_key(page_idx)
            }
        } else {
            Ok(self.middle.key.clone())
        }
    }

    fn key_at(&mut self, idx: usize) -> Result<Vec<u8>> {
        Ok(self.entry_at(idx)?.0)
    }

    fn entry_at(&mut self, idx: usize) -> Result<(Vec<u8>, u32, u32)> {
        if idx >= self.wordcount {
            return Err(DictError::IndexOutOfRange {
                index: idx,
                count: self.wordcount,
            });
        }
        self.load_page(idx / ENTRIES_PER_PAGE)?;
        let entry = &self.page.entries[idx % ENTRIES_PER_PAGE];
        Ok((entry.key.clone(), entry.offset, entry.size))
    }
}

impl IndexFile for OffsetIndex {
    fn key(&mut self, idx: usize) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.key_at(idx)?).into_owned())
    }

    fn entry(&mut self, idx: usize) -> Result<IndexEntry> {
        let (key, offset, size) = self.entry_at(idx)?;
        Ok(IndexEntry {
            key: String::from_utf8_lossy(&key).into_owned(),
            offset,
            size,
        })
    }

    fn lookup(&mut self, word: &str) -> Result<WordLookup> {
        let word = word.as_bytes();
        let mut res = WordLookup::default();

        if ascii_strcasecmp(word, &self.first.key) == Ordering::Less {
            res.next_idx = Some(0);
            return Ok(res);
        }
        if ascii_strcasecmp(word, &self.real_last.key) == Ordering::Greater {
            res.next_idx = None;
            return Ok(res);
        }

        // Stage one: find the page whose first key equals the query, or the
        // page preceding it when no page starts with the query.
        let (mut from, mut to) = (0isize, (self.wordoffset.len() - 2) as isize);
        let mut mid = 0isize;
        let mut found = false;
        while from <= to {
            mid = (from + to) / 2;
            match ascii_strcasecmp(word, &self.get_first_on_page_key(mid as usize)?) {
                Ordering::Greater => from = mid + 1,
                Ordering::Less => to = mid - 1,
                Ordering::Equal => {
                    found = true;
                    break;
                }
            }
        }

        let page_idx;
        let mut in_page = 0usize;
        if found {
            // An equal first key may not be the first duplicate, but the
            // backwards walk below catches entries on earlier pages.
            page_idx = mid as usize;
        } else {
            page_idx = to as usize;
            // Stage two: binary search inside the page that should contain
            // the query, so a miss yields the same next_idx contract as the
            // in-memory index.
            let nentr = self.load_page(page_idx)?;
            let (mut ifrom, mut ito) = (0isize, nentr as isize - 1);
            while ifrom <= ito {
                let imid = (ifrom + ito) / 2;
                match ascii_strcasecmp(word, &self.page.entries[imid as usize].key) {
                    Ordering::Greater => ifrom = imid + 1,
                    Ordering::Less => ito = imid - 1,
                    Ordering::Equal => {
                        found = true;
                        in_page = imid as usize;
                        break;
                    }
                }
            }
            if !found {
                res.next_idx = Some(page_idx * ENTRIES_PER_PAGE + ifrom as usize);
                return Ok(res);
            }
        }

        res.found = true;
        let global = page_idx * ENTRIES_PER_PAGE + in_page;

        // Walk linearly behind and ahead of the match, across page
        // boundaries, so every duplicate headword is reported.
        let mut head = global as isize - 1;
        while head >= 0
            && ascii_strcasecmp(word, &self.key_at(head as usize)?) == Ordering::Equal
        {
            res.indices.insert(head as usize);
            head -= 1;
        }
        let mut tail = global;
        loop {
            res.indices.insert(tail);
            tail += 1;
            if tail > self.real_last.idx
                || ascii_strcasecmp(word, &self.key_at(tail)?) != Ordering::Equal
            {
                break;
            }
        }
        Ok(res)
    }
}

/// Scan the whole index once to record where each 32-entry page begins.
fn build_page_table(
    path: &Path,
    wordcount: usize,
    index_file_size: u64,
    wordoffset: &mut [u32],
) -> Result<()> {
    let map = MapFile::open(path)?;
    if map.len() as u64 != index_file_size {
        return Err(DictError::WrongSize {
            what: ".idx file",
            declared: index_file_size,
            actual: map.len() as u64,
        });
    }
    let data = map.data();

    let mut pos = 0usize;
    let mut slot = 0usize;
    for i in 0..wordcount {
        let nul = data[pos..].iter().position(|&b| b == 0).ok_or_else(|| {
            DictError::Malformed("index entry key lacks its terminator".to_string())
        })?;
        if i % ENTRIES_PER_PAGE == 0 {
            wordoffset[slot] = pos as u32;
            slot += 1;
        }
        pos += nul + 1 + 8;
        if pos > data.len() {
            return Err(DictError::Malformed(
                "index entry overruns the file".to_string(),
            ));
        }
    }
    wordoffset[slot] = pos as u32;
    debug!(
        "page table built for {}: {} pages",
        path.display(),
        slot
    );
    Ok(())
}

/// Candidate `.oft` paths, tried in order: next to the index, then in the
/// per-user cache directory.
fn cache_variants(idx_path: &Path) -> Vec<PathBuf> {
    let mut oft = idx_path.as_os_str().to_owned();
    oft.push(".oft");
    let mut variants = vec![PathBuf::from(oft)];

    if let Some(cache_root) = dirs::cache_dir() {
        let dir = cache_root.join("sdcv");
        if ensure_cache_dir(&dir) {
            if let Some(base) = idx_path.file_name() {
                let mut name = base.to_owned();
                name.push(".oft");
                variants.push(dir.join(name));
            }
        }
    }
    variants
}

fn ensure_cache_dir(dir: &Path) -> bool {
    if dir.is_dir() {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
            .is_ok()
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir).is_ok()
    }
}

/// Restore the page table from an `.oft` cache: the magic string, the
/// sentinel word and the table itself, all in host byte order. A cache
/// older than the index, or with either magic wrong, is ignored.
fn load_cache(idx_path: &Path, wordoffset: &mut [u32]) -> bool {
    for candidate in cache_variants(idx_path) {
        let newer_than_idx = match (modified_time(idx_path), modified_time(&candidate)) {
            (Some(idx_mtime), Some(cache_mtime)) => cache_mtime >= idx_mtime,
            _ => false,
        };
        if !newer_than_idx {
            continue;
        }
        let map = match MapFile::open(&candidate) {
            Ok(map) => map,
            Err(_) => continue,
        };
        let data = map.data();
        let header_len = CACHE_MAGIC.len() + 4;
        if data.len() < header_len + wordoffset.len() * 4 || !data.starts_with(CACHE_MAGIC) {
            continue;
        }
        let sentinel = u32::from_ne_bytes(
            data[CACHE_MAGIC.len()..header_len].try_into().unwrap(),
        );
        if sentinel != CACHE_SENTINEL {
            continue;
        }
        for (slot, chunk) in wordoffset
            .iter_mut()
            .zip(data[header_len..].chunks_exact(4))
        {
            *slot = u32::from_ne_bytes(chunk.try_into().unwrap());
        }
        debug!(
            "page table restored from cache {}",
            candidate.display()
        );
        return true;
    }
    false
}

fn save_cache(idx_path: &Path, wordoffset: &[u32], verbose: bool) -> bool {
    for candidate in cache_variants(idx_path) {
        let write = || -> std::io::Result<()> {
            let mut out = File::create(&candidate)?;
            out.write_all(CACHE_MAGIC)?;
            out.write_all(&CACHE_SENTINEL.to_ne_bytes())?;
            for &off in wordoffset {
                out.write_all(&off.to_ne_bytes())?;
            }
            Ok(())
        };
        if write().is_ok() {
            if verbose {
                info!("save to cache {}", candidate.display());
            }
            return true;
        }
    }
    false
}

fn modified_time(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
