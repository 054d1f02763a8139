//! Random access to `.dict` record payloads, plain or dictzip-compressed.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::trace;

use super::dictzip::DictZipFile;
use super::error::Result;
use super::record::{self, Record};

/// Decoded records kept per dictionary; replacement is a plain rotation.
const RECORD_CACHE_SLOTS: usize = 2;

enum Container {
    Plain(File),
    Dictzip(DictZipFile),
}

#[derive(Default)]
struct RecordSlot {
    offset: u32,
    record: Option<Record>,
}

/// Reader over one dictionary's record payload.
///
/// Wraps either a plain `.dict` file (seek + read) or a `.dict.dz` dictzip
/// container, decodes records against the dictionary's `sametypesequence`,
/// and keeps a small cache of recently decoded records keyed by offset.
pub struct DictData {
    container: Container,
    sametypesequence: String,
    total_len: u64,
    cache: [RecordSlot; RECORD_CACHE_SLOTS],
    cache_cur: usize,
}

impl DictData {
    /// Open the payload at `path`; a `.dz` extension selects the dictzip
    /// reader.
    pub fn open(path: &Path, sametypesequence: String) -> Result<Self> {
        let container = if path.extension().is_some_and(|ext| ext == "dz") {
            Container::Dictzip(DictZipFile::open(path)?)
        } else {
            Container::Plain(File::open(path)?)
        };
        let total_len = match &container {
            Container::Plain(file) => file.metadata()?.len(),
            Container::Dictzip(dz) => dz.uncompressed_len(),
        };
        Ok(DictData {
            container,
            sametypesequence,
            total_len,
            cache: Default::default(),
            cache_cur: 0,
        })
    }

    /// Total uncompressed payload length.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn sametypesequence(&self) -> &str {
        &self.sametypesequence
    }

    /// Read `size` raw bytes at `offset` into `buf` (replacing its
    /// contents).
    pub fn read_into(&mut self, buf: &mut Vec<u8>, offset: u32, size: u32) -> Result<()> {
        match &mut self.container {
            Container::Plain(file) => {
                buf.clear();
                buf.resize(size as usize, 0);
                file.seek(SeekFrom::Start(u64::from(offset)))?;
                file.read_exact(buf)?;
                Ok(())
            }
            Container::Dictzip(dz) => dz.read_into(buf, u64::from(offset), u64::from(size)),
        }
    }

    /// Fetch and decode the record at `(offset, size)`, serving repeats from
    /// the cache.
    pub fn record(&mut self, offset: u32, size: u32) -> Result<Record> {
        for slot in &self.cache {
            if slot.offset == offset {
                if let Some(record) = &slot.record {
                    trace!("record at offset {} served from cache", offset);
                    return Ok(record.clone());
                }
            }
        }

        let mut raw = Vec::new();
        self.read_into(&mut raw, offset, size)?;
        let record = record::decode(&raw, &self.sametypesequence)?;

        self.cache[self.cache_cur] = RecordSlot {
            offset,
            record: Some(record.clone()),
        };
        self.cache_cur = (self.cache_cur + 1) % RECORD_CACHE_SLOTS;
        Ok(record)
    }

    /// Full-text needle scan over the raw record at `(offset, size)`.
    /// `scratch` is reused across calls to avoid per-record allocation.
    pub fn matches_needles(
        &mut self,
        needles: &[String],
        offset: u32,
        size: u32,
        scratch: &mut Vec<u8>,
    ) -> Result<bool> {
        self.read_into(scratch, offset, size)?;
        Ok(record::matches_needles(
            scratch,
            &self.sametypesequence,
            needles,
        ))
    }
}
