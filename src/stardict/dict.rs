//! A single loaded dictionary: metadata, index, synonyms and payload.

use std::path::{Path, PathBuf};

use log::{debug, info};

use super::data::DictData;
use super::error::{DictError, Result};
use super::idx::{IndexEntry, IndexFile, WordListIndex};
use super::ifo::DictInfo;
use super::offset_idx::OffsetIndex;
use super::query::Pattern;
use super::record::{is_text_type, Record};
use super::syn::SynFile;
use super::WordLookup;

/// One dictionary, loaded from its `.ifo` path and immutable thereafter.
///
/// The loader resolves the sibling files by preference: `.dict.dz` over
/// `.dict`, `.idx.gz` over `.idx`, plus an optional `.syn`. Every file is
/// opened at load time and held for the dictionary's lifetime; failure to
/// open any required one fails the whole load.
pub struct Dict {
    info: DictInfo,
    idx: Box<dyn IndexFile>,
    syn: Option<SynFile>,
    data: DictData,
}

impl Dict {
    pub fn load(ifo_path: &Path, verbose: bool) -> Result<Self> {
        let info = DictInfo::load_from_ifo_file(ifo_path, false)?;
        if info.wordcount == 0 {
            return Err(DictError::Malformed(format!(
                "{} declares an empty dictionary",
                ifo_path.display()
            )));
        }

        let dz_path = ifo_path.with_extension("dict.dz");
        let data_path = if dz_path.exists() {
            dz_path
        } else {
            ifo_path.with_extension("dict")
        };
        let data = DictData::open(&data_path, info.sametypesequence.clone())?;

        let gz_path = ifo_path.with_extension("idx.gz");
        let mut idx: Box<dyn IndexFile> = if gz_path.exists() {
            Box::new(WordListIndex::load(
                &gz_path,
                info.wordcount,
                info.index_file_size,
            )?)
        } else {
            Box::new(OffsetIndex::load(
                &ifo_path.with_extension("idx"),
                info.wordcount,
                info.index_file_size,
                verbose,
            )?)
        };

        // The final record must end exactly at the payload's end; anything
        // else means the index and payload disagree.
        let last = idx.entry(info.wordcount - 1)?;
        let payload_end = u64::from(last.offset) + u64::from(last.size);
        if payload_end != data.total_len() {
            return Err(DictError::WrongSize {
                what: ".dict payload",
                declared: payload_end,
                actual: data.total_len(),
            });
        }

        let syn = if info.syn_wordcount > 0 {
            let syn_path = ifo_path.with_extension("syn");
            match SynFile::load(&syn_path, info.syn_wordcount) {
                Ok(syn) => Some(syn),
                Err(err) => {
                    debug!("no usable synonym index at {}: {}", syn_path.display(), err);
                    None
                }
            }
        } else {
            None
        };

        info!(
            "dictionary loaded: {} ({} words, {} synonyms)",
            info.bookname, info.wordcount, info.syn_wordcount
        );
        Ok(Dict {
            info,
            idx,
            syn,
            data,
        })
    }

    pub fn bookname(&self) -> &str {
        &self.info.bookname
    }

    pub fn ifo_path(&self) -> &PathBuf {
        &self.info.ifo_file_name
    }

    pub fn word_count(&self) -> usize {
        self.info.wordcount
    }

    pub fn sametypesequence(&self) -> &str {
        &self.info.sametypesequence
    }

    /// The `idx`-th headword of the main index.
    pub fn key(&mut self, idx: usize) -> Result<String> {
        self.idx.key(idx)
    }

    /// The `idx`-th index entry (headword plus record position).
    pub fn entry(&mut self, idx: usize) -> Result<IndexEntry> {
        self.idx.entry(idx)
    }

    /// Exact lookup: the union of synonym-index and main-index matches.
    /// `next_idx` reflects the main index and is meaningful only on a miss.
    pub fn lookup(&mut self, word: &str) -> Result<WordLookup> {
        let mut res = self.idx.lookup(word)?;
        if let Some(syn) = &self.syn {
            let syn_res = syn.lookup(word);
            res.found |= syn_res.found;
            res.indices.extend(syn_res.indices);
        }
        Ok(res)
    }

    /// Indices of every headword matching the glob, capped at `limit`.
    pub fn lookup_pattern(&mut self, pattern: &Pattern, limit: usize) -> Result<Vec<usize>> {
        let mut matches = Vec::new();
        for idx in 0..self.info.wordcount {
            if matches.len() >= limit {
                break;
            }
            if pattern.matches(&self.idx.key(idx)?) {
                matches.push(idx);
            }
        }
        Ok(matches)
    }

    /// Fetch and decode the record for the `idx`-th entry.
    pub fn record(&mut self, idx: usize) -> Result<Record> {
        let entry = self.idx.entry(idx)?;
        self.data.record(entry.offset, entry.size)
    }

    /// Full-text needle scan over the `idx`-th entry's raw record.
    pub fn matches_data(
        &mut self,
        needles: &[String],
        idx: usize,
        scratch: &mut Vec<u8>,
    ) -> Result<bool> {
        let entry = self.idx.entry(idx)?;
        self.data
            .matches_needles(needles, entry.offset, entry.size, scratch)
    }

    /// Whether full-text search can find anything here: true when the
    /// schema is absent (self-describing records) or names at least one
    /// text-typed field.
    pub fn supports_data_search(&self) -> bool {
        let schema = self.info.sametypesequence.as_bytes();
        schema.is_empty() || schema.iter().any(|&kind| is_text_type(kind))
    }
}
