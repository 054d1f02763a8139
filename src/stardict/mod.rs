//! Core StarDict reader module.

pub mod compare;
pub mod data;
pub mod dict;
pub mod dictzip;
pub mod distance;
pub mod error;
pub mod idx;
pub mod ifo;
pub mod mapfile;
pub mod offset_idx;
pub mod query;
pub mod record;
pub mod syn;

pub mod library;

use std::collections::BTreeSet;

pub use error::{DictError, Result};

/// Outcome of an exact headword lookup against one index.
///
/// `indices` holds every matching entry position (duplicate headwords are
/// legal and all of them are returned). When nothing matched, `next_idx`
/// is the insertion point for the query — the index of the first entry
/// greater than it — or `None` when the query sorts past the last key.
/// `next_idx` carries no meaning on a hit.
#[derive(Debug, Default, Clone)]
pub struct WordLookup {
    pub indices: BTreeSet<usize>,
    pub next_idx: Option<usize>,
    pub found: bool,
}
