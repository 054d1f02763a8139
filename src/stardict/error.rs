//! Error and result types shared across the crate.

use thiserror::Error;

/// Everything that can go wrong while loading or querying a dictionary.
#[derive(Debug, Error)]
pub enum DictError {
    /// A dictionary file could not be opened or read.
    #[error("file access failed: {0}")]
    Io(#[from] std::io::Error),

    /// A file breaks the on-disk layout: bad magic, a key without its
    /// terminator, a record that stops mid-field.
    #[error("malformed dictionary file: {0}")]
    Malformed(String),

    /// The `.ifo` metadata lacks one of its required keys.
    #[error("ifo file {file} has no '{key}' key")]
    MissingKey { key: &'static str, file: String },

    /// A size declared in the metadata or index disagrees with what is
    /// actually on disk.
    #[error("{what}: declared {declared} bytes but found {actual}")]
    WrongSize {
        what: &'static str,
        declared: u64,
        actual: u64,
    },

    /// The `.dict.dz` container is not valid dictzip, or a chunk failed to
    /// inflate.
    #[error("dictzip: {0}")]
    Dictzip(String),

    /// An entry index is outside the dictionary's word count.
    #[error("entry {index} out of range ({count} words)")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Shorthand for results carrying a [`DictError`].
pub type Result<T> = std::result::Result<T, DictError>;
