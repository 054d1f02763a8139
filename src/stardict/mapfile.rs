//! Read-only memory-mapped file views.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use super::error::Result;

/// A scoped read-only mapping of a whole file.
///
/// The mapping is released when the value is dropped. Failure to map (file
/// absent, empty file, platform limit) is an ordinary error; callers that
/// can fall back to buffered I/O should do so.
pub struct MapFile {
    mmap: Mmap,
}

impl MapFile {
    /// Map `path` read-only in its entirety.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let len = file.metadata()?.len() as usize;
        let mmap = unsafe { MmapOptions::new().len(len).map(&file)? };
        Ok(MapFile { mmap })
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }
}
