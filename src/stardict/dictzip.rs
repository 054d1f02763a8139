//! Random-access reader for `.dict.dz` (dictzip) containers.
//!
//! dictzip is ordinary gzip with an `RA` extra field in the header: the
//! payload is cut into fixed-size chunks, each compressed at a full-flush
//! boundary so it can be inflated independently, and the extra field lists
//! every chunk's compressed size. Ranged reads therefore only inflate the
//! chunks spanning the request.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::{Decompress, FlushDecompress};
use log::{debug, trace};

use super::error::{DictError, Result};

// gzip header constants.
const GZ_ID1: u8 = 0x1f;
const GZ_ID2: u8 = 0x8b;
const GZ_CM_DEFLATE: u8 = 8;
const GZ_FHCRC: u8 = 0x02;
const GZ_FEXTRA: u8 = 0x04;
const GZ_FNAME: u8 = 0x08;
const GZ_FCOMMENT: u8 = 0x10;

/// Decoded chunks kept around for sequential-read locality.
const CHUNK_CACHE_SIZE: usize = 5;

struct ChunkSlot {
    chunk: Option<usize>,
    data: Vec<u8>,
}

/// An open dictzip file with its chunk table decoded.
pub struct DictZipFile {
    file: File,
    /// Uncompressed bytes per chunk (last chunk may be shorter).
    chunk_len: usize,
    /// File offset of each compressed chunk; one extra slot for the end.
    chunk_offsets: Vec<u64>,
    /// Total uncompressed length, from the gzip trailer.
    uncompressed_len: u64,
    cache: Vec<ChunkSlot>,
    cache_cur: usize,
}

impl DictZipFile {
    /// Open `path` and parse the gzip header and `RA` chunk table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        if file.read_u8()? != GZ_ID1 || file.read_u8()? != GZ_ID2 {
            return Err(DictError::Dictzip(format!(
                "{} is not a gzip file",
                path.display()
            )));
        }
        if file.read_u8()? != GZ_CM_DEFLATE {
            return Err(DictError::Dictzip("unsupported compression method".into()));
        }
        let flags = file.read_u8()?;
        let _mtime = file.read_u32::<LittleEndian>()?;
        let _xfl = file.read_u8()?;
        let _os = file.read_u8()?;

        if flags & GZ_FEXTRA == 0 {
            return Err(DictError::Dictzip(
                "missing extra field: not a dictzip file".into(),
            ));
        }
        let xlen = file.read_u16::<LittleEndian>()? as usize;
        let mut extra = vec![0u8; xlen];
        file.read_exact(&mut extra)?;
        let (chunk_len, chunk_sizes) = parse_ra_field(&extra)?;

        if flags & GZ_FNAME != 0 {
            skip_cstr(&mut file)?;
        }
        if flags & GZ_FCOMMENT != 0 {
            skip_cstr(&mut file)?;
        }
        if flags & GZ_FHCRC != 0 {
            file.seek(SeekFrom::Current(2))?;
        }

        let data_start = file.stream_position()?;
        let mut chunk_offsets = Vec::with_capacity(chunk_sizes.len() + 1);
        let mut off = data_start;
        for &size in &chunk_sizes {
            chunk_offsets.push(off);
            off += u64::from(size);
        }
        chunk_offsets.push(off);

        // The gzip trailer carries the uncompressed length (mod 2^32; a
        // .dict stream is indexed by u32 offsets so this is exact here).
        let file_len = file.seek(SeekFrom::End(0))?;
        if off + 8 > file_len {
            return Err(DictError::Dictzip("chunk table overruns the file".into()));
        }
        file.seek(SeekFrom::End(-4))?;
        let uncompressed_len = u64::from(file.read_u32::<LittleEndian>()?);

        debug!(
            "dictzip open: {} chunks of {} bytes, {} bytes uncompressed",
            chunk_sizes.len(),
            chunk_len,
            uncompressed_len
        );

        let cache = (0..CHUNK_CACHE_SIZE)
            .map(|_| ChunkSlot {
                chunk: None,
                data: Vec::new(),
            })
            .collect();

        Ok(DictZipFile {
            file,
            chunk_len,
            chunk_offsets,
            uncompressed_len,
            cache,
            cache_cur: 0,
        })
    }

    /// Total uncompressed payload length.
    pub fn uncompressed_len(&self) -> u64 {
        self.uncompressed_len
    }

    /// Read `size` bytes at `offset` of the uncompressed stream into `buf`
    /// (replacing its contents).
    pub fn read_into(&mut self, buf: &mut Vec<u8>, offset: u64, size: u64) -> Result<()> {
        buf.clear();
        if size == 0 {
            return Ok(());
        }
        if offset + size > self.uncompressed_len {
            return Err(DictError::Dictzip(format!(
                "read past end of payload ({} + {} > {})",
                offset, size, self.uncompressed_len
            )));
        }
        buf.reserve(size as usize);

        let chunk_len = self.chunk_len as u64;
        let first = (offset / chunk_len) as usize;
        let last = ((offset + size - 1) / chunk_len) as usize;

        for chunk_idx in first..=last {
            let chunk_start = chunk_idx as u64 * chunk_len;
            let data = self.chunk(chunk_idx)?;
            let from = offset.max(chunk_start) - chunk_start;
            let to = (offset + size - chunk_start).min(data.len() as u64);
            if from > to || to > data.len() as u64 {
                return Err(DictError::Dictzip(format!(
                    "chunk {} shorter than the chunk table implies",
                    chunk_idx
                )));
            }
            buf.extend_from_slice(&data[from as usize..to as usize]);
        }
        if buf.len() as u64 != size {
            return Err(DictError::Dictzip(format!(
                "assembled {} bytes for a {}-byte read",
                buf.len(),
                size
            )));
        }
        Ok(())
    }

    /// Inflate (or fetch from cache) one chunk of the payload.
    fn chunk(&mut self, idx: usize) -> Result<&[u8]> {
        if let Some(slot) = self.cache.iter().position(|s| s.chunk == Some(idx)) {
            trace!("dictzip chunk {} served from cache", idx);
            return Ok(&self.cache[slot].data);
        }

        let comp_len = (self.chunk_offsets[idx + 1] - self.chunk_offsets[idx]) as usize;
        let mut comp = vec![0u8; comp_len];
        self.file.seek(SeekFrom::Start(self.chunk_offsets[idx]))?;
        self.file.read_exact(&mut comp)?;

        // Chunks end on full-flush boundaries, so each one inflates as a
        // standalone raw-deflate stream.
        let mut out = vec![0u8; self.chunk_len];
        let mut inflater = Decompress::new(false);
        inflater
            .decompress(&comp, &mut out, FlushDecompress::Sync)
            .map_err(|e| DictError::Dictzip(format!("chunk {} failed to inflate: {}", idx, e)))?;
        out.truncate(inflater.total_out() as usize);

        let slot = self.cache_cur;
        self.cache[slot] = ChunkSlot {
            chunk: Some(idx),
            data: out,
        };
        self.cache_cur = (self.cache_cur + 1) % CHUNK_CACHE_SIZE;
        Ok(&self.cache[slot].data)
    }
}

/// Locate the `RA` subfield inside the gzip extra field and decode the
/// chunk table: version, chunk length, chunk count, then one u16 compressed
/// size per chunk (all little-endian).
fn parse_ra_field(extra: &[u8]) -> Result<(usize, Vec<u16>)> {
    let mut rest = extra;
    while rest.len() >= 4 {
        let si1 = rest[0];
        let si2 = rest[1];
        let sub_len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        let body = rest
            .get(4..4 + sub_len)
            .ok_or_else(|| DictError::Dictzip("truncated extra subfield".into()))?;
        if (si1, si2) == (b'R', b'A') {
            if body.len() < 6 {
                return Err(DictError::Dictzip("RA subfield too short".into()));
            }
            let version = u16::from_le_bytes([body[0], body[1]]);
            if version != 1 {
                return Err(DictError::Dictzip(format!(
                    "unsupported dictzip version {}",
                    version
                )));
            }
            let chunk_len = u16::from_le_bytes([body[2], body[3]]) as usize;
            let chunk_count = u16::from_le_bytes([body[4], body[5]]) as usize;
            if chunk_len == 0 || body.len() < 6 + 2 * chunk_count {
                return Err(DictError::Dictzip("malformed RA chunk table".into()));
            }
            let sizes = body[6..6 + 2 * chunk_count]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            return Ok((chunk_len, sizes));
        }
        rest = &rest[4 + sub_len..];
    }
    Err(DictError::Dictzip(
        "no RA subfield: not a dictzip file".into(),
    ))
}

/// Skip a zero-terminated header string.
fn skip_cstr(file: &mut File) -> Result<()> {
    loop {
        if file.read_u8()? == 0 {
            return Ok(());
        }
    }
}
