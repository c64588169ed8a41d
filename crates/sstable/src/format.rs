//! SST footer and sparse block index (metadata section) encoding.
//!
//! ## Footer (28 bytes, always last)
//!
//! ```text
//! [sst_id: u64 LE][meta_offset: u64 LE][bloom_offset: u64 LE][magic: u32 LE]
//! ```
//!
//! ## Metadata section (starts at `meta_offset`)
//!
//! ```text
//! [num_blocks: u32]
//! repeated num_blocks times:
//!   [offset: u64][len: u32][first_key_len: u32][first_key][last_key_len: u32][last_key]
//! [crc32: u32]   -- over everything above it in this section
//! ```
//!
//! The reader reads the footer first, then the metadata section up to
//! `bloom_offset`. Block bodies are read one at a time on demand.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::block::MAX_KEY_BYTES;
use crate::error::{corrupt, Result};

/// Magic number identifying a StrataKV SST (ASCII "STB1").
pub const SST_MAGIC: u32 = 0x5354_4231;

/// Footer size: 8 (`sst_id`) + 8 (`meta_offset`) + 8 (`bloom_offset`) + 4 (`magic`).
pub const FOOTER_BYTES: u64 = 8 + 8 + 8 + 4;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub sst_id: u64,
    pub meta_offset: u64,
    pub bloom_offset: u64,
}

impl Footer {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.sst_id)?;
        w.write_u64::<LittleEndian>(self.meta_offset)?;
        w.write_u64::<LittleEndian>(self.bloom_offset)?;
        w.write_u32::<LittleEndian>(SST_MAGIC)?;
        Ok(())
    }

    /// Reads and sanity-checks the footer of a file of `file_size` bytes.
    ///
    /// Checks the magic and that `meta_offset <= bloom_offset <= footer start`.
    pub fn read_from<R: Read + Seek>(r: &mut R, file_size: u64) -> Result<Self> {
        if file_size < FOOTER_BYTES {
            return Err(corrupt(format!(
                "file too small for SST footer ({} bytes)",
                file_size
            )));
        }
        r.seek(SeekFrom::Start(file_size - FOOTER_BYTES))?;
        let sst_id = r.read_u64::<LittleEndian>()?;
        let meta_offset = r.read_u64::<LittleEndian>()?;
        let bloom_offset = r.read_u64::<LittleEndian>()?;
        let magic = r.read_u32::<LittleEndian>()?;

        if magic != SST_MAGIC {
            return Err(corrupt(format!("unknown SST magic: {:#x}", magic)));
        }
        let footer_start = file_size - FOOTER_BYTES;
        if meta_offset > bloom_offset || bloom_offset > footer_start {
            return Err(corrupt(format!(
                "section offsets out of order (meta {}, bloom {}, footer {})",
                meta_offset, bloom_offset, footer_start
            )));
        }

        Ok(Self {
            sst_id,
            meta_offset,
            bloom_offset,
        })
    }
}

/// Sparse index entry for one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMeta {
    /// Byte offset of the block body inside the file.
    pub offset: u64,
    /// Encoded length of the block body.
    pub len: u32,
    pub first_key: Vec<u8>,
    pub last_key: Vec<u8>,
}

impl BlockMeta {
    /// Encodes the whole metadata section, checksum included.
    pub fn encode_all(metas: &[BlockMeta]) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(metas.len() as u32)?;
        for meta in metas {
            buf.write_u64::<LittleEndian>(meta.offset)?;
            buf.write_u32::<LittleEndian>(meta.len)?;
            buf.write_u32::<LittleEndian>(meta.first_key.len() as u32)?;
            buf.write_all(&meta.first_key)?;
            buf.write_u32::<LittleEndian>(meta.last_key.len() as u32)?;
            buf.write_all(&meta.last_key)?;
        }

        let mut hasher = Crc32::new();
        hasher.update(&buf);
        buf.write_u32::<LittleEndian>(hasher.finalize())?;
        Ok(buf)
    }

    /// Decodes a metadata section, verifying its checksum first.
    pub fn decode_all(buf: &[u8]) -> Result<Vec<BlockMeta>> {
        if buf.len() < 8 {
            return Err(corrupt("metadata section truncated"));
        }
        let (body, crc_bytes) = buf.split_at(buf.len() - 4);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let mut hasher = Crc32::new();
        hasher.update(body);
        let actual = hasher.finalize();
        if actual != stored {
            return Err(corrupt(format!(
                "metadata CRC32 mismatch: expected {:#010x}, got {:#010x}",
                stored, actual
            )));
        }

        decode_entries(body).map_err(|e| corrupt(format!("metadata section malformed: {}", e)))
    }
}

fn decode_entries(body: &[u8]) -> io::Result<Vec<BlockMeta>> {
    let mut cur = Cursor::new(body);
    let count = cur.read_u32::<LittleEndian>()? as usize;
    let mut metas = Vec::with_capacity(count.min(body.len() / 16));
    for _ in 0..count {
        let offset = cur.read_u64::<LittleEndian>()?;
        let len = cur.read_u32::<LittleEndian>()?;
        let first_key = read_key(&mut cur)?;
        let last_key = read_key(&mut cur)?;
        metas.push(BlockMeta {
            offset,
            len,
            first_key,
            last_key,
        });
    }
    if cur.position() != body.len() as u64 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "trailing bytes"));
    }
    Ok(metas)
}

fn read_key(cur: &mut Cursor<&[u8]>) -> io::Result<Vec<u8>> {
    let len = cur.read_u32::<LittleEndian>()? as usize;
    let remaining = (cur.get_ref().len() as u64).saturating_sub(cur.position());
    if len > MAX_KEY_BYTES || len as u64 > remaining {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("key length {} is invalid", len),
        ));
    }
    let mut key = vec![0u8; len];
    cur.read_exact(&mut key)?;
    Ok(key)
}
