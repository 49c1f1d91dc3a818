//! Block header layout.
//!
//! ```text
//! [ magic "LZ4Block": 8 ][ token: 1 ][ compressed_len: i32 LE ]
//! [ original_len: i32 LE ][ checksum: i32 LE ][ payload … ]
//! ```
//!
//! `token = method | level`, where the upper nibble is the method (RAW or
//! LZ4) and the lower nibble is `log2(block capacity) - 10`. The checksum is
//! XXH32 over the uncompressed bytes, seeded with [`CHECKSUM_SEED`] so blocks
//! interoperate with lz4-java's `LZ4Block` streams. A block with both lengths zero and a
//! zero checksum marks the end of the stream.

use cascade_core::error::{Result, StreamError};
use xxhash_rust::xxh32::xxh32;

pub const MAGIC: &[u8; 8] = b"LZ4Block";
pub const HEADER_LEN: usize = MAGIC.len() + 1 + 4 + 4 + 4;

pub const METHOD_RAW: u8 = 0x10;
pub const METHOD_LZ4: u8 = 0x20;

pub const LEVEL_BASE: u32 = 10;
pub const MAX_LEVEL: u8 = 0x0F;

/// Largest payload one block can describe.
pub const MAX_BLOCK_SIZE: usize = 1 << (LEVEL_BASE + MAX_LEVEL as u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMethod {
    Raw,
    Lz4,
}

impl BlockMethod {
    fn token_bits(self) -> u8 {
        match self {
            BlockMethod::Raw => METHOD_RAW,
            BlockMethod::Lz4 => METHOD_LZ4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub method: BlockMethod,
    pub level: u8,
    pub compressed_len: usize,
    pub original_len: usize,
    pub checksum: u32,
}

/// Level for a block of `len` bytes: `ceil(log2(len)) - 10`, floored at zero.
pub fn level_for(len: usize) -> u8 {
    if len <= 1 {
        return 0;
    }
    let bits = usize::BITS - (len - 1).leading_zeros();
    bits.saturating_sub(LEVEL_BASE) as u8
}

/// Seed of lz4-java's block checksum.
pub const CHECKSUM_SEED: u32 = 0x9747_b28c;

pub fn checksum(bytes: &[u8]) -> u32 {
    xxh32(bytes, CHECKSUM_SEED)
}

fn corrupt(msg: impl Into<String>) -> StreamError {
    StreamError::Corruption(msg.into())
}

impl BlockHeader {
    pub fn new(method: BlockMethod, original_len: usize, compressed_len: usize, checksum: u32) -> Self {
        debug_assert!(original_len <= MAX_BLOCK_SIZE);
        Self {
            method,
            level: level_for(original_len),
            compressed_len,
            original_len,
            checksum,
        }
    }

    pub fn end_of_stream() -> Self {
        Self::new(BlockMethod::Raw, 0, 0, 0)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.original_len == 0
    }

    pub fn write_to(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(MAGIC);
        out[8] = self.method.token_bits() | self.level;
        out[9..13].copy_from_slice(&(self.compressed_len as i32).to_le_bytes());
        out[13..17].copy_from_slice(&(self.original_len as i32).to_le_bytes());
        out[17..21].copy_from_slice(&self.checksum.to_le_bytes());
    }

    /// Parse and validate a header from the first `HEADER_LEN` bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes
            .get(..HEADER_LEN)
            .ok_or_else(|| corrupt("short block header"))?;
        if &bytes[..8] != MAGIC {
            return Err(corrupt("bad block magic"));
        }
        let token = bytes[8];
        let method = match token & 0xF0 {
            METHOD_RAW => BlockMethod::Raw,
            METHOD_LZ4 => BlockMethod::Lz4,
            other => return Err(corrupt(format!("unknown compression method {:#04x}", other))),
        };
        let level = token & 0x0F;
        let read_i32 = |at: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[at..at + 4]);
            i32::from_le_bytes(word)
        };
        let compressed_len = read_i32(9);
        let original_len = read_i32(13);
        let checksum = read_i32(17) as u32;

        if compressed_len < 0 || original_len < 0 {
            return Err(corrupt("negative block length"));
        }
        let (compressed_len, original_len) = (compressed_len as usize, original_len as usize);
        if original_len > 1usize << (LEVEL_BASE + level as u32) {
            return Err(corrupt(format!(
                "original length {} too large for level {}",
                original_len, level
            )));
        }
        if (original_len == 0) != (compressed_len == 0) {
            return Err(corrupt("exactly one of the block lengths is zero"));
        }
        if compressed_len > lz4_flex::block::get_maximum_output_size(original_len).max(original_len) {
            return Err(corrupt(format!(
                "compressed length {} exceeds bound for {} bytes",
                compressed_len, original_len
            )));
        }
        if method == BlockMethod::Raw && original_len != compressed_len {
            return Err(corrupt("raw block lengths differ"));
        }
        if original_len == 0 && checksum != 0 {
            return Err(corrupt("end-of-stream block carries a checksum"));
        }
        Ok(Self {
            method,
            level,
            compressed_len,
            original_len,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(level_for(0), 0);
        assert_eq!(level_for(1024), 0);
        assert_eq!(level_for(1025), 1);
        assert_eq!(level_for(64 * 1024), 6);
        assert_eq!(level_for(MAX_BLOCK_SIZE), MAX_LEVEL);
    }

    #[test]
    fn header_round_trip() {
        let h = BlockHeader::new(BlockMethod::Lz4, 5000, 1200, 0xDEAD_BEEF);
        let mut out = [0u8; HEADER_LEN];
        h.write_to(&mut out);
        assert_eq!(out[8], METHOD_LZ4 | 3);
        assert_eq!(BlockHeader::parse(&out).unwrap(), h);
    }

    #[test]
    fn end_of_stream_block() {
        let mut out = [0u8; HEADER_LEN];
        BlockHeader::end_of_stream().write_to(&mut out);
        assert_eq!(out[8], METHOD_RAW);
        assert!(BlockHeader::parse(&out).unwrap().is_end_of_stream());
    }

    #[test]
    fn rejects_inconsistent_headers() {
        let mut out = [0u8; HEADER_LEN];
        BlockHeader::new(BlockMethod::Raw, 10, 10, 1).write_to(&mut out);

        let mut bad_magic = out;
        bad_magic[0] = b'X';
        assert!(BlockHeader::parse(&bad_magic).is_err());

        let mut bad_method = out;
        bad_method[8] = 0x30;
        assert!(BlockHeader::parse(&bad_method).is_err());

        let mut raw_mismatch = out;
        raw_mismatch[9] = 9;
        assert!(BlockHeader::parse(&raw_mismatch).is_err());

        let mut too_big = out;
        too_big[13..17].copy_from_slice(&2000i32.to_le_bytes());
        too_big[9..13].copy_from_slice(&2000i32.to_le_bytes());
        assert!(BlockHeader::parse(&too_big).is_err());

        let mut negative = out;
        negative[13..17].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(BlockHeader::parse(&negative).is_err());

        let mut eos_with_check = [0u8; HEADER_LEN];
        BlockHeader::end_of_stream().write_to(&mut eos_with_check);
        eos_with_check[17] = 1;
        assert!(BlockHeader::parse(&eos_with_check).is_err());
    }

    #[test]
    fn checksum_is_seeded_xxh32() {
        assert_eq!(xxh32(b"", 0), 0x02CC_5D05);
        assert_ne!(checksum(b""), 0x02CC_5D05);

        let pool = cascade_mem::BufferPool::default();
        let payload = b"abcabcabcabcabcabcabcabcabcabcabcabc";
        let block = crate::lz4::encode_block(&pool, payload).unwrap();
        let stored = u32::from_le_bytes(block.read_slice()[17..21].try_into().unwrap());
        assert_eq!(stored, xxh32(payload, 0x9747_b28c));
    }
}
