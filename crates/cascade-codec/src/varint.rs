//! Base-128 varints, least significant group first, high bit = continuation.
//!
//! Record length prefixes are capped at three bytes, which bounds a framed
//! record to 2^21-1 bytes. The serializer writes prefixes at a fixed width
//! (padding with continuation bytes) so a header can be reserved before the
//! body size is known; the reader accepts any width up to three.

use cascade_core::error::{Result, StreamError};

pub const MAX_SIZE_1_BYTE: usize = 127;
pub const MAX_SIZE_2_BYTE: usize = 16383;
pub const MAX_SIZE_3_BYTE: usize = 2097151;

pub const MAX_HEADER_BYTES: usize = 3;

/// Minimal prefix width for `len`, or `None` past three bytes.
pub fn header_size(len: usize) -> Option<usize> {
    if len <= MAX_SIZE_1_BYTE {
        Some(1)
    } else if len <= MAX_SIZE_2_BYTE {
        Some(2)
    } else if len <= MAX_SIZE_3_BYTE {
        Some(3)
    } else {
        None
    }
}

/// Write `len` using exactly `width` bytes.
pub fn write_header(out: &mut [u8], len: usize, width: usize) {
    debug_assert!(width >= 1 && width <= MAX_HEADER_BYTES);
    debug_assert!(header_size(len).map_or(false, |w| w <= width));
    let mut v = len;
    for (i, byte) in out[..width].iter_mut().enumerate() {
        let group = (v & 0x7f) as u8;
        v >>= 7;
        *byte = if i + 1 < width { group | 0x80 } else { group };
    }
}

/// Write `len` using the fewest bytes. Returns the width used.
pub fn write_header_minimal(out: &mut [u8], len: usize) -> Result<usize> {
    let width = header_size(len).ok_or_else(|| {
        StreamError::Framing(format!("length {} does not fit a 3-byte prefix", len))
    })?;
    write_header(out, len, width);
    Ok(width)
}

/// Parse a prefix. `Ok(None)` means more bytes are needed.
pub fn read_header(input: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut value = 0usize;
    for i in 0..MAX_HEADER_BYTES {
        let Some(&b) = input.get(i) else {
            return Ok(None);
        };
        value |= ((b & 0x7f) as usize) << (7 * i);
        if b & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Err(StreamError::Framing(
        "length prefix longer than 3 bytes".into(),
    ))
}

/// Unbounded variant for codecs; up to ten bytes for a u64.
pub fn write_u64(out: &mut [u8], mut v: u64) -> Option<usize> {
    let mut i = 0;
    loop {
        let byte = out.get_mut(i)?;
        if v < 0x80 {
            *byte = v as u8;
            return Some(i + 1);
        }
        *byte = (v as u8 & 0x7f) | 0x80;
        v >>= 7;
        i += 1;
    }
}

pub fn read_u64(input: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &b) in input.iter().enumerate().take(10) {
        value |= ((b & 0x7f) as u64) << (7 * i);
        if b & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_len(len: usize) -> usize {
        let mut out = [0u8; 3];
        write_header_minimal(&mut out, len).unwrap()
    }

    #[test]
    fn widths_follow_thresholds() {
        assert_eq!(encoded_len(0), 1);
        assert_eq!(encoded_len(MAX_SIZE_1_BYTE), 1);
        assert_eq!(encoded_len(MAX_SIZE_1_BYTE + 1), 2);
        assert_eq!(encoded_len(MAX_SIZE_2_BYTE), 2);
        assert_eq!(encoded_len(MAX_SIZE_2_BYTE + 1), 3);
        assert_eq!(encoded_len(MAX_SIZE_3_BYTE), 3);
        assert!(write_header_minimal(&mut [0u8; 3], MAX_SIZE_3_BYTE + 1).is_err());
    }

    #[test]
    fn padded_prefix_reads_back() {
        let mut out = [0u8; 3];
        write_header(&mut out, 5, 3);
        assert_eq!(out, [0x85, 0x80, 0x00]);
        assert_eq!(read_header(&out).unwrap(), Some((5, 3)));
    }

    #[test]
    fn partial_and_overlong_prefixes() {
        assert_eq!(read_header(&[]).unwrap(), None);
        assert_eq!(read_header(&[0x80, 0x81]).unwrap(), None);
        assert!(read_header(&[0x80, 0x80, 0x80]).is_err());
        let mut out = [0u8; 3];
        write_header(&mut out, MAX_SIZE_3_BYTE, 3);
        assert_eq!(read_header(&out).unwrap(), Some((MAX_SIZE_3_BYTE, 3)));
    }

    #[test]
    fn u64_varints() {
        let mut out = [0u8; 10];
        let n = write_u64(&mut out, u64::MAX).unwrap();
        assert_eq!(n, 10);
        assert_eq!(read_u64(&out[..n]), Some((u64::MAX, 10)));
        assert_eq!(write_u64(&mut [0u8; 1], 300), None);
    }
}
