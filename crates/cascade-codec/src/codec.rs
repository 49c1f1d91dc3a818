//! Item codecs used by the framer.
//!
//! A codec writes one item into a caller-provided slice and reads one item
//! back from the front of a slice. Running out of room is not an error for
//! the stream: the serializer retries with a larger buffer.

use std::io::Cursor;
use std::marker::PhantomData;

use cascade_core::error::StreamError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::varint;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("output buffer too small")]
    BufferTooSmall,

    #[error("{0}")]
    Invalid(String),
}

impl From<CodecError> for StreamError {
    fn from(e: CodecError) -> Self {
        StreamError::Codec(e.to_string())
    }
}

pub trait ByteCodec<T> {
    /// Encode into `out`. Returns the number of bytes written.
    fn encode(&self, item: &T, out: &mut [u8]) -> Result<usize, CodecError>;

    /// Decode one item from the front of `input`, with the bytes it used.
    fn decode(&self, input: &[u8]) -> Result<(T, usize), CodecError>;
}

fn put(out: &mut [u8], bytes: &[u8]) -> Result<usize, CodecError> {
    let dst = out
        .get_mut(..bytes.len())
        .ok_or(CodecError::BufferTooSmall)?;
    dst.copy_from_slice(bytes);
    Ok(bytes.len())
}

fn take<const N: usize>(input: &[u8]) -> Result<[u8; N], CodecError> {
    input
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| CodecError::Invalid(format!("need {} bytes, have {}", N, input.len())))
}

/// Fixed 4-byte little-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct I32Codec;

impl ByteCodec<i32> for I32Codec {
    fn encode(&self, item: &i32, out: &mut [u8]) -> Result<usize, CodecError> {
        put(out, &item.to_le_bytes())
    }

    fn decode(&self, input: &[u8]) -> Result<(i32, usize), CodecError> {
        Ok((i32::from_le_bytes(take::<4>(input)?), 4))
    }
}

/// Fixed 8-byte little-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct I64Codec;

impl ByteCodec<i64> for I64Codec {
    fn encode(&self, item: &i64, out: &mut [u8]) -> Result<usize, CodecError> {
        put(out, &item.to_le_bytes())
    }

    fn decode(&self, input: &[u8]) -> Result<(i64, usize), CodecError> {
        Ok((i64::from_le_bytes(take::<8>(input)?), 8))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct U64VarCodec;

impl ByteCodec<u64> for U64VarCodec {
    fn encode(&self, item: &u64, out: &mut [u8]) -> Result<usize, CodecError> {
        varint::write_u64(out, *item).ok_or(CodecError::BufferTooSmall)
    }

    fn decode(&self, input: &[u8]) -> Result<(u64, usize), CodecError> {
        varint::read_u64(input).ok_or_else(|| CodecError::Invalid("truncated varint".into()))
    }
}

/// Varint length followed by the raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl BytesCodec {
    fn encode_slice(bytes: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
        let n = varint::write_u64(out, bytes.len() as u64).ok_or(CodecError::BufferTooSmall)?;
        Ok(n + put(&mut out[n..], bytes)?)
    }

    fn decode_slice(input: &[u8]) -> Result<(&[u8], usize), CodecError> {
        let (len, n) = varint::read_u64(input)
            .ok_or_else(|| CodecError::Invalid("truncated length".into()))?;
        let end = n
            .checked_add(len as usize)
            .filter(|end| *end <= input.len())
            .ok_or_else(|| CodecError::Invalid(format!("length {} past end of input", len)))?;
        Ok((&input[n..end], end))
    }
}

impl ByteCodec<Vec<u8>> for BytesCodec {
    fn encode(&self, item: &Vec<u8>, out: &mut [u8]) -> Result<usize, CodecError> {
        Self::encode_slice(item, out)
    }

    fn decode(&self, input: &[u8]) -> Result<(Vec<u8>, usize), CodecError> {
        let (bytes, used) = Self::decode_slice(input)?;
        Ok((bytes.to_vec(), used))
    }
}

/// UTF-8 with a varint length.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl ByteCodec<String> for StringCodec {
    fn encode(&self, item: &String, out: &mut [u8]) -> Result<usize, CodecError> {
        BytesCodec::encode_slice(item.as_bytes(), out)
    }

    fn decode(&self, input: &[u8]) -> Result<(String, usize), CodecError> {
        let (bytes, used) = BytesCodec::decode_slice(input)?;
        let s = std::str::from_utf8(bytes).map_err(|e| CodecError::Invalid(e.to_string()))?;
        Ok((s.to_owned(), used))
    }
}

/// Two codecs back to back.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairCodec<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> PairCodec<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<X, Y, A, B> ByteCodec<(X, Y)> for PairCodec<A, B>
where
    A: ByteCodec<X>,
    B: ByteCodec<Y>,
{
    fn encode(&self, item: &(X, Y), out: &mut [u8]) -> Result<usize, CodecError> {
        let n = self.first.encode(&item.0, out)?;
        Ok(n + self.second.encode(&item.1, &mut out[n..])?)
    }

    fn decode(&self, input: &[u8]) -> Result<((X, Y), usize), CodecError> {
        let (x, n) = self.first.decode(input)?;
        let (y, m) = self.second.decode(&input[n..])?;
        Ok(((x, y), n + m))
    }
}

/// Any serde type, as JSON text.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Serialize + DeserializeOwned> ByteCodec<T> for JsonCodec<T> {
    fn encode(&self, item: &T, out: &mut [u8]) -> Result<usize, CodecError> {
        let mut cursor = Cursor::new(out);
        match serde_json::to_writer(&mut cursor, item) {
            Ok(()) => Ok(cursor.position() as usize),
            Err(e) if e.is_io() => Err(CodecError::BufferTooSmall),
            Err(e) => Err(CodecError::Invalid(e.to_string())),
        }
    }

    fn decode(&self, input: &[u8]) -> Result<(T, usize), CodecError> {
        let mut items = serde_json::Deserializer::from_slice(input).into_iter::<T>();
        match items.next() {
            Some(Ok(item)) => Ok((item, items.byte_offset())),
            Some(Err(e)) => Err(CodecError::Invalid(e.to_string())),
            None => Err(CodecError::Invalid("empty JSON record".into())),
        }
    }
}
