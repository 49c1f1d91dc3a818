#![forbid(unsafe_code)]
//! cascade-codec: turning items into bytes and back.
//!
//! - `codec`: per-item binary codecs
//! - `varint`: the 1..3 byte record length prefix
//! - `serializer` / `deserializer`: framed item streams over pooled chunks
//! - `lz4`: block compression with checksums

pub mod codec;
pub mod deserializer;
pub mod lz4;
pub mod serializer;
pub mod varint;

pub use codec::{
    ByteCodec, BytesCodec, CodecError, I32Codec, I64Codec, JsonCodec, PairCodec, StringCodec,
    U64VarCodec,
};
pub use deserializer::{DeserializerStats, StreamDeserializer};
pub use lz4::{StreamLz4Compressor, StreamLz4Decompressor};
pub use serializer::{SerializerStats, StreamSerializer};
