//! LZ4 block stream: each input chunk becomes one self-describing block, and
//! a zero-length block terminates the stream.

pub mod compressor;
pub mod decompressor;
pub mod format;

pub use compressor::{encode_block, end_of_stream_block, CompressorStats, StreamLz4Compressor};
pub use decompressor::{decode_block, DecompressorStats, StreamLz4Decompressor};
pub use format::{BlockHeader, BlockMethod, HEADER_LEN, MAX_BLOCK_SIZE};
