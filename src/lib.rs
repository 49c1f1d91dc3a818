#![forbid(unsafe_code)]
//! cascade: single-threaded, push-based stream processing.
//!
//! Pipelines are wired from producers and consumers that exchange items under
//! backpressure on one event loop. This facade re-exports the workspace crates:
//!
//! - [`core`]: protocol, statuses, errors, configuration, event loop
//! - [`mem`]: pooled byte buffers
//! - [`codec`]: item codecs, binary framing, LZ4 block compression
//! - [`operators`]: merge reducer, external sorter, join, fan-in/fan-out
//! - [`io`]: run storages, file endpoints, digests

pub use cascade_codec as codec;
pub use cascade_core as core;
pub use cascade_io as io;
pub use cascade_mem as mem;
pub use cascade_operators as operators;

pub mod prelude {
    pub use cascade_codec::{ByteCodec, StreamDeserializer, StreamSerializer};
    pub use cascade_codec::{StreamLz4Compressor, StreamLz4Decompressor};
    pub use cascade_core::prelude::*;
    pub use cascade_mem::{BufferPool, ByteBuf};
    pub use cascade_operators::{
        Reducer, SortedRunStorage, StreamJoin, StreamReducer, StreamSorter, StreamSplitter,
        StreamUnion,
    };
}
