//! `SortedRunStorage` implementations.
//!
//! Both storages frame items with the binary serializer and, when compression
//! is enabled, wrap the frames in LZ4 blocks:
//!
//! ```text
//! write: items -> serializer -> [compressor] -> sink
//! read:  source -> [decompressor] -> deserializer -> items
//! ```

mod fs;
mod memory;

pub use fs::FsRunStorage;
pub use memory::MemoryRunStorage;

use std::rc::Rc;

use cascade_codec::{
    ByteCodec, StreamDeserializer, StreamLz4Compressor, StreamLz4Decompressor, StreamSerializer,
};
use cascade_core::config::FramingConfig;
use cascade_core::eventloop::EventLoopRef;
use cascade_core::stream::{stream_to, StreamConsumer, StreamProducer};
use cascade_mem::{BufferPool, ByteBuf};

/// Shared encode/decode chains of a run storage.
pub(crate) struct RunCodec<T> {
    pub eventloop: EventLoopRef,
    pub pool: BufferPool,
    pub codec: Rc<dyn ByteCodec<T>>,
    pub framing: FramingConfig,
    pub compress: bool,
}

impl<T: 'static> RunCodec<T> {
    /// Item consumer that writes encoded chunks into `sink`.
    pub fn encoder<S>(&self, sink: &Rc<S>) -> Rc<dyn StreamConsumer<T>>
    where
        S: StreamConsumer<ByteBuf> + 'static,
    {
        let serializer =
            StreamSerializer::new(&self.eventloop, &self.pool, self.codec.clone(), &self.framing);
        if self.compress {
            let compressor = StreamLz4Compressor::new(&self.eventloop, &self.pool);
            stream_to(&serializer, &compressor);
            stream_to(&compressor, sink);
        } else {
            stream_to(&serializer, sink);
        }
        serializer
    }

    /// Item producer decoding the chunks emitted by `source`.
    pub fn decoder<P>(&self, source: &Rc<P>) -> Rc<dyn StreamProducer<T>>
    where
        P: StreamProducer<ByteBuf> + 'static,
    {
        let deserializer =
            StreamDeserializer::new(&self.eventloop, &self.pool, self.codec.clone(), &self.framing);
        if self.compress {
            let decompressor = StreamLz4Decompressor::new(&self.eventloop, &self.pool);
            stream_to(source, &decompressor);
            stream_to(&decompressor, &deserializer);
        } else {
            stream_to(source, &deserializer);
        }
        deserializer
    }
}
