//! Chunks to LZ4 blocks, one block per chunk.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use cascade_core::error::{Result, StreamError};
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{Outbox, StreamConsumer, StreamProducer, TransformerCore};
use cascade_mem::{BufferPool, ByteBuf};
use lz4_flex::block::{compress_into, get_maximum_output_size};
use tracing::debug;

use super::format::{checksum, BlockHeader, BlockMethod, HEADER_LEN, MAX_BLOCK_SIZE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressorStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub blocks: u64,
    /// Blocks stored uncompressed because LZ4 did not shrink them.
    pub raw_blocks: u64,
}

/// Encode `payload` as one block into a pooled buffer.
///
/// Falls back to RAW when compression does not make the block smaller.
pub fn encode_block(pool: &BufferPool, payload: &[u8]) -> Result<ByteBuf> {
    debug_assert!(!payload.is_empty() && payload.len() <= MAX_BLOCK_SIZE);
    let bound = get_maximum_output_size(payload.len()).max(payload.len());
    let mut out = pool.allocate(HEADER_LEN + bound);
    let sum = checksum(payload);

    let compressed = compress_into(payload, &mut out.write_slice_mut()[HEADER_LEN..])
        .map_err(|e| StreamError::Codec(format!("lz4 compression failed: {}", e)))?;
    let header = if compressed < payload.len() {
        BlockHeader::new(BlockMethod::Lz4, payload.len(), compressed, sum)
    } else {
        out.write_slice_mut()[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
        BlockHeader::new(BlockMethod::Raw, payload.len(), payload.len(), sum)
    };
    header.write_to(out.write_slice_mut());
    out.advance_write(HEADER_LEN + header.compressed_len);
    Ok(out)
}

pub fn end_of_stream_block(pool: &BufferPool) -> ByteBuf {
    let mut out = pool.allocate(HEADER_LEN);
    BlockHeader::end_of_stream().write_to(out.write_slice_mut());
    out.advance_write(HEADER_LEN);
    out
}

pub struct StreamLz4Compressor {
    core: TransformerCore<ByteBuf, ByteBuf>,
    outbox: Outbox<ByteBuf>,
    pool: BufferPool,
    stats: Cell<CompressorStats>,
}

impl StreamLz4Compressor {
    pub fn new(eventloop: &EventLoopRef, pool: &BufferPool) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            core: TransformerCore::new(eventloop, this.clone()),
            outbox: Outbox::new(),
            pool: pool.clone(),
            stats: Cell::new(CompressorStats::default()),
        })
    }

    pub fn stats(&self) -> CompressorStats {
        self.stats.get()
    }

    fn compress_chunk(&self, chunk: &[u8]) -> Result<()> {
        let mut stats = self.stats.get();
        stats.bytes_in += chunk.len() as u64;
        // Oversized chunks are split; each piece is still its own block.
        for piece in chunk.chunks(MAX_BLOCK_SIZE) {
            let block = encode_block(&self.pool, piece)?;
            if block.read_remaining() == HEADER_LEN + piece.len() {
                stats.raw_blocks += 1;
            }
            stats.blocks += 1;
            stats.bytes_out += block.read_remaining() as u64;
            self.outbox.push(block);
        }
        self.stats.set(stats);
        Ok(())
    }

    fn drain(&self) {
        self.outbox.drain_to(&self.core.output);
        if self.core.output.status().is_terminal() {
            self.outbox.clear();
        }
    }

    fn fail(&self, err: StreamError) {
        if self.core.fail(err) {
            debug!("compressor closed with error");
        }
        self.outbox.clear();
    }
}

impl StreamConsumer<ByteBuf> for StreamLz4Compressor {
    fn consumer_status(&self) -> StreamStatus {
        self.core.input.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<ByteBuf>>) {
        self.core.bind_producer(producer);
    }

    fn on_data(&self, buf: ByteBuf) {
        if !self.core.input.accept_data() {
            return;
        }
        // An empty block would read as end-of-stream.
        if !buf.can_read() {
            return;
        }
        let result = self.compress_chunk(buf.read_slice());
        drop(buf);
        match result {
            Ok(()) => self.drain(),
            Err(err) => self.fail(err),
        }
    }

    fn on_end_of_stream(&self) {
        if !self.core.input.end_of_stream() {
            return;
        }
        let stats = self.stats.get();
        debug!(blocks = stats.blocks, bytes_in = stats.bytes_in, bytes_out = stats.bytes_out, "compressor input ended");
        self.outbox.push(end_of_stream_block(&self.pool));
        self.outbox.finish();
        self.drain();
    }

    fn on_error(&self, err: StreamError) {
        self.fail(err);
    }
}

impl StreamProducer<ByteBuf> for StreamLz4Compressor {
    fn producer_status(&self) -> StreamStatus {
        self.core.output.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<ByteBuf>>) {
        self.core.bind_consumer(consumer);
    }

    fn produce(&self) {
        self.drain();
        if self.outbox.is_empty() && self.core.output.is_ready() {
            self.core.input.resume();
        }
    }

    fn suspend(&self) {
        self.core.suspend();
    }

    fn resume(&self) {
        self.core.output.resume();
    }

    fn close_with_error(&self, err: StreamError) {
        self.fail(err);
    }
}
