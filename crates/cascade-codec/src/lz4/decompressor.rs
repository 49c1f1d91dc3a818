//! LZ4 blocks back to chunks, one chunk per block.
//!
//! Headers and payloads may straddle input chunks. The end-of-stream block
//! ends the output right away; any byte after it is an error.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use cascade_core::error::{Result, StreamError};
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{Outbox, StreamConsumer, StreamProducer, TransformerCore};
use cascade_mem::{BufferPool, ByteBuf};
use lz4_flex::block::decompress_into;
use tracing::debug;

use super::format::{checksum, BlockHeader, BlockMethod, HEADER_LEN};

const INITIAL_SCRATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecompressorStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub blocks: u64,
    /// Offset of the next unread byte in the compressed stream.
    pub input_position: u64,
}

#[derive(Default)]
struct DecompressorState {
    scratch: Option<ByteBuf>,
    header: Option<BlockHeader>,
    finished: bool,
}

/// Decode one block payload, checking length and checksum.
pub fn decode_block(pool: &BufferPool, header: &BlockHeader, payload: &[u8]) -> Result<ByteBuf> {
    let mut out = pool.allocate(header.original_len);
    match header.method {
        BlockMethod::Raw => out.put_slice(payload),
        BlockMethod::Lz4 => {
            let dst = &mut out.write_slice_mut()[..header.original_len];
            let n = decompress_into(payload, dst)
                .map_err(|e| StreamError::Corruption(format!("lz4 block: {}", e)))?;
            if n != header.original_len {
                return Err(StreamError::Corruption(format!(
                    "block decompressed to {} bytes, header says {}",
                    n, header.original_len
                )));
            }
            out.advance_write(n);
        }
    }
    if checksum(out.read_slice()) != header.checksum {
        return Err(StreamError::Corruption("block checksum mismatch".into()));
    }
    Ok(out)
}

pub struct StreamLz4Decompressor {
    core: TransformerCore<ByteBuf, ByteBuf>,
    outbox: Outbox<ByteBuf>,
    pool: BufferPool,
    state: RefCell<DecompressorState>,
    stats: Cell<DecompressorStats>,
}

impl StreamLz4Decompressor {
    pub fn new(eventloop: &EventLoopRef, pool: &BufferPool) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            core: TransformerCore::new(eventloop, this.clone()),
            outbox: Outbox::new(),
            pool: pool.clone(),
            state: RefCell::new(DecompressorState::default()),
            stats: Cell::new(DecompressorStats::default()),
        })
    }

    pub fn stats(&self) -> DecompressorStats {
        self.stats.get()
    }

    /// Accumulate `want` bytes across chunks. Returns true once they are all in scratch.
    fn fill_scratch(&self, st: &mut DecompressorState, buf: &mut ByteBuf, want: usize) -> bool {
        let scratch = st
            .scratch
            .take()
            .unwrap_or_else(|| self.pool.allocate(INITIAL_SCRATCH_SIZE.max(want)));
        let have = scratch.read_remaining();
        let take = (want - have).min(buf.read_remaining());
        let scratch = self.pool.ensure_write_remaining(scratch, want - have);
        let scratch = self.pool.append(scratch, &buf.read_slice()[..take]);
        buf.advance_read(take);
        let complete = scratch.read_remaining() == want;
        st.scratch = Some(scratch);
        complete
    }

    fn consume(&self, mut buf: ByteBuf) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let st = &mut *guard;
        let mut stats = self.stats.get();
        let start = buf.read_position();

        let result = (|| {
            while buf.can_read() {
                if st.finished {
                    return Err(StreamError::Corruption(
                        "data after end-of-stream block".into(),
                    ));
                }
                let scratch_empty = st.scratch.as_ref().map_or(true, |s| !s.can_read());
                match st.header {
                    None => {
                        let header = if scratch_empty && buf.read_remaining() >= HEADER_LEN {
                            let h = BlockHeader::parse(buf.read_slice())?;
                            buf.advance_read(HEADER_LEN);
                            h
                        } else if self.fill_scratch(st, &mut buf, HEADER_LEN) {
                            let scratch = st.scratch.as_mut().ok_or_else(|| {
                                StreamError::Protocol("block scratch missing".into())
                            })?;
                            let h = BlockHeader::parse(scratch.read_slice())?;
                            scratch.clear();
                            h
                        } else {
                            continue;
                        };
                        if header.is_end_of_stream() {
                            st.finished = true;
                            self.outbox.finish();
                        } else {
                            st.header = Some(header);
                        }
                    }
                    Some(header) => {
                        let need = header.compressed_len;
                        let block = if scratch_empty && buf.read_remaining() >= need {
                            let block = decode_block(&self.pool, &header, &buf.read_slice()[..need])?;
                            buf.advance_read(need);
                            block
                        } else if self.fill_scratch(st, &mut buf, need) {
                            let scratch = st.scratch.as_mut().ok_or_else(|| {
                                StreamError::Protocol("block scratch missing".into())
                            })?;
                            let block = decode_block(&self.pool, &header, scratch.read_slice())?;
                            scratch.clear();
                            block
                        } else {
                            continue;
                        };
                        st.header = None;
                        stats.blocks += 1;
                        stats.bytes_out += block.read_remaining() as u64;
                        self.outbox.push(block);
                    }
                }
            }
            Ok(())
        })();

        stats.input_position += (buf.read_position() - start) as u64;
        self.stats.set(stats);
        result
    }

    fn process(&self) {
        self.outbox.drain_to(&self.core.output);
        let status = self.core.output.status();
        if status.is_terminal() {
            if status == StreamStatus::EndOfStream {
                debug!(blocks = self.stats.get().blocks, "decompressor reached end-of-stream block");
            }
            self.cleanup();
        }
    }

    fn fail(&self, err: StreamError) {
        if self.core.fail(err) {
            debug!("decompressor closed with error");
        }
        self.cleanup();
    }

    fn cleanup(&self) {
        let scratch = self.state.borrow_mut().scratch.take();
        drop(scratch);
        self.outbox.clear();
    }
}

impl StreamConsumer<ByteBuf> for StreamLz4Decompressor {
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
        let mut stats = self.stats.get();
        stats.bytes_in += buf.read_remaining() as u64;
        self.stats.set(stats);
        match self.consume(buf) {
            Ok(()) => self.process(),
            Err(err) => self.fail(err),
        }
    }

    /// Output ends at the sentinel block, not at upstream end-of-stream.
    /// Upstream ending first is reported as `Corruption` rather than a clean
    /// end, so a truncated stream never passes for a complete one.
    fn on_end_of_stream(&self) {
        if !self.core.input.end_of_stream() {
            return;
        }
        if !self.state.borrow().finished {
            self.fail(StreamError::Corruption(
                "stream ended without end-of-stream block".into(),
            ));
        }
    }

    fn on_error(&self, err: StreamError) {
        self.fail(err);
    }
}

impl StreamProducer<ByteBuf> for StreamLz4Decompressor {
    fn producer_status(&self) -> StreamStatus {
        self.core.output.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<ByteBuf>>) {
        self.core.bind_consumer(consumer);
    }

    fn produce(&self) {
        self.process();
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
