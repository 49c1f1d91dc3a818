//! Length-prefixed binary chunks back to items.
//!
//! Incoming chunks are queued (at most `deserializer_queue_len` of them) and
//! parsed only while the consumer is ready. A record that straddles chunks is
//! collected in a scratch buffer; the length prefix itself may straddle too.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use cascade_core::config::FramingConfig;
use cascade_core::error::{Result, StreamError};
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{StreamConsumer, StreamProducer, TransformerCore};
use cascade_mem::{BufferPool, ByteBuf};
use tracing::debug;

use crate::codec::ByteCodec;
use crate::varint;

const INITIAL_SCRATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeserializerStats {
    pub items: u64,
    pub buffers_in: u64,
    pub bytes_in: u64,
}

#[derive(Default)]
struct DeserializerState {
    queue: VecDeque<ByteBuf>,
    /// Bytes of a prefix or body that started in an earlier chunk.
    scratch: Option<ByteBuf>,
    /// Body length once the prefix has been parsed.
    body_len: Option<usize>,
}

impl DeserializerState {
    fn scratch_len(&self) -> usize {
        self.scratch.as_ref().map_or(0, |s| s.read_remaining())
    }

    fn has_partial_record(&self) -> bool {
        self.body_len.is_some() || self.scratch_len() > 0
    }
}

pub struct StreamDeserializer<T> {
    core: TransformerCore<ByteBuf, T>,
    codec: Rc<dyn ByteCodec<T>>,
    pool: BufferPool,
    max_message_size: usize,
    queue_len: usize,
    state: RefCell<DeserializerState>,
    stats: Cell<DeserializerStats>,
}

impl<T: 'static> StreamDeserializer<T> {
    pub fn new(
        eventloop: &EventLoopRef,
        pool: &BufferPool,
        codec: Rc<dyn ByteCodec<T>>,
        config: &FramingConfig,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            core: TransformerCore::new(eventloop, this.clone()),
            codec,
            pool: pool.clone(),
            max_message_size: config.max_message_size.clamp(1, varint::MAX_SIZE_3_BYTE),
            queue_len: config.deserializer_queue_len.max(1),
            state: RefCell::new(DeserializerState::default()),
            stats: Cell::new(DeserializerStats::default()),
        })
    }

    pub fn stats(&self) -> DeserializerStats {
        self.stats.get()
    }

    /// Hand every unparsed byte to `sink`, in stream order, and forget it.
    ///
    /// A record whose prefix was already consumed is re-prefixed, so the
    /// drained bytes form a valid framed stream on their own.
    pub fn drain_raw_buffers(&self, sink: &mut dyn FnMut(ByteBuf)) {
        let (head, queue) = {
            let mut st = self.state.borrow_mut();
            let scratch = st.scratch.take();
            let head = match (st.body_len.take(), scratch) {
                (Some(len), scratch) => {
                    let body = scratch.as_ref().map_or(&[][..], |s| s.read_slice());
                    let mut buf = self.pool.allocate(varint::MAX_HEADER_BYTES + body.len());
                    let width = varint::header_size(len).unwrap_or(varint::MAX_HEADER_BYTES);
                    varint::write_header(buf.write_slice_mut(), len, width);
                    buf.advance_write(width);
                    buf.put_slice(body);
                    Some(buf)
                }
                (None, Some(scratch)) if scratch.can_read() => Some(scratch),
                (None, _) => None,
            };
            (head, std::mem::take(&mut st.queue))
        };
        for buf in head.into_iter().chain(queue) {
            if buf.can_read() {
                sink(buf);
            }
        }
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_message_size {
            return Err(StreamError::Framing(format!(
                "record length {} exceeds max message size {}",
                len, self.max_message_size
            )));
        }
        Ok(())
    }

    fn decode_exact(&self, bytes: &[u8]) -> Result<T> {
        let (item, used) = self.codec.decode(bytes)?;
        if used != bytes.len() {
            return Err(StreamError::Framing(format!(
                "decoder used {} bytes of a {}-byte record",
                used,
                bytes.len()
            )));
        }
        Ok(item)
    }

    /// Parse the next complete record, if the queued bytes hold one.
    fn next_item(&self) -> Result<Option<T>> {
        let mut guard = self.state.borrow_mut();
        let st = &mut *guard;
        loop {
            if let Some(len) = st.body_len {
                if st.scratch_len() == len {
                    let item = match st.scratch.as_mut() {
                        Some(scratch) => {
                            let item = self.decode_exact(scratch.read_slice())?;
                            scratch.clear();
                            item
                        }
                        None => self.decode_exact(&[])?,
                    };
                    st.body_len = None;
                    return Ok(Some(item));
                }
            }

            let Some(front) = st.queue.front_mut() else {
                return Ok(None);
            };
            if !front.can_read() {
                st.queue.pop_front();
                continue;
            }

            match st.body_len {
                None if st.scratch.as_ref().map_or(true, |s| !s.can_read()) => {
                    match varint::read_header(front.read_slice())? {
                        Some((len, used)) => {
                            front.advance_read(used);
                            self.check_len(len)?;
                            st.body_len = Some(len);
                        }
                        None => {
                            let n = front.read_remaining();
                            let scratch = st
                                .scratch
                                .take()
                                .unwrap_or_else(|| self.pool.allocate(INITIAL_SCRATCH_SIZE));
                            st.scratch = Some(self.pool.append(scratch, front.read_slice()));
                            front.advance_read(n);
                        }
                    }
                }
                None => {
                    let have = st.scratch.as_ref().map_or(0, |s| s.read_remaining());
                    let take = (varint::MAX_HEADER_BYTES - have).min(front.read_remaining());
                    let scratch = st
                        .scratch
                        .take()
                        .unwrap_or_else(|| self.pool.allocate(INITIAL_SCRATCH_SIZE));
                    let mut scratch = self.pool.append(scratch, &front.read_slice()[..take]);
                    front.advance_read(take);
                    let parsed = varint::read_header(scratch.read_slice());
                    match parsed {
                        Ok(Some((len, used))) => {
                            // Only bytes taken from `front` can be left over.
                            front.rewind_read(have + take - used);
                            scratch.clear();
                            st.scratch = Some(scratch);
                            self.check_len(len)?;
                            st.body_len = Some(len);
                        }
                        Ok(None) => st.scratch = Some(scratch),
                        Err(e) => {
                            st.scratch = Some(scratch);
                            return Err(e);
                        }
                    }
                }
                Some(len) => {
                    let have = st.scratch.as_ref().map_or(0, |s| s.read_remaining());
                    if have == 0 && front.read_remaining() >= len {
                        let item = self.decode_exact(&front.read_slice()[..len])?;
                        front.advance_read(len);
                        st.body_len = None;
                        return Ok(Some(item));
                    }
                    let take = (len - have).min(front.read_remaining());
                    let scratch = st
                        .scratch
                        .take()
                        .unwrap_or_else(|| self.pool.allocate(len.max(INITIAL_SCRATCH_SIZE)));
                    let scratch = self.pool.ensure_write_remaining(scratch, len - have);
                    st.scratch = Some(self.pool.append(scratch, &front.read_slice()[..take]));
                    front.advance_read(take);
                }
            }
        }
    }

    fn process(&self) {
        while self.core.output.is_ready() {
            match self.next_item() {
                Ok(Some(item)) => {
                    self.bump(|s| s.items += 1);
                    self.core.output.send(item);
                }
                Ok(None) => break,
                Err(err) => {
                    self.fail(err);
                    return;
                }
            }
        }

        let (queued, partial) = {
            let st = self.state.borrow();
            (st.queue.len(), st.has_partial_record())
        };
        if self.core.input.is_end_of_stream() && queued == 0 {
            if partial {
                self.fail(StreamError::Framing(
                    "stream ended inside a framed record".into(),
                ));
                return;
            }
            debug!(items = self.stats.get().items, "deserializer finished");
            self.core.output.send_end_of_stream();
            self.cleanup();
        } else if self.core.output.is_ready() && queued < self.queue_len {
            self.core.input.resume();
        }
    }

    fn bump(&self, f: impl FnOnce(&mut DeserializerStats)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    fn fail(&self, err: StreamError) {
        if self.core.fail(err) {
            debug!("deserializer closed with error");
        }
        self.cleanup();
    }

    fn cleanup(&self) {
        let st = std::mem::take(&mut *self.state.borrow_mut());
        drop(st);
    }
}

impl<T: 'static> StreamConsumer<ByteBuf> for StreamDeserializer<T> {
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
        let len = buf.read_remaining();
        self.bump(|s| {
            s.buffers_in += 1;
            s.bytes_in += len as u64;
        });
        if len == 0 {
            return;
        }
        let queued = {
            let mut st = self.state.borrow_mut();
            st.queue.push_back(buf);
            st.queue.len()
        };
        if queued >= self.queue_len {
            self.core.input.suspend();
        }
        if self.core.output.is_ready() {
            self.process();
        }
    }

    fn on_end_of_stream(&self) {
        if self.core.input.end_of_stream() {
            self.process();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.fail(err);
    }
}

impl<T: 'static> StreamProducer<T> for StreamDeserializer<T> {
    fn producer_status(&self) -> StreamStatus {
        self.core.output.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<T>>) {
        self.core.bind_consumer(consumer);
    }

    fn produce(&self) {
        if self.core.output.is_ready() {
            self.process();
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
