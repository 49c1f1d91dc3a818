//! Items to length-prefixed binary chunks.
//!
//! Each record is `varint(len) | body`. The prefix width is fixed by the
//! configured max message size so its room can be reserved before encoding.
//! Buffers are sized from a running estimate of the message size; a codec
//! that runs out of room triggers a bigger buffer and a retry. Partially
//! filled buffers are flushed once per batch, on the next event loop turn or
//! after the configured delay.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use cascade_core::config::FramingConfig;
use cascade_core::error::{Result, StreamError};
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{Outbox, StreamConsumer, StreamProducer, TransformerCore};
use cascade_mem::{BufferPool, ByteBuf};
use tracing::{debug, warn};

use crate::codec::{ByteCodec, CodecError};
use crate::varint;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializerStats {
    pub items: u64,
    pub buffers_out: u64,
    /// Encodes retried because the estimate left too little room.
    pub under_estimates: u64,
    /// Buffers sent because the next message did not fit.
    pub full_buffers: u64,
    pub overflows: u64,
    /// Items dropped under `skip_serialization_errors`.
    pub skipped: u64,
}

struct SerializerState {
    buf: Option<ByteBuf>,
    estimated_message_size: usize,
    flush_posted: bool,
}

pub struct StreamSerializer<T> {
    this: Weak<Self>,
    core: TransformerCore<T, ByteBuf>,
    outbox: Outbox<ByteBuf>,
    codec: Rc<dyn ByteCodec<T>>,
    pool: BufferPool,
    initial_buffer_size: usize,
    max_message_size: usize,
    header_size: usize,
    flush_delay: Option<Duration>,
    skip_errors: bool,
    state: RefCell<SerializerState>,
    stats: Cell<SerializerStats>,
}

impl<T: 'static> StreamSerializer<T> {
    pub fn new(
        eventloop: &EventLoopRef,
        pool: &BufferPool,
        codec: Rc<dyn ByteCodec<T>>,
        config: &FramingConfig,
    ) -> Rc<Self> {
        let max_message_size = config.max_message_size.clamp(1, varint::MAX_SIZE_3_BYTE);
        let header_size = varint::header_size(max_message_size).unwrap_or(varint::MAX_HEADER_BYTES);
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            this: this.clone(),
            core: TransformerCore::new(eventloop, this.clone()),
            outbox: Outbox::new(),
            codec,
            pool: pool.clone(),
            initial_buffer_size: config.initial_buffer_size.max(1),
            max_message_size,
            header_size,
            flush_delay: config.flush_delay_ms.map(Duration::from_millis),
            skip_errors: config.skip_serialization_errors,
            state: RefCell::new(SerializerState {
                buf: None,
                estimated_message_size: 1,
                flush_posted: false,
            }),
            stats: Cell::new(SerializerStats::default()),
        })
    }

    pub fn stats(&self) -> SerializerStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut SerializerStats)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    /// Send the partially filled buffer now.
    pub fn flush(&self) {
        {
            let mut st = self.state.borrow_mut();
            st.flush_posted = false;
            if let Some(buf) = st.buf.take() {
                if buf.can_read() {
                    self.outbox.push(buf);
                }
            }
        }
        self.drain();
    }

    fn drain(&self) {
        let sent = self.outbox.drain_to(&self.core.output);
        if sent > 0 {
            self.bump(|s| s.buffers_out += sent as u64);
        }
    }

    fn post_flush(&self) {
        {
            let mut st = self.state.borrow_mut();
            if st.flush_posted {
                return;
            }
            st.flush_posted = true;
        }
        let this = self.this.clone();
        let task = Box::new(move || {
            if let Some(s) = this.upgrade() {
                if s.core.output.is_open() {
                    s.flush();
                }
            }
        });
        let eventloop = self.core.output.eventloop();
        match self.flush_delay {
            Some(delay) if !delay.is_zero() => eventloop.schedule(delay, task),
            _ => eventloop.post(task),
        }
    }

    /// Room a new buffer should offer for the current estimate.
    fn next_buffer_size(&self, estimate: usize) -> usize {
        self.initial_buffer_size
            .max(self.header_size + estimate + (estimate >> 2))
    }

    fn write_item(&self, item: &T) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let st = &mut *guard;
        loop {
            let needed = self.header_size + st.estimated_message_size;
            let has_room = st.buf.as_ref().map_or(false, |b| b.write_remaining() >= needed);
            if !has_room {
                if let Some(full) = st.buf.take() {
                    if full.can_read() {
                        self.bump(|s| s.full_buffers += 1);
                        self.outbox.push(full);
                    }
                }
                let size = self.next_buffer_size(st.estimated_message_size);
                st.buf = Some(self.pool.allocate(size));
            }
            let Some(buf) = st.buf.as_mut() else {
                continue;
            };

            let avail = buf.write_remaining() - self.header_size;
            let encoded = self
                .codec
                .encode(item, &mut buf.write_slice_mut()[self.header_size..]);
            match encoded {
                Ok(len) if len > self.max_message_size => {
                    self.bump(|s| s.overflows += 1);
                    return self.reject(StreamError::Framing(format!(
                        "message of {} bytes exceeds max message size {}",
                        len, self.max_message_size
                    )));
                }
                Ok(len) => {
                    varint::write_header(buf.write_slice_mut(), len, self.header_size);
                    buf.advance_write(self.header_size + len);

                    let grown = len + (len >> 2);
                    if grown > st.estimated_message_size {
                        st.estimated_message_size = grown;
                    } else {
                        st.estimated_message_size -= st.estimated_message_size >> 8;
                    }
                    self.bump(|s| s.items += 1);
                    return Ok(());
                }
                Err(CodecError::BufferTooSmall) if avail >= self.max_message_size => {
                    self.bump(|s| s.overflows += 1);
                    return self.reject(StreamError::Framing(format!(
                        "message exceeds max message size {}",
                        self.max_message_size
                    )));
                }
                Err(CodecError::BufferTooSmall) => {
                    self.bump(|s| s.under_estimates += 1);
                    st.estimated_message_size =
                        (avail + 1 + (avail >> 1)).min(self.max_message_size);
                }
                Err(e) => {
                    return self.reject(e.into());
                }
            }
        }
    }

    fn reject(&self, err: StreamError) -> Result<()> {
        if self.skip_errors {
            warn!(error = %err, "skipping item that failed to serialize");
            self.bump(|s| s.skipped += 1);
            return Ok(());
        }
        Err(err)
    }

    fn fail(&self, err: StreamError) {
        if self.core.fail(err) {
            debug!("serializer closed with error");
        }
        self.cleanup();
    }

    fn cleanup(&self) {
        let buf = self.state.borrow_mut().buf.take();
        drop(buf);
        self.outbox.clear();
    }
}

impl<T: 'static> StreamConsumer<T> for StreamSerializer<T> {
    fn consumer_status(&self) -> StreamStatus {
        self.core.input.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<T>>) {
        self.core.bind_producer(producer);
    }

    fn on_data(&self, item: T) {
        if !self.core.input.accept_data() {
            return;
        }
        if let Err(err) = self.write_item(&item) {
            self.fail(err);
            return;
        }
        if !self.outbox.is_empty() {
            self.drain();
        }
        self.post_flush();
    }

    fn on_end_of_stream(&self) {
        if !self.core.input.end_of_stream() {
            return;
        }
        debug!(items = self.stats.get().items, "serializer input ended");
        self.outbox.finish();
        self.flush();
        if self.core.output.status().is_terminal() {
            self.cleanup();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.fail(err);
    }
}

impl<T: 'static> StreamProducer<ByteBuf> for StreamSerializer<T> {
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
        if self.core.output.status().is_terminal() {
            self.cleanup();
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
