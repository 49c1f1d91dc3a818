//! Content digest of a chunk stream.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cascade_core::completion::StreamCompletion;
use cascade_core::error::StreamError;
use cascade_core::hash::{ContentHasher, Hash256};
use cascade_core::status::StreamStatus;
use cascade_core::stream::{ConsumerCore, StreamConsumer, StreamProducer};
use cascade_mem::ByteBuf;

/// Hashes every byte it receives; the digest is available once the stream ends.
pub struct StreamDigest {
    core: ConsumerCore<ByteBuf>,
    hasher: RefCell<ContentHasher>,
    digest: Cell<Option<Hash256>>,
    completion: StreamCompletion,
}

impl StreamDigest {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            core: ConsumerCore::new(),
            hasher: RefCell::new(ContentHasher::new()),
            digest: Cell::new(None),
            completion: StreamCompletion::new(),
        })
    }

    pub fn completion(&self) -> StreamCompletion {
        self.completion.clone()
    }

    pub fn digest(&self) -> Option<Hash256> {
        self.digest.get()
    }

    pub fn bytes(&self) -> u64 {
        self.hasher.borrow().bytes()
    }
}

impl StreamConsumer<ByteBuf> for StreamDigest {
    fn consumer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<ByteBuf>>) {
        self.core.bind(producer);
    }

    fn on_data(&self, buf: ByteBuf) {
        if self.core.accept_data() {
            self.hasher.borrow_mut().update(buf.read_slice());
        }
    }

    fn on_end_of_stream(&self) {
        if self.core.end_of_stream() {
            self.digest.set(Some(self.hasher.borrow().finish()));
            self.core.close();
            self.completion.succeed();
        }
    }

    fn on_error(&self, err: StreamError) {
        if self.core.close_with_error(err.clone()) {
            self.completion.fail(err);
        }
    }
}
