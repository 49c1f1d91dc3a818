use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::StreamError;
use crate::status::StreamStatus;

use super::StreamProducer;

/// Consumer half of an edge: status and upstream reference.
pub struct ConsumerCore<T> {
    status: Cell<StreamStatus>,
    producer: RefCell<Option<Rc<dyn StreamProducer<T>>>>,
    error: RefCell<Option<StreamError>>,
}

impl<T> Default for ConsumerCore<T> {
    fn default() -> Self {
        Self {
            status: Cell::new(StreamStatus::Created),
            producer: RefCell::new(None),
            error: RefCell::new(None),
        }
    }
}

impl<T> ConsumerCore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StreamStatus {
        self.status.get()
    }

    pub fn is_ready(&self) -> bool {
        self.status.get() == StreamStatus::Ready
    }

    pub fn is_open(&self) -> bool {
        self.status.get().is_open()
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.status.get() == StreamStatus::EndOfStream
    }

    pub fn error(&self) -> Option<StreamError> {
        self.error.borrow().clone()
    }

    fn producer(&self) -> Option<Rc<dyn StreamProducer<T>>> {
        self.producer.borrow().clone()
    }

    /// Attach upstream, honouring a suspension requested before binding.
    pub fn bind(&self, producer: Rc<dyn StreamProducer<T>>) {
        debug_assert!(self.producer.borrow().is_none(), "consumer bound twice");
        match self.status.get() {
            StreamStatus::Created => {
                self.status.set(StreamStatus::Ready);
                *self.producer.borrow_mut() = Some(producer);
            }
            StreamStatus::Ready => {
                *self.producer.borrow_mut() = Some(producer);
            }
            StreamStatus::Suspended => {
                *self.producer.borrow_mut() = Some(producer.clone());
                producer.suspend();
            }
            StreamStatus::ClosedWithError => {
                if let Some(err) = self.error() {
                    producer.close_with_error(err);
                }
            }
            StreamStatus::EndOfStream | StreamStatus::Closed => {}
        }
    }

    pub fn suspend(&self) {
        match self.status.get() {
            StreamStatus::Created | StreamStatus::Ready => {
                self.status.set(StreamStatus::Suspended);
                if let Some(producer) = self.producer() {
                    producer.suspend();
                }
            }
            _ => {}
        }
    }

    pub fn resume(&self) {
        if self.status.get() != StreamStatus::Suspended {
            return;
        }
        self.status.set(StreamStatus::Ready);
        if let Some(producer) = self.producer() {
            producer.resume();
        }
    }

    /// Gate for `on_data`; a delivery outside `Ready` breaks the protocol.
    pub fn accept_data(&self) -> bool {
        let status = self.status.get();
        debug_assert!(
            status == StreamStatus::Ready || status.is_closed(),
            "on_data while consumer is {:?}",
            status
        );
        status == StreamStatus::Ready
    }

    /// Returns true on the first end-of-stream; the producer is released.
    pub fn end_of_stream(&self) -> bool {
        let status = self.status.get();
        debug_assert!(
            status != StreamStatus::EndOfStream,
            "end of stream delivered twice"
        );
        if status.is_terminal() {
            return false;
        }
        self.status.set(StreamStatus::EndOfStream);
        self.producer.borrow_mut().take();
        true
    }

    /// Terminal clean state for sinks that have delivered their result.
    pub fn close(&self) -> bool {
        if self.status.get().is_closed() {
            return false;
        }
        self.status.set(StreamStatus::Closed);
        self.producer.borrow_mut().take();
        true
    }

    /// Move to `ClosedWithError` and tell the producer. Only the first call acts.
    pub fn close_with_error(&self, err: StreamError) -> bool {
        if self.status.get().is_closed() {
            return false;
        }
        self.status.set(StreamStatus::ClosedWithError);
        *self.error.borrow_mut() = Some(err.clone());
        let producer = self.producer.borrow_mut().take();
        if let Some(producer) = producer {
            producer.close_with_error(err);
        }
        true
    }
}
