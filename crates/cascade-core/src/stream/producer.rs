use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::StreamError;
use crate::eventloop::EventLoopRef;
use crate::status::StreamStatus;

use super::{StreamConsumer, StreamProducer};

/// Producer half of an edge: status, downstream reference and produce scheduling.
pub struct ProducerCore<T> {
    status: Cell<StreamStatus>,
    consumer: RefCell<Option<Rc<dyn StreamConsumer<T>>>>,
    error: RefCell<Option<StreamError>>,
    eventloop: EventLoopRef,
    this: Weak<dyn StreamProducer<T>>,
    produce_posted: Rc<Cell<bool>>,
}

impl<T: 'static> ProducerCore<T> {
    /// `this` points back at the owning producer so `produce()` can be posted.
    pub fn new(eventloop: &EventLoopRef, this: Weak<dyn StreamProducer<T>>) -> Self {
        Self {
            status: Cell::new(StreamStatus::Created),
            consumer: RefCell::new(None),
            error: RefCell::new(None),
            eventloop: eventloop.clone(),
            this,
            produce_posted: Rc::new(Cell::new(false)),
        }
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

    pub fn eventloop(&self) -> &EventLoopRef {
        &self.eventloop
    }

    pub fn error(&self) -> Option<StreamError> {
        self.error.borrow().clone()
    }

    /// Attach downstream. Returns true when the edge became `Ready`.
    ///
    /// A producer that already ended delivers its terminal signal on the next turn.
    pub fn bind(&self, consumer: Rc<dyn StreamConsumer<T>>) -> bool {
        debug_assert!(self.consumer.borrow().is_none(), "producer bound twice");
        let status = self.status.get();
        if status.is_terminal() {
            let err = self.error.borrow().clone();
            self.eventloop.post(Box::new(move || match err {
                Some(err) => consumer.on_error(err),
                None => consumer.on_end_of_stream(),
            }));
            return false;
        }
        *self.consumer.borrow_mut() = Some(consumer);
        if status == StreamStatus::Created {
            self.status.set(StreamStatus::Ready);
            self.schedule_produce();
            return true;
        }
        false
    }

    /// Deliver one item. Callers check `is_ready()` first.
    pub fn send(&self, item: T) {
        debug_assert!(
            self.is_ready(),
            "item sent while producer is {:?}",
            self.status.get()
        );
        if !self.is_ready() {
            return;
        }
        let consumer = self.consumer.borrow().clone();
        if let Some(consumer) = consumer {
            consumer.on_data(item);
        }
    }

    pub fn suspend(&self) -> bool {
        if self.status.get() != StreamStatus::Ready {
            return false;
        }
        self.status.set(StreamStatus::Suspended);
        true
    }

    pub fn resume(&self) -> bool {
        if self.status.get() != StreamStatus::Suspended {
            return false;
        }
        self.status.set(StreamStatus::Ready);
        self.schedule_produce();
        true
    }

    /// Post at most one pending `produce()` call.
    pub fn schedule_produce(&self) {
        if self.produce_posted.replace(true) {
            return;
        }
        let posted = self.produce_posted.clone();
        let this = self.this.clone();
        self.eventloop.post(Box::new(move || {
            posted.set(false);
            if let Some(producer) = this.upgrade() {
                producer.produce();
            }
        }));
    }

    pub fn send_end_of_stream(&self) -> bool {
        if self.status.get().is_terminal() {
            return false;
        }
        self.status.set(StreamStatus::EndOfStream);
        let consumer = self.consumer.borrow_mut().take();
        if let Some(consumer) = consumer {
            consumer.on_end_of_stream();
        }
        true
    }

    /// Move to `ClosedWithError` and tell the consumer. Only the first call acts.
    pub fn close_with_error(&self, err: StreamError) -> bool {
        if self.status.get().is_closed() {
            return false;
        }
        self.status.set(StreamStatus::ClosedWithError);
        *self.error.borrow_mut() = Some(err.clone());
        let consumer = self.consumer.borrow_mut().take();
        if let Some(consumer) = consumer {
            consumer.on_error(err);
        }
        true
    }
}
