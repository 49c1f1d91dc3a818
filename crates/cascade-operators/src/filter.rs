//! Drops items that fail a predicate.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use cascade_core::error::StreamError;
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{StreamConsumer, StreamProducer, TransformerCore};

pub struct StreamFilter<T> {
    core: TransformerCore<T, T>,
    predicate: Box<dyn Fn(&T) -> bool>,
    dropped: Cell<u64>,
}

impl<T: 'static> StreamFilter<T> {
    pub fn new(eventloop: &EventLoopRef, predicate: impl Fn(&T) -> bool + 'static) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            core: TransformerCore::new(eventloop, this.clone()),
            predicate: Box::new(predicate),
            dropped: Cell::new(0),
        })
    }

    /// Items rejected so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

impl<T: 'static> StreamConsumer<T> for StreamFilter<T> {
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
        if (self.predicate)(&item) {
            self.core.output.send(item);
        } else {
            self.dropped.set(self.dropped.get() + 1);
        }
    }

    fn on_end_of_stream(&self) {
        if self.core.input.end_of_stream() {
            self.core.output.send_end_of_stream();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.core.fail(err);
    }
}

impl<T: 'static> StreamProducer<T> for StreamFilter<T> {
    fn producer_status(&self) -> StreamStatus {
        self.core.output.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<T>>) {
        self.core.bind_consumer(consumer);
    }

    fn produce(&self) {}

    fn suspend(&self) {
        self.core.suspend();
    }

    fn resume(&self) {
        self.core.resume();
    }

    fn close_with_error(&self, err: StreamError) {
        self.core.fail(err);
    }
}
