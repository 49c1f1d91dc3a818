//! Per-item transform.

use std::rc::{Rc, Weak};

use cascade_core::error::StreamError;
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{StreamConsumer, StreamProducer, TransformerCore};

pub struct StreamMap<I, O> {
    core: TransformerCore<I, O>,
    f: Box<dyn Fn(I) -> O>,
}

impl<I: 'static, O: 'static> StreamMap<I, O> {
    pub fn new(eventloop: &EventLoopRef, f: impl Fn(I) -> O + 'static) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            core: TransformerCore::new(eventloop, this.clone()),
            f: Box::new(f),
        })
    }
}

impl<I: 'static, O: 'static> StreamConsumer<I> for StreamMap<I, O> {
    fn consumer_status(&self) -> StreamStatus {
        self.core.input.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<I>>) {
        self.core.bind_producer(producer);
    }

    fn on_data(&self, item: I) {
        if self.core.input.accept_data() {
            self.core.output.send((self.f)(item));
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

impl<I: 'static, O: 'static> StreamProducer<O> for StreamMap<I, O> {
    fn producer_status(&self) -> StreamStatus {
        self.core.output.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<O>>) {
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
