use std::rc::{Rc, Weak};

use crate::error::StreamError;
use crate::eventloop::EventLoopRef;

use super::{ConsumerCore, ProducerCore, StreamConsumer, StreamProducer};

/// Both halves of a one-input, one-output operator.
///
/// Demand is mirrored: the input is suspended whenever the output is not
/// ready, so pure per-item transforms never need to buffer.
pub struct TransformerCore<I, O> {
    pub input: ConsumerCore<I>,
    pub output: ProducerCore<O>,
}

impl<I: 'static, O: 'static> TransformerCore<I, O> {
    pub fn new(eventloop: &EventLoopRef, this: Weak<dyn StreamProducer<O>>) -> Self {
        Self {
            input: ConsumerCore::new(),
            output: ProducerCore::new(eventloop, this),
        }
    }

    pub fn bind_producer(&self, producer: Rc<dyn StreamProducer<I>>) {
        self.input.bind(producer);
        if !self.output.is_ready() {
            self.input.suspend();
        }
    }

    /// Returns true when the output became ready.
    pub fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<O>>) -> bool {
        if self.output.bind(consumer) {
            self.input.resume();
            return true;
        }
        false
    }

    pub fn suspend(&self) {
        if self.output.suspend() {
            self.input.suspend();
        }
    }

    pub fn resume(&self) {
        if self.output.resume() {
            self.input.resume();
        }
    }

    /// Close both sides; whichever side reported the error ignores the echo.
    pub fn fail(&self, err: StreamError) -> bool {
        let downstream = self.output.close_with_error(err.clone());
        let upstream = self.input.close_with_error(err);
        downstream || upstream
    }

    pub fn is_failed(&self) -> bool {
        self.output.error().is_some() || self.input.error().is_some()
    }
}
