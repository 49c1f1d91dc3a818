//! Output endpoint of a fan-out operator.

use std::rc::{Rc, Weak};

use cascade_core::error::StreamError;
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{ConsumerCore, ProducerCore, StreamConsumer, StreamProducer};

/// Callbacks from an [`OutputPort`] to the operator that owns it.
pub(crate) trait OutputHooks {
    /// The port became ready, or was asked to produce.
    fn output_ready(&self);

    fn output_suspended(&self);

    fn output_failed(&self, err: StreamError);
}

pub struct OutputPort<T> {
    pub(crate) core: ProducerCore<T>,
    index: usize,
    owner: Weak<dyn OutputHooks>,
}

impl<T: 'static> OutputPort<T> {
    pub(crate) fn new(eventloop: &EventLoopRef, index: usize, owner: Weak<dyn OutputHooks>) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            core: ProducerCore::new(eventloop, this.clone()),
            index,
            owner,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T: 'static> StreamProducer<T> for OutputPort<T> {
    fn producer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<T>>) {
        self.core.bind(consumer);
    }

    fn produce(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.output_ready();
        }
    }

    fn suspend(&self) {
        if self.core.suspend() {
            if let Some(owner) = self.owner.upgrade() {
                owner.output_suspended();
            }
        }
    }

    fn resume(&self) {
        self.core.resume();
    }

    fn close_with_error(&self, err: StreamError) {
        if let Some(owner) = self.owner.upgrade() {
            owner.output_failed(err);
        }
    }
}

pub(crate) fn all_ready<T: 'static>(ports: &[Rc<OutputPort<T>>]) -> bool {
    ports.iter().all(|port| port.core.is_ready())
}

/// A new port is never ready, so the input is held back until it is bound.
/// A port added after the input finished inherits that terminal state.
pub(crate) fn admit<T: 'static>(input: &ConsumerCore<T>, port: &OutputPort<T>) {
    match input.status() {
        StreamStatus::EndOfStream | StreamStatus::Closed => {
            port.core.send_end_of_stream();
        }
        StreamStatus::ClosedWithError => {
            if let Some(err) = input.error() {
                port.core.close_with_error(err);
            }
        }
        _ => input.suspend(),
    }
}
