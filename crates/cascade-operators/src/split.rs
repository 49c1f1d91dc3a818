//! One input copied to every output, paced by the slowest output.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use cascade_core::error::StreamError;
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{ConsumerCore, StreamConsumer, StreamProducer};
use tracing::debug;

use crate::port::{admit, all_ready, OutputHooks, OutputPort};

pub struct StreamSplitter<T> {
    this: Weak<Self>,
    eventloop: EventLoopRef,
    input: ConsumerCore<T>,
    outputs: RefCell<Vec<Rc<OutputPort<T>>>>,
}

impl<T: Clone + 'static> StreamSplitter<T> {
    pub fn new(eventloop: &EventLoopRef) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            this: this.clone(),
            eventloop: eventloop.clone(),
            input: ConsumerCore::new(),
            outputs: RefCell::new(Vec::new()),
        })
    }

    pub fn new_output(&self) -> Rc<OutputPort<T>> {
        let index = self.outputs.borrow().len();
        let owner: Weak<dyn OutputHooks> = self.this.clone();
        let port = OutputPort::new(&self.eventloop, index, owner);
        self.outputs.borrow_mut().push(port.clone());
        admit(&self.input, &port);
        port
    }

    pub fn output_count(&self) -> usize {
        self.outputs.borrow().len()
    }

    fn ports(&self) -> Vec<Rc<OutputPort<T>>> {
        self.outputs.borrow().clone()
    }

    fn fail(&self, err: StreamError) {
        let upstream = self.input.close_with_error(err.clone());
        for port in self.ports() {
            port.core.close_with_error(err.clone());
        }
        if upstream {
            debug!(error = %err, "splitter closed with error");
        }
    }
}

impl<T: Clone + 'static> OutputHooks for StreamSplitter<T> {
    fn output_ready(&self) {
        if all_ready(&self.ports()) {
            self.input.resume();
        }
    }

    fn output_suspended(&self) {
        self.input.suspend();
    }

    fn output_failed(&self, err: StreamError) {
        self.fail(err);
    }
}

impl<T: Clone + 'static> StreamConsumer<T> for StreamSplitter<T> {
    fn consumer_status(&self) -> StreamStatus {
        self.input.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<T>>) {
        self.input.bind(producer);
        if !all_ready(&self.ports()) {
            self.input.suspend();
        }
    }

    fn on_data(&self, item: T) {
        if !self.input.accept_data() {
            return;
        }
        let ports = self.ports();
        if let Some((last, rest)) = ports.split_last() {
            for port in rest {
                if port.core.is_ready() {
                    port.core.send(item.clone());
                }
            }
            if last.core.is_ready() {
                last.core.send(item);
            }
        }
        if !all_ready(&ports) {
            self.input.suspend();
        }
    }

    fn on_end_of_stream(&self) {
        if !self.input.end_of_stream() {
            return;
        }
        for port in self.ports() {
            port.core.send_end_of_stream();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.fail(err);
    }
}
