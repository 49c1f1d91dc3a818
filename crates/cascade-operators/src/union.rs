//! N inputs forwarded to one output in arrival order.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use cascade_core::error::StreamError;
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{ConsumerCore, ProducerCore, StreamConsumer, StreamProducer};
use tracing::debug;

pub struct StreamUnion<T> {
    output: ProducerCore<T>,
    inputs: RefCell<Vec<Weak<UnionInput<T>>>>,
}

impl<T: 'static> StreamUnion<T> {
    pub fn new(eventloop: &EventLoopRef) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            output: ProducerCore::new(eventloop, this.clone()),
            inputs: RefCell::new(Vec::new()),
        })
    }

    pub fn new_input(self: &Rc<Self>) -> Rc<UnionInput<T>> {
        let input = Rc::new(UnionInput {
            core: ConsumerCore::new(),
            union: self.clone(),
        });
        self.inputs.borrow_mut().push(Rc::downgrade(&input));
        input
    }

    pub fn input_count(&self) -> usize {
        self.inputs.borrow().len()
    }

    fn live_inputs(&self) -> Vec<Rc<UnionInput<T>>> {
        self.inputs.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    /// Ended inputs may already be dropped; only live ones can still send.
    fn all_ended(&self) -> bool {
        self.live_inputs()
            .iter()
            .all(|input| input.core.is_end_of_stream())
    }

    fn input_ended(&self) {
        if self.all_ended() && self.output.send_end_of_stream() {
            debug!(inputs = self.input_count(), "union inputs ended");
        }
    }

    fn fail(&self, err: StreamError) {
        let downstream = self.output.close_with_error(err.clone());
        for input in self.live_inputs() {
            input.core.close_with_error(err.clone());
        }
        if downstream {
            debug!(error = %err, "union closed with error");
        }
    }
}

impl<T: 'static> StreamProducer<T> for StreamUnion<T> {
    fn producer_status(&self) -> StreamStatus {
        self.output.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<T>>) {
        self.output.bind(consumer);
    }

    fn produce(&self) {
        if !self.output.is_ready() {
            return;
        }
        if self.all_ended() {
            self.output.send_end_of_stream();
            return;
        }
        for input in self.live_inputs() {
            input.core.resume();
        }
    }

    fn suspend(&self) {
        if self.output.suspend() {
            for input in self.live_inputs() {
                input.core.suspend();
            }
        }
    }

    fn resume(&self) {
        self.output.resume();
    }

    fn close_with_error(&self, err: StreamError) {
        self.fail(err);
    }
}

pub struct UnionInput<T> {
    core: ConsumerCore<T>,
    union: Rc<StreamUnion<T>>,
}

impl<T: 'static> StreamConsumer<T> for UnionInput<T> {
    fn consumer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<T>>) {
        self.core.bind(producer);
        if !self.union.output.is_ready() {
            self.core.suspend();
        }
    }

    fn on_data(&self, item: T) {
        if self.core.accept_data() {
            self.union.output.send(item);
        }
    }

    fn on_end_of_stream(&self) {
        if self.core.end_of_stream() {
            self.union.input_ended();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.union.fail(err);
    }
}
