//! Sink endpoints.

use std::cell::RefCell;
use std::rc::Rc;

use crate::completion::StreamCompletion;
use crate::error::StreamError;
use crate::status::StreamStatus;
use crate::stream::{ConsumerCore, StreamConsumer, StreamProducer};

/// Collects every item and completes on end-of-stream.
pub struct ToListConsumer<T> {
    core: ConsumerCore<T>,
    items: RefCell<Vec<T>>,
    completion: StreamCompletion,
}

pub fn to_list<T: 'static>() -> Rc<ToListConsumer<T>> {
    Rc::new(ToListConsumer {
        core: ConsumerCore::new(),
        items: RefCell::new(Vec::new()),
        completion: StreamCompletion::new(),
    })
}

impl<T> ToListConsumer<T> {
    pub fn completion(&self) -> StreamCompletion {
        self.completion.clone()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn take_items(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.borrow_mut())
    }

    pub fn suspend(&self) {
        self.core.suspend();
    }

    pub fn resume(&self) {
        self.core.resume();
    }

    /// Fail from the sink side.
    pub fn fail(&self, err: StreamError) {
        self.items.borrow_mut().clear();
        if self.core.close_with_error(err.clone()) {
            self.completion.fail(err);
        }
    }
}

impl<T: Clone> ToListConsumer<T> {
    pub fn items(&self) -> Vec<T> {
        self.items.borrow().clone()
    }
}

impl<T> StreamConsumer<T> for ToListConsumer<T> {
    fn consumer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<T>>) {
        self.core.bind(producer);
    }

    fn on_data(&self, item: T) {
        if self.core.accept_data() {
            self.items.borrow_mut().push(item);
        }
    }

    fn on_end_of_stream(&self) {
        if self.core.end_of_stream() {
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
