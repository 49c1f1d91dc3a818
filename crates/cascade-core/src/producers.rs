//! Source endpoints.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::StreamError;
use crate::eventloop::EventLoopRef;
use crate::status::StreamStatus;
use crate::stream::{ProducerCore, StreamConsumer, StreamProducer};

/// Emits the items of an iterator, then end-of-stream or a terminal error.
pub struct IterProducer<T> {
    core: ProducerCore<T>,
    iter: RefCell<Box<dyn Iterator<Item = T>>>,
    terminal_error: RefCell<Option<StreamError>>,
    sent: Cell<u64>,
}

impl<T: 'static> IterProducer<T> {
    fn create(
        eventloop: &EventLoopRef,
        iter: Box<dyn Iterator<Item = T>>,
        terminal_error: Option<StreamError>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            core: ProducerCore::new(eventloop, this.clone()),
            iter: RefCell::new(iter),
            terminal_error: RefCell::new(terminal_error),
            sent: Cell::new(0),
        })
    }

    /// Items delivered so far.
    pub fn sent(&self) -> u64 {
        self.sent.get()
    }
}

impl<T: 'static> StreamProducer<T> for IterProducer<T> {
    fn producer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<T>>) {
        self.core.bind(consumer);
    }

    fn produce(&self) {
        while self.core.is_ready() {
            let next = self.iter.borrow_mut().next();
            match next {
                Some(item) => {
                    self.sent.set(self.sent.get() + 1);
                    self.core.send(item);
                }
                None => {
                    let err = self.terminal_error.borrow_mut().take();
                    match err {
                        Some(err) => self.core.close_with_error(err),
                        None => self.core.send_end_of_stream(),
                    };
                    break;
                }
            }
        }
    }

    fn suspend(&self) {
        self.core.suspend();
    }

    fn resume(&self) {
        self.core.resume();
    }

    fn close_with_error(&self, err: StreamError) {
        if self.core.close_with_error(err) {
            *self.iter.borrow_mut() = Box::new(std::iter::empty());
        }
    }
}

/// Never produces; ends only when closed from downstream.
pub struct IdleProducer<T> {
    core: ProducerCore<T>,
}

impl<T: 'static> StreamProducer<T> for IdleProducer<T> {
    fn producer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<T>>) {
        self.core.bind(consumer);
    }

    fn produce(&self) {}

    fn suspend(&self) {
        self.core.suspend();
    }

    fn resume(&self) {
        self.core.resume();
    }

    fn close_with_error(&self, err: StreamError) {
        self.core.close_with_error(err);
    }
}

pub fn of_iter<T, I>(eventloop: &EventLoopRef, items: I) -> Rc<IterProducer<T>>
where
    T: 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: 'static,
{
    IterProducer::create(eventloop, Box::new(items.into_iter()), None)
}

/// Emits `items`, then fails with `err` instead of ending.
pub fn of_iter_then_error<T, I>(
    eventloop: &EventLoopRef,
    items: I,
    err: StreamError,
) -> Rc<IterProducer<T>>
where
    T: 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: 'static,
{
    IterProducer::create(eventloop, Box::new(items.into_iter()), Some(err))
}

pub fn closing_with_error<T: 'static>(
    eventloop: &EventLoopRef,
    err: StreamError,
) -> Rc<IterProducer<T>> {
    IterProducer::create(eventloop, Box::new(std::iter::empty()), Some(err))
}

pub fn end_of_stream<T: 'static>(eventloop: &EventLoopRef) -> Rc<IterProducer<T>> {
    IterProducer::create(eventloop, Box::new(std::iter::empty()), None)
}

pub fn idle<T: 'static>(eventloop: &EventLoopRef) -> Rc<IdleProducer<T>> {
    Rc::new_cyclic(|this: &Weak<IdleProducer<T>>| IdleProducer {
        core: ProducerCore::new(eventloop, this.clone()),
    })
}
