use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use super::ProducerCore;

/// Items an operator produced while its consumer could not take them.
///
/// Draining respects readiness; a requested end-of-stream is sent only after
/// the last queued item.
pub struct Outbox<T> {
    items: RefCell<VecDeque<T>>,
    end_requested: Cell<bool>,
}

impl<T> Default for Outbox<T> {
    fn default() -> Self {
        Self {
            items: RefCell::new(VecDeque::new()),
            end_requested: Cell::new(false),
        }
    }
}

impl<T: 'static> Outbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.items.borrow_mut().push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Send end-of-stream once everything queued has gone out.
    pub fn finish(&self) {
        self.end_requested.set(true);
    }

    pub fn is_finishing(&self) -> bool {
        self.end_requested.get()
    }

    /// Send queued items while `output` is ready. Returns the number sent.
    pub fn drain_to(&self, output: &ProducerCore<T>) -> usize {
        let mut sent = 0;
        while output.is_ready() {
            let next = self.items.borrow_mut().pop_front();
            match next {
                Some(item) => {
                    output.send(item);
                    sent += 1;
                }
                None => break,
            }
        }
        if self.end_requested.get() && self.is_empty() {
            output.send_end_of_stream();
        }
        sent
    }

    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.items.borrow_mut());
        drop(dropped);
    }
}
