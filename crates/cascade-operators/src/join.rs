//! Sort-merge join of two key-sorted inputs.
//!
//! Both cursors advance by key comparison. Equal keys call
//! [`Joiner::inner_join`] and consume the left item only, so several left
//! items can match one right item. A left key smaller than the right head,
//! or with the right side exhausted, calls [`Joiner::left_join`]. Right items
//! below the left head are skipped. Either side running dry before its
//! end-of-stream pauses the join until it delivers more.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use cascade_core::config::MergeConfig;
use cascade_core::error::StreamError;
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{ConsumerCore, ProducerCore, StreamConsumer, StreamProducer};
use serde::Serialize;
use tracing::debug;

/// Builds join output. `None` means the pair produces nothing.
pub trait Joiner<K, L, R, V> {
    fn inner_join(&self, key: &K, left: L, right: &R) -> Option<V>;

    /// Left item without a right match. Inner joins keep the default.
    fn left_join(&self, _key: &K, _left: L) -> Option<V> {
        None
    }
}

/// Suppresses the left-join output of the wrapped joiner.
pub struct InnerJoin<J>(pub J);

impl<K, L, R, V, J: Joiner<K, L, R, V>> Joiner<K, L, R, V> for InnerJoin<J> {
    fn inner_join(&self, key: &K, left: L, right: &R) -> Option<V> {
        self.0.inner_join(key, left, right)
    }
}

/// Joiner assembled from closures.
pub struct FnJoiner<F, G> {
    inner: F,
    left: G,
}

/// Inner and left join from two closures.
pub fn joiner<F, G>(inner: F, left: G) -> FnJoiner<F, G> {
    FnJoiner { inner, left }
}

impl<K, L, R, V, F, G> Joiner<K, L, R, V> for FnJoiner<F, G>
where
    F: Fn(&K, L, &R) -> Option<V>,
    G: Fn(&K, L) -> Option<V>,
{
    fn inner_join(&self, key: &K, left: L, right: &R) -> Option<V> {
        (self.inner)(key, left, right)
    }

    fn left_join(&self, key: &K, left: L) -> Option<V> {
        (self.left)(key, left)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    pub left_in: u64,
    pub right_in: u64,
    pub items_out: u64,
}

enum Step {
    Inner,
    LeftOnly,
    SkipRight,
    LeftDone,
    Wait,
}

pub struct StreamJoin<K, L, R, V> {
    output: ProducerCore<V>,
    left: ConsumerCore<L>,
    right: ConsumerCore<R>,
    left_items: RefCell<VecDeque<L>>,
    right_items: RefCell<VecDeque<R>>,
    left_key: Box<dyn Fn(&L) -> K>,
    right_key: Box<dyn Fn(&R) -> K>,
    joiner: Box<dyn Joiner<K, L, R, V>>,
    buffer_size: usize,
    stats: Cell<JoinStats>,
}

impl<K, L, R, V> StreamJoin<K, L, R, V>
where
    K: Ord + 'static,
    L: 'static,
    R: 'static,
    V: 'static,
{
    pub fn new(
        eventloop: &EventLoopRef,
        left_key: impl Fn(&L) -> K + 'static,
        right_key: impl Fn(&R) -> K + 'static,
        joiner: impl Joiner<K, L, R, V> + 'static,
    ) -> Rc<Self> {
        Self::with_config(eventloop, left_key, right_key, joiner, &MergeConfig::default())
    }

    pub fn with_config(
        eventloop: &EventLoopRef,
        left_key: impl Fn(&L) -> K + 'static,
        right_key: impl Fn(&R) -> K + 'static,
        joiner: impl Joiner<K, L, R, V> + 'static,
        config: &MergeConfig,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            output: ProducerCore::new(eventloop, this.clone()),
            left: ConsumerCore::new(),
            right: ConsumerCore::new(),
            left_items: RefCell::new(VecDeque::new()),
            right_items: RefCell::new(VecDeque::new()),
            left_key: Box::new(left_key),
            right_key: Box::new(right_key),
            joiner: Box::new(joiner),
            buffer_size: config.input_buffer_size.max(1),
            stats: Cell::new(JoinStats::default()),
        })
    }

    pub fn left_input(self: &Rc<Self>) -> Rc<JoinLeftInput<K, L, R, V>> {
        Rc::new(JoinLeftInput { join: self.clone() })
    }

    pub fn right_input(self: &Rc<Self>) -> Rc<JoinRightInput<K, L, R, V>> {
        Rc::new(JoinRightInput { join: self.clone() })
    }

    pub fn stats(&self) -> JoinStats {
        self.stats.get()
    }

    pub fn left_status(&self) -> StreamStatus {
        self.left.status()
    }

    pub fn right_status(&self) -> StreamStatus {
        self.right.status()
    }

    fn bump(&self, f: impl FnOnce(&mut JoinStats)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    fn left_done(&self) -> bool {
        self.left.is_end_of_stream() && self.left_items.borrow().is_empty()
    }

    fn next_step(&self) -> Step {
        let lefts = self.left_items.borrow();
        let rights = self.right_items.borrow();
        match (lefts.front(), rights.front()) {
            (Some(l), Some(r)) => match (self.left_key)(l).cmp(&(self.right_key)(r)) {
                Ordering::Less => Step::LeftOnly,
                Ordering::Equal => Step::Inner,
                Ordering::Greater => Step::SkipRight,
            },
            (Some(_), None) if self.right.is_end_of_stream() => Step::LeftOnly,
            (None, _) if self.left.is_end_of_stream() => Step::LeftDone,
            _ => Step::Wait,
        }
    }

    fn process(&self) {
        while self.output.is_ready() {
            let out = match self.next_step() {
                Step::Inner => {
                    let Some(left) = self.left_items.borrow_mut().pop_front() else {
                        break;
                    };
                    let key = (self.left_key)(&left);
                    let rights = self.right_items.borrow();
                    let value = rights
                        .front()
                        .and_then(|right| self.joiner.inner_join(&key, left, right));
                    value
                }
                Step::LeftOnly => {
                    let Some(left) = self.left_items.borrow_mut().pop_front() else {
                        break;
                    };
                    let key = (self.left_key)(&left);
                    self.joiner.left_join(&key, left)
                }
                Step::SkipRight => {
                    self.right_items.borrow_mut().pop_front();
                    None
                }
                Step::LeftDone => {
                    self.right_items.borrow_mut().clear();
                    if self.right.is_end_of_stream() && self.output.send_end_of_stream() {
                        let stats = self.stats.get();
                        debug!(
                            left_in = stats.left_in,
                            right_in = stats.right_in,
                            items_out = stats.items_out,
                            "join finished"
                        );
                    }
                    break;
                }
                Step::Wait => break,
            };
            if let Some(value) = out {
                self.bump(|s| s.items_out += 1);
                self.output.send(value);
            }
        }
        self.refill();
    }

    /// Resume an input once its buffer has drained to half.
    fn refill(&self) {
        let half = self.buffer_size / 2;
        if self.left.status() == StreamStatus::Suspended && self.left_items.borrow().len() <= half {
            self.left.resume();
        }
        if self.right.status() == StreamStatus::Suspended && self.right_items.borrow().len() <= half {
            self.right.resume();
        }
    }

    fn on_left(&self, item: L) {
        if !self.left.accept_data() {
            return;
        }
        self.bump(|s| s.left_in += 1);
        let buffered = {
            let mut items = self.left_items.borrow_mut();
            items.push_back(item);
            items.len()
        };
        if buffered >= self.buffer_size {
            self.left.suspend();
        }
        self.process();
    }

    fn on_right(&self, item: R) {
        if !self.right.accept_data() {
            return;
        }
        self.bump(|s| s.right_in += 1);
        if self.left_done() {
            return;
        }
        let buffered = {
            let mut items = self.right_items.borrow_mut();
            items.push_back(item);
            items.len()
        };
        if buffered >= self.buffer_size {
            self.right.suspend();
        }
        self.process();
    }

    fn fail(&self, err: StreamError) {
        let downstream = self.output.close_with_error(err.clone());
        self.left.close_with_error(err.clone());
        self.right.close_with_error(err.clone());
        let lefts = std::mem::take(&mut *self.left_items.borrow_mut());
        let rights = std::mem::take(&mut *self.right_items.borrow_mut());
        drop((lefts, rights));
        if downstream {
            debug!(error = %err, "join closed with error");
        }
    }
}

impl<K, L, R, V> StreamProducer<V> for StreamJoin<K, L, R, V>
where
    K: Ord + 'static,
    L: 'static,
    R: 'static,
    V: 'static,
{
    fn producer_status(&self) -> StreamStatus {
        self.output.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<V>>) {
        self.output.bind(consumer);
    }

    fn produce(&self) {
        self.process();
    }

    fn suspend(&self) {
        self.output.suspend();
    }

    fn resume(&self) {
        self.output.resume();
    }

    fn close_with_error(&self, err: StreamError) {
        self.fail(err);
    }
}

pub struct JoinLeftInput<K, L, R, V> {
    join: Rc<StreamJoin<K, L, R, V>>,
}

impl<K, L, R, V> StreamConsumer<L> for JoinLeftInput<K, L, R, V>
where
    K: Ord + 'static,
    L: 'static,
    R: 'static,
    V: 'static,
{
    fn consumer_status(&self) -> StreamStatus {
        self.join.left.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<L>>) {
        self.join.left.bind(producer);
    }

    fn on_data(&self, item: L) {
        self.join.on_left(item);
    }

    fn on_end_of_stream(&self) {
        if self.join.left.end_of_stream() {
            self.join.process();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.join.fail(err);
    }
}

pub struct JoinRightInput<K, L, R, V> {
    join: Rc<StreamJoin<K, L, R, V>>,
}

impl<K, L, R, V> StreamConsumer<R> for JoinRightInput<K, L, R, V>
where
    K: Ord + 'static,
    L: 'static,
    R: 'static,
    V: 'static,
{
    fn consumer_status(&self) -> StreamStatus {
        self.join.right.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<R>>) {
        self.join.right.bind(producer);
    }

    fn on_data(&self, item: R) {
        self.join.on_right(item);
    }

    fn on_end_of_stream(&self) {
        if self.join.right.end_of_stream() {
            self.join.process();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.join.fail(err);
    }
}
