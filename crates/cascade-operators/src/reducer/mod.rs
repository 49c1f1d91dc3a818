//! N-way merge of key-sorted inputs with per-key reduction.
//!
//! Each input declares a key function and a [`Reducer`]. The reducer keeps a
//! bounded look-ahead buffer per input and a [`MergeFrontier`] holding the
//! head key of every non-empty input. A production step pops the smallest
//! `(key, input)` pair: the same key as the open group folds into it, a new
//! key completes the open group and opens the next. When an input runs dry
//! before its end-of-stream, production waits for it.

pub mod reducers;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use cascade_core::config::MergeConfig;
use cascade_core::error::{Result, StreamError};
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{ConsumerCore, Outbox, ProducerCore, StreamConsumer, StreamProducer};
use serde::Serialize;
use tracing::debug;

use crate::frontier::MergeFrontier;

pub use reducers::{accumulate, Accumulate, Deduplicate, MergeSort};

/// Output handle given to reducer callbacks.
pub struct Emitter<'a, O> {
    outbox: &'a Outbox<O>,
    emitted: u64,
}

impl<'a, O: 'static> Emitter<'a, O> {
    pub(crate) fn new(outbox: &'a Outbox<O>) -> Self {
        Self { outbox, emitted: 0 }
    }

    pub fn emit(&mut self, item: O) {
        self.outbox.push(item);
        self.emitted += 1;
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

/// Per-key reduction strategy.
///
/// A group is every item with one key across all inputs. `on_first_item`
/// opens it, `on_next_item` folds the rest in, `on_complete` closes it.
/// Any callback may emit output.
pub trait Reducer<K, I, O, A> {
    fn on_first_item(&self, out: &mut Emitter<'_, O>, key: &K, item: I) -> A;

    fn on_next_item(&self, out: &mut Emitter<'_, O>, key: &K, item: I, acc: A) -> A;

    fn on_complete(&self, out: &mut Emitter<'_, O>, key: &K, acc: A);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReducerStats {
    pub items_in: u64,
    pub items_out: u64,
    pub groups: u64,
}

struct OpenGroup<K, A> {
    key: K,
    acc: A,
    /// Input whose reducer closes the group: the last one that contributed.
    input: usize,
}

/// Input state with the item type erased, so inputs of different types can
/// feed one reducer.
trait ReducerSlot<K, O, A> {
    fn head_key(&self) -> Option<K>;

    fn open_group(&self, out: &mut Emitter<'_, O>, key: &K) -> Result<A>;

    fn fold(&self, out: &mut Emitter<'_, O>, key: &K, acc: A) -> Result<A>;

    fn complete(&self, out: &mut Emitter<'_, O>, key: &K, acc: A);

    fn is_empty(&self) -> bool;

    fn is_finished(&self) -> bool;

    fn status(&self) -> StreamStatus;

    /// Let a suspended input refill once its buffer has drained to half.
    fn resume_if_drained(&self, buffer_size: usize);

    fn fail(&self, err: StreamError);
}

struct InputSlot<K, I, O, A> {
    index: usize,
    core: ConsumerCore<I>,
    items: RefCell<VecDeque<(K, I)>>,
    key_fn: Box<dyn Fn(&I) -> K>,
    reducer: Rc<dyn Reducer<K, I, O, A>>,
}

impl<K, I, O, A> InputSlot<K, I, O, A> {
    fn pop(&self) -> Result<I> {
        self.items
            .borrow_mut()
            .pop_front()
            .map(|(_, item)| item)
            .ok_or_else(|| {
                StreamError::Protocol(format!("reducer input {} has no buffered item", self.index))
            })
    }
}

impl<K: Clone, I, O, A> ReducerSlot<K, O, A> for InputSlot<K, I, O, A> {
    fn head_key(&self) -> Option<K> {
        self.items.borrow().front().map(|(key, _)| key.clone())
    }

    fn open_group(&self, out: &mut Emitter<'_, O>, key: &K) -> Result<A> {
        let item = self.pop()?;
        Ok(self.reducer.on_first_item(out, key, item))
    }

    fn fold(&self, out: &mut Emitter<'_, O>, key: &K, acc: A) -> Result<A> {
        let item = self.pop()?;
        Ok(self.reducer.on_next_item(out, key, item, acc))
    }

    fn complete(&self, out: &mut Emitter<'_, O>, key: &K, acc: A) {
        self.reducer.on_complete(out, key, acc);
    }

    fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    fn is_finished(&self) -> bool {
        self.core.is_end_of_stream()
    }

    fn status(&self) -> StreamStatus {
        self.core.status()
    }

    fn resume_if_drained(&self, buffer_size: usize) {
        if self.core.status() == StreamStatus::Suspended
            && self.items.borrow().len() <= buffer_size / 2
        {
            self.core.resume();
        }
    }

    fn fail(&self, err: StreamError) {
        let dropped = std::mem::take(&mut *self.items.borrow_mut());
        drop(dropped);
        self.core.close_with_error(err);
    }
}

pub struct StreamReducer<K, O, A> {
    output: ProducerCore<O>,
    outbox: Outbox<O>,
    buffer_size: usize,
    inputs: RefCell<Vec<Rc<dyn ReducerSlot<K, O, A>>>>,
    frontier: RefCell<MergeFrontier<K>>,
    group: RefCell<Option<OpenGroup<K, A>>>,
    /// Inputs that are empty but not yet at end-of-stream.
    awaited: Cell<usize>,
    stats: Cell<ReducerStats>,
}

impl<K, O, A> StreamReducer<K, O, A>
where
    K: Ord + Clone + 'static,
    O: 'static,
    A: 'static,
{
    pub fn new(eventloop: &EventLoopRef, config: &MergeConfig) -> Rc<Self> {
        Self::with_buffer_size(eventloop, config.input_buffer_size)
    }

    pub fn with_buffer_size(eventloop: &EventLoopRef, buffer_size: usize) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            output: ProducerCore::new(eventloop, this.clone()),
            outbox: Outbox::new(),
            buffer_size: buffer_size.max(1),
            inputs: RefCell::new(Vec::new()),
            frontier: RefCell::new(MergeFrontier::new()),
            group: RefCell::new(None),
            awaited: Cell::new(0),
            stats: Cell::new(ReducerStats::default()),
        })
    }

    /// Declare the next input. Equal keys are reduced in declaration order.
    pub fn new_input<I: 'static>(
        self: &Rc<Self>,
        key_fn: impl Fn(&I) -> K + 'static,
        reducer: Rc<dyn Reducer<K, I, O, A>>,
    ) -> Rc<ReducerInput<K, I, O, A>> {
        let index = self.inputs.borrow().len();
        let slot = Rc::new(InputSlot {
            index,
            core: ConsumerCore::new(),
            items: RefCell::new(VecDeque::new()),
            key_fn: Box::new(key_fn),
            reducer,
        });
        self.inputs.borrow_mut().push(slot.clone());
        self.awaited.set(self.awaited.get() + 1);
        Rc::new(ReducerInput {
            slot,
            reducer: self.clone(),
        })
    }

    pub fn input_count(&self) -> usize {
        self.inputs.borrow().len()
    }

    pub fn input_status(&self, index: usize) -> Option<StreamStatus> {
        self.inputs.borrow().get(index).map(|slot| slot.status())
    }

    pub fn stats(&self) -> ReducerStats {
        self.stats.get()
    }

    fn slot(&self, index: usize) -> Result<Rc<dyn ReducerSlot<K, O, A>>> {
        self.inputs
            .borrow()
            .get(index)
            .cloned()
            .ok_or_else(|| StreamError::Protocol(format!("unknown reducer input {}", index)))
    }

    fn bump(&self, f: impl FnOnce(&mut ReducerStats)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    fn item_buffered(&self, index: usize, new_head: Option<K>) {
        self.bump(|s| s.items_in += 1);
        if let Some(key) = new_head {
            self.frontier.borrow_mut().push(key, index);
            self.input_settled();
        }
    }

    /// An awaited input got an item or reached end-of-stream.
    fn input_settled(&self) {
        let awaited = self.awaited.get().saturating_sub(1);
        self.awaited.set(awaited);
        if awaited == 0 {
            self.output.schedule_produce();
        }
    }

    fn process(&self) {
        self.outbox.drain_to(&self.output);
        while self.output.is_ready() && self.awaited.get() == 0 {
            let next = self.frontier.borrow_mut().pop();
            let result = match next {
                Some((key, index)) => self.step(key, index),
                None => self.finish(),
            };
            if let Err(err) = result {
                self.fail(err);
                return;
            }
            self.outbox.drain_to(&self.output);
        }
    }

    fn step(&self, key: K, index: usize) -> Result<()> {
        let slot = self.slot(index)?;
        let mut out = Emitter::new(&self.outbox);
        let open = self.group.borrow_mut().take();
        let acc = match open {
            Some(group) if group.key == key => slot.fold(&mut out, &key, group.acc)?,
            Some(group) => {
                self.slot(group.input)?.complete(&mut out, &group.key, group.acc);
                self.bump(|s| s.groups += 1);
                slot.open_group(&mut out, &key)?
            }
            None => slot.open_group(&mut out, &key)?,
        };
        let emitted = out.emitted();
        self.bump(|s| s.items_out += emitted);
        *self.group.borrow_mut() = Some(OpenGroup {
            key,
            acc,
            input: index,
        });

        match slot.head_key() {
            Some(next) => self.frontier.borrow_mut().push(next, index),
            None if !slot.is_finished() => self.awaited.set(self.awaited.get() + 1),
            None => {}
        }
        slot.resume_if_drained(self.buffer_size);
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        let open = self.group.borrow_mut().take();
        if let Some(group) = open {
            let mut out = Emitter::new(&self.outbox);
            self.slot(group.input)?.complete(&mut out, &group.key, group.acc);
            let emitted = out.emitted();
            self.bump(|s| {
                s.items_out += emitted;
                s.groups += 1;
            });
        }
        let stats = self.stats.get();
        debug!(
            inputs = self.input_count(),
            items_in = stats.items_in,
            items_out = stats.items_out,
            groups = stats.groups,
            "reducer inputs exhausted"
        );
        self.outbox.finish();
        Ok(())
    }

    fn fail(&self, err: StreamError) {
        let closed = self.output.close_with_error(err.clone());
        let inputs = self.inputs.borrow().clone();
        for slot in inputs {
            slot.fail(err.clone());
        }
        self.frontier.borrow_mut().clear();
        let group = self.group.borrow_mut().take();
        drop(group);
        self.outbox.clear();
        if closed {
            debug!(error = %err, "reducer closed with error");
        }
    }
}

impl<K, O, A> StreamProducer<O> for StreamReducer<K, O, A>
where
    K: Ord + Clone + 'static,
    O: 'static,
    A: 'static,
{
    fn producer_status(&self) -> StreamStatus {
        self.output.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<O>>) {
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

/// Consumer end of one reducer input.
pub struct ReducerInput<K, I, O, A> {
    slot: Rc<InputSlot<K, I, O, A>>,
    reducer: Rc<StreamReducer<K, O, A>>,
}

impl<K, I, O, A> ReducerInput<K, I, O, A> {
    pub fn index(&self) -> usize {
        self.slot.index
    }
}

impl<K, I, O, A> StreamConsumer<I> for ReducerInput<K, I, O, A>
where
    K: Ord + Clone + 'static,
    I: 'static,
    O: 'static,
    A: 'static,
{
    fn consumer_status(&self) -> StreamStatus {
        self.slot.core.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<I>>) {
        self.slot.core.bind(producer);
    }

    fn on_data(&self, item: I) {
        if !self.slot.core.accept_data() {
            return;
        }
        let key = (self.slot.key_fn)(&item);
        let (new_head, buffered) = {
            let mut items = self.slot.items.borrow_mut();
            let new_head = items.is_empty().then(|| key.clone());
            items.push_back((key, item));
            (new_head, items.len())
        };
        if buffered >= self.reducer.buffer_size {
            self.slot.core.suspend();
        }
        self.reducer.item_buffered(self.slot.index, new_head);
    }

    fn on_end_of_stream(&self) {
        if !self.slot.core.end_of_stream() {
            return;
        }
        if self.slot.is_empty() {
            self.reducer.input_settled();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.reducer.fail(err);
    }
}
