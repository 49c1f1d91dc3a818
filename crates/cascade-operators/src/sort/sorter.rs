//! External merge sort.
//!
//! Items are buffered up to `items_in_memory`; a full batch is sorted and
//! written as one run through a [`SortedRunStorage`] while the input is
//! suspended. On end-of-stream the spilled runs, in spill order, and the
//! sorted remainder are merged by a [`StreamReducer`]. Equal keys therefore
//! keep their input order, and deduplication keeps the first item seen.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use cascade_core::config::{MergeConfig, SortConfig};
use cascade_core::error::{Result, StreamError};
use cascade_core::eventloop::EventLoopRef;
use cascade_core::producers;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{
    connect, stream_to, ConsumerCore, ProducerCore, StreamConsumer, StreamProducer,
};
use serde::Serialize;
use tracing::{debug, warn};

use super::storage::SortedRunStorage;
use crate::reducer::{Deduplicate, MergeSort, Reducer, StreamReducer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SorterStats {
    pub items_in: u64,
    pub items_out: u64,
    pub runs: u64,
}

struct SorterState<K, T> {
    batch: Vec<T>,
    /// Runs fully written, in spill order.
    runs: Vec<usize>,
    spilling: Option<usize>,
    input_ended: bool,
    merger: Option<Rc<dyn StreamProducer<T>>>,
    sink: Option<Rc<MergeSink<K, T>>>,
}

pub struct StreamSorter<K, T> {
    this: Weak<Self>,
    eventloop: EventLoopRef,
    input: ConsumerCore<T>,
    output: ProducerCore<T>,
    storage: Rc<dyn SortedRunStorage<T>>,
    key_fn: Rc<dyn Fn(&T) -> K>,
    items_in_memory: usize,
    deduplicate: bool,
    merge_buffer_size: usize,
    state: RefCell<SorterState<K, T>>,
    stats: Cell<SorterStats>,
}

impl<K, T> StreamSorter<K, T>
where
    K: Ord + Clone + 'static,
    T: 'static,
{
    pub fn new(
        eventloop: &EventLoopRef,
        storage: Rc<dyn SortedRunStorage<T>>,
        key_fn: impl Fn(&T) -> K + 'static,
        config: &SortConfig,
    ) -> Rc<Self> {
        Self::with_merge_config(eventloop, storage, key_fn, config, &MergeConfig::default())
    }

    pub fn with_merge_config(
        eventloop: &EventLoopRef,
        storage: Rc<dyn SortedRunStorage<T>>,
        key_fn: impl Fn(&T) -> K + 'static,
        config: &SortConfig,
        merge: &MergeConfig,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            this: this.clone(),
            eventloop: eventloop.clone(),
            input: ConsumerCore::new(),
            output: ProducerCore::new(eventloop, this.clone()),
            storage,
            key_fn: Rc::new(key_fn),
            items_in_memory: config.items_in_memory.max(1),
            deduplicate: config.deduplicate,
            merge_buffer_size: merge.input_buffer_size,
            state: RefCell::new(SorterState {
                batch: Vec::new(),
                runs: Vec::new(),
                spilling: None,
                input_ended: false,
                merger: None,
                sink: None,
            }),
            stats: Cell::new(SorterStats::default()),
        })
    }

    pub fn stats(&self) -> SorterStats {
        self.stats.get()
    }

    pub fn input_status(&self) -> StreamStatus {
        self.input.status()
    }

    fn bump(&self, f: impl FnOnce(&mut SorterStats)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    fn is_failed(&self) -> bool {
        self.output.error().is_some() || self.input.error().is_some()
    }

    fn sorted(&self, mut batch: Vec<T>) -> Vec<T> {
        let key_fn = &self.key_fn;
        batch.sort_by_cached_key(|item| key_fn(item));
        batch
    }

    fn spill(&self) {
        let (batch, run) = {
            let mut st = self.state.borrow_mut();
            if st.spilling.is_some() {
                return;
            }
            let batch = std::mem::take(&mut st.batch);
            let run = self.storage.next_run_index();
            st.spilling = Some(run);
            (batch, run)
        };
        self.input.suspend();
        let batch = self.sorted(batch);
        debug!(run, items = batch.len(), "spilling sorted run");

        let writer = match self.storage.writer(run) {
            Ok(writer) => writer,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        let this = self.this.clone();
        writer.completion.on_complete(move |result| {
            if let Some(sorter) = this.upgrade() {
                sorter.spill_done(run, result.clone());
            }
        });
        let producer: Rc<dyn StreamProducer<T>> = producers::of_iter(&self.eventloop, batch);
        connect(producer, writer.consumer);
    }

    fn spill_done(&self, run: usize, result: Result<()>) {
        if self.is_failed() {
            self.cleanup_runs(vec![run]);
            return;
        }
        if let Err(err) = result {
            self.fail(err);
            return;
        }
        let input_ended = {
            let mut st = self.state.borrow_mut();
            st.spilling = None;
            st.runs.push(run);
            st.input_ended
        };
        self.bump(|s| s.runs += 1);
        debug!(run, "run spilled");
        if input_ended {
            self.start_merge();
        } else {
            self.input.resume();
        }
    }

    fn reducer_strategy(&self) -> Rc<dyn Reducer<K, T, T, ()>> {
        if self.deduplicate {
            Rc::new(Deduplicate)
        } else {
            Rc::new(MergeSort)
        }
    }

    fn start_merge(&self) {
        let (runs, remainder) = {
            let mut st = self.state.borrow_mut();
            (st.runs.clone(), std::mem::take(&mut st.batch))
        };
        let remainder = self.sorted(remainder);
        debug!(runs = runs.len(), in_memory = remainder.len(), "merging sorted runs");

        let reducer: Rc<StreamReducer<K, T, ()>> =
            StreamReducer::with_buffer_size(&self.eventloop, self.merge_buffer_size);
        let sink = Rc::new(MergeSink {
            core: ConsumerCore::new(),
            sorter: self.this.clone(),
        });
        if !self.output.is_ready() {
            sink.core.suspend();
        }
        {
            let merger: Rc<dyn StreamProducer<T>> = reducer.clone();
            let mut st = self.state.borrow_mut();
            st.merger = Some(merger);
            st.sink = Some(sink.clone());
        }

        let strategy = self.reducer_strategy();
        for run in runs {
            let reader = match self.storage.reader(run) {
                Ok(reader) => reader,
                Err(err) => {
                    self.fail(err);
                    return;
                }
            };
            let key_fn = self.key_fn.clone();
            let input = reducer.new_input(move |item: &T| key_fn(item), strategy.clone());
            connect(reader, input);
        }
        let key_fn = self.key_fn.clone();
        let input = reducer.new_input(move |item: &T| key_fn(item), strategy);
        stream_to(&producers::of_iter(&self.eventloop, remainder), &input);
        stream_to(&reducer, &sink);
    }

    fn forward(&self, sink: &MergeSink<K, T>, item: T) {
        self.bump(|s| s.items_out += 1);
        self.output.send(item);
        if !self.output.is_ready() {
            sink.core.suspend();
        }
    }

    fn merge_done(&self) {
        let runs = {
            let mut st = self.state.borrow_mut();
            st.merger = None;
            st.sink = None;
            std::mem::take(&mut st.runs)
        };
        let stats = self.stats.get();
        debug!(
            items_in = stats.items_in,
            items_out = stats.items_out,
            runs = stats.runs,
            "sort finished"
        );
        self.output.send_end_of_stream();
        self.cleanup_runs(runs);
    }

    /// Best effort: the sort already has its outcome.
    fn cleanup_runs(&self, runs: Vec<usize>) {
        if runs.is_empty() {
            return;
        }
        if let Err(err) = self.storage.cleanup(&runs) {
            warn!(error = %err, runs = runs.len(), "sorted run cleanup failed");
        }
    }

    fn fail(&self, err: StreamError) {
        let downstream = self.output.close_with_error(err.clone());
        let upstream = self.input.close_with_error(err.clone());
        let (merger, sink, mut runs) = {
            let mut st = self.state.borrow_mut();
            st.batch.clear();
            let mut runs = std::mem::take(&mut st.runs);
            runs.extend(st.spilling.take());
            (st.merger.take(), st.sink.take(), runs)
        };
        if let Some(merger) = merger {
            merger.close_with_error(err.clone());
        }
        if let Some(sink) = sink {
            sink.core.close_with_error(err.clone());
        }
        runs.sort_unstable();
        self.cleanup_runs(runs);
        if downstream || upstream {
            debug!(error = %err, "sorter closed with error");
        }
    }
}

impl<K, T> StreamConsumer<T> for StreamSorter<K, T>
where
    K: Ord + Clone + 'static,
    T: 'static,
{
    fn consumer_status(&self) -> StreamStatus {
        self.input.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<T>>) {
        self.input.bind(producer);
    }

    fn on_data(&self, item: T) {
        if !self.input.accept_data() {
            return;
        }
        self.bump(|s| s.items_in += 1);
        let full = {
            let mut st = self.state.borrow_mut();
            st.batch.push(item);
            st.batch.len() >= self.items_in_memory
        };
        if full {
            self.spill();
        }
    }

    fn on_end_of_stream(&self) {
        if !self.input.end_of_stream() {
            return;
        }
        let spilling = {
            let mut st = self.state.borrow_mut();
            st.input_ended = true;
            st.spilling.is_some()
        };
        if !spilling {
            self.start_merge();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.fail(err);
    }
}

impl<K, T> StreamProducer<T> for StreamSorter<K, T>
where
    K: Ord + Clone + 'static,
    T: 'static,
{
    fn producer_status(&self) -> StreamStatus {
        self.output.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<T>>) {
        self.output.bind(consumer);
    }

    fn produce(&self) {
        let sink = self.state.borrow().sink.clone();
        if let Some(sink) = sink {
            sink.core.resume();
        }
    }

    fn suspend(&self) {
        self.output.suspend();
        let sink = self.state.borrow().sink.clone();
        if let Some(sink) = sink {
            sink.core.suspend();
        }
    }

    fn resume(&self) {
        self.output.resume();
    }

    fn close_with_error(&self, err: StreamError) {
        self.fail(err);
    }
}

/// Receives the merged output and forwards it through the sorter's output.
struct MergeSink<K, T> {
    core: ConsumerCore<T>,
    sorter: Weak<StreamSorter<K, T>>,
}

impl<K, T> StreamConsumer<T> for MergeSink<K, T>
where
    K: Ord + Clone + 'static,
    T: 'static,
{
    fn consumer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<T>>) {
        self.core.bind(producer);
    }

    fn on_data(&self, item: T) {
        if !self.core.accept_data() {
            return;
        }
        if let Some(sorter) = self.sorter.upgrade() {
            sorter.forward(self, item);
        }
    }

    fn on_end_of_stream(&self) {
        if !self.core.end_of_stream() {
            return;
        }
        if let Some(sorter) = self.sorter.upgrade() {
            sorter.merge_done();
        }
    }

    fn on_error(&self, err: StreamError) {
        if let Some(sorter) = self.sorter.upgrade() {
            sorter.fail(err);
        }
    }
}
