//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use cascade::core::completion::StreamCompletion;
use cascade::core::error::{Result, StreamError};
use cascade::core::eventloop::{EventLoopRef, LocalEventLoop};
use cascade::core::status::StreamStatus;
use cascade::core::stream::{ConsumerCore, StreamConsumer, StreamProducer};
use cascade::operators::{RunWriter, SortedRunStorage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SEED: u64 = 0x5eed_cafe;

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

pub fn event_loop() -> (LocalEventLoop, EventLoopRef) {
    let el = LocalEventLoop::new();
    let handle = el.handle();
    (el, handle)
}

/// Split `bytes` into chunks of random length in `1..=max_chunk`.
pub fn random_chunks(rng: &mut StdRng, bytes: &[u8], max_chunk: usize) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let n = rng.gen_range(1..=max_chunk).min(bytes.len() - pos);
        out.push(bytes[pos..pos + n].to_vec());
        pos += n;
    }
    out
}

/// Sink that suspends at random and resumes a random number of turns later.
///
/// Every `on_data` is checked against the consumer status; a delivery while
/// not `Ready` is counted as a violation.
pub struct RandomlySuspending<T> {
    this: Weak<Self>,
    core: ConsumerCore<T>,
    eventloop: EventLoopRef,
    rng: RefCell<StdRng>,
    suspend_probability: f64,
    items: RefCell<Vec<T>>,
    violations: Cell<u64>,
    suspensions: Cell<u64>,
    completion: StreamCompletion,
}

impl<T: 'static> RandomlySuspending<T> {
    pub fn new(eventloop: &EventLoopRef, seed: u64, suspend_probability: f64) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            this: this.clone(),
            core: ConsumerCore::new(),
            eventloop: eventloop.clone(),
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
            suspend_probability,
            items: RefCell::new(Vec::new()),
            violations: Cell::new(0),
            suspensions: Cell::new(0),
            completion: StreamCompletion::new(),
        })
    }

    pub fn completion(&self) -> StreamCompletion {
        self.completion.clone()
    }

    pub fn take_items(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.borrow_mut())
    }

    pub fn violations(&self) -> u64 {
        self.violations.get()
    }

    pub fn suspensions(&self) -> u64 {
        self.suspensions.get()
    }

    fn schedule_resume(&self, turns: u32) {
        let this = self.this.clone();
        self.eventloop.post(Box::new(move || {
            if let Some(sink) = this.upgrade() {
                if turns == 0 {
                    sink.core.resume();
                } else {
                    sink.schedule_resume(turns - 1);
                }
            }
        }));
    }
}

impl<T: 'static> StreamConsumer<T> for RandomlySuspending<T> {
    fn consumer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<T>>) {
        self.core.bind(producer);
    }

    fn on_data(&self, item: T) {
        if self.core.status() != StreamStatus::Ready {
            self.violations.set(self.violations.get() + 1);
            return;
        }
        self.items.borrow_mut().push(item);
        let (suspend, turns) = {
            let mut rng = self.rng.borrow_mut();
            (rng.gen_bool(self.suspend_probability), rng.gen_range(0..4))
        };
        if suspend {
            self.suspensions.set(self.suspensions.get() + 1);
            self.core.suspend();
            self.schedule_resume(turns);
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

/// Accepts `limit` items, then closes with `error`.
pub struct FailingConsumer<T> {
    core: ConsumerCore<T>,
    limit: usize,
    error: StreamError,
    received: Cell<usize>,
    completion: StreamCompletion,
}

impl<T: 'static> FailingConsumer<T> {
    pub fn after(limit: usize, error: StreamError) -> Rc<Self> {
        Rc::new(Self {
            core: ConsumerCore::new(),
            limit,
            error,
            received: Cell::new(0),
            completion: StreamCompletion::new(),
        })
    }

    pub fn completion(&self) -> StreamCompletion {
        self.completion.clone()
    }

    pub fn received(&self) -> usize {
        self.received.get()
    }
}

impl<T: 'static> StreamConsumer<T> for FailingConsumer<T> {
    fn consumer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<T>>) {
        self.core.bind(producer);
    }

    fn on_data(&self, _item: T) {
        if !self.core.accept_data() {
            return;
        }
        if self.received.get() == self.limit {
            if self.core.close_with_error(self.error.clone()) {
                self.completion.fail(self.error.clone());
            }
            return;
        }
        self.received.set(self.received.get() + 1);
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// `writer()` itself returns an error.
    Open,
    /// The writer accepts `n` items of the run, then fails.
    Write(usize),
}

/// Run storage that breaks while writing one chosen run.
pub struct FailingRunStorage<S> {
    inner: S,
    failing_run: usize,
    mode: FailMode,
    cleaned: RefCell<Vec<usize>>,
}

impl<S> FailingRunStorage<S> {
    pub fn new(inner: S, failing_run: usize, mode: FailMode) -> Self {
        Self {
            inner,
            failing_run,
            mode,
            cleaned: RefCell::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Every run index passed to `cleanup`, in call order.
    pub fn cleaned(&self) -> Vec<usize> {
        self.cleaned.borrow().clone()
    }
}

impl<T: 'static, S: SortedRunStorage<T>> SortedRunStorage<T> for FailingRunStorage<S> {
    fn next_run_index(&self) -> usize {
        self.inner.next_run_index()
    }

    fn writer(&self, run: usize) -> Result<RunWriter<T>> {
        if run != self.failing_run {
            return self.inner.writer(run);
        }
        let err = StreamError::Storage(format!("run {} is not writable", run));
        match self.mode {
            FailMode::Open => Err(err),
            FailMode::Write(n) => {
                let consumer = FailingConsumer::after(n, err);
                let completion = consumer.completion();
                Ok(RunWriter {
                    consumer,
                    completion,
                })
            }
        }
    }

    fn reader(&self, run: usize) -> Result<Rc<dyn StreamProducer<T>>> {
        self.inner.reader(run)
    }

    fn cleanup(&self, runs: &[usize]) -> Result<()> {
        self.cleaned.borrow_mut().extend_from_slice(runs);
        self.inner.cleanup(runs)
    }
}
