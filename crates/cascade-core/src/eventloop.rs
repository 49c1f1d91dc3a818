//! Single-threaded cooperative scheduler.
//!
//! Operators never block: they post continuations here and return. The local
//! implementation keeps a FIFO of ready tasks and a virtual clock for delayed
//! ones, so a run is fully deterministic.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

pub type Task = Box<dyn FnOnce()>;

/// Shared handle operators hold to reach their event loop.
pub type EventLoopRef = Rc<dyn EventLoop>;

pub trait EventLoop {
    /// Run `task` on a later turn, after every task posted before it.
    fn post(&self, task: Task);

    /// Run `task` once `delay` has elapsed on the loop clock.
    fn schedule(&self, delay: Duration, task: Task);

    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub executed: u64,
    pub pending_tasks: usize,
    pub pending_timers: usize,
    pub now_millis: u64,
}

#[derive(Default)]
struct LoopState {
    tasks: RefCell<VecDeque<Task>>,
    timers: RefCell<BTreeMap<(u64, u64), Task>>,
    clock: Cell<u64>,
    seq: Cell<u64>,
    executed: Cell<u64>,
}

impl EventLoop for LoopState {
    fn post(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn schedule(&self, delay: Duration, task: Task) {
        let deadline = self.clock.get() + delay.as_millis() as u64;
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.timers.borrow_mut().insert((deadline, seq), task);
    }

    fn now_millis(&self) -> u64 {
        self.clock.get()
    }
}

/// Deterministic event loop with a virtual millisecond clock.
#[derive(Clone, Default)]
pub struct LocalEventLoop {
    state: Rc<LoopState>,
}

impl LocalEventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> EventLoopRef {
        self.state.clone()
    }

    /// Execute a single task. Timers fire only when no ready task is queued;
    /// firing one advances the clock to its deadline.
    pub fn run_one(&self) -> bool {
        let task = self.state.tasks.borrow_mut().pop_front();
        if let Some(task) = task {
            self.execute(task);
            return true;
        }
        let timer = self.state.timers.borrow_mut().pop_first();
        match timer {
            Some(((deadline, _), task)) => {
                if deadline > self.state.clock.get() {
                    self.state.clock.set(deadline);
                }
                self.execute(task);
                true
            }
            None => false,
        }
    }

    /// Run until no task or timer is left. Returns the number of tasks executed.
    pub fn run(&self) -> u64 {
        let start = self.state.executed.get();
        while self.run_one() {}
        let ran = self.state.executed.get() - start;
        trace!(ran, now_millis = self.state.clock.get(), "event loop idle");
        ran
    }

    pub fn stats(&self) -> LoopStats {
        LoopStats {
            executed: self.state.executed.get(),
            pending_tasks: self.state.tasks.borrow().len(),
            pending_timers: self.state.timers.borrow().len(),
            now_millis: self.state.clock.get(),
        }
    }

    fn execute(&self, task: Task) {
        self.state.executed.set(self.state.executed.get() + 1);
        task();
    }
}

impl EventLoop for LocalEventLoop {
    fn post(&self, task: Task) {
        self.state.post(task)
    }

    fn schedule(&self, delay: Duration, task: Task) {
        self.state.schedule(delay, task)
    }

    fn now_millis(&self) -> u64 {
        self.state.now_millis()
    }
}
