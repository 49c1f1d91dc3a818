//! One input routed to exactly one of N outputs by key.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use cascade_core::error::StreamError;
use cascade_core::eventloop::EventLoopRef;
use cascade_core::hash::stable_hash;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{ConsumerCore, StreamConsumer, StreamProducer};
use tracing::debug;

use crate::port::{admit, all_ready, OutputHooks, OutputPort};

/// Maps a key to an output index in `0..shards`.
pub trait ShardStrategy<K> {
    fn shard(&self, key: &K, shards: usize) -> usize;
}

impl<K, F> ShardStrategy<K> for F
where
    F: Fn(&K, usize) -> usize,
{
    fn shard(&self, key: &K, shards: usize) -> usize {
        self(key, shards)
    }
}

/// `hash(key) % shards` over [`stable_hash`], so the mapping does not change
/// between runs or toolchains.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashShardStrategy;

impl<K: Hash> ShardStrategy<K> for HashShardStrategy {
    fn shard(&self, key: &K, shards: usize) -> usize {
        (stable_hash(key) % shards.max(1) as u64) as usize
    }
}

pub struct StreamSharder<K, T> {
    this: Weak<Self>,
    eventloop: EventLoopRef,
    input: ConsumerCore<T>,
    outputs: RefCell<Vec<Rc<OutputPort<T>>>>,
    key_fn: Box<dyn Fn(&T) -> K>,
    strategy: Box<dyn ShardStrategy<K>>,
}

impl<K: 'static, T: 'static> StreamSharder<K, T> {
    pub fn new(
        eventloop: &EventLoopRef,
        key_fn: impl Fn(&T) -> K + 'static,
        strategy: impl ShardStrategy<K> + 'static,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            this: this.clone(),
            eventloop: eventloop.clone(),
            input: ConsumerCore::new(),
            outputs: RefCell::new(Vec::new()),
            key_fn: Box::new(key_fn),
            strategy: Box::new(strategy),
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
            debug!(error = %err, "sharder closed with error");
        }
    }
}

impl<K: 'static, T: 'static> OutputHooks for StreamSharder<K, T> {
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

impl<K: 'static, T: 'static> StreamConsumer<T> for StreamSharder<K, T> {
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
        let key = (self.key_fn)(&item);
        let index = self.strategy.shard(&key, ports.len());
        let port = match ports.get(index) {
            Some(port) => port,
            None => {
                self.fail(StreamError::Protocol(format!(
                    "shard index {} out of range for {} outputs",
                    index,
                    ports.len()
                )));
                return;
            }
        };
        port.core.send(item);
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
