use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use cascade_codec::ByteCodec;
use cascade_core::completion::StreamCompletion;
use cascade_core::config::StreamConfig;
use cascade_core::error::{Result, StreamError};
use cascade_core::eventloop::EventLoopRef;
use cascade_core::producers;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{ConsumerCore, StreamConsumer, StreamProducer};
use cascade_mem::{BufferPool, ByteBuf};
use cascade_operators::sort::{RunWriter, SortedRunStorage};

use super::RunCodec;
use crate::error::IoError;

type RunMap = Rc<RefCell<HashMap<usize, Vec<Vec<u8>>>>>;

/// Keeps encoded runs in memory, one byte vector per chunk.
pub struct MemoryRunStorage<T> {
    codec: RunCodec<T>,
    runs: RunMap,
    next_run: Cell<usize>,
}

impl<T: 'static> MemoryRunStorage<T> {
    pub fn new(
        eventloop: &EventLoopRef,
        pool: &BufferPool,
        codec: Rc<dyn ByteCodec<T>>,
        config: &StreamConfig,
    ) -> Self {
        Self {
            codec: RunCodec {
                eventloop: eventloop.clone(),
                pool: pool.clone(),
                codec,
                framing: config.framing.clone(),
                compress: config.compression.enabled,
            },
            runs: Rc::new(RefCell::new(HashMap::new())),
            next_run: Cell::new(0),
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.borrow().len()
    }

    pub fn contains(&self, run: usize) -> bool {
        self.runs.borrow().contains_key(&run)
    }

    /// Encoded bytes held across all runs.
    pub fn stored_bytes(&self) -> usize {
        self.runs
            .borrow()
            .values()
            .flat_map(|chunks| chunks.iter().map(Vec::len))
            .sum()
    }
}

impl<T: 'static> SortedRunStorage<T> for MemoryRunStorage<T> {
    fn next_run_index(&self) -> usize {
        let run = self.next_run.get();
        self.next_run.set(run + 1);
        run
    }

    fn writer(&self, run: usize) -> Result<RunWriter<T>> {
        let sink = Rc::new(ChunkSink {
            core: ConsumerCore::new(),
            run,
            chunks: RefCell::new(Vec::new()),
            runs: self.runs.clone(),
            completion: StreamCompletion::new(),
        });
        let completion = sink.completion.clone();
        Ok(RunWriter {
            consumer: self.codec.encoder(&sink),
            completion,
        })
    }

    fn reader(&self, run: usize) -> Result<Rc<dyn StreamProducer<T>>> {
        let chunks = self
            .runs
            .borrow()
            .get(&run)
            .cloned()
            .ok_or(IoError::MissingRun(run))?;
        let source = producers::of_iter(&self.codec.eventloop, chunks.into_iter().map(ByteBuf::wrap));
        Ok(self.codec.decoder(&source))
    }

    fn cleanup(&self, runs: &[usize]) -> Result<()> {
        let mut stored = self.runs.borrow_mut();
        for run in runs {
            stored.remove(run);
        }
        Ok(())
    }
}

/// Collects a run's chunks and publishes them once the run is complete.
struct ChunkSink {
    core: ConsumerCore<ByteBuf>,
    run: usize,
    chunks: RefCell<Vec<Vec<u8>>>,
    runs: RunMap,
    completion: StreamCompletion,
}

impl StreamConsumer<ByteBuf> for ChunkSink {
    fn consumer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<ByteBuf>>) {
        self.core.bind(producer);
    }

    fn on_data(&self, buf: ByteBuf) {
        if self.core.accept_data() {
            self.chunks.borrow_mut().push(buf.to_vec());
        }
    }

    fn on_end_of_stream(&self) {
        if self.core.end_of_stream() {
            let chunks = std::mem::take(&mut *self.chunks.borrow_mut());
            self.runs.borrow_mut().insert(self.run, chunks);
            self.core.close();
            self.completion.succeed();
        }
    }

    fn on_error(&self, err: StreamError) {
        self.chunks.borrow_mut().clear();
        if self.core.close_with_error(err.clone()) {
            self.completion.fail(err);
        }
    }
}
