//! Where the sorter keeps its spilled runs.

use std::rc::Rc;

use cascade_core::completion::StreamCompletion;
use cascade_core::error::Result;
use cascade_core::stream::{StreamConsumer, StreamProducer};

/// Consumer end of one run being written.
///
/// `completion` resolves once every item is durable in the storage, or with
/// the write failure.
pub struct RunWriter<T> {
    pub consumer: Rc<dyn StreamConsumer<T>>,
    pub completion: StreamCompletion,
}

/// Storage for sorted runs, addressed by run index.
pub trait SortedRunStorage<T> {
    /// Reserve the index of the next run.
    fn next_run_index(&self) -> usize;

    fn writer(&self, run: usize) -> Result<RunWriter<T>>;

    /// Producer replaying run `run` in the order it was written.
    fn reader(&self, run: usize) -> Result<Rc<dyn StreamProducer<T>>>;

    /// Remove the given runs. Missing runs are not an error.
    fn cleanup(&self, runs: &[usize]) -> Result<()>;
}
