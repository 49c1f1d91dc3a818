//! External merge sort over pluggable run storage.

pub mod sorter;
pub mod storage;

pub use sorter::{SorterStats, StreamSorter};
pub use storage::{RunWriter, SortedRunStorage};
