#![forbid(unsafe_code)]
//! cascade-operators: stream operators built on the cascade-core protocol.
//!
//! - merging: `frontier`, `reducer` (N-way keyed merge with pluggable reduction)
//! - sorting: `sort` (external merge sort over a `SortedRunStorage`)
//! - fan-out / fan-in: `split`, `shard`, `union`
//! - `join`: sort-merge join of two sorted inputs
//! - per-item: `map`, `filter`
//!
//! Every operator is single-threaded and must be driven by the event loop it
//! was created with.

pub mod filter;
pub mod frontier;
pub mod join;
pub mod map;
pub mod port;
pub mod reducer;
pub mod shard;
pub mod sort;
pub mod split;
pub mod union;

pub use filter::StreamFilter;
pub use frontier::MergeFrontier;
pub use join::{joiner, InnerJoin, Joiner, JoinStats, StreamJoin};
pub use map::StreamMap;
pub use port::OutputPort;
pub use reducer::{Emitter, Reducer, ReducerInput, ReducerStats, StreamReducer};
pub use shard::{HashShardStrategy, ShardStrategy, StreamSharder};
pub use sort::{RunWriter, SortedRunStorage, SorterStats, StreamSorter};
pub use split::StreamSplitter;
pub use union::{StreamUnion, UnionInput};
