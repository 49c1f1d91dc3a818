#![forbid(unsafe_code)]
//! cascade-mem: pooled byte buffers.
//!
//! All chunk and scratch buffers in the engine flow through `BufferPool`, which
//! counts acquires and releases so tests can prove that a pipeline returns
//! every buffer it took.

pub mod buf;
pub mod pool;
pub mod tracking;

pub use buf::ByteBuf;
pub use pool::{BufferPool, PoolStats};
