#![forbid(unsafe_code)]
//! cascade-io: endpoints that touch the outside world.
//!
//! - `storage`: sorted run storages (in memory, on the filesystem)
//! - `file`: chunked file reader and writer
//! - `digest`: BLAKE3 digest sink for comparing outputs across runs

pub mod digest;
pub mod error;
pub mod file;
pub mod storage;

pub use digest::StreamDigest;
pub use error::IoError;
pub use file::{StreamFileReader, StreamFileWriter};
pub use storage::{FsRunStorage, MemoryRunStorage};
