#![forbid(unsafe_code)]
//! cascade-core: the stream protocol shared by every cascade operator.
//!
//! This crate defines statuses, the error taxonomy, configuration, the event
//! loop abstraction and the producer/consumer contract, plus the embeddable
//! state machines operators build on. It performs no I/O.

pub mod completion;
pub mod config;
pub mod consumers;
pub mod error;
pub mod eventloop;
pub mod hash;
pub mod prelude;
pub mod producers;
pub mod status;
pub mod stream;

pub use completion::StreamCompletion;
pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use eventloop::{EventLoop, EventLoopRef, LocalEventLoop};
pub use status::StreamStatus;
pub use stream::{
    connect, stream_to, ConsumerCore, Outbox, ProducerCore, StreamConsumer, StreamProducer,
    TransformerCore,
};
