pub use crate::completion::StreamCompletion;
pub use crate::config::StreamConfig;
pub use crate::error::{Result, StreamError};
pub use crate::eventloop::{EventLoop, EventLoopRef, LocalEventLoop};
pub use crate::status::StreamStatus;
pub use crate::stream::{connect, stream_to, StreamConsumer, StreamProducer};
pub use crate::{consumers, producers};
