//! Producer/consumer protocol.
//!
//! Every edge of a pipeline joins one [`StreamProducer`] to one
//! [`StreamConsumer`]. Data flows downstream through `on_data`; demand flows
//! upstream through `suspend`/`resume`; failures flow both ways. The embeddable
//! cores in this module hold the per-edge state machine so operators only
//! implement their own logic.
//!
//! Producers hold their consumer strongly and consumers hold their producer
//! strongly, so a wired pipeline keeps itself alive. Both references are
//! released once the edge reaches a terminal status.

mod consumer;
mod outbox;
mod producer;
mod transformer;

use std::rc::Rc;

use crate::error::StreamError;
use crate::status::StreamStatus;

pub use consumer::ConsumerCore;
pub use outbox::Outbox;
pub use producer::ProducerCore;
pub use transformer::TransformerCore;

pub trait StreamProducer<T> {
    fn producer_status(&self) -> StreamStatus;

    /// Attach the downstream consumer. Called once, by [`connect`].
    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<T>>);

    /// Push items while the consumer is ready. No-op unless `Ready`.
    fn produce(&self);

    fn suspend(&self);

    /// Make a later `produce()` legal; the event loop schedules it.
    fn resume(&self);

    /// Failure reported by the consumer side.
    fn close_with_error(&self, err: StreamError);
}

pub trait StreamConsumer<T> {
    fn consumer_status(&self) -> StreamStatus;

    /// Attach the upstream producer. Called once, by [`connect`].
    fn bind_producer(&self, producer: Rc<dyn StreamProducer<T>>);

    fn on_data(&self, item: T);

    fn on_end_of_stream(&self);

    fn on_error(&self, err: StreamError);
}

/// Wire two type-erased endpoints.
pub fn connect<T: 'static>(
    producer: Rc<dyn StreamProducer<T>>,
    consumer: Rc<dyn StreamConsumer<T>>,
) {
    producer.bind_consumer(consumer.clone());
    consumer.bind_producer(producer);
}

/// Wire two concrete endpoints.
pub fn stream_to<T, P, C>(producer: &Rc<P>, consumer: &Rc<C>)
where
    T: 'static,
    P: StreamProducer<T> + 'static,
    C: StreamConsumer<T> + 'static,
{
    let producer: Rc<dyn StreamProducer<T>> = producer.clone();
    let consumer: Rc<dyn StreamConsumer<T>> = consumer.clone();
    connect(producer, consumer);
}
