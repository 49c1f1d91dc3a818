//! Suspend/resume interleavings and terminal-signal rules of the stream protocol

mod test_support;

use std::rc::Rc;

use cascade::codec::{I64Codec, StreamDeserializer, StreamLz4Compressor, StreamLz4Decompressor, StreamSerializer};
use cascade::core::config::FramingConfig;
use cascade::core::consumers;
use cascade::core::error::StreamError;
use cascade::core::producers;
use cascade::core::status::StreamStatus;
use cascade::core::stream::{stream_to, StreamConsumer, StreamProducer};
use cascade::mem::BufferPool;
use cascade::operators::{StreamFilter, StreamMap};
use test_support::{event_loop, FailingConsumer, RandomlySuspending};

#[test]
fn ten_thousand_random_interleavings() {
    let mut suspensions = 0;
    for seed in 0..10_000u64 {
        let (el, handle) = event_loop();
        let n = 1 + (seed % 64) as i64;

        let source = producers::of_iter(&handle, 0..n);
        let map = StreamMap::new(&handle, |x: i64| x * 2);
        let filter = StreamFilter::new(&handle, |x: &i64| x % 3 != 0);
        let sink = RandomlySuspending::new(&handle, seed, 0.3);
        stream_to(&source, &map);
        stream_to(&map, &filter);
        stream_to(&filter, &sink);
        el.run();

        assert_eq!(sink.violations(), 0, "seed {}", seed);
        assert!(sink.completion().result().unwrap().is_ok(), "seed {}", seed);
        let expected: Vec<i64> = (0..n).map(|x| x * 2).filter(|x| x % 3 != 0).collect();
        assert_eq!(sink.take_items(), expected, "seed {}", seed);
        suspensions += sink.suspensions();
    }
    assert!(suspensions > 10_000);
}

#[test]
fn framed_and_compressed_chain_under_random_demand() {
    let config = FramingConfig {
        initial_buffer_size: 64,
        deserializer_queue_len: 2,
        ..FramingConfig::default()
    };
    for seed in 0..300u64 {
        let (el, handle) = event_loop();
        let pool = BufferPool::default();
        let n = 50 + (seed * 7 % 400) as i64;

        let source = producers::of_iter(&handle, 0..n);
        let serializer = StreamSerializer::new(&handle, &pool, Rc::new(I64Codec), &config);
        let compressor = StreamLz4Compressor::new(&handle, &pool);
        let decompressor = StreamLz4Decompressor::new(&handle, &pool);
        let deserializer = StreamDeserializer::new(&handle, &pool, Rc::new(I64Codec), &config);
        let sink = RandomlySuspending::new(&handle, seed, 0.2);
        stream_to(&source, &serializer);
        stream_to(&serializer, &compressor);
        stream_to(&compressor, &decompressor);
        stream_to(&decompressor, &deserializer);
        stream_to(&deserializer, &sink);
        el.run();

        assert_eq!(sink.violations(), 0, "seed {}", seed);
        assert!(sink.completion().result().unwrap().is_ok(), "seed {}", seed);
        assert_eq!(sink.take_items(), (0..n).collect::<Vec<_>>(), "seed {}", seed);
        assert_eq!(pool.stats().outstanding(), 0, "seed {}", seed);
    }
}

#[test]
fn suspension_before_binding_is_honoured() {
    let (el, handle) = event_loop();
    let source = producers::of_iter(&handle, 0..10);
    let sink = consumers::to_list();
    sink.suspend();
    stream_to(&source, &sink);
    el.run();

    assert!(sink.is_empty());
    assert_eq!(source.producer_status(), StreamStatus::Suspended);

    sink.resume();
    el.run();
    assert_eq!(sink.take_items(), (0..10).collect::<Vec<_>>());
    assert_eq!(source.producer_status(), StreamStatus::EndOfStream);
    assert_eq!(sink.consumer_status(), StreamStatus::Closed);
}

#[test]
fn nothing_flows_before_the_loop_runs() {
    let (el, handle) = event_loop();
    let source = producers::of_iter(&handle, 0..3);
    let sink = consumers::to_list();
    stream_to(&source, &sink);

    assert!(sink.is_empty());
    assert!(!sink.completion().is_complete());
    el.run();
    assert_eq!(sink.len(), 3);
}

#[test]
fn error_after_items_reaches_sink_once() {
    let (el, handle) = event_loop();
    let source = producers::of_iter_then_error(&handle, 0..5, StreamError::custom("boom"));
    let map = StreamMap::new(&handle, |x: i32| x + 1);
    let sink = consumers::to_list();
    stream_to(&source, &map);
    stream_to(&map, &sink);
    el.run();

    assert_eq!(sink.items(), vec![1, 2, 3, 4, 5]);
    assert_eq!(sink.completion().error(), Some(StreamError::custom("boom")));
    assert_eq!(sink.consumer_status(), StreamStatus::ClosedWithError);
    assert_eq!(map.producer_status(), StreamStatus::ClosedWithError);
}

#[test]
fn first_error_wins() {
    let (el, handle) = event_loop();
    let source = producers::of_iter(&handle, 0..100);
    let map = StreamMap::new(&handle, |x: i32| x);
    let sink = FailingConsumer::after(3, StreamError::custom("downstream"));
    stream_to(&source, &map);
    stream_to(&map, &sink);
    el.run();

    // A later failure from the other end is ignored.
    source.close_with_error(StreamError::custom("upstream"));
    el.run();

    assert_eq!(sink.received(), 3);
    assert_eq!(sink.completion().error(), Some(StreamError::custom("downstream")));
    assert_eq!(source.producer_status(), StreamStatus::ClosedWithError);
    assert!(source.sent() < 100);
}

#[test]
fn consumer_failure_stops_the_source() {
    let (el, handle) = event_loop();
    let source = producers::of_iter(&handle, 0..1_000_000);
    let filter = StreamFilter::new(&handle, |_: &u32| true);
    let sink = FailingConsumer::after(10, StreamError::custom("full"));
    stream_to(&source, &filter);
    stream_to(&filter, &sink);
    el.run();

    assert_eq!(source.sent(), 11);
    assert_eq!(filter.consumer_status(), StreamStatus::ClosedWithError);
}

#[test]
fn empty_stream_ends_cleanly() {
    let (el, handle) = event_loop();
    let source = producers::end_of_stream::<u8>(&handle);
    let map = StreamMap::new(&handle, |x: u8| x as u32);
    let sink = consumers::to_list();
    stream_to(&source, &map);
    stream_to(&map, &sink);
    el.run();

    assert!(sink.completion().result().unwrap().is_ok());
    assert!(sink.is_empty());
}

#[test]
fn immediate_error_skips_data() {
    let (el, handle) = event_loop();
    let source = producers::closing_with_error::<u8>(&handle, StreamError::Cancelled("stop".into()));
    let sink = consumers::to_list();
    stream_to(&source, &sink);
    el.run();

    assert!(sink.is_empty());
    assert_eq!(
        sink.completion().error(),
        Some(StreamError::Cancelled("stop".into()))
    );
}

#[test]
fn idle_producer_closes_from_downstream() {
    let (el, handle) = event_loop();
    let source = producers::idle::<u8>(&handle);
    let sink = consumers::to_list();
    stream_to(&source, &sink);
    el.run();
    assert!(!sink.completion().is_complete());

    sink.fail(StreamError::Cancelled("timeout".into()));
    el.run();
    assert_eq!(source.producer_status(), StreamStatus::ClosedWithError);
    assert_eq!(
        sink.completion().error(),
        Some(StreamError::Cancelled("timeout".into()))
    );
}

#[test]
fn reruns_execute_identically() {
    let run = || {
        let (el, handle) = event_loop();
        let source = producers::of_iter(&handle, 0..500);
        let map = StreamMap::new(&handle, |x: i32| x * x);
        let sink = RandomlySuspending::new(&handle, 42, 0.5);
        stream_to(&source, &map);
        stream_to(&map, &sink);
        el.run();
        (el.stats(), sink.take_items(), sink.suspensions())
    };
    assert_eq!(run(), run());
}
