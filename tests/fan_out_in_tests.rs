//! Splitter, sharder, union and the per-item operators

mod test_support;

use std::collections::HashSet;

use cascade::core::consumers;
use cascade::core::error::StreamError;
use cascade::core::hash::{hash_bytes, stable_hash};
use cascade::core::producers;
use cascade::core::status::StreamStatus;
use cascade::core::stream::{stream_to, StreamProducer};
use cascade::operators::{HashShardStrategy, ShardStrategy, StreamFilter, StreamMap, StreamSharder, StreamSplitter, StreamUnion};
use test_support::{event_loop, FailingConsumer, RandomlySuspending};

#[test]
fn splitter_copies_every_item_to_every_output() {
    let (el, handle) = event_loop();
    let splitter = StreamSplitter::new(&handle);
    let a = consumers::to_list();
    let b = consumers::to_list();
    let slow = RandomlySuspending::new(&handle, 3, 0.3);
    stream_to(&splitter.new_output(), &a);
    stream_to(&splitter.new_output(), &b);
    stream_to(&splitter.new_output(), &slow);
    stream_to(&producers::of_iter(&handle, 0..1000), &splitter);
    el.run();

    let expected: Vec<i32> = (0..1000).collect();
    assert_eq!(splitter.output_count(), 3);
    assert_eq!(a.take_items(), expected);
    assert_eq!(b.take_items(), expected);
    assert_eq!(slow.violations(), 0);
    assert_eq!(slow.take_items(), expected);
    assert!(a.completion().result().unwrap().is_ok());
    assert!(slow.completion().result().unwrap().is_ok());
}

#[test]
fn splitter_waits_for_every_output() {
    let (el, handle) = event_loop();
    let splitter = StreamSplitter::new(&handle);
    let bound = consumers::to_list();
    stream_to(&splitter.new_output(), &bound);
    let unbound = splitter.new_output();
    let source = producers::of_iter(&handle, 0..10);
    stream_to(&source, &splitter);
    el.run();

    assert!(bound.is_empty());
    assert_eq!(source.sent(), 0);

    let late = consumers::to_list();
    stream_to(&unbound, &late);
    el.run();
    assert_eq!(bound.len(), 10);
    assert_eq!(late.len(), 10);
}

#[test]
fn output_added_after_binding_holds_back_the_input() {
    let (el, handle) = event_loop();
    let splitter = StreamSplitter::new(&handle);
    let early = consumers::to_list();
    stream_to(&splitter.new_output(), &early);
    let source = producers::of_iter(&handle, 0..10);
    stream_to(&source, &splitter);
    let late_port = splitter.new_output();
    el.run();

    assert!(early.is_empty());
    assert_eq!(source.sent(), 0);

    let late = consumers::to_list();
    stream_to(&late_port, &late);
    el.run();
    let expected: Vec<i32> = (0..10).collect();
    assert_eq!(early.take_items(), expected);
    assert_eq!(late.take_items(), expected);
    assert!(late.completion().result().unwrap().is_ok());
}

#[test]
fn output_added_after_end_of_stream_ends_at_once() {
    let (el, handle) = event_loop();
    let splitter = StreamSplitter::new(&handle);
    let first = consumers::to_list();
    stream_to(&splitter.new_output(), &first);
    stream_to(&producers::of_iter(&handle, 0..3), &splitter);
    el.run();
    assert_eq!(first.len(), 3);

    let late = consumers::to_list::<i32>();
    stream_to(&splitter.new_output(), &late);
    el.run();
    assert!(late.completion().result().unwrap().is_ok());
    assert!(late.is_empty());
}

#[test]
fn failing_output_fails_the_split() {
    let (el, handle) = event_loop();
    let splitter = StreamSplitter::new(&handle);
    let healthy = consumers::to_list();
    let broken = FailingConsumer::after(5, StreamError::custom("sink full"));
    stream_to(&splitter.new_output(), &healthy);
    stream_to(&splitter.new_output(), &broken);
    let source = producers::of_iter(&handle, 0..100);
    stream_to(&source, &splitter);
    el.run();

    assert_eq!(healthy.completion().error(), Some(StreamError::custom("sink full")));
    assert_eq!(source.producer_status(), StreamStatus::ClosedWithError);
}

#[test]
fn sharder_routes_by_strategy() {
    let (el, handle) = event_loop();
    let sharder = StreamSharder::new(&handle, |x: &u32| *x, |key: &u32, shards: usize| *key as usize % shards);
    let outputs: Vec<_> = (0..3).map(|_| consumers::to_list()).collect();
    for out in &outputs {
        stream_to(&sharder.new_output(), out);
    }
    stream_to(&producers::of_iter(&handle, 0..30u32), &sharder);
    el.run();

    assert_eq!(sharder.output_count(), 3);
    for (i, out) in outputs.iter().enumerate() {
        let expected: Vec<u32> = (0..30).filter(|x| *x as usize % 3 == i).collect();
        assert_eq!(out.take_items(), expected);
        assert!(out.completion().result().unwrap().is_ok());
    }
}

#[test]
fn hash_sharding_is_deterministic_and_complete() {
    let run = || {
        let (el, handle) = event_loop();
        let sharder = StreamSharder::new(&handle, |s: &String| s.clone(), HashShardStrategy);
        let outputs: Vec<_> = (0..4).map(|_| consumers::to_list()).collect();
        for out in &outputs {
            stream_to(&sharder.new_output(), out);
        }
        let words: Vec<String> = (0..200).map(|i| format!("word-{}", i % 50)).collect();
        stream_to(&producers::of_iter(&handle, words), &sharder);
        el.run();
        outputs.iter().map(|o| o.take_items()).collect::<Vec<_>>()
    };

    let first = run();
    assert_eq!(first, run());
    assert_eq!(first.iter().map(Vec::len).sum::<usize>(), 200);
    // Every key lands on exactly one shard.
    for (i, shard) in first.iter().enumerate() {
        for word in shard {
            assert_eq!(HashShardStrategy.shard(word, 4), i);
        }
    }
}

#[test]
fn shard_added_late_receives_its_share() {
    let (el, handle) = event_loop();
    let sharder = StreamSharder::new(&handle, |x: &u32| *x, |key: &u32, shards: usize| *key as usize % shards);
    let even = consumers::to_list();
    stream_to(&sharder.new_output(), &even);
    let source = producers::of_iter(&handle, 0..20u32);
    stream_to(&source, &sharder);
    let odd_port = sharder.new_output();
    el.run();
    assert_eq!(source.sent(), 0);

    let odd = consumers::to_list();
    stream_to(&odd_port, &odd);
    el.run();
    assert_eq!(even.take_items(), (0..20).filter(|x| x % 2 == 0).collect::<Vec<u32>>());
    assert_eq!(odd.take_items(), (0..20).filter(|x| x % 2 == 1).collect::<Vec<u32>>());
}

#[test]
fn hash_sharding_uses_a_toolchain_independent_hash() {
    for key in 0u64..500 {
        let expected = (stable_hash(&key) % 7) as usize;
        assert_eq!(HashShardStrategy.shard(&key, 7), expected);
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash_bytes(&42u64.to_ne_bytes()).0[..8]);
    assert_eq!(
        HashShardStrategy.shard(&42u64, 5),
        (u64::from_le_bytes(bytes) % 5) as usize
    );
}

#[test]
fn sharder_rejects_out_of_range_index() {
    let (el, handle) = event_loop();
    let sharder = StreamSharder::new(&handle, |x: &u32| *x, |_key: &u32, shards: usize| shards);
    let out = consumers::to_list();
    stream_to(&sharder.new_output(), &out);
    stream_to(&producers::of_iter(&handle, 0..3u32), &sharder);
    el.run();

    assert!(matches!(out.completion().error(), Some(StreamError::Protocol(_))));
}

#[test]
fn union_forwards_everything_and_ends_last() {
    let (el, handle) = event_loop();
    let union = StreamUnion::new(&handle);
    let inputs: Vec<_> = (0..3).map(|_| union.new_input()).collect();
    for (i, input) in inputs.iter().enumerate() {
        let base = i as i32 * 100;
        stream_to(&producers::of_iter(&handle, base..base + 50), input);
    }
    let sink = RandomlySuspending::new(&handle, 11, 0.2);
    stream_to(&union, &sink);
    el.run();

    assert_eq!(union.input_count(), 3);
    assert_eq!(sink.violations(), 0);
    assert!(sink.completion().result().unwrap().is_ok());
    let items = sink.take_items();
    assert_eq!(items.len(), 150);
    for i in 0..3 {
        let base = i * 100;
        let from_input: Vec<i32> = items.iter().copied().filter(|x| (base..base + 50).contains(x)).collect();
        assert_eq!(from_input, (base..base + 50).collect::<Vec<_>>());
    }
    let distinct: HashSet<i32> = items.into_iter().collect();
    assert_eq!(distinct.len(), 150);
}

#[test]
fn union_error_closes_every_input() {
    let (el, handle) = event_loop();
    let union = StreamUnion::new(&handle);
    let a = union.new_input();
    let b = union.new_input();
    let quiet = producers::idle::<i32>(&handle);
    stream_to(&quiet, &a);
    stream_to(
        &producers::of_iter_then_error(&handle, vec![1], StreamError::custom("b failed")),
        &b,
    );
    let sink = consumers::to_list();
    stream_to(&union, &sink);
    el.run();

    assert_eq!(sink.completion().error(), Some(StreamError::custom("b failed")));
    assert_eq!(quiet.producer_status(), StreamStatus::ClosedWithError);
}

#[test]
fn map_and_filter_compose() {
    let (el, handle) = event_loop();
    let words = producers::of_iter(&handle, vec!["alpha", "be", "gamma", "pi", "delta"]);
    let lengths = StreamMap::new(&handle, |w: &'static str| (w, w.len()));
    let long = StreamFilter::new(&handle, |(_, n): &(&'static str, usize)| *n > 2);
    let sink = consumers::to_list();
    stream_to(&words, &lengths);
    stream_to(&lengths, &long);
    stream_to(&long, &sink);
    el.run();

    assert_eq!(sink.take_items(), vec![("alpha", 5), ("gamma", 5), ("delta", 5)]);
    assert_eq!(long.dropped(), 2);
}
