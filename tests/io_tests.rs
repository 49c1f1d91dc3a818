//! File endpoints, digests and byte-identical reruns

mod test_support;

use std::path::PathBuf;
use std::rc::Rc;

use cascade::codec::{JsonCodec, StreamDeserializer, StreamLz4Compressor, StreamLz4Decompressor, StreamSerializer};
use cascade::core::config::{SortConfig, StreamConfig};
use cascade::core::consumers;
use cascade::core::error::StreamError;
use cascade::core::hash::{hash_bytes, Hash256};
use cascade::core::producers;
use cascade::core::stream::stream_to;
use cascade::io::{IoError, MemoryRunStorage, StreamDigest, StreamFileReader, StreamFileWriter};
use cascade::mem::{BufferPool, ByteBuf};
use cascade::operators::StreamSorter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use test_support::{event_loop, rng};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: u32,
    at: u64,
    value: f64,
}

fn readings(n: usize) -> Vec<Reading> {
    let mut rng = rng();
    (0..n)
        .map(|i| Reading {
            sensor: rng.gen_range(0..20),
            at: i as u64,
            value: rng.gen_range(-50.0..50.0),
        })
        .collect()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("cascade-{}-{}", name, Uuid::new_v4()))
}

#[test]
fn compressed_file_round_trip() {
    let (el, handle) = event_loop();
    let pool = BufferPool::default();
    let config = StreamConfig::default();
    let path = temp_path("readings");
    let data = readings(5000);
    let codec = Rc::new(JsonCodec::<Reading>::new());

    let serializer = StreamSerializer::new(&handle, &pool, codec.clone(), &config.framing);
    let compressor = StreamLz4Compressor::new(&handle, &pool);
    let writer = StreamFileWriter::create(&path).unwrap();
    stream_to(&producers::of_iter(&handle, data.clone()), &serializer);
    stream_to(&serializer, &compressor);
    stream_to(&compressor, &writer);
    el.run();
    assert!(writer.completion().result().unwrap().is_ok());
    let written = writer.bytes_written();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), written);

    let reader = StreamFileReader::open(&handle, &pool, &path, 777).unwrap();
    let decompressor = StreamLz4Decompressor::new(&handle, &pool);
    let deserializer = StreamDeserializer::new(&handle, &pool, codec, &config.framing);
    let sink = consumers::to_list();
    stream_to(&reader, &decompressor);
    stream_to(&decompressor, &deserializer);
    stream_to(&deserializer, &sink);
    el.run();

    assert!(sink.completion().result().unwrap().is_ok());
    assert_eq!(sink.take_items(), data);
    assert_eq!(reader.bytes_read(), written);
    assert_eq!(pool.stats().outstanding(), 0);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn reader_emits_block_sized_chunks() {
    let (el, handle) = event_loop();
    let pool = BufferPool::default();
    let path = temp_path("chunks");
    std::fs::write(&path, vec![7u8; 1000]).unwrap();

    let reader = StreamFileReader::open(&handle, &pool, &path, 300).unwrap();
    let sink = consumers::to_list::<ByteBuf>();
    stream_to(&reader, &sink);
    el.run();

    let sizes: Vec<usize> = sink.take_items().iter().map(ByteBuf::read_remaining).collect();
    assert_eq!(sizes, vec![300, 300, 300, 100]);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn missing_file_reports_path() {
    let (_el, handle) = event_loop();
    let pool = BufferPool::default();
    let path = temp_path("absent");

    let err = StreamFileReader::open(&handle, &pool, &path, 64).err().unwrap();
    match err {
        StreamError::Storage(msg) => assert!(msg.contains(&path.display().to_string())),
        other => panic!("unexpected error {:?}", other),
    }
    let io_err = IoError::MissingRun(4);
    assert!(matches!(StreamError::from(io_err), StreamError::Storage(_)));
}

#[test]
fn writer_upstream_error_fails_completion() {
    let (el, handle) = event_loop();
    let path = temp_path("partial");
    let writer = StreamFileWriter::create(&path).unwrap();
    stream_to(
        &producers::of_iter_then_error(
            &handle,
            vec![ByteBuf::from_slice(b"abc")],
            StreamError::custom("cut"),
        ),
        &writer,
    );
    el.run();

    assert_eq!(writer.completion().error(), Some(StreamError::custom("cut")));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn digest_ignores_chunk_boundaries() {
    let (el, handle) = event_loop();
    let digest = StreamDigest::new();
    let chunks = vec![ByteBuf::from_slice(b"hello "), ByteBuf::empty(), ByteBuf::from_slice(b"world")];
    stream_to(&producers::of_iter(&handle, chunks), &digest);
    el.run();

    assert!(digest.completion().result().unwrap().is_ok());
    assert_eq!(digest.digest(), Some(hash_bytes(b"hello world")));
    assert_eq!(digest.bytes(), 11);
}

/// Sort, frame and compress `data`, returning the digest of the output bytes.
fn sorted_digest(data: Vec<Reading>) -> (Hash256, u64) {
    let (el, handle) = event_loop();
    let pool = BufferPool::default();
    let config = StreamConfig::default();
    let codec = Rc::new(JsonCodec::<Reading>::new());

    let storage = Rc::new(MemoryRunStorage::new(&handle, &pool, codec.clone(), &config));
    let sorter = StreamSorter::new(
        &handle,
        storage,
        |r: &Reading| (r.sensor, r.at),
        &SortConfig {
            items_in_memory: 700,
            deduplicate: false,
        },
    );
    let serializer = StreamSerializer::new(&handle, &pool, codec, &config.framing);
    let compressor = StreamLz4Compressor::new(&handle, &pool);
    let digest = StreamDigest::new();
    stream_to(&producers::of_iter(&handle, data), &sorter);
    stream_to(&sorter, &serializer);
    stream_to(&serializer, &compressor);
    stream_to(&compressor, &digest);
    el.run();

    (digest.digest().unwrap(), el.stats().executed)
}

#[test]
fn reruns_are_byte_identical() {
    let (first, first_tasks) = sorted_digest(readings(10_000));
    let (second, second_tasks) = sorted_digest(readings(10_000));
    assert_eq!(first, second);
    assert_eq!(first_tasks, second_tasks);

    let mut other = readings(10_000);
    other[0].value += 1.0;
    assert_ne!(sorted_digest(other).0, first);
}

#[test]
fn rerun_files_match() {
    let write = |path: &PathBuf| {
        let (el, handle) = event_loop();
        let pool = BufferPool::default();
        let config = StreamConfig::default();
        let serializer = StreamSerializer::new(
            &handle,
            &pool,
            Rc::new(JsonCodec::<Reading>::new()),
            &config.framing,
        );
        let compressor = StreamLz4Compressor::new(&handle, &pool);
        let writer = StreamFileWriter::create(path).unwrap();
        stream_to(&producers::of_iter(&handle, readings(2000)), &serializer);
        stream_to(&serializer, &compressor);
        stream_to(&compressor, &writer);
        el.run();
        assert!(writer.completion().result().unwrap().is_ok());
    };

    let (a, b) = (temp_path("rerun-a"), temp_path("rerun-b"));
    write(&a);
    write(&b);
    assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    std::fs::remove_file(&a).unwrap();
    std::fs::remove_file(&b).unwrap();
}
