//! Throughput Benchmark for kiwi
//!
//! Measures a shard on its own, the engine with its executor tasks, and the
//! RESP request decoder.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use kiwi::commands::{lookup, Handler};
use kiwi::config::Config;
use kiwi::protocol::{Request, RequestDecoder};
use kiwi::storage::{Engine, Shard, Value};
use std::time::{Duration, Instant};

fn request(parts: &[&str]) -> Request {
    Request::new(parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())))
}

/// Benchmark direct shard access, no queues involved
fn bench_shard(c: &mut Criterion) {
    let mut shard = Shard::new(0, 1);
    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        shard.set(key, Value::Str(Bytes::from(format!("value:{}", i))), None);
    }

    let mut group = c.benchmark_group("shard");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("new:{}", i));
            shard.set(key, Value::Str(Bytes::from("small_value")), None);
            i += 1;
        });
    });

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(shard.get(key.as_bytes()).is_some());
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        let expires = Instant::now() + Duration::from_secs(3600);
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            shard.set(key, Value::Str(Bytes::from("value")), Some(expires));
            i += 1;
        });
    });

    let Some(Handler::Keyed(incr)) = lookup(b"INCR").map(|spec| spec.handler) else {
        panic!("INCR is a keyed command");
    };
    group.bench_function("incr_handler", |b| {
        let args = [Bytes::from("counter")];
        b.iter(|| black_box(incr(&mut shard, &args)));
    });

    group.finish();
}

/// Benchmark requests through the engine: routing, queueing, reply channel
fn bench_engine(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let engine = runtime.block_on(async { Engine::start(&Config::default()) });

    runtime.block_on(async {
        for i in 0..10_000 {
            let key = format!("key:{}", i);
            engine
                .execute(request(&["SET", key.as_str(), "value"]))
                .await
                .unwrap();
        }
    });

    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            let reply = runtime.block_on(engine.execute(request(&["GET", key.as_str()])));
            black_box(reply.unwrap());
            i += 1;
        });
    });

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            let req = if i % 5 == 0 {
                request(&["SET", key.as_str(), "value"])
            } else {
                request(&["GET", key.as_str()])
            };
            black_box(runtime.block_on(engine.execute(req)).unwrap());
            i += 1;
        });
    });

    // 100 pipelined requests: all dispatched before the first reply is awaited.
    group.throughput(Throughput::Elements(100));
    group.bench_function("pipelined_100", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut pending = Vec::with_capacity(100);
                for i in 0..100 {
                    let key = format!("key:{}", i);
                    pending.push(engine.dispatch(request(&["GET", key.as_str()])).await.unwrap());
                }
                for reply in pending {
                    black_box(reply.wait().await.unwrap());
                }
            })
        });
    });

    group.finish();
}

/// Benchmark the RESP request decoder
fn bench_decoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoder");

    let set = b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n";
    group.throughput(Throughput::Bytes(set.len() as u64));
    group.bench_function("set_frame", |b| {
        let mut decoder = RequestDecoder::new();
        b.iter(|| {
            let mut buf = BytesMut::from(&set[..]);
            black_box(decoder.decode(&mut buf).unwrap());
        });
    });

    let value = "x".repeat(16 * 1024);
    let large = format!("*3\r\n$3\r\nSET\r\n$3\r\nbig\r\n${}\r\n{}\r\n", value.len(), value);
    group.throughput(Throughput::Bytes(large.len() as u64));
    group.bench_function("large_value_in_chunks", |b| {
        let mut decoder = RequestDecoder::new();
        b.iter(|| {
            let mut buf = BytesMut::new();
            let mut frame = None;
            for chunk in large.as_bytes().chunks(1024) {
                buf.extend_from_slice(chunk);
                frame = decoder.decode(&mut buf).unwrap();
            }
            black_box(frame)
        });
    });

    let pipeline: Vec<u8> = set.iter().copied().cycle().take(set.len() * 100).collect();
    group.throughput(Throughput::Elements(100));
    group.bench_function("pipelined_100", |b| {
        let mut decoder = RequestDecoder::new();
        b.iter(|| {
            let mut buf = BytesMut::from(&pipeline[..]);
            while let Some(frame) = decoder.decode(&mut buf).unwrap() {
                black_box(frame);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_shard, bench_engine, bench_decoder);
criterion_main!(benches);
