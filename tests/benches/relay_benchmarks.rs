//! # Tx-Relay Benchmarks
//!
//! Hot paths the worker runs for every message:
//!
//! | Path | Work |
//! |------|------|
//! | Identification | bincode decode + SHA-256 of the body |
//! | Reply codec | encode/decode of success and failure replies |
//! | SRV selection | ordering a record set |
//! | Broker round trip | in-memory publish → get → ack |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_bus::{BrokerConnector, BrokerUrl, InMemoryBroker};
use shared_types::testing::signed_tx;
use shared_types::{
    BincodeTxIdentifier, FailureKind, SubmissionFailure, SubmissionOutcome, TxIdentifier,
};
use std::time::Duration;
use tr_01_service_discovery::{select_record, SrvRecord};

fn bench_identification(c: &mut Criterion) {
    let mut group = c.benchmark_group("identification");
    group.measurement_time(Duration::from_secs(5));

    for size in [256usize, 4 * 1024, 16 * 1024] {
        let raw = signed_tx(&vec![0xAB; size]).to_bytes();
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::new("bincode_sha256", size), &raw, |b, raw| {
            b.iter(|| BincodeTxIdentifier.transaction_id(black_box(raw)))
        });
    }
    group.finish();
}

fn bench_reply_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("reply_codec");
    let failure = SubmissionOutcome::Failure(SubmissionFailure::new(
        FailureKind::ValueNotConserved,
        "consumed 10000000 produced 9990000",
    ));
    let encoded = failure.encode();

    group.bench_function("encode_failure", |b| b.iter(|| black_box(&failure).encode()));
    group.bench_function("decode_failure", |b| {
        b.iter(|| SubmissionOutcome::decode(black_box(&encoded)))
    });
    group.bench_function("decode_success", |b| {
        b.iter(|| SubmissionOutcome::decode(black_box(&[])))
    });
    group.finish();
}

fn bench_srv_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("srv_selection");
    for count in [4usize, 64] {
        let records: Vec<SrvRecord> = (0..count)
            .map(|i| SrvRecord::new(format!("mq-{i}.svc."), 5672, (i % 3) as u16, (i % 7) as u16))
            .collect();
        group.bench_with_input(BenchmarkId::new("select", count), &records, |b, records| {
            b.iter(|| select_record(black_box(records)))
        });
    }
    group.finish();
}

fn bench_memory_broker(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let broker = InMemoryBroker::new();
    let (_connection, channel) = runtime.block_on(async {
        let connection = broker.connect(&BrokerUrl::localhost()).await.expect("connect");
        let channel = connection.create_channel().await.expect("channel");
        channel.declare_queue("bench").await.expect("declare");
        (connection, channel)
    });
    let payload = signed_tx(b"bench").to_bytes();

    c.bench_function("memory_broker/publish_get_ack", |b| {
        b.iter(|| {
            runtime.block_on(async {
                channel.publish("bench", &payload).await.expect("publish");
                let delivery = channel.get("bench").await.expect("get").expect("message");
                channel.ack(delivery.delivery_tag).await.expect("ack");
            })
        })
    });
}

criterion_group!(
    benches,
    bench_identification,
    bench_reply_codec,
    bench_srv_selection,
    bench_memory_broker
);
criterion_main!(benches);
