//! Codec benchmarks for courier-protocol.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use courier_protocol::{codec, events::UserProfile, ServerEvent};
use uuid::Uuid;

fn sample_profile(email: &str) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        email: email.to_string(),
        first_name: Some("Sample".to_string()),
        last_name: Some("User".to_string()),
        avatar_color: Some("#7c3aed".to_string()),
        profile_complete: true,
    }
}

fn bench_encode_receive_message(c: &mut Criterion) {
    let event = ServerEvent::ReceiveMessage {
        id: Uuid::new_v4(),
        sender: sample_profile("alice@example.com"),
        recipient: sample_profile("bob@example.com"),
        content: "x".repeat(64),
        message_type: "text".to_string(),
        timestamp: Utc::now(),
    };

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("receive_message_64B", |b| {
        b.iter(|| codec::encode_server(black_box(&event)))
    });
    group.finish();
}

fn bench_decode_send_message(c: &mut Criterion) {
    let raw = format!(
        r#"{{"event":"sendMessage","recipient":"{}","content":"{}"}}"#,
        Uuid::new_v4(),
        "x".repeat(64)
    );

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(raw.len() as u64));
    group.bench_function("send_message_64B", |b| {
        b.iter(|| codec::decode_client(black_box(&raw)))
    });
    group.finish();
}

criterion_group!(benches, bench_encode_receive_message, bench_decode_send_message);
criterion_main!(benches);
