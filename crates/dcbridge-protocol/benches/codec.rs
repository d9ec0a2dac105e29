//! Codec benchmarks for dcbridge-protocol.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dcbridge_protocol::{codec, Event, IrcCodec, Message};
use tokio_util::codec::Decoder;

const NAMES_LINE: &str =
    ":irc.example.net 353 bridge = #dc :@alice +bob carol ~dave &erin %frank grace heidi";

fn bench_parse_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(NAMES_LINE.len() as u64));
    group.bench_function("names_reply", |b| {
        b.iter(|| black_box(NAMES_LINE).parse::<Message>())
    });
    group.finish();
}

fn bench_event_lift(c: &mut Criterion) {
    let msg: Message = ":op!o@host MODE #dc +oo-h+a alice bob carol dave".parse().unwrap();

    c.bench_function("event_from_mode", |b| {
        b.iter(|| Event::from_message(black_box(&msg)))
    });
}

fn bench_stream_decode(c: &mut Criterion) {
    let mut wire = BytesMut::new();
    for _ in 0..64 {
        wire.extend_from_slice(b":alice!a@host PRIVMSG #dc :hello there, hub people\r\n");
    }

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("64_privmsg", |b| {
        b.iter(|| {
            let mut codec = IrcCodec::new();
            let mut buf = wire.clone();
            while let Ok(Some(msg)) = codec.decode(&mut buf) {
                black_box(msg);
            }
        })
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let msg = Message::new("PRIVMSG", vec!["alice".into(), "x".repeat(400)]);

    c.bench_function("encode_400", |b| b.iter(|| codec::encode(black_box(&msg))));
}

criterion_group!(
    benches,
    bench_parse_line,
    bench_event_lift,
    bench_stream_decode,
    bench_encode
);
criterion_main!(benches);
