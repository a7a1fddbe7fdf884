use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::path::Path;

use smak::parser::eml::{parse_message, ParseOptions};
use smak::parser::header::collapse_ws;

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(path).unwrap()
}

fn bench_parse_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_message");
    for name in ["plain.eml", "quoted_printable.eml", "base64.eml", "encoded_words.eml"] {
        let raw = fixture(name);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_function(name, |b| {
            b.iter_batched_ref(
                || raw.clone(),
                |buf| parse_message(buf, ParseOptions::default()).map(|m| m.body.len()),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_large_qp_body(c: &mut Criterion) {
    let mut raw = b"Subject: big\nContent-Transfer-Encoding: quoted-printable\n\n".to_vec();
    for _ in 0..10_000 {
        raw.extend_from_slice(b"Caf=C3=A9 au lait, s'il vous pla=C3=AEt, =\nencore une fois.\n");
    }
    c.bench_function("parse_large_qp_body", |b| {
        b.iter_batched_ref(
            || raw.clone(),
            |buf| parse_message(buf, ParseOptions::default()).map(|m| m.body.len()),
            BatchSize::LargeInput,
        )
    });
}

fn bench_collapse_ws(c: &mut Criterion) {
    let value = b"Re: a\r\n   folded \t subject   with\r\n\t lots   of   space".repeat(64);
    c.bench_function("collapse_ws", |b| {
        b.iter_batched_ref(|| value.clone(), |buf| collapse_ws(buf), BatchSize::SmallInput)
    });
}

criterion_group!(
    benches,
    bench_parse_message,
    bench_large_qp_body,
    bench_collapse_ws
);
criterion_main!(benches);
