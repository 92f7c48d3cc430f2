use criterion::{black_box, criterion_group, criterion_main, Criterion};
use samplering::SampleRing;

fn bench_throughput(c: &mut Criterion) {
    let mut ring = SampleRing::new(4096).unwrap();
    let block = [0.5f64; 256];
    let mut out = [0.0f64; 256];

    c.bench_function("spsc_block_roundtrip_256", |b| {
        b.iter(|| {
            ring.write(black_box(&block));
            ring.read(black_box(&mut out));
        })
    });

    // 255 does not divide 4097, so the copies keep landing on the seam
    let mut ring = SampleRing::new(4096).unwrap();
    let block = [0.5f64; 255];
    let mut out = [0.0f64; 255];

    c.bench_function("spsc_block_roundtrip_255_wrapping", |b| {
        b.iter(|| {
            ring.write(black_box(&block));
            ring.read(black_box(&mut out));
        })
    });
}

criterion_group!(benches, bench_throughput);
criterion_main!(benches);
