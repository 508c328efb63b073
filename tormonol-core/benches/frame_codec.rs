use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tormonol_core::core_frame::{Dimensions, Frame, FrameCipher};

fn bench_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_seal");
    let cipher = FrameCipher::new(&[0x11; 16]);

    // Keystrokes up to a full screen of output
    for size in [1, 64, 1024, 4096, 16384].iter() {
        let plaintext = vec![b'x'; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("payload", size), &plaintext, |b, pt| {
            b.iter(|| {
                let frame = cipher.seal(black_box(pt)).unwrap();
                black_box(frame.encode())
            });
        });
    }

    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_open");
    let cipher = FrameCipher::new(&[0x11; 16]);

    for size in [1, 64, 1024, 4096, 16384].iter() {
        let raw = cipher.seal(&vec![b'x'; *size]).unwrap().encode();
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("payload", size), &raw, |b, raw| {
            b.iter(|| black_box(cipher.open_frame(black_box(raw)).unwrap()));
        });
    }

    group.finish();
}

fn bench_resize_decode(c: &mut Criterion) {
    let raw = Frame::Resize(Dimensions { cols: 240, rows: 67 }).encode();
    c.bench_function("resize_decode", |b| {
        b.iter(|| black_box(Frame::decode(black_box(&raw)).unwrap()));
    });
}

criterion_group!(benches, bench_seal, bench_open, bench_resize_decode);
criterion_main!(benches);
