use criterion::{Criterion, criterion_group, criterion_main};
use smbusb_protocol::{Pec, crc8, update_crc};

fn benchmark_pec(c: &mut Criterion) {
    let block: Vec<u8> = (0..=255u8).collect();

    c.bench_function("update_crc single byte", |b| {
        b.iter(|| std::hint::black_box(update_crc(std::hint::black_box(0x5A), 0xA5)));
    });

    c.bench_function("crc8 255-byte block", |b| {
        b.iter(|| std::hint::black_box(crc8(std::hint::black_box(&block))));
    });

    c.bench_function("Pec accumulator 64-byte chunk", |b| {
        let chunk = block.get(..64).unwrap_or(&[]);
        b.iter(|| {
            let mut pec = Pec::new();
            pec.extend(std::hint::black_box(chunk));
            std::hint::black_box(pec.value())
        });
    });
}

criterion_group!(benches, benchmark_pec);
criterion_main!(benches);
