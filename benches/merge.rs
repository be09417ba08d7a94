use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use ugnos_ooo::merge::OooCandidates;
use ugnos_ooo::*;

const SEED: u64 = 0x5eed_0000_0000_0001;

// Deterministic LCG so runs are comparable across machines.
fn intervals(n: usize, mut state: u64) -> Vec<(Timestamp, Timestamp)> {
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let min = (state >> 33) as i64 % 100_000;
            let len = 1 + (state >> 20) as i64 % 500;
            (min, min + len)
        })
        .collect()
}

fn bench_merge_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for n in [8usize, 64, 512] {
        let ivs = intervals(n, SEED);
        group.bench_with_input(BenchmarkId::new("merge_into", n), &ivs, |b, ivs| {
            let mut out = Vec::with_capacity(n);
            b.iter(|| {
                let mut cands = OooCandidates::with_capacity(ivs.len());
                for (i, (min, max)) in ivs.iter().enumerate().rev() {
                    cands.push(*min, *max, ChunkRef(i as u64));
                }
                cands.merge_into(&mut out);
                black_box(out.len())
            })
        });
    }
    group.finish();
}

fn bench_series_chunks(c: &mut Criterion) {
    let head = Arc::new(
        Head::new(HeadConfig::default(), Arc::new(MemChunkMapper::new())).expect("head init"),
    );
    head.get_or_create(Labels::from_pairs(&[("job", "bench")]))
        .expect("series");
    for (min, max) in intervals(128, SEED) {
        head.add_mmapped_ooo_chunk(1, min, max, b"chunk")
            .expect("mmapped chunk");
    }
    head.append_ooo(1, 50_000, 50_100, b"open").expect("append");

    let ir = head.ooo_index_reader(0, 100_000);
    let cr = head.ooo_chunk_reader(0, 100_000);

    let mut group = c.benchmark_group("ooo_head_read");
    group.bench_function("series_chunks_128", |b| {
        let mut lbls = Labels::default();
        let mut chks = Vec::new();
        b.iter(|| {
            ir.series(black_box(1), &mut lbls, Some(&mut chks))
                .expect("series");
            black_box(chks.len())
        })
    });
    group.bench_function("resolve_open_chunk", |b| {
        let open = ChunkRef::pack(1, 128).expect("ref");
        b.iter(|| black_box(cr.chunk(open).expect("chunk").bytes().len()))
    });
    group.finish();
}

criterion_group!(benches, bench_merge_engine, bench_series_chunks);
criterion_main!(benches);
