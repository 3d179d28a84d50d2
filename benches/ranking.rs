use archive_search::corpus::{CorpusRow, InMemoryCorpus};
use archive_search::ranking::{RankingOptions, rank_corpus};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tokio_util::sync::CancellationToken;

const DIMENSION: usize = 256;

/// Deterministic pseudo-random unit-ish vectors
fn synthetic_corpus(records: i64) -> InMemoryCorpus {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (1..=records)
        .map(|id| {
            let vector = (0..DIMENSION)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state % 2000) as f32 / 1000.0 - 1.0
                })
                .collect();
            CorpusRow::document(id, id, format!("chunk {}", id), vector)
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("can build runtime");
    let corpus = synthetic_corpus(20_000);
    let query: Vec<f32> = (0..DIMENSION).map(|i| (i as f32).sin()).collect();
    let cancel = CancellationToken::new();

    let mut group = c.benchmark_group("rank_corpus");
    for top_k in [10, 100, 1000] {
        let options = RankingOptions {
            top_k,
            min_score: -1.0,
            batch_size: 500,
        };
        group.bench_with_input(BenchmarkId::from_parameter(top_k), &options, |b, options| {
            b.iter(|| {
                runtime
                    .block_on(rank_corpus(&corpus, black_box(&query), options, &cancel))
                    .expect("ranking succeeds")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
