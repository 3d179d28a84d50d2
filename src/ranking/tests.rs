use super::*;
use crate::corpus::{InMemoryCorpus, VectorPayload};
use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn options(top_k: usize, min_score: f32, batch_size: usize) -> RankingOptions {
    RankingOptions {
        top_k,
        min_score,
        batch_size,
    }
}

fn ids(outcome: &RankOutcome) -> Vec<i64> {
    outcome.hits.iter().map(|h| h.corpus_record_id).collect()
}

fn sample_corpus() -> InMemoryCorpus {
    InMemoryCorpus::new(vec![
        CorpusRow::document(1, 100, "A", vec![1.0, 0.0]),
        CorpusRow::document(2, 101, "B", vec![0.0, 1.0]),
        CorpusRow::flight(3, 200, "C", vec![0.7, 0.7]),
    ])
}

/// Records every requested offset and can fail at a chosen one
struct ScriptedCorpus {
    inner: InMemoryCorpus,
    fail_at: Option<usize>,
    requested: Mutex<Vec<usize>>,
}

impl ScriptedCorpus {
    fn new(inner: InMemoryCorpus, fail_at: Option<usize>) -> Self {
        Self {
            inner,
            fail_at,
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requested(&self) -> Vec<usize> {
        self.requested.lock().expect("lock should not be poisoned").clone()
    }
}

#[async_trait]
impl CorpusSource for ScriptedCorpus {
    async fn fetch_page(&self, offset: usize, limit: usize) -> anyhow::Result<Vec<CorpusRow>> {
        self.requested
            .lock()
            .expect("lock should not be poisoned")
            .push(offset);
        if self.fail_at == Some(offset) {
            return Err(anyhow!("connection reset while reading page"));
        }
        self.inner.fetch_page(offset, limit).await
    }
}

/// Cancels the token once a given number of pages has been served
struct CancellingCorpus {
    inner: InMemoryCorpus,
    cancel_after: usize,
    served: AtomicUsize,
    token: CancellationToken,
}

#[async_trait]
impl CorpusSource for CancellingCorpus {
    async fn fetch_page(&self, offset: usize, limit: usize) -> anyhow::Result<Vec<CorpusRow>> {
        if self.served.fetch_add(1, Ordering::SeqCst) + 1 >= self.cancel_after {
            self.token.cancel();
        }
        self.inner.fetch_page(offset, limit).await
    }
}

#[tokio::test]
async fn ranks_by_descending_similarity_above_threshold() {
    let corpus = sample_corpus();
    let outcome = rank_corpus(
        &corpus,
        &[1.0, 0.0],
        &options(2, 0.5, 500),
        &CancellationToken::new(),
    )
    .await
    .expect("ranking should succeed");

    assert_eq!(ids(&outcome), vec![1, 3]);
    assert!((outcome.hits[0].score - 1.0).abs() < 1e-6);
    assert!((outcome.hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    assert_eq!(outcome.hits[1].subject, SubjectRef::Flight(200));
    assert_eq!(outcome.hits[1].snippet, "C");
    assert_eq!(outcome.scanned, 3);
    assert_eq!(outcome.pages, 1);
}

#[tokio::test]
async fn top_k_bounds_the_result() {
    let corpus = sample_corpus();
    let outcome = rank_corpus(
        &corpus,
        &[1.0, 0.0],
        &options(1, 0.0, 500),
        &CancellationToken::new(),
    )
    .await
    .expect("ranking should succeed");

    assert_eq!(ids(&outcome), vec![1]);
}

#[tokio::test]
async fn ties_break_by_ascending_id_across_pages() {
    let corpus = InMemoryCorpus::new(vec![
        CorpusRow::document(5, 1, "five", vec![1.0, 0.0]),
        CorpusRow::document(9, 2, "nine", vec![0.0, 1.0]),
        CorpusRow::document(3, 3, "three", vec![2.0, 0.0]),
    ]);

    for batch_size in [1, 2, 500] {
        let outcome = rank_corpus(
            &corpus,
            &[1.0, 0.0],
            &options(2, 0.5, batch_size),
            &CancellationToken::new(),
        )
        .await
        .expect("ranking should succeed");

        assert_eq!(ids(&outcome), vec![3, 5], "batch size {}", batch_size);
    }
}

#[tokio::test]
async fn result_does_not_depend_on_batch_size() {
    let corpus: InMemoryCorpus = (1..=57)
        .map(|id| {
            let angle = (id as f32) * 0.11;
            CorpusRow::document(id, id, format!("chunk {}", id), vec![angle.cos(), angle.sin()])
        })
        .collect();

    let reference = rank_corpus(
        &corpus,
        &[1.0, 0.2],
        &options(7, -1.0, 1000),
        &CancellationToken::new(),
    )
    .await
    .expect("ranking should succeed");

    for batch_size in [1, 3, 10, 56, 57, 58] {
        let outcome = rank_corpus(
            &corpus,
            &[1.0, 0.2],
            &options(7, -1.0, batch_size),
            &CancellationToken::new(),
        )
        .await
        .expect("ranking should succeed");
        assert_eq!(outcome.hits, reference.hits, "batch size {}", batch_size);
        assert_eq!(outcome.scanned, 57);
    }
}

#[tokio::test]
async fn scan_stops_after_short_page() {
    let corpus = ScriptedCorpus::new(sample_corpus(), None);
    rank_corpus(
        &corpus,
        &[1.0, 0.0],
        &options(5, 0.0, 2),
        &CancellationToken::new(),
    )
    .await
    .expect("ranking should succeed");

    assert_eq!(corpus.requested(), vec![0, 2]);
}

#[tokio::test]
async fn exact_multiple_ends_on_empty_page() {
    let corpus = ScriptedCorpus::new(sample_corpus(), None);
    let outcome = rank_corpus(
        &corpus,
        &[1.0, 0.0],
        &options(5, 0.0, 3),
        &CancellationToken::new(),
    )
    .await
    .expect("ranking should succeed");

    assert_eq!(corpus.requested(), vec![0, 3]);
    assert_eq!(outcome.pages, 1);
}

#[tokio::test]
async fn empty_corpus_yields_empty_ranking() {
    let corpus = InMemoryCorpus::default();
    let outcome = rank_corpus(
        &corpus,
        &[1.0, 0.0],
        &RankingOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .expect("ranking should succeed");

    assert!(outcome.hits.is_empty());
    assert_eq!(outcome.scanned, 0);
    assert_eq!(outcome.pages, 0);
}

#[tokio::test]
async fn failed_page_fails_the_ranking() {
    let corpus = ScriptedCorpus::new(sample_corpus(), Some(2));
    let error = rank_corpus(
        &corpus,
        &[1.0, 0.0],
        &options(5, 0.0, 2),
        &CancellationToken::new(),
    )
    .await
    .expect_err("ranking should fail");

    match error {
        SearchError::CorpusAccess { offset, source } => {
            assert_eq!(offset, Some(2));
            assert!(source.to_string().contains("connection reset"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn defective_records_are_skipped_and_counted() {
    let corpus = InMemoryCorpus::new(vec![
        CorpusRow::document(1, 1, "good", vec![1.0, 0.0]),
        CorpusRow {
            vector: VectorPayload::Encoded("[1.0, oops]".to_string()),
            ..CorpusRow::document(2, 2, "garbled", Vec::new())
        },
        CorpusRow::document(3, 3, "short", vec![1.0]),
        CorpusRow::document(4, 4, "nan", vec![f32::NAN, 1.0]),
        CorpusRow::document(5, 5, "zero", vec![0.0, 0.0]),
        CorpusRow {
            document_id: None,
            ..CorpusRow::document(6, 6, "orphan", vec![1.0, 0.0])
        },
        CorpusRow {
            flight_id: Some(9),
            ..CorpusRow::document(7, 7, "both", vec![1.0, 0.0])
        },
        CorpusRow {
            vector: VectorPayload::Encoded("[0.6,0.8]".to_string()),
            ..CorpusRow::flight(8, 8, "encoded", Vec::new())
        },
    ]);

    let outcome = rank_corpus(
        &corpus,
        &[1.0, 0.0],
        &options(10, 0.0, 3),
        &CancellationToken::new(),
    )
    .await
    .expect("ranking should succeed");

    assert_eq!(ids(&outcome), vec![1, 8]);
    assert_eq!(outcome.scanned, 8);
    assert_eq!(
        outcome.skipped,
        SkippedRecords {
            unparsable_vector: 1,
            dimension_mismatch: 1,
            non_finite_component: 1,
            zero_norm: 1,
            missing_subject: 1,
            ambiguous_subject: 1,
        }
    );
    assert_eq!(outcome.skipped.total(), 6);
}

#[tokio::test]
async fn threshold_is_inclusive() {
    let corpus = InMemoryCorpus::new(vec![
        CorpusRow::document(1, 1, "exact", vec![1.0, 0.0]),
        CorpusRow::document(2, 2, "orthogonal", vec![0.0, 1.0]),
    ]);

    let outcome = rank_corpus(
        &corpus,
        &[1.0, 0.0],
        &options(5, 1.0, 10),
        &CancellationToken::new(),
    )
    .await
    .expect("ranking should succeed");
    assert_eq!(ids(&outcome), vec![1]);
}

#[tokio::test]
async fn invalid_query_vector_is_rejected_before_scanning() {
    let corpus = ScriptedCorpus::new(sample_corpus(), None);

    let error = rank_corpus(
        &corpus,
        &[0.0, 0.0],
        &RankingOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .expect_err("zero query should fail");

    assert!(matches!(error, SearchError::InvalidQueryVector { .. }));
    assert!(corpus.requested().is_empty());
}

#[tokio::test]
async fn zero_top_k_skips_the_scan() {
    let corpus = ScriptedCorpus::new(sample_corpus(), None);
    let outcome = rank_corpus(
        &corpus,
        &[1.0, 0.0],
        &options(0, 0.0, 10),
        &CancellationToken::new(),
    )
    .await
    .expect("ranking should succeed");

    assert!(outcome.hits.is_empty());
    assert!(corpus.requested().is_empty());
}

#[tokio::test]
async fn invalid_options_are_rejected() {
    let corpus = sample_corpus();
    let token = CancellationToken::new();

    let zero_batch = rank_corpus(&corpus, &[1.0, 0.0], &options(5, 0.0, 0), &token).await;
    assert!(matches!(zero_batch, Err(SearchError::InvalidOptions { .. })));

    let nan_threshold = rank_corpus(&corpus, &[1.0, 0.0], &options(5, f32::NAN, 10), &token).await;
    assert!(matches!(nan_threshold, Err(SearchError::InvalidOptions { .. })));
}

#[tokio::test]
async fn cancelled_token_aborts_before_fetching() {
    let corpus = ScriptedCorpus::new(sample_corpus(), None);
    let token = CancellationToken::new();
    token.cancel();

    let error = rank_corpus(&corpus, &[1.0, 0.0], &options(5, 0.0, 1), &token)
        .await
        .expect_err("ranking should be cancelled");
    assert!(matches!(error, SearchError::Cancelled));
}

#[tokio::test]
async fn cancellation_mid_scan_discards_partial_results() {
    let token = CancellationToken::new();
    let corpus = CancellingCorpus {
        inner: (1..=10)
            .map(|id| CorpusRow::document(id, id, "", vec![1.0, 0.0]))
            .collect(),
        cancel_after: 2,
        served: AtomicUsize::new(0),
        token: token.clone(),
    };

    let error = rank_corpus(&corpus, &[1.0, 0.0], &options(5, 0.0, 2), &token)
        .await
        .expect_err("ranking should be cancelled");
    assert!(matches!(error, SearchError::Cancelled));
}

#[tokio::test]
async fn audit_classifies_every_row() {
    let corpus = InMemoryCorpus::new(vec![
        CorpusRow::document(1, 1, "", vec![1.0, 0.0, 0.0]),
        CorpusRow::document(2, 2, "", vec![0.0, 1.0, 0.0]),
        CorpusRow::document(3, 3, "", vec![0.0, 1.0]),
        CorpusRow::document(4, 4, "", vec![0.0, 0.0, 0.0]),
        CorpusRow {
            vector: VectorPayload::Encoded("{}".to_string()),
            ..CorpusRow::flight(5, 5, "", Vec::new())
        },
    ]);

    let audit = audit_corpus(&corpus, None, 2, &CancellationToken::new())
        .await
        .expect("audit should succeed");

    assert_eq!(audit.scanned, 5);
    assert_eq!(audit.valid, 2);
    assert_eq!(audit.dimension, Some(3));
    assert_eq!(audit.skipped.dimension_mismatch, 1);
    assert_eq!(audit.skipped.zero_norm, 1);
    assert_eq!(audit.skipped.unparsable_vector, 1);
    assert_eq!(audit.dimensions.get(&3), Some(&2));
    assert_eq!(audit.dimensions.get(&2), Some(&1));
}

#[tokio::test]
async fn audit_uses_expected_dimension() {
    let corpus = InMemoryCorpus::new(vec![
        CorpusRow::document(1, 1, "", vec![1.0, 0.0, 0.0]),
        CorpusRow::document(2, 2, "", vec![0.0, 1.0, 0.0]),
        CorpusRow::document(3, 3, "", vec![0.0, 1.0]),
    ]);

    let audit = audit_corpus(&corpus, Some(2), 10, &CancellationToken::new())
        .await
        .expect("audit should succeed");

    assert_eq!(audit.valid, 1);
    assert_eq!(audit.dimension, Some(2));
    assert_eq!(audit.skipped.dimension_mismatch, 2);
}

#[test]
fn skipped_records_count_by_defect() {
    let mut skipped = SkippedRecords::default();
    assert!(skipped.is_empty());

    skipped.record(&RecordDefect::ZeroNorm);
    skipped.record(&RecordDefect::DimensionMismatch {
        expected: 2,
        found: 3,
    });
    skipped.record(&RecordDefect::ZeroNorm);

    assert_eq!(skipped.zero_norm, 2);
    assert_eq!(skipped.dimension_mismatch, 1);
    assert_eq!(skipped.total(), 3);
    assert!(!skipped.is_empty());
}
