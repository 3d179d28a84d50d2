//! Similarity ranking over a paged corpus
//!
//! [`rank_corpus`] streams the corpus page by page, scores every valid record
//! against the query, and keeps only the best `top_k` hits in a bounded heap.
//! Memory use is bounded by one page plus `top_k` hits no matter how large the
//! corpus grows. Rows that cannot be scored are skipped and counted in
//! [`SkippedRecords`] instead of failing the search; a failed page fetch
//! fails the whole ranking.

#[cfg(test)]
mod tests;

pub mod similarity;
pub mod top_k;

pub use similarity::QueryVector;
pub use top_k::TopK;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::corpus::{CorpusRow, CorpusSource, RecordDefect, SubjectRef};
use crate::search::SearchError;

pub const DEFAULT_TOP_K: usize = 20;
pub const DEFAULT_MIN_SCORE: f32 = 0.25;
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingOptions {
    /// Maximum number of hits to return
    pub top_k: usize,
    /// Records scoring below this never compete for a slot
    pub min_score: f32,
    /// Rows requested per corpus page
    pub batch_size: usize,
}

impl Default for RankingOptions {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl RankingOptions {
    #[inline]
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.batch_size == 0 {
            return Err(SearchError::invalid_options("batch_size must be at least 1"));
        }
        if !self.min_score.is_finite() {
            return Err(SearchError::invalid_options("min_score must be finite"));
        }
        Ok(())
    }
}

/// A corpus record that made it into the ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub corpus_record_id: i64,
    pub subject: SubjectRef,
    pub score: f32,
    pub snippet: String,
}

/// Per-defect counts of corpus rows that were skipped during a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecords {
    pub unparsable_vector: u64,
    pub dimension_mismatch: u64,
    pub non_finite_component: u64,
    pub zero_norm: u64,
    pub missing_subject: u64,
    pub ambiguous_subject: u64,
}

impl SkippedRecords {
    #[inline]
    pub fn record(&mut self, defect: &RecordDefect) {
        let counter = match defect {
            RecordDefect::UnparsableVector => &mut self.unparsable_vector,
            RecordDefect::DimensionMismatch { .. } => &mut self.dimension_mismatch,
            RecordDefect::NonFiniteComponent => &mut self.non_finite_component,
            RecordDefect::ZeroNorm => &mut self.zero_norm,
            RecordDefect::MissingSubject => &mut self.missing_subject,
            RecordDefect::AmbiguousSubject => &mut self.ambiguous_subject,
        };
        *counter += 1;
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.unparsable_vector
            + self.dimension_mismatch
            + self.non_finite_component
            + self.zero_norm
            + self.missing_subject
            + self.ambiguous_subject
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankOutcome {
    /// Hits sorted by descending score, ties by ascending record id
    pub hits: Vec<RankedHit>,
    /// Rows read from the corpus
    pub scanned: u64,
    /// Pages fetched that contained rows
    pub pages: u64,
    pub skipped: SkippedRecords,
}

/// Result of a full data-quality pass over the corpus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusAudit {
    pub scanned: u64,
    pub valid: u64,
    pub skipped: SkippedRecords,
    /// Dimension the audit checked vectors against
    pub dimension: Option<usize>,
    /// Number of decodable vectors per dimension
    pub dimensions: BTreeMap<usize, u64>,
}

struct Scan<'q> {
    query: QueryVector<'q>,
    min_score: f32,
    top: TopK,
    scanned: u64,
    pages: u64,
    skipped: SkippedRecords,
}

impl<'q> Scan<'q> {
    fn new(query: QueryVector<'q>, options: &RankingOptions) -> Self {
        Self {
            query,
            min_score: options.min_score,
            top: TopK::new(options.top_k),
            scanned: 0,
            pages: 0,
            skipped: SkippedRecords::default(),
        }
    }

    fn score_page(&mut self, rows: Vec<CorpusRow>) {
        self.pages += 1;

        for row in rows {
            self.scanned += 1;
            let id = row.id;

            let scored = row
                .into_record(self.query.dimension())
                .and_then(|record| self.query.score(&record.vector).map(|score| (record, score)));

            let (record, score) = match scored {
                Ok(scored) => scored,
                Err(defect) => {
                    warn!("Skipping corpus record {}: {}", id, defect);
                    self.skipped.record(&defect);
                    continue;
                }
            };

            if score < self.min_score {
                continue;
            }

            self.top.offer(RankedHit {
                corpus_record_id: record.id,
                subject: record.subject,
                score,
                snippet: record.snippet,
            });
        }
    }

    fn finish(self) -> RankOutcome {
        RankOutcome {
            hits: self.top.into_sorted_vec(),
            scanned: self.scanned,
            pages: self.pages,
            skipped: self.skipped,
        }
    }
}

/// Rank the whole corpus against `query_vector`
///
/// The next page is requested while the current one is being scored. The
/// token is checked between pages and raced against every page fetch; a
/// cancelled or failed scan never yields a partial ranking.
#[inline]
pub async fn rank_corpus(
    corpus: &dyn CorpusSource,
    query_vector: &[f32],
    options: &RankingOptions,
    cancel: &CancellationToken,
) -> Result<RankOutcome, SearchError> {
    options.validate()?;
    let query = QueryVector::new(query_vector)?;

    if options.top_k == 0 {
        debug!("top_k is 0, skipping corpus scan");
        return Ok(RankOutcome::default());
    }

    let batch_size = options.batch_size;
    let mut scan = Scan::new(query, options);
    let mut offset = 0;
    let mut page = fetch_page(corpus, offset, batch_size, cancel).await?;

    while !page.is_empty() {
        let rows = page.len();
        debug!("Scoring corpus page at offset {} ({} rows)", offset, rows);

        if rows < batch_size {
            scan.score_page(page);
            break;
        }

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        offset += rows;
        let (next, ()) = tokio::join!(fetch_page(corpus, offset, batch_size, cancel), async {
            scan.score_page(page);
        });
        page = next?;
    }

    let outcome = scan.finish();
    if !outcome.skipped.is_empty() {
        warn!(
            "Skipped {} of {} corpus records during ranking",
            outcome.skipped.total(),
            outcome.scanned
        );
    }
    debug!(
        "Ranked {} records across {} pages, {} hits retained",
        outcome.scanned,
        outcome.pages,
        outcome.hits.len()
    );

    Ok(outcome)
}

/// Scan the whole corpus and classify every row
///
/// Without an `expected_dimension` the most common dimension is taken as the
/// reference and every other dimension is counted as a mismatch.
#[inline]
pub async fn audit_corpus(
    corpus: &dyn CorpusSource,
    expected_dimension: Option<usize>,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<CorpusAudit, SearchError> {
    if batch_size == 0 {
        return Err(SearchError::invalid_options("batch_size must be at least 1"));
    }

    let mut audit = CorpusAudit::default();
    let mut offset = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let page = fetch_page(corpus, offset, batch_size, cancel).await?;
        let rows = page.len();

        for row in page {
            audit.scanned += 1;
            let id = row.id;
            match row.decode() {
                Ok(record) if record.vector.iter().all(|c| *c == 0.0) => {
                    debug!("Corpus record {} has a zero vector", id);
                    audit.skipped.record(&RecordDefect::ZeroNorm);
                }
                Ok(record) => {
                    *audit.dimensions.entry(record.vector.len()).or_default() += 1;
                }
                Err(defect) => {
                    debug!("Corpus record {} is defective: {}", id, defect);
                    audit.skipped.record(&defect);
                }
            }
        }

        if rows < batch_size {
            break;
        }
        offset += rows;
    }

    let reference = expected_dimension.or_else(|| {
        audit
            .dimensions
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(dimension, _)| *dimension)
    });

    let decodable: u64 = audit.dimensions.values().sum();
    let matching = reference
        .and_then(|dimension| audit.dimensions.get(&dimension))
        .copied()
        .unwrap_or(0);

    audit.skipped.dimension_mismatch += decodable - matching;
    audit.valid = matching;
    audit.dimension = reference;

    Ok(audit)
}

async fn fetch_page(
    corpus: &dyn CorpusSource,
    offset: usize,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<Vec<CorpusRow>, SearchError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SearchError::Cancelled),
        page = corpus.fetch_page(offset, limit) => page.map_err(|source| {
            error!("Corpus page fetch at offset {} failed: {:#}", offset, source);
            SearchError::CorpusAccess {
                offset: Some(offset),
                source,
            }
        }),
    }
}
