//! Search entrypoint
//!
//! [`SemanticSearch`] wires the embedding provider, the corpus, and the
//! subject store into a single call: embed the query, rank the corpus, and
//! hydrate the winners. Each call owns its query vector, top-K structure and
//! hit list, so one engine can serve concurrent searches.


pub mod errors;

pub use errors::{NO_RELEVANT_RESULTS, SearchError};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MAX_TOP_K, SearchConfig};
use crate::corpus::CorpusSource;
use crate::database::Database;
use crate::embeddings::{EmbeddingError, EmbeddingProvider, OpenAiClient};
use crate::hydration::{HydratedResult, SubjectStore, hydrate};
use crate::ranking::{
    DEFAULT_BATCH_SIZE, DEFAULT_MIN_SCORE, DEFAULT_TOP_K, RankingOptions, SkippedRecords,
    rank_corpus,
};

/// Per-request tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub top_k: usize,
    pub min_score: f32,
    pub batch_size: usize,
}

impl Default for SearchOptions {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl From<&SearchConfig> for SearchOptions {
    #[inline]
    fn from(config: &SearchConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_score: config.min_score,
            batch_size: config.batch_size,
        }
    }
}

impl SearchOptions {
    #[inline]
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.top_k > MAX_TOP_K {
            return Err(SearchError::invalid_options(format!(
                "top_k {} exceeds the maximum of {}",
                self.top_k, MAX_TOP_K
            )));
        }
        self.ranking().validate()
    }

    fn ranking(&self) -> RankingOptions {
        RankingOptions {
            top_k: self.top_k,
            min_score: self.min_score,
            batch_size: self.batch_size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Corpus rows read
    pub scanned: u64,
    /// Corpus pages that contained rows
    pub pages: u64,
    /// Rows that could not be scored
    pub skipped: SkippedRecords,
    /// Hits whose subject was deleted before hydration
    pub dropped: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Hydrated hits, best first
    pub results: Vec<HydratedResult>,
    pub stats: SearchStats,
}

impl SearchResponse {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Clone)]
pub struct SemanticSearch {
    embedder: Arc<dyn EmbeddingProvider>,
    corpus: Arc<dyn CorpusSource>,
    subjects: Arc<dyn SubjectStore>,
    expected_dimensions: Option<usize>,
    scan_timeout: Option<Duration>,
}

impl std::fmt::Debug for SemanticSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticSearch")
            .field("expected_dimensions", &self.expected_dimensions)
            .field("scan_timeout", &self.scan_timeout)
            .finish_non_exhaustive()
    }
}

impl SemanticSearch {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        corpus: Arc<dyn CorpusSource>,
        subjects: Arc<dyn SubjectStore>,
    ) -> Self {
        Self {
            embedder,
            corpus,
            subjects,
            expected_dimensions: None,
            scan_timeout: None,
        }
    }

    /// Build an engine backed by the configured provider and database
    #[inline]
    pub fn from_config(config: &Config, database: Database) -> Result<Self> {
        let client = OpenAiClient::new(&config.embedding)?;
        let database = Arc::new(database);

        let corpus: Arc<dyn CorpusSource> = Arc::<Database>::clone(&database);

        Ok(Self::new(Arc::new(client), corpus, database)
            .with_expected_dimensions(config.embedding.dimensions.map(|d| d as usize))
            .with_scan_timeout(config.search.scan_timeout()))
    }

    /// Reject query vectors whose length differs from `dimensions`
    #[inline]
    pub fn with_expected_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.expected_dimensions = dimensions;
        self
    }

    /// Abort any corpus scan that runs longer than `limit`
    #[inline]
    pub fn with_scan_timeout(mut self, limit: Option<Duration>) -> Self {
        self.scan_timeout = limit;
        self
    }

    /// Run one search
    ///
    /// An empty `results` list is a valid outcome meaning nothing cleared
    /// `min_score`. Any error means no results at all; partial rankings are
    /// never returned.
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();

        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        options.validate()?;

        if options.top_k == 0 {
            debug!("top_k is 0, returning an empty result");
            return Ok(SearchResponse::default());
        }

        let vector = self.embed(query, cancel).await?;

        if let Some(expected) = self.expected_dimensions {
            if vector.len() != expected {
                return Err(SearchError::invalid_query_vector(format!(
                    "expected {} dimensions, provider returned {}",
                    expected,
                    vector.len()
                )));
            }
        }

        let ranking_options = options.ranking();
        let ranking = rank_corpus(self.corpus.as_ref(), &vector, &ranking_options, cancel);
        let outcome = match self.scan_timeout {
            Some(limit) => tokio::time::timeout(limit, ranking).await.map_err(|_| {
                warn!("Corpus scan exceeded {:?}, abandoning search", limit);
                SearchError::ScanTimedOut { limit }
            })??,
            None => ranking.await?,
        };

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let hydrated = hydrate(outcome.hits, self.subjects.as_ref()).await?;

        let stats = SearchStats {
            scanned: outcome.scanned,
            pages: outcome.pages,
            skipped: outcome.skipped,
            dropped: hydrated.dropped,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        info!(
            "Search returned {} results from {} records in {}ms ({} skipped, {} dropped)",
            hydrated.results.len(),
            stats.scanned,
            stats.elapsed_ms,
            stats.skipped.total(),
            stats.dropped
        );

        Ok(SearchResponse {
            results: hydrated.results,
            stats,
        })
    }

    async fn embed(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<f32>, SearchError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SearchError::Cancelled),
            embedded = self.embedder.embed(query) => match embedded {
                Ok(vector) if vector.is_empty() => {
                    error!("Query embedding failed: {}", EmbeddingError::EmptyResult);
                    Err(SearchError::EmbeddingProvider(EmbeddingError::EmptyResult))
                }
                Ok(vector) => Ok(vector),
                Err(e) => {
                    error!("Query embedding failed: {}", e);
                    Err(SearchError::from(e))
                }
            },
        }
    }
}
