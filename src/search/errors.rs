//! Search error taxonomy
//!
//! Every failure of a search call is reported through [`SearchError`] so
//! front ends can tell "no embedding available" apart from "index
//! unreachable". An empty result is never an error.

use std::time::Duration;
use thiserror::Error;

use crate::embeddings::EmbeddingError;

/// Message shown when a search succeeds but nothing clears the score threshold
pub const NO_RELEVANT_RESULTS: &str = "No sufficiently relevant results found via semantic search.";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search query is empty")]
    EmptyQuery,

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(#[from] EmbeddingError),

    #[error("Invalid query vector: {reason}")]
    InvalidQueryVector { reason: String },

    /// `offset` is the corpus page that failed, `None` for subject lookups
    #[error("Search index access failed: {source}")]
    CorpusAccess {
        offset: Option<usize>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid search options: {reason}")]
    InvalidOptions { reason: String },

    #[error("Search was cancelled")]
    Cancelled,

    #[error("Corpus scan exceeded its time budget of {limit:?}")]
    ScanTimedOut { limit: Duration },
}

impl SearchError {
    #[inline]
    pub fn invalid_query_vector(reason: impl Into<String>) -> Self {
        Self::InvalidQueryVector {
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn invalid_options(reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            reason: reason.into(),
        }
    }

    /// Message suitable for showing to an end user
    #[inline]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "Please enter a search query.",
            Self::EmbeddingProvider(_) => {
                "Semantic search is temporarily unavailable. Please try again shortly."
            }
            Self::InvalidQueryVector { .. } => {
                "Semantic search could not interpret this query. Please try rephrasing it."
            }
            Self::CorpusAccess { .. } => {
                "The search index is currently unreachable. Please try again later."
            }
            Self::InvalidOptions { .. } => "The search options are invalid.",
            Self::Cancelled => "The search was cancelled.",
            Self::ScanTimedOut { .. } => {
                "The search took too long to complete. Please try a more specific query."
            }
        }
    }

    /// Whether retrying the same request later may succeed
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingProvider(_) | Self::CorpusAccess { .. } | Self::ScanTimedOut { .. }
        )
    }
}
