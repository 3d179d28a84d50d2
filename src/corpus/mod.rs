//! Corpus records and the paged source they are streamed from
//!
//! The corpus itself is owned by the ingestion pipeline. This module only
//! describes what a stored row looks like, how it is validated into a
//! scorable [`CorpusRecord`], and the [`CorpusSource`] seam the ranker pulls
//! pages through.


pub mod memory;

pub use memory::InMemoryCorpus;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of subject a corpus record points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Document,
    Flight,
}

impl std::fmt::Display for SubjectKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            SubjectKind::Document => write!(f, "document"),
            SubjectKind::Flight => write!(f, "flight"),
        }
    }
}

/// Reference to exactly one subject record by foreign id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SubjectRef {
    Document(i64),
    Flight(i64),
}

impl SubjectRef {
    #[inline]
    pub fn kind(&self) -> SubjectKind {
        match *self {
            SubjectRef::Document(_) => SubjectKind::Document,
            SubjectRef::Flight(_) => SubjectKind::Flight,
        }
    }

    #[inline]
    pub fn id(&self) -> i64 {
        match *self {
            SubjectRef::Document(id) | SubjectRef::Flight(id) => id,
        }
    }
}

/// Stored vector as handed over by a source
///
/// SQL-backed sources hand over the serialized column untouched so that
/// decoding failures are attributed to the individual record rather than to
/// the page fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorPayload {
    /// JSON array of floats, as persisted by the ingestion pipeline
    Encoded(String),
    /// Already decoded components
    Decoded(Vec<f32>),
}

/// A row exactly as it comes out of the corpus store
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusRow {
    pub id: i64,
    pub document_id: Option<i64>,
    pub flight_id: Option<i64>,
    pub snippet: String,
    pub vector: VectorPayload,
}

/// A validated, scorable corpus record
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusRecord {
    pub id: i64,
    pub subject: SubjectRef,
    pub snippet: String,
    pub vector: Vec<f32>,
}

/// Reason a stored row cannot take part in ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordDefect {
    #[error("stored vector could not be parsed")]
    UnparsableVector,
    #[error("vector has {found} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("vector contains a non-finite component")]
    NonFiniteComponent,
    #[error("vector has zero magnitude")]
    ZeroNorm,
    #[error("record references neither a document nor a flight")]
    MissingSubject,
    #[error("record references both a document and a flight")]
    AmbiguousSubject,
}

impl CorpusRow {
    /// Build a row referencing a document with already decoded components
    #[inline]
    pub fn document(id: i64, document_id: i64, snippet: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id,
            document_id: Some(document_id),
            flight_id: None,
            snippet: snippet.into(),
            vector: VectorPayload::Decoded(vector),
        }
    }

    /// Build a row referencing a flight log with already decoded components
    #[inline]
    pub fn flight(id: i64, flight_id: i64, snippet: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id,
            document_id: None,
            flight_id: Some(flight_id),
            snippet: snippet.into(),
            vector: VectorPayload::Decoded(vector),
        }
    }

    /// Resolve the subject reference, enforcing that exactly one is set
    #[inline]
    pub fn subject(&self) -> Result<SubjectRef, RecordDefect> {
        match (self.document_id, self.flight_id) {
            (Some(document_id), None) => Ok(SubjectRef::Document(document_id)),
            (None, Some(flight_id)) => Ok(SubjectRef::Flight(flight_id)),
            (None, None) => Err(RecordDefect::MissingSubject),
            (Some(_), Some(_)) => Err(RecordDefect::AmbiguousSubject),
        }
    }

    /// Decode the row without constraining its dimension
    #[inline]
    pub fn decode(self) -> Result<CorpusRecord, RecordDefect> {
        let subject = self.subject()?;

        let vector = match self.vector {
            VectorPayload::Decoded(vector) => vector,
            VectorPayload::Encoded(raw) => decode_vector(&raw)?,
        };

        if vector.iter().any(|component| !component.is_finite()) {
            return Err(RecordDefect::NonFiniteComponent);
        }

        Ok(CorpusRecord {
            id: self.id,
            subject,
            snippet: self.snippet,
            vector,
        })
    }

    /// Validate the row into a scorable record of the given dimension
    ///
    /// Only structural checks happen here; magnitude is checked while scoring
    /// because the norm is computed there anyway.
    #[inline]
    pub fn into_record(self, dimension: usize) -> Result<CorpusRecord, RecordDefect> {
        let record = self.decode()?;

        if record.vector.len() != dimension {
            return Err(RecordDefect::DimensionMismatch {
                expected: dimension,
                found: record.vector.len(),
            });
        }

        Ok(record)
    }
}

/// Decode a JSON float array as written by the ingestion pipeline
#[inline]
pub fn decode_vector(raw: &str) -> Result<Vec<f32>, RecordDefect> {
    serde_json::from_str::<Vec<f32>>(raw).map_err(|_| RecordDefect::UnparsableVector)
}

/// Serialize a vector in the storage format
///
/// Non-finite components have no JSON representation and are rejected.
#[inline]
pub fn encode_vector(vector: &[f32]) -> Result<String, RecordDefect> {
    if vector.iter().any(|component| !component.is_finite()) {
        return Err(RecordDefect::NonFiniteComponent);
    }
    serde_json::to_string(vector).map_err(|_| RecordDefect::UnparsableVector)
}

/// Paged, read-only access to the vector corpus
///
/// Implementations return at most `limit` rows starting at `offset` in a
/// stable order. A page shorter than `limit` marks the end of the corpus and
/// an empty page signals exhaustion.
#[async_trait]
pub trait CorpusSource: Send + Sync {
    async fn fetch_page(&self, offset: usize, limit: usize) -> anyhow::Result<Vec<CorpusRow>>;

    /// Total number of rows, when the source can tell cheaply
    async fn count(&self) -> anyhow::Result<Option<u64>> {
        Ok(None)
    }
}
