
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::corpus::{CorpusRow, VectorPayload};

pub use crate::hydration::{DocumentRecord, FlightRecord};

/// Row of the `embeddings` table with the vector still serialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EmbeddingRow {
    pub id: i64,
    pub document_id: Option<i64>,
    pub flight_id: Option<i64>,
    pub content_text: Option<String>,
    pub embedding_vector: Option<String>,
}

impl From<EmbeddingRow> for CorpusRow {
    #[inline]
    fn from(row: EmbeddingRow) -> Self {
        Self {
            id: row.id,
            document_id: row.document_id,
            flight_id: row.flight_id,
            snippet: row.content_text.unwrap_or_default(),
            // A NULL column fails decoding later and is counted as unparsable.
            vector: VectorPayload::Encoded(row.embedding_vector.unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEmbedding {
    pub document_id: Option<i64>,
    pub flight_id: Option<i64>,
    pub content_text: String,
    pub vector: Vec<f32>,
}

impl NewEmbedding {
    #[inline]
    pub fn for_document(document_id: i64, content_text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            document_id: Some(document_id),
            flight_id: None,
            content_text: content_text.into(),
            vector,
        }
    }

    #[inline]
    pub fn for_flight(flight_id: i64, content_text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            document_id: None,
            flight_id: Some(flight_id),
            content_text: content_text.into(),
            vector,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: Option<String>,
    pub ai_summary: Option<String>,
    pub data_set: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFlight {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub flight_date: Option<NaiveDate>,
    pub aircraft: Option<String>,
    pub ai_summary: Option<String>,
}

/// Row counts of the archive tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCounts {
    pub documents: u64,
    pub flights: u64,
    pub embeddings: u64,
}
