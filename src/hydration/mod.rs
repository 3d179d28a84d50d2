//! Resolution of ranked hits into full subject records
//!
//! Hits are grouped by subject kind and each kind is fetched with at most one
//! batched lookup, so the number of store round trips does not grow with the
//! number of hits. Hits whose subject no longer exists are dropped.


use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, warn};

use crate::corpus::SubjectRef;
use crate::ranking::RankedHit;
use crate::search::SearchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentRecord {
    pub id: i64,
    pub title: Option<String>,
    pub ai_summary: Option<String>,
    pub data_set: Option<String>,
    pub file_type: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FlightRecord {
    pub id: i64,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub flight_date: Option<NaiveDate>,
    pub aircraft: Option<String>,
    pub ai_summary: Option<String>,
}

impl DocumentRecord {
    #[inline]
    pub fn display_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => "Untitled Document".to_string(),
        }
    }
}

impl FlightRecord {
    #[inline]
    pub fn display_title(&self) -> String {
        let route = format!(
            "{} to {}",
            self.origin.as_deref().unwrap_or("Unknown"),
            self.destination.as_deref().unwrap_or("Unknown")
        );
        match self.flight_date {
            Some(date) => format!("Flight: {} ({})", route, date),
            None => format!("Flight: {}", route),
        }
    }
}

/// The full record a hit points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Subject {
    Document(DocumentRecord),
    Flight(FlightRecord),
}

impl Subject {
    #[inline]
    pub fn id(&self) -> i64 {
        match self {
            Subject::Document(document) => document.id,
            Subject::Flight(flight) => flight.id,
        }
    }

    #[inline]
    pub fn title(&self) -> String {
        match self {
            Subject::Document(document) => document.display_title(),
            Subject::Flight(flight) => flight.display_title(),
        }
    }

    #[inline]
    pub fn summary(&self) -> Option<&str> {
        match self {
            Subject::Document(document) => document.ai_summary.as_deref(),
            Subject::Flight(flight) => flight.ai_summary.as_deref(),
        }
    }
}

/// A ranked hit joined with its subject record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydratedResult {
    pub corpus_record_id: i64,
    pub score: f32,
    pub snippet: String,
    pub subject: Subject,
}

/// Batched, read-only lookup of subject records by id
///
/// Ids that do not exist are simply absent from the returned map.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn fetch_documents(&self, ids: &BTreeSet<i64>) -> anyhow::Result<HashMap<i64, DocumentRecord>>;

    async fn fetch_flights(&self, ids: &BTreeSet<i64>) -> anyhow::Result<HashMap<i64, FlightRecord>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hydrated {
    /// Results in the order of the ranked hits
    pub results: Vec<HydratedResult>,
    /// Hits whose subject no longer exists
    pub dropped: u64,
}

/// Join ranked hits with their subjects, preserving rank order
///
/// Documents and flights are fetched concurrently, and a kind with no hits
/// is not fetched at all.
#[inline]
pub async fn hydrate(hits: Vec<RankedHit>, store: &dyn SubjectStore) -> Result<Hydrated, SearchError> {
    if hits.is_empty() {
        return Ok(Hydrated::default());
    }

    let mut document_ids = BTreeSet::new();
    let mut flight_ids = BTreeSet::new();
    for hit in &hits {
        match hit.subject {
            SubjectRef::Document(id) => document_ids.insert(id),
            SubjectRef::Flight(id) => flight_ids.insert(id),
        };
    }

    debug!(
        "Hydrating {} hits ({} documents, {} flights)",
        hits.len(),
        document_ids.len(),
        flight_ids.len()
    );

    let (documents, flights) = futures::try_join!(
        async {
            if document_ids.is_empty() {
                Ok(HashMap::new())
            } else {
                store.fetch_documents(&document_ids).await
            }
        },
        async {
            if flight_ids.is_empty() {
                Ok(HashMap::new())
            } else {
                store.fetch_flights(&flight_ids).await
            }
        }
    )
    .map_err(|source| {
        error!("Subject lookup failed: {:#}", source);
        SearchError::CorpusAccess {
            offset: None,
            source,
        }
    })?;

    let mut hydrated = Hydrated {
        results: Vec::with_capacity(hits.len()),
        dropped: 0,
    };

    for hit in hits {
        // Several hits may share a subject, so records are cloned out of the maps.
        let subject = match hit.subject {
            SubjectRef::Document(id) => documents.get(&id).cloned().map(Subject::Document),
            SubjectRef::Flight(id) => flights.get(&id).cloned().map(Subject::Flight),
        };

        let Some(subject) = subject else {
            warn!(
                "Dropping hit {}: {} {} no longer exists",
                hit.corpus_record_id,
                hit.subject.kind(),
                hit.subject.id()
            );
            hydrated.dropped += 1;
            continue;
        };

        hydrated.results.push(HydratedResult {
            corpus_record_id: hit.corpus_record_id,
            score: hit.score,
            snippet: hit.snippet,
            subject,
        });
    }

    Ok(hydrated)
}
