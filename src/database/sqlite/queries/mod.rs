
use super::models::*;
use crate::corpus::encode_vector;
use anyhow::{Context, Result};
use itertools::Itertools;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// `?, ?, ...` with one placeholder per id
fn placeholders(count: usize) -> String {
    std::iter::repeat_n("?", count).join(", ")
}

fn to_i64(value: usize, what: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{} {} does not fit in an SQLite integer", what, value))
}

fn encode(embedding: &NewEmbedding) -> Result<String> {
    encode_vector(&embedding.vector).with_context(|| {
        format!(
            "Refusing to store embedding for {:?}/{:?}",
            embedding.document_id, embedding.flight_id
        )
    })
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

pub struct EmbeddingQueries;

impl EmbeddingQueries {
    /// One page of the corpus in ascending id order
    #[inline]
    pub async fn fetch_page(pool: &SqlitePool, offset: usize, limit: usize) -> Result<Vec<EmbeddingRow>> {
        let rows = sqlx::query_as::<_, EmbeddingRow>(
            r#"
            SELECT id,
                   document_id,
                   flight_id,
                   content_text,
                   embedding_vector
            FROM embeddings
            ORDER BY id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(to_i64(limit, "limit")?)
        .bind(to_i64(offset, "offset")?)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to fetch embeddings page at offset {}", offset))?;

        Ok(rows)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(pool)
            .await
            .context("Failed to count embeddings")?;

        Ok(to_u64(count))
    }

    #[inline]
    pub async fn insert(pool: &SqlitePool, embedding: &NewEmbedding) -> Result<i64> {
        let vector = encode(embedding)?;
        let id = sqlx::query(
            r#"
            INSERT INTO embeddings (document_id, flight_id, content_text, embedding_vector)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(embedding.document_id)
        .bind(embedding.flight_id)
        .bind(&embedding.content_text)
        .bind(vector)
        .execute(pool)
        .await
        .context("Failed to insert embedding")?
        .last_insert_rowid();

        Ok(id)
    }

    /// Store a raw, possibly malformed vector column as-is
    #[inline]
    pub async fn insert_raw(
        pool: &SqlitePool,
        document_id: Option<i64>,
        flight_id: Option<i64>,
        content_text: &str,
        embedding_vector: Option<&str>,
    ) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO embeddings (document_id, flight_id, content_text, embedding_vector)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(document_id)
        .bind(flight_id)
        .bind(content_text)
        .bind(embedding_vector)
        .execute(pool)
        .await
        .context("Failed to insert raw embedding")?
        .last_insert_rowid();

        Ok(id)
    }

    #[inline]
    pub async fn insert_batch(pool: &SqlitePool, embeddings: &[NewEmbedding]) -> Result<Vec<i64>> {
        if embeddings.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = embeddings.iter().map(encode).collect::<Result<Vec<_>>>()?;

        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for batch embedding insert")?;

        let mut ids = Vec::with_capacity(embeddings.len());
        for (embedding, vector) in embeddings.iter().zip(vectors) {
            let id = sqlx::query(
                r#"
                INSERT INTO embeddings (document_id, flight_id, content_text, embedding_vector)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(embedding.document_id)
            .bind(embedding.flight_id)
            .bind(&embedding.content_text)
            .bind(vector)
            .execute(&mut *transaction)
            .await
            .context("Failed to insert embedding in batch")?
            .last_insert_rowid();

            ids.push(id);
        }

        transaction
            .commit()
            .await
            .context("Failed to commit batch embedding insert transaction")?;

        debug!("Inserted {} embeddings", ids.len());
        Ok(ids)
    }
}

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn insert(pool: &SqlitePool, document: &NewDocument) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO documents (title, ai_summary, data_set, file_type)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&document.title)
        .bind(&document.ai_summary)
        .bind(&document.data_set)
        .bind(&document.file_type)
        .execute(pool)
        .await
        .context("Failed to insert document")?
        .last_insert_rowid();

        Ok(id)
    }

    /// Fetch every listed document in one query; unknown ids are absent
    #[inline]
    pub async fn fetch_many(pool: &SqlitePool, ids: &BTreeSet<i64>) -> Result<HashMap<i64, DocumentRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            r#"
            SELECT id,
                   title,
                   ai_summary,
                   data_set,
                   file_type,
                   created_at
            FROM documents
            WHERE id IN ({})
            "#,
            placeholders(ids.len())
        );

        let mut query = sqlx::query_as::<_, DocumentRecord>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        let documents = query
            .fetch_all(pool)
            .await
            .context("Failed to fetch documents by id")?;

        debug!("Fetched {} of {} requested documents", documents.len(), ids.len());
        Ok(documents.into_iter().map(|d| (d.id, d)).collect())
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(pool)
            .await
            .context("Failed to count documents")?;

        Ok(to_u64(count))
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct FlightQueries;

impl FlightQueries {
    #[inline]
    pub async fn insert(pool: &SqlitePool, flight: &NewFlight) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO flight_logs (origin, destination, flight_date, aircraft, ai_summary)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&flight.origin)
        .bind(&flight.destination)
        .bind(flight.flight_date)
        .bind(&flight.aircraft)
        .bind(&flight.ai_summary)
        .execute(pool)
        .await
        .context("Failed to insert flight log")?
        .last_insert_rowid();

        Ok(id)
    }

    /// Fetch every listed flight log in one query; unknown ids are absent
    #[inline]
    pub async fn fetch_many(pool: &SqlitePool, ids: &BTreeSet<i64>) -> Result<HashMap<i64, FlightRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            r#"
            SELECT id,
                   origin,
                   destination,
                   flight_date,
                   aircraft,
                   ai_summary
            FROM flight_logs
            WHERE id IN ({})
            "#,
            placeholders(ids.len())
        );

        let mut query = sqlx::query_as::<_, FlightRecord>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        let flights = query
            .fetch_all(pool)
            .await
            .context("Failed to fetch flight logs by id")?;

        debug!("Fetched {} of {} requested flight logs", flights.len(), ids.len());
        Ok(flights.into_iter().map(|f| (f.id, f)).collect())
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flight_logs")
            .fetch_one(pool)
            .await
            .context("Failed to count flight logs")?;

        Ok(to_u64(count))
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flight_logs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete flight log")?;

        Ok(result.rows_affected() > 0)
    }
}
