use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::corpus::{CorpusRow, CorpusSource};
use crate::hydration::SubjectStore;


pub mod models;
pub mod queries;

pub use models::*;
pub use queries::{DocumentQueries, EmbeddingQueries, FlightQueries};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open the archive database at `<config_dir>/archive.db`
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("archive.db")).await
    }

    /// Open the database configured in `config`
    pub async fn open(config: &Config) -> Result<Self> {
        let path = config.database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        debug!("Opening archive database at {}", path.display());
        Self::new(&path).await
    }

    pub async fn counts(&self) -> Result<ArchiveCounts> {
        let (documents, flights, embeddings) = futures::try_join!(
            DocumentQueries::count(&self.pool),
            FlightQueries::count(&self.pool),
            EmbeddingQueries::count(&self.pool),
        )?;

        Ok(ArchiveCounts {
            documents,
            flights,
            embeddings,
        })
    }

    // Subject operations
    pub async fn insert_document(&self, document: &NewDocument) -> Result<i64> {
        DocumentQueries::insert(&self.pool, document).await
    }

    pub async fn insert_flight(&self, flight: &NewFlight) -> Result<i64> {
        FlightQueries::insert(&self.pool, flight).await
    }

    pub async fn delete_document(&self, id: i64) -> Result<bool> {
        DocumentQueries::delete(&self.pool, id).await
    }

    pub async fn delete_flight(&self, id: i64) -> Result<bool> {
        FlightQueries::delete(&self.pool, id).await
    }

    // Corpus operations
    pub async fn insert_embedding(&self, embedding: &NewEmbedding) -> Result<i64> {
        EmbeddingQueries::insert(&self.pool, embedding).await
    }

    pub async fn insert_embeddings(&self, embeddings: &[NewEmbedding]) -> Result<Vec<i64>> {
        EmbeddingQueries::insert_batch(&self.pool, embeddings).await
    }
}

#[async_trait]
impl CorpusSource for Database {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<CorpusRow>> {
        let rows = EmbeddingQueries::fetch_page(&self.pool, offset, limit).await?;
        Ok(rows.into_iter().map(CorpusRow::from).collect())
    }

    async fn count(&self) -> Result<Option<u64>> {
        EmbeddingQueries::count(&self.pool).await.map(Some)
    }
}

#[async_trait]
impl SubjectStore for Database {
    async fn fetch_documents(&self, ids: &BTreeSet<i64>) -> Result<HashMap<i64, DocumentRecord>> {
        DocumentQueries::fetch_many(&self.pool, ids).await
    }

    async fn fetch_flights(&self, ids: &BTreeSet<i64>) -> Result<HashMap<i64, FlightRecord>> {
        FlightQueries::fetch_many(&self.pool, ids).await
    }
}
