use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::models::{
    Document, EmbeddingRow, NewDocument, SourceFilter, SourceType, StoreStatistics,
};
use crate::database::queries::DocumentQueries;

#[cfg(test)]
mod tests;

pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Handle to the document + vector store: a SQLite pool with an FTS5 index
/// over chunk text and an embeddings table cascade-tied to documents.
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

        sqlx::migrate!("src/database/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("recall.db")).await
    }

    pub async fn insert_with_embedding(
        &self,
        new_document: NewDocument,
        vector: &[f32],
        model_id: &str,
    ) -> Result<Document> {
        DocumentQueries::insert_with_embedding(&self.pool, new_document, vector, model_id).await
    }

    pub async fn load_all(
        &self,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<(Document, Vec<f32>)>> {
        DocumentQueries::load_all(&self.pool, filter).await
    }

    pub async fn full_text_search(
        &self,
        query: &str,
        limit: u32,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<Document>> {
        DocumentQueries::full_text_search(&self.pool, query, limit, filter).await
    }

    pub async fn full_text_search_with_vectors(
        &self,
        query: &str,
        limit: u32,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<(Document, Vec<f32>)>> {
        DocumentQueries::full_text_search_with_vectors(&self.pool, query, limit, filter).await
    }

    pub async fn delete_by_source(&self, source_type: SourceType, source_id: &str) -> Result<u64> {
        DocumentQueries::delete_by_source(&self.pool, source_type, source_id).await
    }

    pub async fn delete_by_conversation(&self, conversation_id: &str) -> Result<u64> {
        DocumentQueries::delete_by_conversation(&self.pool, conversation_id).await
    }

    pub async fn delete_all(&self) -> Result<u64> {
        DocumentQueries::delete_all(&self.pool).await
    }

    pub async fn get_document_by_id(&self, id: i64) -> Result<Option<Document>> {
        DocumentQueries::get_by_id(&self.pool, id).await
    }

    pub async fn get_embedding_for_document(
        &self,
        document_id: i64,
    ) -> Result<Option<EmbeddingRow>> {
        DocumentQueries::get_embedding_for_document(&self.pool, document_id).await
    }

    pub async fn statistics(&self) -> Result<StoreStatistics> {
        DocumentQueries::statistics(&self.pool).await
    }
}
