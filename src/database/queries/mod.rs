
use super::models::{Document, EmbeddingRow, NewDocument, SourceFilter, SourceType, StoreStatistics};
use crate::RecallError;
use crate::similarity::{decode_vector, encode_vector};
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, Row, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

/// Classify persistence failures so callers can tell storage errors apart
/// from skippable per-chunk failures.
fn storage_error(action: &str, err: sqlx::Error) -> anyhow::Error {
    RecallError::Storage(format!("{action}: {err}")).into()
}

#[derive(Debug, FromRow)]
struct DocumentVectorRow {
    id: i64,
    source_type: SourceType,
    source_id: String,
    chunk_text: String,
    chunk_index: i64,
    metadata: String,
    created_at: NaiveDateTime,
    vector: Vec<u8>,
}

impl DocumentVectorRow {
    fn into_pair(self) -> (Document, Vec<f32>) {
        let vector = decode_vector(&self.vector);
        (
            Document {
                id: self.id,
                source_type: self.source_type,
                source_id: self.source_id,
                chunk_text: self.chunk_text,
                chunk_index: self.chunk_index,
                metadata: self.metadata,
                created_at: self.created_at,
            },
            vector,
        )
    }
}

const DOCUMENT_VECTOR_COLUMNS: &str = "d.id, d.source_type, d.source_id, d.chunk_text, \
     d.chunk_index, d.metadata, d.created_at, e.vector";

pub struct DocumentQueries;

impl DocumentQueries {
    /// Insert a document and its embedding in one transaction. Neither side
    /// can exist without the other; a failure rolls both back.
    #[inline]
    pub async fn insert_with_embedding(
        pool: &SqlitePool,
        new_document: NewDocument,
        vector: &[f32],
        model_id: &str,
    ) -> Result<Document> {
        let now = Utc::now().naive_utc();
        let metadata_json = serde_json::to_string(&new_document.metadata)
            .context("Failed to serialize document metadata")?;

        let mut transaction = pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin insert transaction", e))?;

        let document_id = sqlx::query(
            r#"
            INSERT INTO documents (source_type, source_id, chunk_text, chunk_index, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_document.source_type)
        .bind(&new_document.source_id)
        .bind(&new_document.chunk_text)
        .bind(new_document.chunk_index)
        .bind(&metadata_json)
        .bind(now)
        .execute(&mut *transaction)
        .await
        .map_err(|e| storage_error("Failed to insert document", e))?
        .last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO embeddings (document_id, vector, model_id, dimension, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(document_id)
        .bind(encode_vector(vector))
        .bind(model_id)
        .bind(vector.len() as i64)
        .bind(now)
        .execute(&mut *transaction)
        .await
        .map_err(|e| storage_error("Failed to insert embedding", e))?;

        transaction
            .commit()
            .await
            .map_err(|e| storage_error("Failed to commit insert transaction", e))?;

        Ok(Document {
            id: document_id,
            source_type: new_document.source_type,
            source_id: new_document.source_id,
            chunk_text: new_document.chunk_text,
            chunk_index: new_document.chunk_index,
            metadata: metadata_json,
            created_at: now,
        })
    }

    /// Bulk-load documents with their vectors for brute-force scanning.
    #[inline]
    pub async fn load_all(
        pool: &SqlitePool,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<(Document, Vec<f32>)>> {
        let mut sql = format!(
            "SELECT {DOCUMENT_VECTOR_COLUMNS} FROM documents d \
             JOIN embeddings e ON e.document_id = d.id"
        );

        let mut conditions = Vec::new();
        if let Some(filter) = filter {
            if filter.source_type.is_some() {
                conditions.push("d.source_type = ?");
            }
            if filter.source_id.is_some() {
                conditions.push("d.source_id = ?");
            }
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY d.id ASC");

        let mut query = sqlx::query_as::<_, DocumentVectorRow>(&sql);
        if let Some(filter) = filter {
            if let Some(source_type) = filter.source_type {
                query = query.bind(source_type);
            }
            if let Some(ref source_id) = filter.source_id {
                query = query.bind(source_id.clone());
            }
        }

        let rows = query
            .fetch_all(pool)
            .await
            .map_err(|e| storage_error("Failed to load documents with vectors", e))?;

        Ok(rows.into_iter().map(DocumentVectorRow::into_pair).collect())
    }

    /// Keyword search over chunk text via the FTS5 index, best match first.
    ///
    /// The raw query is reduced to quoted bare terms first, so arbitrary
    /// natural-language input can never produce an FTS syntax error; a query
    /// with no searchable terms returns an empty list.
    #[inline]
    pub async fn full_text_search(
        pool: &SqlitePool,
        query: &str,
        limit: u32,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<Document>> {
        let results = Self::full_text_search_with_vectors(pool, query, limit, filter).await?;
        Ok(results.into_iter().map(|(document, _)| document).collect())
    }

    /// Keyword search returning each match with its stored vector, saving a
    /// second round-trip when the caller reranks semantically.
    #[inline]
    pub async fn full_text_search_with_vectors(
        pool: &SqlitePool,
        query: &str,
        limit: u32,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<(Document, Vec<f32>)>> {
        let Some(match_expr) = sanitize_match_query(query) else {
            return Ok(Vec::new());
        };

        let mut sql = format!(
            "SELECT {DOCUMENT_VECTOR_COLUMNS} FROM documents_fts f \
             JOIN documents d ON d.id = f.rowid \
             JOIN embeddings e ON e.document_id = d.id \
             WHERE documents_fts MATCH ?"
        );
        if let Some(filter) = filter {
            if filter.source_type.is_some() {
                sql.push_str(" AND d.source_type = ?");
            }
            if filter.source_id.is_some() {
                sql.push_str(" AND d.source_id = ?");
            }
        }
        sql.push_str(" ORDER BY rank LIMIT ?");

        let mut db_query = sqlx::query_as::<_, DocumentVectorRow>(&sql).bind(match_expr);
        if let Some(filter) = filter {
            if let Some(source_type) = filter.source_type {
                db_query = db_query.bind(source_type);
            }
            if let Some(ref source_id) = filter.source_id {
                db_query = db_query.bind(source_id.clone());
            }
        }
        db_query = db_query.bind(limit);

        let rows = db_query
            .fetch_all(pool)
            .await
            .map_err(|e| storage_error("Failed to run full-text search", e))?;

        debug!("Full-text search matched {} documents", rows.len());
        Ok(rows.into_iter().map(DocumentVectorRow::into_pair).collect())
    }

    /// Delete all chunks for one source; embeddings and FTS rows cascade.
    #[inline]
    pub async fn delete_by_source(
        pool: &SqlitePool,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE source_type = ? AND source_id = ?")
            .bind(source_type)
            .bind(source_id)
            .execute(pool)
            .await
            .map_err(|e| storage_error("Failed to delete documents by source", e))?;

        debug!(
            "Deleted {} documents for {}/{}",
            result.rows_affected(),
            source_type,
            source_id
        );
        Ok(result.rows_affected())
    }

    /// Delete every chunk tied to a conversation: conversation-sourced rows
    /// by source id plus message rows tagged with the conversation in
    /// metadata.
    #[inline]
    pub async fn delete_by_conversation(
        pool: &SqlitePool,
        conversation_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM documents WHERE (source_type = ? AND source_id = ?) \
             OR json_extract(metadata, '$.conversation_id') = ?",
        )
        .bind(SourceType::Conversation)
        .bind(conversation_id)
        .bind(conversation_id)
        .execute(pool)
        .await
        .map_err(|e| storage_error("Failed to delete conversation documents", e))?;

        debug!(
            "Deleted {} documents for conversation {}",
            result.rows_affected(),
            conversation_id
        );
        Ok(result.rows_affected())
    }

    /// Full wipe of the corpus.
    #[inline]
    pub async fn delete_all(pool: &SqlitePool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM documents")
            .execute(pool)
            .await
            .map_err(|e| storage_error("Failed to delete all documents", e))?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
        let result = sqlx::query_as::<_, Document>(
            "SELECT id, source_type, source_id, chunk_text, chunk_index, metadata, created_at \
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| storage_error("Failed to get document by id", e))?;

        Ok(result)
    }

    #[inline]
    pub async fn get_embedding_for_document(
        pool: &SqlitePool,
        document_id: i64,
    ) -> Result<Option<EmbeddingRow>> {
        let result = sqlx::query_as::<_, EmbeddingRow>(
            "SELECT id, document_id, vector, model_id, dimension, created_at \
             FROM embeddings WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| storage_error("Failed to get embedding by document id", e))?;

        Ok(result)
    }

    #[inline]
    pub async fn statistics(pool: &SqlitePool) -> Result<StoreStatistics> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(pool)
            .await
            .map_err(|e| storage_error("Failed to count documents", e))?;

        let embeddings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(pool)
            .await
            .map_err(|e| storage_error("Failed to count embeddings", e))?;

        let rows = sqlx::query("SELECT source_type, COUNT(*) AS n FROM documents GROUP BY source_type")
            .fetch_all(pool)
            .await
            .map_err(|e| storage_error("Failed to count documents by source type", e))?;

        let mut by_source_type = HashMap::new();
        for row in rows {
            let source_type: String = row.get("source_type");
            let count: i64 = row.get("n");
            by_source_type.insert(source_type, count);
        }

        Ok(StoreStatistics {
            documents,
            embeddings,
            by_source_type,
        })
    }
}

/// Reduce arbitrary query text to a safe FTS5 MATCH expression: bare terms,
/// each double-quoted, joined with OR. Returns None when nothing remains.
fn sanitize_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{term}\""))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
