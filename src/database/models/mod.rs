#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use std::collections::HashMap;

/// Category a chunk originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Message,
    Conversation,
    Code,
    Documentation,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::Message,
        SourceType::Conversation,
        SourceType::Code,
        SourceType::Documentation,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Message => "message",
            SourceType::Conversation => "conversation",
            SourceType::Code => "code",
            SourceType::Documentation => "documentation",
        }
    }
}

impl std::fmt::Display for SourceType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(SourceType::Message),
            "conversation" => Ok(SourceType::Conversation),
            "code" => Ok(SourceType::Code),
            "documentation" => Ok(SourceType::Documentation),
            other => Err(format!(
                "unknown source type '{other}' (expected message, conversation, code, or documentation)"
            )),
        }
    }
}

/// A persisted text chunk. Immutable after creation; removed only by
/// source-scoped deletion or a full wipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub source_type: SourceType,
    pub source_id: String,
    pub chunk_text: String,
    pub chunk_index: i64,
    /// String-keyed map stored as JSON text.
    pub metadata: String,
    pub created_at: NaiveDateTime,
}

impl Document {
    /// Decode the metadata map. Malformed rows decode as empty rather than
    /// failing a search.
    #[inline]
    pub fn metadata_map(&self) -> HashMap<String, String> {
        serde_json::from_str(&self.metadata).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub source_type: SourceType,
    pub source_id: String,
    pub chunk_text: String,
    pub chunk_index: i64,
    pub metadata: HashMap<String, String>,
}

impl NewDocument {
    #[inline]
    pub fn new(source_type: SourceType, source_id: impl Into<String>, chunk_text: impl Into<String>) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
            chunk_text: chunk_text.into(),
            chunk_index: 0,
            metadata: HashMap::new(),
        }
    }

    #[inline]
    pub fn with_chunk_index(mut self, index: i64) -> Self {
        self.chunk_index = index;
        self
    }

    #[inline]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Stored embedding row; owns exactly one document (cascade delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EmbeddingRow {
    pub id: i64,
    pub document_id: i64,
    pub vector: Vec<u8>,
    pub model_id: String,
    pub dimension: i64,
    pub created_at: NaiveDateTime,
}

impl EmbeddingRow {
    #[inline]
    pub fn decode_vector(&self) -> Vec<f32> {
        crate::similarity::decode_vector(&self.vector)
    }
}

/// Store-level filter pushed into SQL; both fields optional.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceFilter {
    pub source_type: Option<SourceType>,
    pub source_id: Option<String>,
}

impl SourceFilter {
    #[inline]
    pub fn by_type(source_type: SourceType) -> Self {
        Self {
            source_type: Some(source_type),
            source_id: None,
        }
    }

    #[inline]
    pub fn by_source(source_type: SourceType, source_id: impl Into<String>) -> Self {
        Self {
            source_type: Some(source_type),
            source_id: Some(source_id.into()),
        }
    }
}

/// Corpus counts surfaced through `get_statistics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub documents: i64,
    pub embeddings: i64,
    pub by_source_type: HashMap<String, i64>,
}
