#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::RecallError;
use crate::chunking::{ConversationTurn, MessageContent, Role, chunk_turns, is_embeddable};
use crate::config::ChunkingConfig;
use crate::database::Database;
use crate::database::models::{Document, NewDocument, SourceType};
use crate::embeddings::EmbeddingClient;

/// A single chat message handed to the pipeline for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: MessageContent,
}

/// Per-call outcome of indexing one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversationIndexOutcome {
    pub indexed: usize,
    pub skipped: usize,
}

/// Lifetime counters for one pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCounters {
    pub indexed: u64,
    pub skipped: u64,
}

/// Receives pipeline progress events. Injected rather than global so hosts
/// can surface progress in their own UI; the default forwards to tracing.
pub trait IndexObserver: Send + Sync {
    fn chunk_indexed(&self, _document: &Document) {}
    fn chunk_skipped(&self, _source_id: &str, _reason: &str) {}
    fn conversation_indexed(&self, _conversation_id: &str, _outcome: ConversationIndexOutcome) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IndexObserver for TracingObserver {
    fn chunk_indexed(&self, document: &Document) {
        debug!(
            "Indexed chunk {} of {} '{}'",
            document.chunk_index, document.source_type, document.source_id
        );
    }

    fn chunk_skipped(&self, source_id: &str, reason: &str) {
        debug!("Skipped chunk of '{}': {}", source_id, reason);
    }

    fn conversation_indexed(&self, conversation_id: &str, outcome: ConversationIndexOutcome) {
        info!(
            "Indexed conversation '{}': {} chunks stored, {} skipped",
            conversation_id, outcome.indexed, outcome.skipped
        );
    }
}

/// Drives content through gate, embed, and persist.
///
/// Embedding happens before any write, so a provider failure leaves the
/// store untouched. Each chunk persists atomically with its vector.
pub struct IndexingPipeline {
    database: Database,
    client: EmbeddingClient,
    chunking: ChunkingConfig,
    observer: Arc<dyn IndexObserver>,
    indexed: AtomicU64,
    skipped: AtomicU64,
}

impl IndexingPipeline {
    #[inline]
    pub fn new(database: Database, client: EmbeddingClient, chunking: ChunkingConfig) -> Self {
        Self {
            database,
            client,
            chunking,
            observer: Arc::new(TracingObserver),
            indexed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn with_observer(mut self, observer: Arc<dyn IndexObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Index one message as a single chunk.
    ///
    /// Content the embeddability gate rejects returns `Ok(None)`; provider
    /// and storage failures propagate.
    pub async fn index_message(&self, message: &IncomingMessage) -> Result<Option<Document>> {
        let text = message.content.embeddable_text();

        if !is_embeddable(&text, self.chunking.min_embeddable_chars) {
            self.skip(&message.id, "content below embeddable minimum");
            return Ok(None);
        }

        let vector = self
            .client
            .embed(&text)
            .await
            .with_context(|| format!("Failed to embed message '{}'", message.id))?;

        let new_document = NewDocument::new(SourceType::Message, &message.id, text)
            .with_metadata("conversation_id", &message.conversation_id)
            .with_metadata("role", message.role.to_string());

        let document = self
            .database
            .insert_with_embedding(new_document, &vector, self.client.model())
            .await?;

        self.indexed.fetch_add(1, Ordering::Relaxed);
        self.observer.chunk_indexed(&document);

        Ok(Some(document))
    }

    /// Chunk a whole conversation and index each chunk.
    ///
    /// A chunk the gate or the provider rejects is skipped and counted, and
    /// the remaining chunks still index; storage failures abort the call.
    pub async fn index_conversation(
        &self,
        conversation_id: &str,
        turns: &[ConversationTurn],
    ) -> Result<ConversationIndexOutcome> {
        let chunks = chunk_turns(turns, self.chunking.target_chunk_chars);
        let mut outcome = ConversationIndexOutcome::default();

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            if !is_embeddable(&chunk.text, self.chunking.min_embeddable_chars) {
                self.skip(conversation_id, "chunk below embeddable minimum");
                outcome.skipped += 1;
                continue;
            }

            let vector = match self.client.embed(&chunk.text).await {
                Ok(vector) => vector,
                Err(error) if is_skippable(&error) => {
                    warn!(
                        "Skipping chunk {} of conversation '{}': {:#}",
                        chunk_index, conversation_id, error
                    );
                    self.skip(conversation_id, "embedding failed");
                    outcome.skipped += 1;
                    continue;
                }
                Err(error) => {
                    return Err(error.context(format!(
                        "Failed to embed chunk {chunk_index} of conversation '{conversation_id}'"
                    )));
                }
            };

            let new_document =
                NewDocument::new(SourceType::Conversation, conversation_id, &chunk.text)
                    .with_chunk_index(chunk_index as i64)
                    .with_metadata("conversation_id", conversation_id)
                    .with_metadata("turn_count", chunk.turn_count.to_string());

            let document = self
                .database
                .insert_with_embedding(new_document, &vector, self.client.model())
                .await?;

            self.indexed.fetch_add(1, Ordering::Relaxed);
            self.observer.chunk_indexed(&document);
            outcome.indexed += 1;
        }

        self.observer.conversation_indexed(conversation_id, outcome);
        Ok(outcome)
    }

    #[inline]
    pub fn counters(&self) -> IndexCounters {
        IndexCounters {
            indexed: self.indexed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    fn skip(&self, source_id: &str, reason: &str) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.observer.chunk_skipped(source_id, reason);
    }
}

/// Validation and provider failures affect one chunk; anything else is
/// treated as systemic and aborts the batch.
fn is_skippable(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<RecallError>(),
        Some(RecallError::Validation(_) | RecallError::Provider(_))
    )
}
