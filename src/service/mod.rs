
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::chunking::ConversationTurn;
use crate::config::Config;
use crate::context::{ContextBuilder, ContextFilter, DEFAULT_TOP_K};
use crate::database::Database;
use crate::database::models::{Document, SourceFilter, StoreStatistics};
use crate::embeddings::EmbeddingClient;
use crate::indexer::{
    ConversationIndexOutcome, IncomingMessage, IndexCounters, IndexObserver, IndexingPipeline,
};
use crate::search::{RankedResult, SearchEngine};

/// Corpus totals plus this session's pipeline counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatistics {
    pub store: StoreStatistics,
    pub session: IndexCounters,
}

/// Facade wiring store, embedding client, pipeline, search, and context
/// assembly into one handle for hosts to embed.
pub struct RecallService {
    config: Config,
    database: Database,
    pipeline: IndexingPipeline,
    search: SearchEngine,
    context: ContextBuilder,
}

impl RecallService {
    /// Open (or create) the store under the config's base directory and wire
    /// up the full stack. Fails fast on invalid config or a missing provider
    /// credential.
    pub async fn new(config: Config) -> Result<Self> {
        config
            .validate()
            .context("Configuration validation failed")?;

        let database = Database::initialize_from_config_dir(&config.base_dir).await?;
        let client = EmbeddingClient::new(&config)?;

        let search = SearchEngine::new(database.clone(), client.clone(), config.fusion.clone());
        let context = ContextBuilder::new(search.clone(), config.context.clone());
        let pipeline = IndexingPipeline::new(database.clone(), client, config.chunking.clone());

        info!(
            "Recall service ready (store: {})",
            config.database_path().display()
        );

        Ok(Self {
            config,
            database,
            pipeline,
            search,
            context,
        })
    }

    #[inline]
    pub fn with_observer(mut self, observer: Arc<dyn IndexObserver>) -> Self {
        self.pipeline = self.pipeline.with_observer(observer);
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub async fn index_message(&self, message: &IncomingMessage) -> Result<Option<Document>> {
        self.pipeline.index_message(message).await
    }

    #[inline]
    pub async fn index_conversation(
        &self,
        conversation_id: &str,
        turns: &[ConversationTurn],
    ) -> Result<ConversationIndexOutcome> {
        self.pipeline.index_conversation(conversation_id, turns).await
    }

    /// Hybrid search over the whole corpus (or a source-scoped slice).
    #[inline]
    pub async fn search_messages(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<RankedResult>> {
        self.search.hybrid_search(query, top_k, filter).await
    }

    /// Assemble budgeted context for a query. `top_k` defaults when absent.
    #[inline]
    pub async fn build_context_for_query(
        &self,
        query: &str,
        filter: Option<&ContextFilter>,
        top_k: Option<usize>,
    ) -> Result<String> {
        self.context
            .build_context(query, filter, top_k.unwrap_or(DEFAULT_TOP_K))
            .await
    }

    #[inline]
    pub async fn build_conversation_context(
        &self,
        conversation_id: &str,
        query: &str,
    ) -> Result<String> {
        self.context
            .build_conversation_context(conversation_id, query)
            .await
    }

    #[inline]
    pub async fn build_code_context(
        &self,
        query: &str,
        language: Option<&str>,
    ) -> Result<String> {
        self.context.build_code_context(query, language).await
    }

    #[inline]
    pub async fn build_multi_turn_context(
        &self,
        turns: &[ConversationTurn],
        filter: Option<&ContextFilter>,
    ) -> Result<String> {
        self.context.build_multi_turn_context(turns, filter).await
    }

    #[inline]
    pub async fn get_statistics(&self) -> Result<ServiceStatistics> {
        Ok(ServiceStatistics {
            store: self.database.statistics().await?,
            session: self.pipeline.counters(),
        })
    }

    /// Remove every chunk indexed from one conversation: its conversation
    /// chunks and any message chunks tagged with its id.
    #[inline]
    pub async fn delete_conversation_data(&self, conversation_id: &str) -> Result<u64> {
        self.database.delete_by_conversation(conversation_id).await
    }

    /// Wipe the store. Irreversible; embeddings cascade with their documents.
    #[inline]
    pub async fn clear_all_data(&self) -> Result<u64> {
        let removed = self.database.delete_all().await?;
        info!("Cleared {} documents from the store", removed);
        Ok(removed)
    }
}
