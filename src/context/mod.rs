#[cfg(test)]
mod tests;

use anyhow::Result;
use itertools::Itertools;
use tracing::debug;

use crate::chunking::{ConversationTurn, estimate_tokens};
use crate::config::ContextConfig;
use crate::database::models::{Document, SourceFilter, SourceType};
use crate::search::{RankedResult, SearchEngine};

pub const DEFAULT_TOP_K: usize = 10;

/// Decides whether a chunk "looks like code" for code-focused retrieval.
/// Pluggable because the heuristic is a coarse approximation.
pub trait CodeClassifier: Send + Sync {
    fn looks_like_code(&self, text: &str) -> bool;
}

/// Substring heuristic carried over from the original policy: declaration
/// keywords, braces, or arrows.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicCodeClassifier;

impl CodeClassifier for HeuristicCodeClassifier {
    #[inline]
    fn looks_like_code(&self, text: &str) -> bool {
        const MARKERS: [&str; 5] = ["function", "const ", "class ", "import ", "=>"];
        MARKERS.iter().any(|marker| text.contains(marker))
            || text.contains("->")
            || (text.contains('{') && text.contains('}'))
    }
}

/// Candidate filter applied by the assembler: an optional source-type scope
/// pushed into SQL plus metadata pairs matched after retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextFilter {
    pub source_type: Option<SourceType>,
    pub metadata: Vec<(String, String)>,
}

impl ContextFilter {
    #[inline]
    pub fn by_type(source_type: SourceType) -> Self {
        Self {
            source_type: Some(source_type),
            metadata: Vec::new(),
        }
    }

    #[inline]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    fn source_filter(&self) -> Option<SourceFilter> {
        self.source_type.map(SourceFilter::by_type)
    }

    fn matches(&self, document: &Document) -> bool {
        if self.metadata.is_empty() {
            return true;
        }
        let map = document.metadata_map();
        self.metadata
            .iter()
            .all(|(key, value)| map.get(key) == Some(value))
    }
}

/// Turns ranked search results into a token-budgeted prompt-context string.
///
/// All four builders share one greedy accumulation; they differ only in how
/// candidates are selected and formatted. An empty result is a normal
/// outcome, not an error.
pub struct ContextBuilder {
    search: SearchEngine,
    config: ContextConfig,
    classifier: Box<dyn CodeClassifier>,
}

impl ContextBuilder {
    #[inline]
    pub fn new(search: SearchEngine, config: ContextConfig) -> Self {
        Self {
            search,
            config,
            classifier: Box::new(HeuristicCodeClassifier),
        }
    }

    #[inline]
    pub fn with_classifier(mut self, classifier: Box<dyn CodeClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Generic context: hybrid search with twice the requested depth,
    /// metadata post-filter, then budgeted assembly of labeled blocks.
    #[inline]
    pub async fn build_context(
        &self,
        query: &str,
        filter: Option<&ContextFilter>,
        top_k: usize,
    ) -> Result<String> {
        let source_filter = filter.and_then(ContextFilter::source_filter);
        let mut results = self
            .search
            .hybrid_search(query, top_k * 2, source_filter.as_ref())
            .await?;

        if let Some(filter) = filter {
            results.retain(|result| filter.matches(&result.document));
        }
        results.truncate(top_k);

        let blocks = results.iter().map(format_labeled_block);
        Ok(assemble_within_budget(
            blocks,
            self.config.max_context_tokens,
        ))
    }

    /// Context scoped to one conversation, with lighter formatting.
    #[inline]
    pub async fn build_conversation_context(
        &self,
        conversation_id: &str,
        query: &str,
    ) -> Result<String> {
        let filter = SourceFilter::by_source(SourceType::Conversation, conversation_id);
        let results = self
            .search
            .hybrid_search(query, DEFAULT_TOP_K, Some(&filter))
            .await?;

        let blocks = results
            .iter()
            .map(|result| result.document.chunk_text.clone());
        Ok(assemble_within_budget(
            blocks,
            self.config.max_context_tokens,
        ))
    }

    /// Code-focused context: the query gets a language hint, candidates are
    /// post-filtered through the classifier, survivors come back fenced.
    #[inline]
    pub async fn build_code_context(
        &self,
        query: &str,
        language: Option<&str>,
    ) -> Result<String> {
        let hinted_query = match language {
            Some(language) => format!("{query} {language} code"),
            None => format!("{query} code"),
        };

        let results = self
            .search
            .hybrid_search(&hinted_query, DEFAULT_TOP_K * 2, None)
            .await?;

        let fence_label = language.unwrap_or_default();
        let blocks: Vec<String> = results
            .iter()
            .filter(|result| self.classifier.looks_like_code(&result.document.chunk_text))
            .take(DEFAULT_TOP_K)
            .map(|result| format!("```{fence_label}\n{}\n```", result.document.chunk_text))
            .collect();

        debug!("Code context kept {} code-like blocks", blocks.len());
        Ok(assemble_within_budget(
            blocks,
            self.config.max_context_tokens,
        ))
    }

    /// Compound-query context for multi-turn questions: recent turns merge
    /// into one query, results dedupe per conversation keeping the
    /// best-ranked occurrence, capped at a configured conversation count.
    #[inline]
    pub async fn build_multi_turn_context(
        &self,
        turns: &[ConversationTurn],
        filter: Option<&ContextFilter>,
    ) -> Result<String> {
        let compound_query = turns
            .iter()
            .map(|turn| turn.content.embeddable_text())
            .join("\n");

        let source_filter = filter.and_then(ContextFilter::source_filter);
        let mut results = self
            .search
            .hybrid_search(&compound_query, DEFAULT_TOP_K * 2, source_filter.as_ref())
            .await?;

        if let Some(filter) = filter {
            results.retain(|result| filter.matches(&result.document));
        }

        // Results are already best-first; unique_by keeps the highest-ranked
        // chunk per conversation.
        let deduped: Vec<&RankedResult> = results
            .iter()
            .unique_by(|result| conversation_key(&result.document))
            .take(self.config.max_conversations)
            .collect();

        let blocks = deduped.iter().map(|result| format_labeled_block(result));
        Ok(assemble_within_budget(
            blocks,
            self.config.max_context_tokens,
        ))
    }
}

/// The conversation a chunk belongs to: explicit metadata when present,
/// otherwise the source id itself.
fn conversation_key(document: &Document) -> String {
    document
        .metadata_map()
        .get("conversation_id")
        .cloned()
        .unwrap_or_else(|| document.source_id.clone())
}

fn format_labeled_block(result: &RankedResult) -> String {
    let percent = (result.relevance * 100.0).round() as i32;
    format!(
        "[Relevance: {percent}% | Source: {}]\n{}",
        result.document.source_type, result.document.chunk_text
    )
}

/// Greedy token-budget accumulation shared by every builder: append whole
/// blocks in rank order and stop before the estimate exceeds the budget.
/// Partial blocks are forbidden; they corrupt formatting and meaning.
fn assemble_within_budget(
    blocks: impl IntoIterator<Item = String>,
    max_tokens: usize,
) -> String {
    const SEPARATOR: &str = "\n\n";
    let separator_tokens = estimate_tokens(SEPARATOR);

    let mut assembled = String::new();
    let mut used_tokens = 0;

    for block in blocks {
        let mut cost = estimate_tokens(&block);
        if !assembled.is_empty() {
            cost += separator_tokens;
        }

        if used_tokens + cost > max_tokens {
            break;
        }

        if !assembled.is_empty() {
            assembled.push_str(SEPARATOR);
        }
        assembled.push_str(&block);
        used_tokens += cost;
    }

    assembled
}
