#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FusionConfig;
use crate::database::Database;
use crate::database::models::{Document, SourceFilter};
use crate::embeddings::EmbeddingClient;
use crate::similarity::cosine_similarity;

/// A document with its query relevance, always in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub document: Document,
    pub relevance: f32,
}

/// Fuses keyword pre-filtering with semantic reranking.
///
/// Semantic scanning is brute-force over every stored vector: O(N) per
/// query, which is fine at the target scale of thousands of chunks. This is
/// deliberately not an approximate-nearest-neighbor index.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    database: Database,
    client: EmbeddingClient,
    fusion: FusionConfig,
}

impl SearchEngine {
    #[inline]
    pub fn new(database: Database, client: EmbeddingClient, fusion: FusionConfig) -> Self {
        Self {
            database,
            client,
            fusion,
        }
    }

    /// Embed the query once, score the whole corpus, return the best top_k.
    ///
    /// Failure to embed the live query is fatal to the call; there is no
    /// degraded keyword-only mode here.
    #[inline]
    pub async fn semantic_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<RankedResult>> {
        let query_vector = self
            .client
            .embed(query)
            .await
            .context("Failed to embed search query")?;

        let corpus = self.database.load_all(filter).await?;
        debug!("Semantic scan over {} stored vectors", corpus.len());

        Ok(rank_by_similarity(&query_vector, corpus, top_k))
    }

    /// Keyword pre-filter, then semantic rerank with score fusion.
    ///
    /// A keyword miss falls back to a full semantic scan, so a query never
    /// comes back empty purely because its terms are out of vocabulary.
    #[inline]
    pub async fn hybrid_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<RankedResult>> {
        let candidates = self
            .database
            .full_text_search_with_vectors(query, self.fusion.keyword_candidate_limit, filter)
            .await?;

        if candidates.is_empty() {
            debug!("No keyword candidates; falling back to semantic search");
            return self.semantic_search(query, top_k, filter).await;
        }

        let query_vector = self
            .client
            .embed(query)
            .await
            .context("Failed to embed search query")?;

        let candidate_count = candidates.len();
        let mut results: Vec<RankedResult> = candidates
            .into_iter()
            .enumerate()
            .map(|(position, (document, vector))| {
                let semantic = cosine_similarity(&query_vector, &vector).max(0.0);
                let keyword = keyword_rank_score(position, candidate_count);
                RankedResult {
                    document,
                    relevance: fuse_scores(&self.fusion, semantic, keyword),
                }
            })
            .collect();

        // Stable sort: ties keep keyword candidate order.
        results.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        debug!(
            "Hybrid search fused {} candidates into {} results",
            candidate_count,
            results.len()
        );
        Ok(results)
    }
}

/// Linear decay over keyword positions: position 0 scores 1.0, the last
/// candidate scores 1/N.
#[inline]
pub(crate) fn keyword_rank_score(position: usize, candidate_count: usize) -> f32 {
    if candidate_count == 0 {
        return 0.0;
    }
    (candidate_count - position) as f32 / candidate_count as f32
}

#[inline]
pub(crate) fn fuse_scores(fusion: &FusionConfig, semantic: f32, keyword: f32) -> f32 {
    (fusion.semantic_weight * semantic + fusion.keyword_weight * keyword).clamp(0.0, 1.0)
}

/// Score, stable-sort descending, truncate. Negative cosine scores clamp to
/// zero so relevance stays in `[0, 1]`.
fn rank_by_similarity(
    query_vector: &[f32],
    corpus: Vec<(Document, Vec<f32>)>,
    top_k: usize,
) -> Vec<RankedResult> {
    let mut results: Vec<RankedResult> = corpus
        .into_iter()
        .map(|(document, vector)| RankedResult {
            relevance: cosine_similarity(query_vector, &vector).max(0.0),
            document,
        })
        .collect();

    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}
