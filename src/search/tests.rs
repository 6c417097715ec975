use super::*;
use crate::database::models::SourceType;
use chrono::Utc;

fn doc(id: i64, text: &str) -> Document {
    Document {
        id,
        source_type: SourceType::Message,
        source_id: format!("msg-{id}"),
        chunk_text: text.to_string(),
        chunk_index: 0,
        metadata: "{}".to_string(),
        created_at: Utc::now().naive_utc(),
    }
}

#[test]
fn ranking_orders_by_similarity_descending() {
    let query = vec![1.0, 0.0, 0.0];
    let corpus = vec![
        (doc(1, "far"), vec![0.0, 1.0, 0.0]),
        (doc(2, "close"), vec![0.9, 0.1, 0.0]),
        (doc(3, "middling"), vec![0.5, 0.5, 0.0]),
    ];

    let results = rank_by_similarity(&query, corpus, 10);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].document.id, 2);
    assert_eq!(results[1].document.id, 3);
    assert_eq!(results[2].document.id, 1);
}

#[test]
fn ranking_truncates_to_top_k() {
    let query = vec![1.0, 0.0];
    let corpus = (0..10)
        .map(|i| (doc(i, "x"), vec![1.0 / (i + 1) as f32, 0.0]))
        .collect();

    let results = rank_by_similarity(&query, corpus, 3);
    assert_eq!(results.len(), 3);
}

#[test]
fn negative_similarity_clamps_to_zero() {
    let query = vec![1.0, 0.0];
    let corpus = vec![(doc(1, "opposite"), vec![-1.0, 0.0])];

    let results = rank_by_similarity(&query, corpus, 1);
    assert_eq!(results[0].relevance, 0.0);
}

#[test]
fn mismatched_dimension_scores_zero_not_error() {
    let query = vec![1.0, 0.0, 0.0];
    let corpus = vec![
        (doc(1, "wrong dims"), vec![1.0, 0.0]),
        (doc(2, "right dims"), vec![1.0, 0.0, 0.0]),
    ];

    let results = rank_by_similarity(&query, corpus, 10);
    assert_eq!(results[0].document.id, 2);
    assert_eq!(results[1].relevance, 0.0);
}

#[test]
fn stable_sort_preserves_candidate_order_on_ties() {
    let query = vec![0.0, 1.0];
    // Both orthogonal to the query: identical scores.
    let corpus = vec![
        (doc(7, "first candidate"), vec![1.0, 0.0]),
        (doc(8, "second candidate"), vec![-1.0, 0.0]),
    ];

    let results = rank_by_similarity(&query, corpus, 10);
    assert_eq!(results[0].document.id, 7);
    assert_eq!(results[1].document.id, 8);
}

#[test]
fn keyword_rank_decays_linearly() {
    assert_eq!(keyword_rank_score(0, 4), 1.0);
    assert_eq!(keyword_rank_score(1, 4), 0.75);
    assert_eq!(keyword_rank_score(3, 4), 0.25);
    assert_eq!(keyword_rank_score(0, 0), 0.0);
}

#[test]
fn fusion_weights_scores_as_configured() {
    let fusion = FusionConfig {
        semantic_weight: 0.6,
        keyword_weight: 0.4,
        keyword_candidate_limit: 50,
    };

    let fused = fuse_scores(&fusion, 1.0, 0.5);
    assert!((fused - 0.8).abs() < 1e-6);

    // Fused scores never escape [0, 1].
    assert_eq!(fuse_scores(&fusion, 2.0, 2.0), 1.0);
    assert_eq!(fuse_scores(&fusion, -1.0, -1.0), 0.0);
}

#[test]
fn alternate_fusion_weights_change_ordering() {
    let keyword_heavy = FusionConfig {
        semantic_weight: 0.1,
        keyword_weight: 0.9,
        keyword_candidate_limit: 50,
    };

    // High keyword rank beats high semantic score under keyword-heavy fusion.
    let a = fuse_scores(&keyword_heavy, 0.9, 0.1);
    let b = fuse_scores(&keyword_heavy, 0.1, 0.9);
    assert!(b > a);
}
