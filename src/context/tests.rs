use super::*;
use crate::database::models::SourceType;
use chrono::Utc;

fn doc(id: i64, text: &str, metadata: &str) -> Document {
    Document {
        id,
        source_type: SourceType::Message,
        source_id: format!("msg-{id}"),
        chunk_text: text.to_string(),
        chunk_index: 0,
        metadata: metadata.to_string(),
        created_at: Utc::now().naive_utc(),
    }
}

fn ranked(id: i64, text: &str, relevance: f32) -> RankedResult {
    RankedResult {
        document: doc(id, text, "{}"),
        relevance,
    }
}

#[test]
fn assembly_keeps_whole_blocks_within_budget() {
    // 40 chars each: 10 tokens per block, separator costs 1 token.
    let blocks = vec!["a".repeat(40), "b".repeat(40), "c".repeat(40)];

    let assembled = assemble_within_budget(blocks.clone(), 21);
    assert_eq!(assembled, format!("{}\n\n{}", blocks[0], blocks[1]));
    assert!(estimate_tokens(&assembled) <= 21);
}

#[test]
fn assembly_stops_at_first_block_that_does_not_fit() {
    let blocks = vec!["a".repeat(40), "b".repeat(400), "c".repeat(40)];

    // The second block would blow the budget; assembly stops there rather
    // than skipping ahead.
    let assembled = assemble_within_budget(blocks.clone(), 50);
    assert_eq!(assembled, blocks[0]);
}

#[test]
fn assembly_returns_empty_when_nothing_fits() {
    let blocks = vec!["a".repeat(400)];
    assert_eq!(assemble_within_budget(blocks, 10), "");
}

#[test]
fn assembly_never_emits_partial_blocks() {
    let blocks = vec!["x".repeat(100), "y".repeat(100)];
    let assembled = assemble_within_budget(blocks, 30);

    // Either a block is present in full or not at all.
    assert!(!assembled.contains('y'));
    assert_eq!(assembled.matches('x').count(), 100);
}

#[test]
fn labeled_block_shows_percent_and_source() {
    let block = format_labeled_block(&ranked(1, "hello world", 0.873));
    assert_eq!(block, "[Relevance: 87% | Source: message]\nhello world");
}

#[test]
fn metadata_filter_requires_all_pairs() {
    let filter = ContextFilter::default()
        .with_metadata("conversation_id", "c-1")
        .with_metadata("author", "kim");

    let matching = doc(1, "x", r#"{"conversation_id":"c-1","author":"kim"}"#);
    let partial = doc(2, "x", r#"{"conversation_id":"c-1"}"#);
    let empty = doc(3, "x", "{}");

    assert!(filter.matches(&matching));
    assert!(!filter.matches(&partial));
    assert!(!filter.matches(&empty));
}

#[test]
fn empty_metadata_filter_matches_everything() {
    let filter = ContextFilter::by_type(SourceType::Message);
    assert!(filter.matches(&doc(1, "x", "{}")));
}

#[test]
fn conversation_key_prefers_metadata_over_source_id() {
    let tagged = doc(1, "x", r#"{"conversation_id":"c-42"}"#);
    assert_eq!(conversation_key(&tagged), "c-42");

    let untagged = doc(2, "x", "{}");
    assert_eq!(conversation_key(&untagged), "msg-2");
}

#[test]
fn heuristic_classifier_recognizes_code_markers() {
    let classifier = HeuristicCodeClassifier;

    assert!(classifier.looks_like_code("function add(a, b) { return a + b; }"));
    assert!(classifier.looks_like_code("import os"));
    assert!(classifier.looks_like_code("fn main() -> i32"));
    assert!(classifier.looks_like_code("const x = 1;"));

    assert!(!classifier.looks_like_code("We talked about the weather."));
    assert!(!classifier.looks_like_code("Please summarize the meeting notes."));
}
