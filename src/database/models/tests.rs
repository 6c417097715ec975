use super::*;
use chrono::Utc;

#[test]
fn source_type_round_trips_through_str() {
    for source_type in SourceType::ALL {
        let parsed: SourceType = source_type.as_str().parse().expect("parse should succeed");
        assert_eq!(parsed, source_type);
    }
}

#[test]
fn source_type_rejects_unknown_names() {
    let result: Result<SourceType, _> = "webpage".parse();
    assert!(result.is_err());
}

#[test]
fn metadata_map_decodes_json_text() {
    let document = Document {
        id: 1,
        source_type: SourceType::Message,
        source_id: "msg-1".to_string(),
        chunk_text: "hello".to_string(),
        chunk_index: 0,
        metadata: r#"{"language":"rust","topic":"3d"}"#.to_string(),
        created_at: Utc::now().naive_utc(),
    };

    let map = document.metadata_map();
    assert_eq!(map.get("language").map(String::as_str), Some("rust"));
    assert_eq!(map.get("topic").map(String::as_str), Some("3d"));
}

#[test]
fn malformed_metadata_decodes_as_empty() {
    let document = Document {
        id: 1,
        source_type: SourceType::Message,
        source_id: "msg-1".to_string(),
        chunk_text: "hello".to_string(),
        chunk_index: 0,
        metadata: "not json".to_string(),
        created_at: Utc::now().naive_utc(),
    };

    assert!(document.metadata_map().is_empty());
}

#[test]
fn new_document_builder_sets_fields() {
    let new_doc = NewDocument::new(SourceType::Conversation, "conv-7", "some text")
        .with_chunk_index(3)
        .with_metadata("turns", "5");

    assert_eq!(new_doc.source_type, SourceType::Conversation);
    assert_eq!(new_doc.source_id, "conv-7");
    assert_eq!(new_doc.chunk_index, 3);
    assert_eq!(new_doc.metadata.get("turns").map(String::as_str), Some("5"));
}

#[test]
fn embedding_row_decodes_stored_vector() {
    let vector = vec![0.5f32, -1.0, 2.25];
    let row = EmbeddingRow {
        id: 1,
        document_id: 1,
        vector: crate::similarity::encode_vector(&vector),
        model_id: "test-model".to_string(),
        dimension: 3,
        created_at: Utc::now().naive_utc(),
    };

    assert_eq!(row.decode_vector(), vector);
}
