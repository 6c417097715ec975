use super::*;
use crate::config::Config;
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl IndexObserver for RecordingObserver {
    fn chunk_indexed(&self, document: &Document) {
        self.events
            .lock()
            .unwrap()
            .push(format!("indexed:{}", document.source_id));
    }

    fn chunk_skipped(&self, source_id: &str, reason: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("skipped:{source_id}:{reason}"));
    }

    fn conversation_indexed(&self, conversation_id: &str, outcome: ConversationIndexOutcome) {
        self.events.lock().unwrap().push(format!(
            "conversation:{conversation_id}:{}:{}",
            outcome.indexed, outcome.skipped
        ));
    }
}

async fn test_pipeline(temp_dir: &TempDir) -> (IndexingPipeline, Arc<RecordingObserver>) {
    let mut config = Config::default();
    config.provider.api_key = Some("test-key".to_string());

    let database = Database::new(temp_dir.path().join("recall.db"))
        .await
        .expect("database should initialize");
    let client = EmbeddingClient::new(&config).expect("client should build");

    let observer = Arc::new(RecordingObserver::default());
    let pipeline = IndexingPipeline::new(database, client, config.chunking)
        .with_observer(observer.clone());
    (pipeline, observer)
}

fn message(id: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        id: id.to_string(),
        conversation_id: "conv-1".to_string(),
        role: Role::User,
        content: MessageContent::TextOnly {
            text: text.to_string(),
        },
    }
}

#[tokio::test]
async fn short_message_is_skipped_without_a_provider_call() {
    let temp_dir = TempDir::new().expect("temp dir");
    let (pipeline, observer) = test_pipeline(&temp_dir).await;

    // No mock provider is running; a network attempt would fail loudly.
    let result = pipeline
        .index_message(&message("msg-1", "hi"))
        .await
        .expect("gate rejection is not an error");
    assert!(result.is_none());

    let counters = pipeline.counters();
    assert_eq!(counters.indexed, 0);
    assert_eq!(counters.skipped, 1);

    let events = observer.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].starts_with("skipped:msg-1"));
}

#[tokio::test]
async fn empty_conversation_indexes_nothing() {
    let temp_dir = TempDir::new().expect("temp dir");
    let (pipeline, observer) = test_pipeline(&temp_dir).await;

    let outcome = pipeline
        .index_conversation("conv-1", &[])
        .await
        .expect("empty conversation should succeed");
    assert_eq!(outcome, ConversationIndexOutcome::default());

    let events = observer.events.lock().unwrap();
    assert_eq!(events.as_slice(), ["conversation:conv-1:0:0"]);
}

#[test]
fn validation_and_provider_errors_are_skippable() {
    let validation = anyhow::Error::new(RecallError::Validation("too short".to_string()));
    let provider = anyhow::Error::new(RecallError::Provider("rate limited".to_string()));
    let storage = anyhow::Error::new(RecallError::Storage("disk full".to_string()));
    let bare = anyhow::anyhow!("no classification");

    assert!(is_skippable(&validation));
    assert!(is_skippable(&provider));
    assert!(!is_skippable(&storage));
    assert!(!is_skippable(&bare));
}

#[test]
fn classification_survives_added_context() {
    let error = anyhow::Error::new(RecallError::Provider("rate limited".to_string()))
        .context("batch 2/3 failed");
    assert!(is_skippable(&error));
}
