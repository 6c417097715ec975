
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Character budget approximating four characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Hard ceiling on tokens per embedding input.
pub const MAX_EMBED_TOKENS: usize = 8000;

/// A message body is either plain text or text with attachments. Consumers
/// pattern-match exhaustively; there is no untyped "content" escape hatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    TextOnly { text: String },
    WithAttachments {
        text: String,
        attachments: Vec<Attachment>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
}

impl MessageContent {
    /// The embeddable text of this message. Attachment bodies are not
    /// embedded; their names are appended so retrieval can still match them.
    #[inline]
    pub fn embeddable_text(&self) -> String {
        match self {
            MessageContent::TextOnly { text } => text.clone(),
            MessageContent::WithAttachments { text, attachments } => {
                if attachments.is_empty() {
                    text.clone()
                } else {
                    let names: Vec<&str> = attachments.iter().map(|a| a.name.as_str()).collect();
                    format!("{}\n[attachments: {}]", text, names.join(", "))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
            Role::System => write!(f, "System"),
        }
    }
}

/// One turn of a conversation, in order of occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: MessageContent,
}

impl ConversationTurn {
    /// Render the turn the way it appears inside a chunk.
    #[inline]
    pub fn render(&self) -> String {
        format!("{}: {}", self.role, self.content.embeddable_text())
    }
}

/// A bounded slice of conversation text ready for the embedding pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnChunk {
    pub text: String,
    /// Number of source turns concatenated into this chunk.
    pub turn_count: usize,
}

/// Split ordered turns into chunks of roughly `target_chars` characters.
///
/// Turns are never split: a chunk closes when appending the next turn would
/// exceed the budget, and a single oversized turn still forms its own chunk.
/// Every turn lands in exactly one chunk, in order.
#[inline]
pub fn chunk_turns(turns: &[ConversationTurn], target_chars: usize) -> Vec<TurnChunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_turns = 0;

    for turn in turns {
        let rendered = turn.render();
        let appended_len = if current.is_empty() {
            rendered.chars().count()
        } else {
            current.chars().count() + 1 + rendered.chars().count()
        };

        if current_turns > 0 && appended_len > target_chars {
            chunks.push(TurnChunk {
                text: std::mem::take(&mut current),
                turn_count: current_turns,
            });
            current_turns = 0;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&rendered);
        current_turns += 1;
    }

    if current_turns > 0 {
        chunks.push(TurnChunk {
            text: current,
            turn_count: current_turns,
        });
    }

    debug!(
        "Chunked {} turns into {} chunks (target {} chars)",
        turns.len(),
        chunks.len(),
        target_chars
    );

    chunks
}

/// Pre-flight gate: blank or very short text never reaches the provider.
#[inline]
pub fn is_embeddable(text: &str, min_chars: usize) -> bool {
    text.trim().chars().count() >= min_chars
}

/// Estimate token count as chars/4. Monotone and cheap, not exact.
#[inline]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Hard-cut text at `max_tokens * 4` characters, preserving the prefix.
#[inline]
pub fn truncate_to_limit(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
