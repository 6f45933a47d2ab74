//! In-memory message store
//!
//! Conversations live for the lifetime of the process. They are created on
//! first reference, only ever appended to, and never deleted.

mod schema;

pub use schema::*;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    activity_counter: u64,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.activity_counter += 1;
        self.activity_counter
    }

    /// Conversation `conv_id`, created with `activity` if it is new
    fn entry(&mut self, conv_id: &str, activity: u64) -> &mut Conversation {
        self.conversations
            .entry(conv_id.to_string())
            .or_insert_with(|| Conversation::new(conv_id, activity))
    }
}

/// Process-wide conversation storage, cheap to clone
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, creating the conversation if unseen
    pub async fn append(&self, conv_id: &str, message: Message) {
        let mut inner = self.inner.write().await;
        let activity = inner.bump();
        let conv = inner.entry(conv_id, activity);
        conv.updated_at = message.created_at;
        conv.activity = activity;
        conv.messages.push(message);
    }

    /// All messages in causal order; empty for unknown ids
    pub async fn get_messages(&self, conv_id: &str) -> Vec<Message> {
        self.inner
            .read()
            .await
            .conversations
            .get(conv_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    pub async fn get_conversation(&self, conv_id: &str) -> Option<Conversation> {
        self.inner.read().await.conversations.get(conv_id).cloned()
    }

    /// Summaries of every known conversation, most recently active first
    pub async fn list_conversations(&self) -> Vec<ConversationSummary> {
        let inner = self.inner.read().await;
        let mut convs: Vec<&Conversation> = inner.conversations.values().collect();
        convs.sort_by(|a, b| b.activity.cmp(&a.activity));
        convs.into_iter().map(Conversation::summary).collect()
    }
}
