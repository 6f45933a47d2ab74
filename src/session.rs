//! Browser sessions and the conversations they know about
//!
//! A session tracks which conversation the chat pane shows and the threads
//! listed in its sidebar. Threads are kept in creation order and presented
//! newest first.

use crate::store::{InMemoryStore, Role};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

struct Session {
    active: String,
    threads: Vec<String>,
}

impl Session {
    fn with_conversation(conv_id: String) -> Self {
        Self {
            active: conv_id.clone(),
            threads: vec![conv_id],
        }
    }

    fn activate(&mut self, conv_id: &str) {
        if !self.threads.iter().any(|t| t == conv_id) {
            self.threads.push(conv_id.to_string());
        }
        self.active = conv_id.to_string();
    }
}

/// Sidebar entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    pub id: String,
    /// First line of the first user message, if any
    pub title: Option<String>,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub active_conversation: String,
    /// Most recent first
    pub threads: Vec<ThreadSummary>,
}

/// A message as rendered in the chat pane
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchResult {
    pub session: SessionView,
    pub messages: Vec<DisplayMessage>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    store: InMemoryStore,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl SessionRegistry {
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Start a session with a fresh active conversation
    pub async fn create_session(&self) -> SessionView {
        let session_id = new_id();
        let session = Session::with_conversation(new_id());
        let view = self.render(&session_id, &session).await;
        self.sessions.write().await.insert(session_id, session);
        view
    }

    /// Begin a fresh conversation and make it active
    pub async fn new_conversation(&self, session_id: &str) -> Result<SessionView, SessionError> {
        let conv_id = new_id();
        self.update(session_id, |session| session.activate(&conv_id))
            .await
    }

    /// Make `conv_id` active and load its displayable history
    pub async fn switch_conversation(
        &self,
        session_id: &str,
        conv_id: &str,
    ) -> Result<SwitchResult, SessionError> {
        let session = self
            .update(session_id, |session| session.activate(conv_id))
            .await?;

        let messages = self
            .store
            .get_messages(conv_id)
            .await
            .into_iter()
            .filter(|m| m.is_displayable())
            .map(|m| DisplayMessage {
                role: m.role,
                content: m.content,
            })
            .collect();

        tracing::debug!(session_id = %session_id, conv_id = %conv_id, "Switched conversation");
        Ok(SwitchResult { session, messages })
    }

    pub async fn view(&self, session_id: &str) -> Result<SessionView, SessionError> {
        self.update(session_id, |_| {}).await
    }

    async fn update(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session),
    ) -> Result<SessionView, SessionError> {
        let (active, threads) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
            f(session);
            (session.active.clone(), session.threads.clone())
        };
        Ok(self
            .render(
                session_id,
                &Session {
                    active,
                    threads,
                },
            )
            .await)
    }

    async fn render(&self, session_id: &str, session: &Session) -> SessionView {
        let mut threads = Vec::with_capacity(session.threads.len());
        for id in session.threads.iter().rev() {
            let (title, message_count) = match self.store.get_conversation(id).await {
                Some(conv) => (conv.title(), conv.messages.len()),
                None => (None, 0),
            };
            threads.push(ThreadSummary {
                id: id.clone(),
                title,
                message_count,
            });
        }
        SessionView {
            session_id: session_id.to_string(),
            active_conversation: session.active.clone(),
            threads,
        }
    }
}
