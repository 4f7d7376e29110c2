//! Reads assistant chat history out of the workspace state databases.
//!
//! Two tiers are involved. The per-workspace index lists the sessions
//! that belong to the matched workspace; the global store holds each
//! session's ordered message-id list and the message bodies. Stores
//! belong to the assistant, not to us, so every read degrades: a
//! missing database, key, or field drops data rather than failing the
//! journal run.

use serde::{Deserialize, Serialize};

use crate::window::TimeWindow;
use crate::workspace::WorkspaceHandle;

use self::store::KvStore;

mod store;

#[cfg(test)]
mod tests;

/// Index-db key holding the workspace's session registry.
pub const SESSIONS_KEY: &str = "chat.sessions";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn parse(raw: &str) -> Option<Role> {
        match raw {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub timestamp_ms: i64,
    /// Display name of the session the message came from.
    pub session: String,
}

#[derive(Deserialize)]
struct SessionRecord {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct MessageRecord {
    role: Option<String>,
    text: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: Option<i64>,
}

// ============================================================================
// Extraction
// ============================================================================

/// Collects every chat message inside `window` across all sessions of
/// the matched workspace, merged into one timestamp-ordered transcript.
pub fn extract(
    handle: &WorkspaceHandle,
    window: &TimeWindow,
    busy_timeout_ms: u64,
) -> Vec<ChatMessage> {
    let index = match KvStore::open_read_only(&handle.index_db, busy_timeout_ms) {
        Ok(store) => store,
        Err(err) => {
            tracing::debug!(db = %handle.index_db.display(), error = %err, "chat index unavailable");
            return Vec::new();
        }
    };
    let sessions = read_sessions(&index);
    if sessions.is_empty() {
        return Vec::new();
    }

    let global = match KvStore::open_read_only(&handle.global_db, busy_timeout_ms) {
        Ok(store) => store,
        Err(err) => {
            tracing::debug!(db = %handle.global_db.display(), error = %err, "global chat store unavailable");
            return Vec::new();
        }
    };

    let mut messages = Vec::new();
    for session in &sessions {
        let name = session.name.clone().unwrap_or_else(|| session.id.clone());
        for id in message_ids(&global, &session.id) {
            if let Some(message) = read_message(&global, &session.id, &id, &name) {
                if window.contains(message.timestamp_ms) {
                    messages.push(message);
                }
            }
        }
    }
    // Stable, so equal timestamps keep session order.
    messages.sort_by_key(|message| message.timestamp_ms);

    tracing::debug!(
        sessions = sessions.len(),
        collected = messages.len(),
        "chat extraction complete"
    );
    messages
}

fn read_sessions(index: &KvStore) -> Vec<SessionRecord> {
    let raw = match index.get(SESSIONS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            tracing::debug!(error = %err, "session registry unreadable");
            return Vec::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(sessions) => sessions,
        Err(err) => {
            tracing::debug!(error = %err, "session registry malformed");
            Vec::new()
        }
    }
}

fn message_ids(global: &KvStore, session_id: &str) -> Vec<String> {
    let raw = match global.get(&format!("sessionMessages:{session_id}")) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            tracing::debug!(session = session_id, error = %err, "message list unreadable");
            return Vec::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(ids) => ids,
        Err(err) => {
            tracing::debug!(session = session_id, error = %err, "message list malformed");
            Vec::new()
        }
    }
}

fn read_message(
    global: &KvStore,
    session_id: &str,
    message_id: &str,
    session_name: &str,
) -> Option<ChatMessage> {
    let key = format!("message:{session_id}:{message_id}");
    let raw = match global.get(&key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::debug!(key, "message body missing");
            return None;
        }
        Err(err) => {
            tracing::debug!(key, error = %err, "message body unreadable");
            return None;
        }
    };
    let record: MessageRecord = match serde_json::from_str(&raw) {
        Ok(record) => record,
        Err(err) => {
            tracing::debug!(key, error = %err, "message body malformed");
            return None;
        }
    };
    let role = record.role.as_deref().and_then(Role::parse)?;
    let text = record.text?;
    let timestamp_ms = record.created_at?;
    Some(ChatMessage {
        role,
        text,
        timestamp_ms,
        session: session_name.to_owned(),
    })
}
