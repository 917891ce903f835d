pub mod grouping;

use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;

use crate::models::chat::{ChatMessage, ChatRole, Conversation, DEFAULT_TITLE};
use crate::storage::KvStore;

/// Single durable key holding the serialized conversation array.
pub const CONVERSATIONS_KEY: &str = "ia_conversations_v1";

/// Display length for titles derived from the first user message.
const TITLE_MAX_CHARS: usize = 44;

/// Owns the conversation list, routes messages into the single active
/// conversation, and rewrites the persisted snapshot after every mutation so
/// memory and storage never disagree.
pub struct ConversationStore {
    kv: Arc<dyn KvStore>,
    conversations: Vec<Conversation>,
    active_id: Option<String>,
}

impl ConversationStore {
    /// Read the snapshot once and select the most recently updated
    /// conversation as active.
    pub async fn load(kv: Arc<dyn KvStore>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let conversations = match kv.load(CONVERSATIONS_KEY).await? {
            Some(bytes) => sanitize_snapshot(&bytes),
            None => Vec::new(),
        };
        let active_id = most_recent_id(&conversations);
        Ok(Self {
            kv,
            conversations,
            active_id,
        })
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    /// Make an existing conversation the active one.
    pub fn select(&mut self, conversation_id: &str) -> bool {
        if self.get(conversation_id).is_some() {
            self.active_id = Some(conversation_id.to_string());
            true
        } else {
            false
        }
    }

    /// Fresh conversation at the head of the list, marked active.
    pub async fn create_conversation(&mut self) -> Result<String, Box<dyn Error + Send + Sync>> {
        let convo = Conversation::new();
        let id = convo.id.clone();
        self.conversations.insert(0, convo);
        self.active_id = Some(id.clone());
        self.persist().await?;
        Ok(id)
    }

    /// Append messages to `conversation_id`, creating the conversation first
    /// when the id is absent or unknown. Returns the id written to.
    pub async fn append_messages(
        &mut self,
        conversation_id: Option<&str>,
        new_messages: Vec<ChatMessage>,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let idx = match conversation_id {
            Some(id) => match self.conversations.iter().position(|c| c.id == id) {
                Some(idx) => idx,
                None => {
                    // Stale id (snapshot cleared elsewhere): recreate it.
                    let mut convo = Conversation::new();
                    convo.id = id.to_string();
                    self.conversations.insert(0, convo);
                    0
                }
            },
            None => {
                let convo = Conversation::new();
                self.active_id = Some(convo.id.clone());
                self.conversations.insert(0, convo);
                0
            }
        };

        let convo = &mut self.conversations[idx];
        convo.messages.extend(new_messages);
        if !convo.has_title() {
            if let Some(title) = derive_title(&convo.messages) {
                convo.title = title;
            }
        }
        convo.touch();
        let id = convo.id.clone();

        self.persist().await?;
        Ok(id)
    }

    /// Append a streamed delta to an in-progress assistant message. Content
    /// only ever grows; `updatedAt` is refreshed on every append.
    pub async fn append_assistant_delta(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        delta: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if delta.is_empty() {
            return Ok(());
        }
        let Some(convo) = self.conversations.iter_mut().find(|c| c.id == conversation_id) else {
            warn!("Dropping delta for unknown conversation {}", conversation_id);
            return Ok(());
        };
        let Some(msg) = convo
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.role == ChatRole::Assistant)
        else {
            warn!("Dropping delta for unknown assistant message {}", message_id);
            return Ok(());
        };
        msg.content.push_str(delta);
        convo.touch();
        self.persist().await
    }

    /// Whitespace-only titles are rejected: the conversation is left
    /// completely untouched, `updatedAt` included.
    pub async fn rename(
        &mut self,
        conversation_id: &str,
        new_title: &str,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let title = new_title.trim();
        if title.is_empty() {
            return Ok(false);
        }
        let Some(convo) = self.conversations.iter_mut().find(|c| c.id == conversation_id) else {
            return Ok(false);
        };
        convo.title = title.to_string();
        convo.touch();
        self.persist().await?;
        Ok(true)
    }

    /// Remove a conversation. When the active one goes, the most recently
    /// updated survivor takes its place, or none if the list is empty.
    pub async fn delete(&mut self, conversation_id: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.conversations.retain(|c| c.id != conversation_id);
        if self.active_id.as_deref() == Some(conversation_id) {
            self.active_id = most_recent_id(&self.conversations);
        }
        self.persist().await
    }

    async fn persist(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let bytes = serde_json::to_vec(&self.conversations)?;
        self.kv.save(CONVERSATIONS_KEY, &bytes).await
    }
}

fn most_recent_id(conversations: &[Conversation]) -> Option<String> {
    conversations
        .iter()
        .max_by_key(|c| c.updated_at)
        .map(|c| c.id.clone())
}

/// Title from the first non-blank user message, truncated for display.
pub fn derive_title(messages: &[ChatMessage]) -> Option<String> {
    let first_user = messages
        .iter()
        .find(|m| m.role == ChatRole::User && !m.content.trim().is_empty())?;
    Some(truncate_title(first_user.content.trim()))
}

fn truncate_title(raw: &str) -> String {
    if raw.chars().count() > TITLE_MAX_CHARS {
        let mut title: String = raw.chars().take(TITLE_MAX_CHARS).collect();
        title.push('…');
        title
    } else {
        raw.to_string()
    }
}

/// Tolerant snapshot parse: entries without a string id are dropped, missing
/// fields get defaults, malformed messages are skipped. Accepts either a bare
/// array or an object wrapping one under `conversations`.
fn sanitize_snapshot(bytes: &[u8]) -> Vec<Conversation> {
    let parsed: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!("Discarding unreadable conversations snapshot: {}", e);
            return Vec::new();
        }
    };

    let list = match &parsed {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("conversations") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    let now = Utc::now();
    let mut conversations = Vec::with_capacity(list.len());
    for entry in list {
        let Some(id) = entry.get("id").and_then(Value::as_str) else {
            continue;
        };
        let title = entry
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();
        let created_at = timestamp_or(entry.get("createdAt"), now);
        let updated_at = timestamp_or(entry.get("updatedAt"), now);
        let messages = match entry.get("messages") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|m| serde_json::from_value::<ChatMessage>(m.clone()).ok())
                .collect(),
            _ => Vec::new(),
        };
        conversations.push(Conversation {
            id: id.to_string(),
            title,
            created_at,
            updated_at,
            messages,
        });
    }
    conversations
}

fn timestamp_or(value: Option<&Value>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    value
        .cloned()
        .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok())
        .unwrap_or(fallback)
}
