use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder title for conversations that have no user content yet.
pub const DEFAULT_TITLE: &str = "Nuevo chat";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: format!("u_{}", Uuid::new_v4().simple()),
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Empty assistant message that the stream assembler appends into.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: format!("a_{}", Uuid::new_v4().simple()),
            role: ChatRole::Assistant,
            content: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: format!("c_{}", Uuid::new_v4().simple()),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// True once a non-placeholder title has been set.
    pub fn has_title(&self) -> bool {
        let t = self.title.trim();
        !t.is_empty() && t != DEFAULT_TITLE
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire role vocabulary: a superset of `ChatRole` that also allows `system`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
}

impl From<ChatRole> for WireRole {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => WireRole::User,
            ChatRole::Assistant => WireRole::Assistant,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
}
