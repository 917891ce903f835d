use futures::StreamExt;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::{ChatApi, SendError};
use crate::history::ConversationStore;
use crate::models::chat::ChatMessage;
use crate::stream::StreamAssembler;

/// Incremental outcome of one user turn.
#[derive(Debug)]
pub enum ChatEvent {
    Delta(String),
    Done,
    Failed(SendError),
}

/// Session-scoped controller: one per console instance. Holds the active
/// stream handle as an explicit field and guarantees at most one in-flight
/// stream, aborting the previous read loop before a new turn starts.
pub struct ChatSession {
    api: Arc<ChatApi>,
    store: Arc<Mutex<ConversationStore>>,
    in_flight: Option<JoinHandle<()>>,
    last_prompt: Option<String>,
}

impl ChatSession {
    pub fn new(api: ChatApi, store: ConversationStore) -> Self {
        Self {
            api: Arc::new(api),
            store: Arc::new(Mutex::new(store)),
            in_flight: None,
            last_prompt: None,
        }
    }

    pub fn store(&self) -> Arc<Mutex<ConversationStore>> {
        self.store.clone()
    }

    /// Abort the in-flight read loop, if any. Partial assistant output
    /// already appended stays where it is.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
            info!("Aborted previous in-flight stream");
        }
    }

    /// Resubmit the last sent prompt. `None` when nothing was sent yet.
    pub async fn retry(&mut self) -> Result<Option<ReceiverStream<ChatEvent>>, SendError> {
        match self.last_prompt.clone() {
            Some(prompt) => self.send(&prompt).await.map(Some),
            None => Ok(None),
        }
    }

    /// One user turn: append the user message plus an empty assistant
    /// placeholder, POST the conversation, then stream deltas into the
    /// placeholder. Pre-stream failures return here with the placeholder
    /// still visibly empty; mid-stream failures arrive as a `Failed` event
    /// after whatever partial text already landed.
    pub async fn send(&mut self, prompt: &str) -> Result<ReceiverStream<ChatEvent>, SendError> {
        let text = prompt.trim();
        self.api.ensure_session()?;
        self.cancel();

        let user = ChatMessage::user(text);
        let assistant = ChatMessage::assistant_placeholder();
        let assistant_id = assistant.id.clone();

        let (conversation_id, request_messages) = {
            let mut store = self.store.lock().await;
            let active = store.active_id().map(str::to_string);
            let id = store
                .append_messages(active.as_deref(), vec![user, assistant])
                .await
                .map_err(|e| SendError::Storage(e.to_string()))?;
            let messages = store.get(&id).map(|c| c.messages.clone()).unwrap_or_default();
            (id, messages)
        };
        self.last_prompt = Some(text.to_string());

        let resp = self.api.send_chat(&request_messages).await?;
        debug!("Streaming response for conversation {}", conversation_id);

        let (tx, rx) = mpsc::channel(32);
        let store = self.store.clone();

        let handle = tokio::spawn(async move {
            let mut assembler = StreamAssembler::new();
            let mut body = resp.bytes_stream();

            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for delta in assembler.feed(&bytes) {
                            persist_delta(&store, &conversation_id, &assistant_id, &delta).await;
                            if tx.send(ChatEvent::Delta(delta)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(ChatEvent::Failed(SendError::Network(e.to_string())))
                            .await;
                        return;
                    }
                }
            }

            if let Some(tail) = assembler.finish() {
                persist_delta(&store, &conversation_id, &assistant_id, &tail).await;
                if tx.send(ChatEvent::Delta(tail)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(ChatEvent::Done).await;
        });

        self.in_flight = Some(handle);
        Ok(ReceiverStream::new(rx))
    }
}

async fn persist_delta(
    store: &Arc<Mutex<ConversationStore>>,
    conversation_id: &str,
    assistant_id: &str,
    delta: &str,
) {
    let mut store = store.lock().await;
    if let Err(e) = store
        .append_assistant_delta(conversation_id, assistant_id, delta)
        .await
    {
        // The delta is still delivered to the view; only the snapshot lags.
        error!("Failed to persist assistant delta: {}", e);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
