use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::ReceiverStream;

use ia_chat::api::{ChatApi, SendError};
use ia_chat::cli::Args;
use ia_chat::history::ConversationStore;
use ia_chat::models::chat::ChatRole;
use ia_chat::session::{ChatEvent, ChatSession};
use ia_chat::storage::MemoryKvStore;

/// Canned behavior for one fake-backend connection.
#[derive(Clone)]
enum Script {
    /// 200 with an event-stream body written chunk by chunk, then EOF.
    Stream(Vec<&'static [u8]>),
    /// Non-success status with a plain body.
    Status(u16, &'static str),
    /// 200, write one chunk, then hold the connection open.
    StallAfter(&'static [u8]),
    /// 200 with an over-declared Content-Length so the close mid-body
    /// surfaces as a transport error on the client.
    Truncated(&'static [u8]),
}

async fn spawn_server(script: Script) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            let script = script.clone();
            tokio::spawn(async move {
                read_request(&mut sock).await;
                match script {
                    Script::Stream(chunks) => {
                        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
                        let _ = sock.write_all(head.as_bytes()).await;
                        for chunk in chunks {
                            let _ = sock.write_all(chunk).await;
                            let _ = sock.flush().await;
                            tokio::time::sleep(Duration::from_millis(5)).await;
                        }
                        let _ = sock.shutdown().await;
                    }
                    Script::Status(code, body) => {
                        let resp = format!(
                            "HTTP/1.1 {} Error\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            code,
                            body.len(),
                            body
                        );
                        let _ = sock.write_all(resp.as_bytes()).await;
                        let _ = sock.shutdown().await;
                    }
                    Script::StallAfter(chunk) => {
                        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
                        let _ = sock.write_all(head.as_bytes()).await;
                        let _ = sock.write_all(chunk).await;
                        let _ = sock.flush().await;
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Script::Truncated(chunk) => {
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            chunk.len() + 1000
                        );
                        let _ = sock.write_all(head.as_bytes()).await;
                        let _ = sock.write_all(chunk).await;
                        let _ = sock.flush().await;
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        let _ = sock.shutdown().await;
                    }
                }
            });
        }
    });
    format!("http://{}", addr)
}

/// Drain one HTTP request (headers plus Content-Length body) off the socket.
async fn read_request(sock: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = sock.read(&mut tmp).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&tmp[..n]);
        let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut remaining = content_length.saturating_sub(buf.len() - (pos + 4));
        while remaining > 0 {
            let n = sock.read(&mut tmp).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            remaining = remaining.saturating_sub(n);
        }
        return;
    }
}

fn args_for(base_url: &str) -> Args {
    Args {
        api_base_url: base_url.to_string(),
        chat_path: "/api/ai/chat/".to_string(),
        api_token: Some("test-token".to_string()),
        system_prompt: "Eres un asistente de IA.".to_string(),
        storage_type: "memory".to_string(),
        storage_dir: ".".to_string(),
        storage_redis_url: "redis://127.0.0.1:6379".to_string(),
        storage_redis_prefix: "ia:".to_string(),
        debug: false,
    }
}

async fn session_for(base_url: &str) -> ChatSession {
    let api = ChatApi::from_args(&args_for(base_url)).unwrap();
    let store = ConversationStore::load(Arc::new(MemoryKvStore::new()))
        .await
        .unwrap();
    ChatSession::new(api, store)
}

/// Drain a turn's events: (concatenated deltas, saw Done, failure if any).
async fn collect(mut events: ReceiverStream<ChatEvent>) -> (String, bool, Option<SendError>) {
    let mut text = String::new();
    let mut done = false;
    let mut failure = None;
    while let Some(event) = events.next().await {
        match event {
            ChatEvent::Delta(delta) => text.push_str(&delta),
            ChatEvent::Done => done = true,
            ChatEvent::Failed(e) => failure = Some(e),
        }
    }
    (text, done, failure)
}

#[tokio::test]
async fn hola_mundo_streams_end_to_end() {
    // Frame boundaries deliberately misaligned with write boundaries.
    let base = spawn_server(Script::Stream(vec![
        b"data: {\"delta\":\"Hola \"}\n\nda",
        b"ta: {\"delta\":\"mundo\"}\n\nda",
        b"ta: [DONE]\n\n",
    ]))
    .await;
    let mut session = session_for(&base).await;

    let events = session.send("Hola").await.unwrap();
    let (text, done, failure) = collect(events).await;
    assert_eq!(text, "Hola mundo");
    assert!(done);
    assert!(failure.is_none());

    let store = session.store();
    let store = store.lock().await;
    let convo = store.active().unwrap();
    assert_eq!(convo.title, "Hola");
    assert_eq!(convo.messages.len(), 2);
    assert_eq!(convo.messages[0].role, ChatRole::User);
    assert_eq!(convo.messages[0].content, "Hola");
    assert_eq!(convo.messages[1].role, ChatRole::Assistant);
    assert_eq!(convo.messages[1].content, "Hola mundo");
}

#[tokio::test]
async fn second_turn_reuses_the_active_conversation() {
    let base = spawn_server(Script::Stream(vec![b"data: ok\n\ndata: [DONE]\n\n"])).await;
    let mut session = session_for(&base).await;

    let (_, done, _) = collect(session.send("primera").await.unwrap()).await;
    assert!(done);
    let (_, done, _) = collect(session.send("segunda").await.unwrap()).await;
    assert!(done);

    let store = session.store();
    let store = store.lock().await;
    assert_eq!(store.conversations().len(), 1);
    let convo = store.active().unwrap();
    assert_eq!(convo.messages.len(), 4);
    // Title stays pinned to the first user message.
    assert_eq!(convo.title, "primera");
}

#[tokio::test]
async fn upstream_502_is_surfaced_with_retry_and_empty_placeholder() {
    let base = spawn_server(Script::Status(502, "upstream down")).await;
    let mut session = session_for(&base).await;

    let err = session.send("Hola").await.err().unwrap();
    assert!(matches!(err, SendError::UpstreamUnavailable));
    assert_eq!(err.status(), Some(502));
    assert!(err.offers_retry());

    // The empty assistant placeholder stays so the failed turn is visible.
    {
        let store = session.store();
        let store = store.lock().await;
        let convo = store.active().unwrap();
        assert_eq!(convo.messages.len(), 2);
        assert_eq!(convo.messages[1].role, ChatRole::Assistant);
        assert!(convo.messages[1].content.is_empty());
    }

    // Retry resubmits the same turn.
    let err = session.retry().await.err().unwrap();
    assert!(matches!(err, SendError::UpstreamUnavailable));
    let store = session.store();
    let store = store.lock().await;
    assert_eq!(store.active().unwrap().messages.len(), 4);
    assert_eq!(store.active().unwrap().messages[2].content, "Hola");
}

#[tokio::test]
async fn generic_http_failure_carries_status_and_body() {
    let base = spawn_server(Script::Status(500, "boom")).await;
    let mut session = session_for(&base).await;

    let err = session.send("Hola").await.err().unwrap();
    match err {
        SendError::Http { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("expected Http error, got {:?}", other),
    }
}

#[tokio::test]
async fn connection_refused_classifies_as_network() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut session = session_for(&base).await;
    let err = session.send("Hola").await.err().unwrap();
    assert!(matches!(err, SendError::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn new_send_aborts_the_previous_stream() {
    let base = spawn_server(Script::StallAfter(b"data: {\"delta\":\"primero\"}\n\n")).await;
    let mut session = session_for(&base).await;

    let mut first = session.send("uno").await.unwrap();
    match first.next().await {
        Some(ChatEvent::Delta(delta)) => assert_eq!(delta, "primero"),
        other => panic!("expected first delta, got {:?}", other),
    }

    // Second turn: the first read loop must be aborted before it starts.
    let mut second = session.send("dos").await.unwrap();

    // The first stream closes without a Done and without an error.
    assert!(first.next().await.is_none());

    match second.next().await {
        Some(ChatEvent::Delta(delta)) => assert_eq!(delta, "primero"),
        other => panic!("expected second turn delta, got {:?}", other),
    }

    let store = session.store();
    let store = store.lock().await;
    let convo = store.active().unwrap();
    assert_eq!(convo.messages.len(), 4);
    // Partial output of the cancelled turn is retained, not rolled back.
    assert_eq!(convo.messages[1].content, "primero");
    // Only the new turn's deltas land in the new assistant message.
    assert_eq!(convo.messages[3].content, "primero");
}

#[tokio::test]
async fn mid_stream_failure_keeps_partial_output() {
    let base = spawn_server(Script::Truncated(b"data: {\"delta\":\"parcial\"}\n\n")).await;
    let mut session = session_for(&base).await;

    let events = session.send("Hola").await.unwrap();
    let (text, done, failure) = collect(events).await;
    assert_eq!(text, "parcial");
    assert!(!done);
    assert!(matches!(failure, Some(SendError::Network(_))));

    let store = session.store();
    let store = store.lock().await;
    assert_eq!(store.active().unwrap().messages[1].content, "parcial");
}

#[tokio::test]
async fn stream_without_done_sentinel_flushes_trailing_frame() {
    // Body ends at EOF with an unterminated frame.
    let base = spawn_server(Script::Stream(vec![b"data: {\"delta\":\"fin\"}"])).await;
    let mut session = session_for(&base).await;

    let (text, done, failure) = collect(session.send("Hola").await.unwrap()).await;
    assert_eq!(text, "fin");
    assert!(done);
    assert!(failure.is_none());
}
