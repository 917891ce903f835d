use log::debug;
use reqwest::{Client as HttpClient, StatusCode};
use thiserror::Error;
use url::Url;

use crate::cli::Args;
use crate::models::chat::{ChatMessage, ChatRequest, WireMessage, WireRole};

/// Everything `send` can fail with, each with its user-facing copy. A
/// deliberate cancellation is part of the taxonomy but is never shown.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("No hay sesión activa (token).")]
    NoSession,
    #[error("El servicio de IA está temporalmente no disponible (502). Intenta de nuevo en unos segundos.")]
    UpstreamUnavailable,
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("No se pudo conectar por CORS. Si estás en producción, revisa la configuración del backend para permitir este dominio.")]
    CorsBlocked { detail: String },
    #[error("{0}")]
    Network(String),
    #[error("No se pudo guardar la conversación: {0}")]
    Storage(String),
    #[error("solicitud cancelada")]
    Cancelled,
}

impl SendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SendError::UpstreamUnavailable => Some(502),
            SendError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Banner headline, one per error family.
    pub fn headline(&self) -> &'static str {
        match self {
            SendError::UpstreamUnavailable => "Servicio no disponible",
            SendError::CorsBlocked { .. } => "Conexión bloqueada",
            _ => "Error",
        }
    }

    /// Only the upstream-unavailable case gets a retry affordance.
    pub fn offers_retry(&self) -> bool {
        matches!(self, SendError::UpstreamUnavailable)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SendError::Cancelled)
    }
}

/// Best-effort transport-error classification. Nothing in the error
/// authoritatively distinguishes a blocked cross-origin request from a plain
/// network failure, so this matches on the error text and stays approximate.
fn classify_transport_text(text: String) -> SendError {
    let lower = text.to_lowercase();
    if lower.contains("cors") || lower.contains("origin") || lower.contains("failed to fetch") {
        SendError::CorsBlocked { detail: text }
    } else {
        SendError::Network(text)
    }
}

fn classify_transport_error(err: &reqwest::Error) -> SendError {
    classify_transport_text(err.to_string())
}

/// Client for the chat endpoint: one POST per user turn carrying the system
/// instruction plus the full prior message list.
pub struct ChatApi {
    http: HttpClient,
    chat_url: Url,
    token: Option<String>,
    system_prompt: String,
}

impl ChatApi {
    pub fn from_args(args: &Args) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let base = Url::parse(&args.api_base_url)
            .map_err(|e| format!("Invalid API base URL '{}': {}", args.api_base_url, e))?;
        let chat_url = base
            .join(&args.chat_path)
            .map_err(|e| format!("Invalid chat path '{}': {}", args.chat_path, e))?;
        let http = HttpClient::builder().build()?;
        let token = args.api_token.clone().filter(|t| !t.trim().is_empty());

        Ok(Self {
            http,
            chat_url,
            token,
            system_prompt: args.system_prompt.clone(),
        })
    }

    /// A missing credential blocks sending before anything is mutated.
    pub fn ensure_session(&self) -> Result<&str, SendError> {
        self.token.as_deref().ok_or(SendError::NoSession)
    }

    /// System instruction first, then every prior message with non-blank
    /// content, widened to the wire role vocabulary.
    pub fn wire_messages(&self, messages: &[ChatMessage]) -> Vec<WireMessage> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(WireMessage {
            role: WireRole::System,
            content: self.system_prompt.clone(),
        });
        wire.extend(
            messages
                .iter()
                .filter(|m| !m.content.trim().is_empty())
                .map(|m| WireMessage {
                    role: m.role.into(),
                    content: m.content.clone(),
                }),
        );
        wire
    }

    /// Issue the turn's POST. A non-success status never reaches the caller
    /// as a response: it is classified here, before any streaming starts.
    pub async fn send_chat(&self, messages: &[ChatMessage]) -> Result<reqwest::Response, SendError> {
        let token = self.ensure_session()?.to_string();
        let req = ChatRequest {
            messages: self.wire_messages(messages),
        };
        debug!("POST {} ({} wire messages)", self.chat_url, req.messages.len());

        let resp = self
            .http
            .post(self.chat_url.clone())
            .bearer_auth(token)
            .json(&req)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            if status == StatusCode::BAD_GATEWAY {
                return Err(SendError::UpstreamUnavailable);
            }
            let body = resp.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                format!("Error al consultar IA ({}).", status.as_u16())
            } else {
                body
            };
            return Err(SendError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp)
    }
}
