use clap::Parser;

/// Default system instruction, sent as the first wire message of every turn.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres un asistente de IA profesional. Responde siempre en español neutro. Usa el contexto de toda la conversación (mensajes anteriores) para mantener continuidad. No inventes datos como fechas actuales; si no sabes algo, dilo.";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- API Args ---
    /// Base address of the backend REST API.
    #[arg(long, env = "API_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub api_base_url: String,

    /// Path of the streaming chat endpoint, joined onto the base address.
    #[arg(long, env = "CHAT_PATH", default_value = "/api/ai/chat/")]
    pub chat_path: String,

    /// Bearer token for the API session. Sending is blocked without one.
    #[arg(long, env = "API_TOKEN")]
    pub api_token: Option<String>,

    /// System instruction prepended to every outbound turn.
    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    // --- Storage Args ---
    /// Conversation snapshot store type (file, redis, memory)
    #[arg(long, env = "STORAGE_TYPE", default_value = "file")]
    pub storage_type: String,

    /// Directory for the file snapshot store.
    #[arg(long, env = "STORAGE_DIR", default_value = ".ia-chat")]
    pub storage_dir: String,

    /// Redis URL for the redis snapshot store (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "STORAGE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub storage_redis_url: String,

    /// Prefix for redis snapshot keys.
    #[arg(long, env = "STORAGE_REDIS_PREFIX", default_value = "ia:")]
    pub storage_redis_prefix: String,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

#[cfg(test)]
impl Args {
    pub fn for_tests() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            chat_path: "/api/ai/chat/".to_string(),
            api_token: Some("test-token".to_string()),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            storage_type: "memory".to_string(),
            storage_dir: ".ia-chat".to_string(),
            storage_redis_url: "redis://127.0.0.1:6379".to_string(),
            storage_redis_prefix: "ia:".to_string(),
            debug: false,
        }
    }
}
