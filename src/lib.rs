pub mod api;
pub mod cli;
pub mod console;
pub mod history;
pub mod models;
pub mod session;
pub mod storage;
pub mod stream;

use api::ChatApi;
use cli::Args;
use console::Console;
use history::ConversationStore;
use log::info;
use session::ChatSession;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("API Base URL: {}", args.api_base_url);
    info!("Chat Path: {}", args.chat_path);
    info!("Session Token Present: {}", args.api_token.is_some());
    info!("Storage Type: {}", args.storage_type);
    if args.storage_type == "redis" {
        info!("Storage Redis URL: {}", args.storage_redis_url);
    } else {
        info!("Storage Dir: {}", args.storage_dir);
    }
    info!("-------------------------");

    let kv = storage::initialize_kv_store(&args)?;
    let store = ConversationStore::load(kv).await?;
    info!("Loaded {} conversation(s)", store.conversations().len());

    let api = ChatApi::from_args(&args)?;
    let session = ChatSession::new(api, store);
    Console::new(session).run().await
}
