mod file;
mod memory;
mod redis;

pub use self::file::FileKvStore;
pub use self::memory::MemoryKvStore;
pub use self::redis::RedisKvStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;

use crate::cli::Args;

/// Durable key-value persistence for the conversation snapshot.
///
/// The full snapshot lives under a single key, so any backend that can load
/// and atomically replace a value by key fits.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, Box<dyn Error + Send + Sync>>;

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>>;
}

pub fn create_kv_store(args: &Args) -> Result<Arc<dyn KvStore>, Box<dyn Error + Send + Sync>> {
    match args.storage_type.to_lowercase().as_str() {
        "file" => {
            let store = FileKvStore::new(args.storage_dir.clone());
            Ok(Arc::new(store))
        }
        "redis" => {
            let store = RedisKvStore::new(args.clone())?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryKvStore::new())),
        _ => Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Unsupported storage type: {}", args.storage_type),
        ))),
    }
}

pub fn initialize_kv_store(args: &Args) -> Result<Arc<dyn KvStore>, Box<dyn Error + Send + Sync>> {
    info!(
        "Conversations will be stored in: {} ({})",
        args.storage_type,
        match args.storage_type.as_str() {
            "redis" => args.storage_redis_url.clone(),
            _ => args.storage_dir.clone(),
        }
    );
    create_kv_store(args)
}
