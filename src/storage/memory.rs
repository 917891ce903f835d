use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use tokio::sync::Mutex;

use super::KvStore;

/// In-memory stub, for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, Box<dyn Error + Send + Sync>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.values.lock().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
