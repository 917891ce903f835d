use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use std::error::Error;

use super::KvStore;
use crate::cli::Args;

/// Redis-backed snapshot store for deployments where the console runs on
/// more than one host.
pub struct RedisKvStore {
    client: Client,
    key_prefix: String,
}

impl RedisKvStore {
    pub fn new(args: Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            client: Client::open(args.storage_redis_url.as_str())?,
            key_prefix: args.storage_redis_prefix,
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let value: Option<Vec<u8>> = conn.get(self.key_for(key)).await?;
        Ok(value)
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let _: () = conn.set(self.key_for(key), value).await?;
        Ok(())
    }
}
