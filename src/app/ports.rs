use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::processing::correction::ValueTable;
use crate::types::{EntitySpan, Sentiment};

/// Black-box sentiment classifier. Callers truncate `text` to `max_len` characters first.
#[async_trait]
pub trait SentimentEngine: Send + Sync {
    async fn classify(&self, text: &str, max_len: usize) -> Result<Sentiment>;
}

/// Black-box named-entity recognizer returning byte-offset spans over `text`.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>>;
}

/// Durable home of the correction agent's value table.
pub trait TableStore: Send + Sync {
    /// `Ok(None)` means nothing has been stored yet (cold start).
    fn load(&self) -> Result<Option<ValueTable>>;
    fn save(&self, table: &ValueTable) -> Result<()>;
}

/// Durable blob storage for artifacts.
pub trait BlobStore: Send + Sync {
    /// Writes `content` under `key` and returns its location.
    /// Must fail with `io::ErrorKind::AlreadyExists` instead of overwriting an existing key.
    fn put(&self, key: &str, content: &serde_json::Value) -> Result<String>;
}
