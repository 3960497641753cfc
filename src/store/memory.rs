use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{keys, KeyValueStore};

/// Store that lives only as long as the process. Useful for embedding the tracker and for tests.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn get_all(&self) -> Result<Map<String, Value>> {
        Ok(self.data.lock().await.clone())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.data.lock().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.data.lock().await.shift_remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.data.lock().await.clear();
        Ok(())
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<u64> {
        let mut data = self.data.lock().await;
        let total = keys::seconds_of(data.get(key)) + delta;
        data.insert(key.to_owned(), Value::from(total));
        Ok(total)
    }

    async fn replace_all(&self, data: Map<String, Value>) -> Result<()> {
        *self.data.lock().await = data;
        Ok(())
    }
}
