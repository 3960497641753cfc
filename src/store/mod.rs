//!  The persisted state of the application is a single flat key-value mapping.
//!  The basic idea is:
//!   - Most keys are tracking rules mapped to the seconds spent on them.
//!   - A few reserved keys ([keys::ReservedKey]) hold projects, notes, to-dos and settings.
//!   - Every access goes through [KeyValueStore], so the tracker never cares where the data lives.

pub mod catalog;
pub mod entities;
pub mod json_store;
pub mod keys;
pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Interface for abstracting the persisted key-value store. Values are arbitrary JSON.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Returns a snapshot of the whole store in stored order.
    async fn get_all(&self) -> Result<Map<String, Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Adds `delta` seconds to a rule and returns the new total. A missing entry is created.
    /// Implementations should make this a single atomic read-modify-write.
    async fn increment(&self, key: &str, delta: u64) -> Result<u64> {
        let total = keys::seconds_of(self.get(key).await?.as_ref()) + delta;
        self.set(key, Value::from(total)).await?;
        Ok(total)
    }

    /// Replaces the entire content of the store.
    async fn replace_all(&self, data: Map<String, Value>) -> Result<()> {
        self.clear().await?;
        for (key, value) in data {
            self.set(&key, value).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key).await
    }

    async fn get_all(&self) -> Result<Map<String, Value>> {
        (**self).get_all().await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<u64> {
        (**self).increment(key, delta).await
    }

    async fn replace_all(&self, data: Map<String, Value>) -> Result<()> {
        (**self).replace_all(data).await
    }
}
