use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use serde_json::{Map, Value};
use tokio::{fs::File, sync::Mutex};
use tracing::{debug, trace};

use crate::fs::operations::{read_or_empty, write_atomically};

use super::{keys, KeyValueStore};

/// The main realization of [KeyValueStore]. The whole store is a single JSON object on disk.
///
/// Every operation takes an advisory lock on a sibling `.lock` file: shared for reads, exclusive
/// for writes. The data file itself is replaced atomically, so its inode changes and can't carry
/// the lock. File locks block the thread, so callers inside this process queue on `local` first.
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    local: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut lock_name = path.file_name().map(|v| v.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Ok(Self {
            path,
            lock_path,
            local: Mutex::new(()),
        })
    }

    /// Store located in the application directory.
    pub fn in_dir(dir: &Path) -> Result<Self, std::io::Error> {
        Self::new(dir.join("store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open_lock(&self) -> Result<File> {
        let file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&self.lock_path)
            .await
            .with_context(|| format!("Failed to open lock file {:?}", self.lock_path))?;
        Ok(file)
    }

    async fn read_map(&self) -> Result<Map<String, Value>> {
        let content = read_or_empty(&self.path).await?;
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        // A corrupted store is reported instead of being silently replaced by an empty one.
        let data = serde_json::from_slice::<Map<String, Value>>(&content)
            .with_context(|| format!("Store {:?} is not a JSON object", self.path))?;
        Ok(data)
    }

    async fn write_map(&self, data: &Map<String, Value>) -> Result<()> {
        let content = serde_json::to_vec_pretty(data)?;
        write_atomically(&self.path, &content).await?;
        trace!("Wrote {} keys to {:?}", data.len(), self.path);
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(Map<String, Value>) -> T + Send) -> Result<T> {
        let _local = self.local.lock().await;
        let lock = self.open_lock().await?;
        lock.lock_shared()?;
        let result = self.read_map().await;
        lock.unlock_async().await?;
        Ok(f(result?))
    }

    /// Semi-safe acquire-release around a read-modify-write of the whole store.
    async fn modify<T: Send>(
        &self,
        f: impl FnOnce(&mut Map<String, Value>) -> T + Send,
    ) -> Result<T> {
        let _local = self.local.lock().await;
        let lock = self.open_lock().await?;
        lock.lock_exclusive()?;
        let result = self.modify_locked(f).await;
        lock.unlock_async().await?;
        result
    }

    async fn modify_locked<T: Send>(
        &self,
        f: impl FnOnce(&mut Map<String, Value>) -> T + Send,
    ) -> Result<T> {
        let mut data = self.read_map().await?;
        let result = f(&mut data);
        self.write_map(&data).await?;
        Ok(result)
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.read(|mut data| data.remove(key)).await
    }

    async fn get_all(&self) -> Result<Map<String, Value>> {
        self.read(|data| data).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.modify(|data| {
            data.insert(key.to_owned(), value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.modify(|data| {
            data.shift_remove(key);
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.modify(|data| data.clear()).await
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<u64> {
        let total = self
            .modify(|data| {
                let total = keys::seconds_of(data.get(key)) + delta;
                data.insert(key.to_owned(), Value::from(total));
                total
            })
            .await?;
        debug!("Incremented {key} by {delta} to {total}");
        Ok(total)
    }

    async fn replace_all(&self, replacement: Map<String, Value>) -> Result<()> {
        self.modify(|data| *data = replacement).await
    }
}
