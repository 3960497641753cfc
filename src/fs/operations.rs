use std::path::{Path, PathBuf};

use tokio::{fs, io::{self, AsyncWriteExt}};

/// Path of the scratch file used while replacing `path`.
pub fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|v| v.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the content of a file so that readers either see the old content or the new one.
/// A shutdown in the middle of a write leaves at most a stray temporary file behind.
pub async fn write_atomically(path: &Path, content: &[u8]) -> Result<(), io::Error> {
    let temporary = temporary_sibling(path);
    {
        let mut file = fs::File::create(&temporary).await?;
        file.write_all(content).await?;
        file.flush().await?;
        file.sync_all().await?;
    }
    fs::rename(&temporary, path).await
}

/// Reads a file, treating a missing file as empty.
pub async fn read_or_empty(path: &Path) -> Result<Vec<u8>, io::Error> {
    match fs::read(path).await {
        Ok(v) => Ok(v),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(vec![]),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_write_atomically_replaces_content() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("store.json");

        write_atomically(&path, b"{\"a\":1}").await?;
        write_atomically(&path, b"{\"b\":2}").await?;

        assert_eq!(tokio::fs::read(&path).await?, b"{\"b\":2}");
        assert!(!temporary_sibling(&path).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_missing_file() -> Result<()> {
        let dir = tempdir()?;

        let content = read_or_empty(&dir.path().join("missing.json")).await?;

        assert!(content.is_empty());
        Ok(())
    }
}
