use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::{
    fs::operations::write_atomically,
    store::{catalog::Catalog, KeyValueStore},
    utils::time::export_file_name,
};

/// Writes the whole store to `output`, or to a dated file in the current directory.
pub async fn export_to<S: KeyValueStore + ?Sized>(
    catalog: &Catalog<'_, S>,
    output: Option<PathBuf>,
    today: NaiveDate,
) -> Result<PathBuf> {
    let path = output.unwrap_or_else(|| PathBuf::from(export_file_name(today)));
    let content = catalog.export_json().await?;
    write_atomically(&path, content.as_bytes())
        .await
        .with_context(|| format!("Failed to write backup to {}", path.display()))?;
    info!("Exported store to {path:?}");
    Ok(path)
}

pub async fn import_from<S: KeyValueStore + ?Sized>(
    catalog: &Catalog<'_, S>,
    input: &Path,
) -> Result<usize> {
    let content = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read backup {}", input.display()))?;
    catalog.import_json(&content).await
}
