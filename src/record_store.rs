use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;

use crate::{history::HistoryExport, models::Record};

pub async fn load_records(path: &Path) -> Result<Vec<Record>> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse records in {}", path.display()))
}

pub async fn load_history_export(path: &Path) -> Result<Option<HistoryExport>> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to read history export {}", path.display()))
        }
    };
    let export = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse history export {}", path.display()))?;
    Ok(Some(export))
}

pub async fn write_history_export(path: &Path, export: &HistoryExport) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let raw = serde_json::to_vec_pretty(export).context("Failed to serialize history export")?;
    fs::write(path, raw)
        .await
        .with_context(|| format!("Failed to write history export {}", path.display()))
}
