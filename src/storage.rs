use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::warn;

use crate::config::Config;
use crate::types::RadarPayload;
use crate::utils::part_path;

/// Write the payload to the JSON side-cache, replacing the previous snapshot
/// wholesale. Callers treat failure as non-fatal.
pub async fn persist_payload(cfg: &Config, payload: &RadarPayload) -> Result<()> {
    let path = cfg.payload_path();
    let encoded = serde_json::to_vec(payload).context("Failed to serialize radar payload")?;

    let tmp = part_path(&path);
    fs::write(&tmp, &encoded)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, &path)
        .await
        .with_context(|| format!("Failed to move payload cache into {}", path.display()))?;
    Ok(())
}

/// Rehydrate the in-memory payload slot from the JSON side-cache at boot.
/// A missing or unreadable cache file is an empty slot, not an error.
pub async fn load_cached_payload(cfg: &Config) -> Result<Option<Arc<RadarPayload>>> {
    let path = cfg.payload_path();
    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    match serde_json::from_slice::<RadarPayload>(&bytes) {
        Ok(payload) => Ok(Some(Arc::new(payload))),
        Err(error) => {
            warn!(
                "Ignoring unreadable payload cache at {}: {error}",
                path.display()
            );
            Ok(None)
        }
    }
}
