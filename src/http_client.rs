use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::warn;

use crate::utils::part_path;

/// Download `url` to `dest`, streaming the body chunk by chunk so a
/// multi-hundred-megabyte grid file never sits in memory. The body lands in a
/// temporary sibling first and is renamed into place on success, so a failed
/// attempt leaves any previous artifact at `dest` untouched.
pub async fn download_to_file(http: &Client, url: &str, dest: &Path) -> Result<()> {
    let tmp = part_path(dest);
    if let Err(error) = stream_to_file(http, url, &tmp).await {
        fs::remove_file(&tmp).await.ok();
        return Err(error);
    }
    fs::rename(&tmp, dest)
        .await
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;
    Ok(())
}

async fn stream_to_file(http: &Client, url: &str, tmp: &Path) -> Result<()> {
    let response = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request failed for {url}"))?;

    if !response.status().is_success() {
        bail!("Request failed ({}) for {url}", response.status());
    }

    let mut file = fs::File::create(tmp)
        .await
        .with_context(|| format!("Failed to create {}", tmp.display()))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Failed to read body chunk for {url}"))?;
        file.write_all(&chunk)
            .await
            .context("Failed to write download chunk")?;
    }

    file.flush().await.context("Failed to flush download")?;
    Ok(())
}

/// Retry driver for the fetch stage: up to `attempts` tries with a fixed
/// inter-attempt delay, returning the last underlying failure once the
/// budget is exhausted.
pub async fn fetch_with_retries(
    http: &Client,
    url: &str,
    dest: &Path,
    attempts: u32,
    retry_delay: Duration,
) -> Result<()> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match download_to_file(http, url, dest).await {
            Ok(()) => return Ok(()),
            Err(error) => {
                warn!("Fetch attempt {attempt}/{attempts} failed for {url}: {error:#}");
                last_error = Some(error);
                if attempt < attempts {
                    sleep(retry_delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("No fetch attempts were made")))
}
