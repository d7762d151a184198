use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::cache::should_refetch;
use crate::error::PipelineError;
use crate::extract::extract;
use crate::http_client::fetch_with_retries;
use crate::storage::persist_payload;
use crate::transform::transform;
use crate::types::{AppState, RadarPayload};

/// Produce the payload for one request: reuse the in-memory snapshot while
/// the decoded artifact is inside the cache window, otherwise run the
/// fetch -> extract -> decode -> transform pipeline and publish the result.
///
/// The refresh mutex single-flights the pipeline; a request that was queued
/// behind an in-flight refresh re-checks freshness and reuses the
/// just-published payload instead of downloading the snapshot again.
pub async fn latest_payload(state: &AppState) -> Result<Arc<RadarPayload>, PipelineError> {
    if !should_refetch(&state.cfg.decoded_path(), state.cfg.max_age) {
        if let Some(payload) = state.latest.read().await.as_ref() {
            return Ok(payload.clone());
        }
    }

    let _guard = state.refresh_lock.lock().await;

    let refetch = should_refetch(&state.cfg.decoded_path(), state.cfg.max_age);
    if !refetch {
        if let Some(payload) = state.latest.read().await.as_ref() {
            return Ok(payload.clone());
        }
    }

    if refetch {
        info!("Fetching latest radar snapshot from {}", state.cfg.source_url);
        fetch_with_retries(
            &state.http,
            &state.cfg.source_url,
            &state.cfg.raw_path(),
            state.cfg.fetch_attempts,
            state.cfg.fetch_retry_delay,
        )
        .await
        .map_err(PipelineError::Fetch)?;

        let raw = state.cfg.raw_path();
        let decoded = state.cfg.decoded_path();
        tokio::task::spawn_blocking(move || extract(&raw, &decoded))
            .await
            .context("Join error while extracting artifact")
            .and_then(|result| result)
            .map_err(PipelineError::Extract)?;
    }

    let decoder = state.decoder.clone();
    let decoded = state.cfg.decoded_path();
    let grids = tokio::task::spawn_blocking(move || decoder.decode(&decoded))
        .await
        .context("Join error while decoding grid")
        .and_then(|result| result)
        .map_err(PipelineError::Decode)?;

    let payload = transform(&grids, &state.cfg.source_url, state.cfg.downsample_stride)
        .map_err(PipelineError::Transform)?;
    let payload = Arc::new(payload);
    info!("Transformed radar snapshot into {} points", payload.points.len());

    // Best effort; a request should not fail because the side-cache did.
    if let Err(error) = persist_payload(&state.cfg, &payload).await {
        warn!("Failed to persist payload cache: {error:#}");
    }

    *state.latest.write().await = Some(payload.clone());
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::Result;
    use indexmap::IndexMap;
    use reqwest::Client;
    use tokio::sync::{Mutex, RwLock};

    use crate::config::Config;
    use crate::decode::{GridDecoder, GridSet, GridVariable};
    use crate::types::RadarPoint;

    struct StubDecoder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubDecoder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    impl GridDecoder for StubDecoder {
        fn decode(&self, _path: &Path) -> Result<GridSet> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("synthetic decode failure");
            }

            let mut variables = IndexMap::new();
            variables.insert(
                "ReflectivityAtLowestAltitude".to_string(),
                GridVariable {
                    latitudes: vec![10.0, 11.0],
                    longitudes: vec![190.0, 200.0],
                    values: vec![-999.0, -10.0, 5.0, f64::NAN],
                    attributes: HashMap::new(),
                },
            );
            Ok(GridSet {
                variables,
                reference_time: None,
            })
        }
    }

    fn test_config(data_dir: PathBuf, source_url: String) -> Config {
        Config {
            listen_addr: "127.0.0.1:0".to_string(),
            data_dir,
            source_url,
            max_age: Duration::from_secs(900),
            fetch_timeout: Duration::from_secs(5),
            fetch_attempts: 3,
            fetch_retry_delay: Duration::from_millis(5),
            downsample_stride: 1,
        }
    }

    fn test_state(cfg: Config, decoder: Arc<StubDecoder>) -> AppState {
        AppState {
            cfg: Arc::new(cfg),
            http: Client::new(),
            decoder,
            latest: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    fn expected_points() -> Vec<RadarPoint> {
        vec![
            RadarPoint {
                lat: 10.0,
                lon: -170.0,
                value: -10.0,
            },
            RadarPoint {
                lat: 11.0,
                lon: -170.0,
                value: 5.0,
            },
            RadarPoint {
                lat: 11.0,
                lon: -160.0,
                value: 0.0,
            },
        ]
    }

    #[tokio::test]
    async fn fresh_artifact_is_decoded_without_a_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(
            dir.path().to_path_buf(),
            // Unroutable on purpose; a fetch attempt would fail the test.
            "http://127.0.0.1:1/latest.grib2.gz".to_string(),
        );
        std::fs::write(cfg.decoded_path(), b"fresh artifact").unwrap();
        let decoder = Arc::new(StubDecoder::new());
        let state = test_state(cfg, decoder.clone());

        let payload = latest_payload(&state).await.unwrap();

        assert_eq!(payload.points, expected_points());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
        assert!(state.cfg.payload_path().exists());
    }

    #[tokio::test]
    async fn cache_window_hits_reuse_the_published_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(
            dir.path().to_path_buf(),
            "http://127.0.0.1:1/latest.grib2.gz".to_string(),
        );
        std::fs::write(cfg.decoded_path(), b"fresh artifact").unwrap();
        let decoder = Arc::new(StubDecoder::new());
        let state = test_state(cfg, decoder.clone());

        let first = latest_payload(&state).await.unwrap();
        let second = latest_payload(&state).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_pipeline_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(
            dir.path().to_path_buf(),
            "http://127.0.0.1:1/latest.grib2.gz".to_string(),
        );
        std::fs::write(cfg.decoded_path(), b"fresh artifact").unwrap();
        let decoder = Arc::new(StubDecoder::new());
        let state = test_state(cfg, decoder.clone());

        let (first, second) =
            tokio::join!(latest_payload(&state), latest_payload(&state));

        assert_eq!(first.unwrap().points, expected_points());
        assert_eq!(second.unwrap().points, expected_points());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_fetch_surfaces_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(
            dir.path().to_path_buf(),
            "http://127.0.0.1:1/latest.grib2.gz".to_string(),
        );
        let state = test_state(cfg, Arc::new(StubDecoder::new()));

        let error = latest_payload(&state).await.unwrap_err();
        assert!(matches!(error, PipelineError::Fetch(_)));
    }

    #[tokio::test]
    async fn decode_failure_surfaces_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(
            dir.path().to_path_buf(),
            "http://127.0.0.1:1/latest.grib2.gz".to_string(),
        );
        std::fs::write(cfg.decoded_path(), b"fresh artifact").unwrap();
        let state = test_state(cfg, Arc::new(StubDecoder::failing()));

        let error = latest_payload(&state).await.unwrap_err();
        assert!(matches!(error, PipelineError::Decode(_)));
        assert!(state.latest.read().await.is_none());
    }
}
