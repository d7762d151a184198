use thiserror::Error;

/// A stage failure aborts the rest of the pipeline for that request and maps
/// to a single top-level error response.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Fetch failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("Extract failed: {0:#}")]
    Extract(anyhow::Error),
    #[error("Decode failed: {0:#}")]
    Decode(anyhow::Error),
    #[error("Transform failed: {0:#}")]
    Transform(anyhow::Error),
}
