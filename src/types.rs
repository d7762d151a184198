use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::decode::GridDecoder;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub http: Client,
    pub decoder: Arc<dyn GridDecoder>,
    pub latest: Arc<RwLock<Option<Arc<RadarPayload>>>>,
    /// Single-flight guard around the on-disk artifact slot, so concurrent
    /// stale requests never race a second download of the same snapshot.
    pub refresh_lock: Arc<Mutex<()>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadarPoint {
    pub lat: f64,
    pub lon: f64,
    pub value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RadarMetadata {
    pub units: String,
    pub long_name: String,
    pub source: String,
}

/// The unit of response and of the on-disk JSON cache. Replaced wholesale on
/// each successful pipeline run, never partially updated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RadarPayload {
    pub timestamp: String,
    pub metadata: RadarMetadata,
    pub points: Vec<RadarPoint>,
}
