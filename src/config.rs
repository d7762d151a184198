use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::constants::{
    DECODED_ARTIFACT_FILENAME, DEFAULT_DATA_DIR, DEFAULT_DOWNSAMPLE_STRIDE,
    DEFAULT_FETCH_ATTEMPTS, DEFAULT_FETCH_RETRY_DELAY_SECONDS, DEFAULT_FETCH_TIMEOUT_SECONDS,
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_AGE_SECONDS, PAYLOAD_CACHE_FILENAME, RALA_SOURCE_URL,
    RAW_ARTIFACT_FILENAME,
};

#[derive(Clone)]
pub struct Config {
    pub listen_addr: String,
    pub data_dir: PathBuf,
    pub source_url: String,
    pub max_age: Duration,
    pub fetch_timeout: Duration,
    pub fetch_attempts: u32,
    pub fetch_retry_delay: Duration,
    pub downsample_stride: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = env_string("RADAR_LISTEN_ADDR", DEFAULT_LISTEN_ADDR);
        let data_dir = PathBuf::from(env_string("RADAR_DATA_DIR", DEFAULT_DATA_DIR));
        let source_url = env_string("RADAR_SOURCE_URL", RALA_SOURCE_URL);
        let max_age =
            Duration::from_secs(env_u64("RADAR_MAX_AGE_SECONDS", DEFAULT_MAX_AGE_SECONDS)?);
        let fetch_timeout = Duration::from_secs(env_u64(
            "RADAR_FETCH_TIMEOUT_SECONDS",
            DEFAULT_FETCH_TIMEOUT_SECONDS,
        )?);
        let fetch_attempts = env_u32("RADAR_FETCH_ATTEMPTS", DEFAULT_FETCH_ATTEMPTS)?;
        let fetch_retry_delay = Duration::from_secs(env_u64(
            "RADAR_FETCH_RETRY_DELAY_SECONDS",
            DEFAULT_FETCH_RETRY_DELAY_SECONDS,
        )?);
        let downsample_stride =
            env_usize("RADAR_DOWNSAMPLE_STRIDE", DEFAULT_DOWNSAMPLE_STRIDE)?.max(1);

        Ok(Self {
            listen_addr,
            data_dir,
            source_url,
            max_age,
            fetch_timeout,
            fetch_attempts,
            fetch_retry_delay,
            downsample_stride,
        })
    }

    pub fn raw_path(&self) -> PathBuf {
        self.data_dir.join(RAW_ARTIFACT_FILENAME)
    }

    pub fn decoded_path(&self) -> PathBuf {
        self.data_dir.join(DECODED_ARTIFACT_FILENAME)
    }

    pub fn payload_path(&self) -> PathBuf {
        self.data_dir.join(PAYLOAD_CACHE_FILENAME)
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {}={} as u64", name, value)),
        Err(_) => Ok(default),
    }
}

fn env_u32(name: &str, default: u32) -> Result<u32> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u32>()
            .with_context(|| format!("Failed to parse {}={} as u32", name, value)),
        Err(_) => Ok(default),
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<usize>()
            .with_context(|| format!("Failed to parse {}={} as usize", name, value)),
        Err(_) => Ok(default),
    }
}
