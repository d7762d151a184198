use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

/// Remap a [0, 360) longitude to the [-180, 180) convention map frontends
/// expect. Longitudes already in range pass through unchanged.
pub fn normalize_lon(lon_deg: f64) -> f64 {
    if lon_deg > 180.0 {
        lon_deg - 360.0
    } else {
        lon_deg
    }
}

pub fn nan_to_zero(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

/// Temporary sibling for atomic replace-on-success writes into `dest`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(".part");
    dest.with_file_name(name)
}
