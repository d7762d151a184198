pub const RALA_SOURCE_URL: &str =
    "https://mrms.ncep.noaa.gov/2D/ReflectivityAtLowestAltitude/MRMS_ReflectivityAtLowestAltitude.latest.grib2.gz";

pub const RAW_ARTIFACT_FILENAME: &str = "reflectivity.grib2.gz";
pub const DECODED_ARTIFACT_FILENAME: &str = "reflectivity.grib2";
pub const PAYLOAD_CACHE_FILENAME: &str = "reflectivity.json";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9292";
pub const DEFAULT_DATA_DIR: &str = "/var/lib/radar-weather-api";
pub const DEFAULT_MAX_AGE_SECONDS: u64 = 900;
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 90;
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
pub const DEFAULT_FETCH_RETRY_DELAY_SECONDS: u64 = 3;
pub const DEFAULT_DOWNSAMPLE_STRIDE: usize = 20;

/// Values at or below this are missing-data sentinels (-99, -999), not
/// reflectivity readings.
pub const MIN_VALID_VALUE: f64 = -50.0;

pub const DEFAULT_LONG_NAME: &str = "Reflectivity at Lowest Altitude";

/// Case-sensitive substrings that identify a reflectivity variable.
pub const REFLECTIVITY_NAME_HINTS: [&str; 2] = ["Reflectivity", "DZ"];
