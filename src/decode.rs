use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Decoding capability the pipeline depends on. The production implementation
/// parses the MRMS GRIB2 artifact; tests substitute synthetic grids without
/// touching the binary format.
pub trait GridDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<GridSet>;
}

/// A decoded grid file: named 2-D data variables in file order, plus the
/// reference time the file carries, when it carries one.
#[derive(Clone, Debug, Default)]
pub struct GridSet {
    pub variables: IndexMap<String, GridVariable>,
    pub reference_time: Option<DateTime<Utc>>,
}

/// One 2-D data variable with its coordinate axes and attribute metadata.
/// `values` is row-major: `latitudes.len()` rows of `longitudes.len()` cells.
#[derive(Clone, Debug)]
pub struct GridVariable {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub values: Vec<f64>,
    pub attributes: HashMap<String, String>,
}

impl GridVariable {
    pub fn value_at(&self, row: usize, col: usize) -> Option<f64> {
        if col >= self.longitudes.len() {
            return None;
        }
        self.values.get(row * self.longitudes.len() + col).copied()
    }

    /// Attribute lookup with explicit default-on-missing semantics.
    pub fn attribute_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.attributes.get(key).map(String::as_str).unwrap_or(default)
    }
}
