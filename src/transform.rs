use anyhow::{anyhow, Result};

use crate::constants::{DEFAULT_LONG_NAME, MIN_VALID_VALUE, REFLECTIVITY_NAME_HINTS};
use crate::decode::{GridSet, GridVariable};
use crate::types::{RadarMetadata, RadarPayload, RadarPoint};
use crate::utils::{nan_to_zero, normalize_lon};

/// Turn a decoded grid into the response payload: pick the reflectivity
/// variable, sample every `stride`-th cell along both axes, drop sentinel
/// cells, and normalize longitudes for map frontends.
///
/// NaN cells become 0 before the validity filter runs, so they are retained
/// as zero-valued points rather than dropped.
pub fn transform(grids: &GridSet, source_url: &str, stride: usize) -> Result<RadarPayload> {
    let (_, variable) = select_variable(grids)?;
    let stride = stride.max(1);

    let mut points = Vec::new();
    for (row, lat) in variable.latitudes.iter().copied().enumerate().step_by(stride) {
        for (col, lon) in variable
            .longitudes
            .iter()
            .copied()
            .enumerate()
            .step_by(stride)
        {
            let value = nan_to_zero(variable.value_at(row, col).unwrap_or(f64::NAN));
            if value > MIN_VALID_VALUE {
                points.push(RadarPoint {
                    lat,
                    lon: normalize_lon(lon),
                    value,
                });
            }
        }
    }

    let timestamp = grids
        .reference_time
        .map(|time| time.to_rfc3339())
        .unwrap_or_default();

    Ok(RadarPayload {
        timestamp,
        metadata: RadarMetadata {
            units: variable.attribute_or("units", "").to_string(),
            long_name: variable.attribute_or("long_name", DEFAULT_LONG_NAME).to_string(),
            source: source_url.to_string(),
        },
        points,
    })
}

/// First variable whose name carries a reflectivity hint, falling back to
/// the first variable in file order. Errors only when the set is empty.
fn select_variable(grids: &GridSet) -> Result<(&str, &GridVariable)> {
    let first = grids
        .variables
        .iter()
        .next()
        .ok_or_else(|| anyhow!("Decoded grid contains no data variables"))?;

    let (name, variable) = grids
        .variables
        .iter()
        .find(|(name, _)| {
            REFLECTIVITY_NAME_HINTS
                .iter()
                .any(|hint| name.contains(hint))
        })
        .unwrap_or(first);

    Ok((name.as_str(), variable))
}
