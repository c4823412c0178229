//! Grid Resampling
//!
//! Point sampling and whole-grid reindexing for tables stored as
//! `values[load_index][speed_index]`. Queries outside the grid are clamped to
//! its bounding box, so edge values are held rather than extrapolated.

use serde::{Deserialize, Serialize};

use crate::axis::{bracket, AxisSeries};
use crate::error::{CalcError, Result};

/// Interpolation used when sampling a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMethod {
    /// Closest bin on each axis, ties toward the lower index
    Nearest,
    /// Four-point weighted interpolation
    #[default]
    Bilinear,
}

/// Linear interpolation over sorted `xs`, holding the edge values outside
pub fn interpolate_1d(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    if ys.is_empty() {
        return 0.0;
    }
    let (i0, i1, t) = bracket(xs, x);
    let y0 = ys.get(i0).copied().unwrap_or(0.0);
    let y1 = ys.get(i1).copied().unwrap_or(y0);
    if t == 0.0 {
        y0
    } else {
        y0 + (y1 - y0) * t
    }
}

/// Sample one point of a grid
pub fn sample(
    values: &[Vec<f64>],
    load_axis: &AxisSeries,
    speed_axis: &AxisSeries,
    query_load: f64,
    query_speed: f64,
    method: SampleMethod,
) -> f64 {
    match method {
        SampleMethod::Nearest => {
            let li = load_axis.nearest_index(query_load);
            let si = speed_axis.nearest_index(query_speed);
            get_value(values, li, si)
        }
        SampleMethod::Bilinear => {
            let (l0, l1, tl) = load_axis.bracket(query_load);
            let (s0, s1, ts) = speed_axis.bracket(query_speed);

            let v00 = get_value(values, l0, s0);
            let v01 = get_value(values, l0, s1);
            let v10 = get_value(values, l1, s0);
            let v11 = get_value(values, l1, s1);

            // Exact grid points return the stored value untouched
            let low = if ts == 0.0 { v00 } else { v00 + (v01 - v00) * ts };
            let high = if ts == 0.0 { v10 } else { v10 + (v11 - v10) * ts };
            if tl == 0.0 {
                low
            } else {
                low + (high - low) * tl
            }
        }
    }
}

/// Reindex a grid from one axis pair onto another
pub fn resample(
    values: &[Vec<f64>],
    from_load: &AxisSeries,
    from_speed: &AxisSeries,
    to_load: &AxisSeries,
    to_speed: &AxisSeries,
    method: SampleMethod,
) -> Vec<Vec<f64>> {
    if from_load == to_load && from_speed == to_speed {
        return values.to_vec();
    }

    to_load
        .values()
        .iter()
        .map(|&load| {
            to_speed
                .values()
                .iter()
                .map(|&speed| sample(values, from_load, from_speed, load, speed, method))
                .collect()
        })
        .collect()
}

/// Check that `values` is `load_len` rows of `speed_len` columns
pub fn check_shape<T>(
    grid: &str,
    values: &[Vec<T>],
    load_len: usize,
    speed_len: usize,
) -> Result<()> {
    let ragged = values.iter().find(|row| row.len() != speed_len);
    if values.len() != load_len || ragged.is_some() {
        let cols = ragged.map_or_else(
            || values.first().map_or(0, |row| row.len()),
            |row| row.len(),
        );
        return Err(CalcError::ShapeMismatch {
            grid: grid.to_string(),
            expected: (load_len, speed_len),
            actual: (values.len(), cols),
        });
    }
    Ok(())
}

/// Safe value fetch with bounds checks
fn get_value(values: &[Vec<f64>], load_idx: usize, speed_idx: usize) -> f64 {
    values
        .get(load_idx)
        .and_then(|row| row.get(speed_idx))
        .copied()
        .unwrap_or(0.0)
}
