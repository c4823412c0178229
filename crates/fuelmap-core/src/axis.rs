//! Table axes
//!
//! An [`AxisSeries`] is a validated, strictly increasing set of bins used both
//! as a table axis and as the query domain when sampling a grid.

use serde::{Deserialize, Serialize};

use crate::error::{CalcError, Result};

/// Fewest bins an axis may have
pub const MIN_AXIS_LEN: usize = 2;
/// Most bins an axis may have
pub const MAX_AXIS_LEN: usize = 32;

/// Strictly increasing axis bins (load in bar, or speed in RPM)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct AxisSeries {
    bins: Vec<f64>,
}

impl AxisSeries {
    /// Validate and wrap axis bins
    ///
    /// `name` is only used in the error message.
    pub fn new(name: &str, bins: Vec<f64>) -> Result<Self> {
        if bins.len() < MIN_AXIS_LEN {
            return Err(CalcError::axis(
                name,
                format!("needs at least {MIN_AXIS_LEN} bins, got {}", bins.len()),
            ));
        }
        if bins.len() > MAX_AXIS_LEN {
            return Err(CalcError::axis(
                name,
                format!("at most {MAX_AXIS_LEN} bins allowed, got {}", bins.len()),
            ));
        }
        if let Some(bad) = bins.iter().position(|v| !v.is_finite()) {
            return Err(CalcError::axis(name, format!("bin {bad} is not finite")));
        }
        if let Some(i) = bins.windows(2).position(|pair| pair[1] <= pair[0]) {
            return Err(CalcError::axis(
                name,
                format!(
                    "bins must be strictly increasing ({} at {} followed by {})",
                    bins[i],
                    i,
                    bins[i + 1]
                ),
            ));
        }
        Ok(Self { bins })
    }

    /// Evenly spaced axis from `start` to `end` inclusive
    pub fn linspace(name: &str, start: f64, end: f64, count: usize) -> Result<Self> {
        if count < MIN_AXIS_LEN {
            return Self::new(name, vec![start; count]);
        }
        let step = (end - start) / (count - 1) as f64;
        let bins = (0..count).map(|i| start + step * i as f64).collect();
        Self::new(name, bins)
    }

    /// Bin values
    pub fn values(&self) -> &[f64] {
        &self.bins
    }

    /// Number of bins
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Always false for a validated axis
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Lowest bin
    pub fn first(&self) -> f64 {
        self.bins[0]
    }

    /// Highest bin
    pub fn last(&self) -> f64 {
        self.bins[self.bins.len() - 1]
    }

    /// Median bin; mean of the two middle bins for an even count
    pub fn median(&self) -> f64 {
        let n = self.bins.len();
        if n % 2 == 1 {
            self.bins[n / 2]
        } else {
            (self.bins[n / 2 - 1] + self.bins[n / 2]) / 2.0
        }
    }

    /// Whether `value` lies within `[first, last]`
    pub fn contains(&self, value: f64) -> bool {
        value >= self.first() && value <= self.last()
    }

    /// Index of the bin closest to `value`, ties go to the lower index
    pub fn nearest_index(&self, value: f64) -> usize {
        let (i0, i1, t) = self.bracket(value);
        if t > 0.5 {
            i1
        } else {
            i0
        }
    }

    /// Surrounding bin indices and interpolation ratio (clamped to edges)
    ///
    /// Outside the axis both indices point at the edge bin and the ratio is 0,
    /// so interpolation holds the edge value.
    pub fn bracket(&self, value: f64) -> (usize, usize, f64) {
        bracket(&self.bins, value)
    }
}

impl TryFrom<Vec<f64>> for AxisSeries {
    type Error = CalcError;

    fn try_from(bins: Vec<f64>) -> Result<Self> {
        AxisSeries::new("axis", bins)
    }
}

impl From<AxisSeries> for Vec<f64> {
    fn from(axis: AxisSeries) -> Self {
        axis.bins
    }
}

/// Bracket `value` within sorted `bins`; works on any sorted slice
pub(crate) fn bracket(bins: &[f64], value: f64) -> (usize, usize, f64) {
    if bins.is_empty() {
        return (0, 0, 0.0);
    }

    // NaN and anything below the first bin hold the first bin
    if value.is_nan() || value <= bins[0] {
        return (0, 0, 0.0);
    }

    let last_idx = bins.len() - 1;
    if value >= bins[last_idx] {
        return (last_idx, last_idx, 0.0);
    }

    // First bin strictly greater than value; value > bins[0] so idx >= 1
    let upper = bins.partition_point(|&b| b <= value);
    let lower = upper - 1;
    let span = bins[upper] - bins[lower];
    let ratio = if span.abs() < f64::EPSILON {
        0.0
    } else {
        (value - bins[lower]) / span
    };
    (lower, upper, ratio)
}
