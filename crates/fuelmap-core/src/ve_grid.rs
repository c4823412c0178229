//! Volumetric efficiency table
//!
//! Read-only efficiency values over (load, speed). Missing entries are filled
//! with the configured default efficiency when the grid is built.

use serde::{Deserialize, Serialize};

use crate::axis::AxisSeries;
use crate::config::DEFAULT_EFFICIENCY;
use crate::error::{require_finite, Result};
use crate::resample::{self, check_shape, SampleMethod};

/// Efficiency values indexed `[load][speed]` on their native axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEfficiencyGrid")]
pub struct EfficiencyGrid {
    load_axis: AxisSeries,
    speed_axis: AxisSeries,
    values: Vec<Vec<f64>>,
    default_efficiency: f64,
    /// Entries that were absent and took the default
    #[serde(skip_serializing)]
    missing: usize,
}

/// Wire form; `null` entries are missing
#[derive(Debug, Deserialize)]
struct RawEfficiencyGrid {
    load_axis: AxisSeries,
    speed_axis: AxisSeries,
    values: Vec<Vec<Option<f64>>>,
    #[serde(default = "default_efficiency")]
    default_efficiency: f64,
}

fn default_efficiency() -> f64 {
    DEFAULT_EFFICIENCY
}

impl TryFrom<RawEfficiencyGrid> for EfficiencyGrid {
    type Error = crate::error::CalcError;

    fn try_from(raw: RawEfficiencyGrid) -> Result<Self> {
        EfficiencyGrid::new(
            raw.load_axis,
            raw.speed_axis,
            raw.values,
            raw.default_efficiency,
        )
    }
}

impl EfficiencyGrid {
    /// Build a grid where `None` (or non-finite) entries take `default_efficiency`
    pub fn new(
        load_axis: AxisSeries,
        speed_axis: AxisSeries,
        values: Vec<Vec<Option<f64>>>,
        default_efficiency: f64,
    ) -> Result<Self> {
        require_finite("default_efficiency", default_efficiency)?;
        check_shape("efficiency grid", &values, load_axis.len(), speed_axis.len())?;

        let mut missing = 0;
        let values: Vec<Vec<f64>> = values
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|v| match v {
                        Some(v) if v.is_finite() => v,
                        _ => {
                            missing += 1;
                            default_efficiency
                        }
                    })
                    .collect()
            })
            .collect();

        if missing > 0 {
            tracing::warn!(
                "Efficiency grid has {missing} missing entries, using default {default_efficiency}"
            );
        }

        Ok(Self {
            load_axis,
            speed_axis,
            values,
            default_efficiency,
            missing,
        })
    }

    /// Build a fully populated grid
    pub fn from_values(
        load_axis: AxisSeries,
        speed_axis: AxisSeries,
        values: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let values = values
            .into_iter()
            .map(|row| row.into_iter().map(Some).collect())
            .collect();
        Self::new(load_axis, speed_axis, values, DEFAULT_EFFICIENCY)
    }

    /// Grid holding one efficiency everywhere
    pub fn uniform(load_axis: AxisSeries, speed_axis: AxisSeries, efficiency: f64) -> Result<Self> {
        let values = vec![vec![efficiency; speed_axis.len()]; load_axis.len()];
        Self::from_values(load_axis, speed_axis, values)
    }

    /// Native rows, bar
    pub fn load_axis(&self) -> &AxisSeries {
        &self.load_axis
    }

    /// Native columns, RPM
    pub fn speed_axis(&self) -> &AxisSeries {
        &self.speed_axis
    }

    /// Efficiency values, `[load][speed]`
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Value used for missing entries
    pub fn default_efficiency(&self) -> f64 {
        self.default_efficiency
    }

    /// Number of entries that were filled with the default
    pub fn missing_count(&self) -> usize {
        self.missing
    }

    /// Stored value at a grid index, default efficiency when out of range
    pub fn get(&self, load_idx: usize, speed_idx: usize) -> f64 {
        self.values
            .get(load_idx)
            .and_then(|row| row.get(speed_idx))
            .copied()
            .unwrap_or(self.default_efficiency)
    }

    /// Efficiency at an arbitrary operating point
    pub fn sample(&self, load: f64, speed: f64, method: SampleMethod) -> f64 {
        resample::sample(
            &self.values,
            &self.load_axis,
            &self.speed_axis,
            load,
            speed,
            method,
        )
    }

    /// Bilinear shortcut for [`EfficiencyGrid::sample`]
    pub fn at(&self, load: f64, speed: f64) -> f64 {
        self.sample(load, speed, SampleMethod::Bilinear)
    }

    /// Same grid reindexed onto other axes
    pub fn resampled(
        &self,
        load_axis: &AxisSeries,
        speed_axis: &AxisSeries,
        method: SampleMethod,
    ) -> EfficiencyGrid {
        let values = resample::resample(
            &self.values,
            &self.load_axis,
            &self.speed_axis,
            load_axis,
            speed_axis,
            method,
        );
        EfficiencyGrid {
            load_axis: load_axis.clone(),
            speed_axis: speed_axis.clone(),
            values,
            default_efficiency: self.default_efficiency,
            missing: 0,
        }
    }
}
