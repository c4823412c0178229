//! Engine-wide constants
//!
//! Stored as JSON. Every key is optional and falls back to its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::axis::AxisSeries;
use crate::error::{require_finite, require_positive, CalcError, Result};
use crate::lambda::LambdaLimits;
use crate::resample::SampleMethod;
use crate::unit_conversion::ATMOSPHERIC_BAR;
use crate::ve_grid::EfficiencyGrid;

/// Efficiency substituted for missing grid entries
pub const DEFAULT_EFFICIENCY: f64 = 0.80;

/// Specific gas constant of dry air, J/(kg·K)
pub const GAS_CONSTANT_AIR: f64 = 287.05;

/// Constants shared by every calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Efficiency used where a grid has no value
    pub default_efficiency: f64,

    /// Safe lambda multiplier range
    pub lambda_limits: LambdaLimits,

    /// Specific gas constant of the intake charge, J/(kg·K)
    pub gas_constant: f64,

    /// Added to relative load to get absolute manifold pressure, bar
    pub atmospheric_pressure_bar: f64,

    /// How grids are sampled when their axes differ from the request axes
    pub efficiency_sampling: SampleMethod,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_efficiency: DEFAULT_EFFICIENCY,
            lambda_limits: LambdaLimits::default(),
            gas_constant: GAS_CONSTANT_AIR,
            atmospheric_pressure_bar: ATMOSPHERIC_BAR,
            efficiency_sampling: SampleMethod::Bilinear,
        }
    }
}

impl EngineConfig {
    /// Parse from a JSON string and validate
    pub fn from_json(content: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        tracing::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Write as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Efficiency grid whose missing entries take this config's default
    pub fn efficiency_grid(
        &self,
        load_axis: AxisSeries,
        speed_axis: AxisSeries,
        values: Vec<Vec<Option<f64>>>,
    ) -> Result<EfficiencyGrid> {
        EfficiencyGrid::new(load_axis, speed_axis, values, self.default_efficiency)
    }

    /// Check ranges of every field
    pub fn validate(&self) -> Result<()> {
        require_finite("default_efficiency", self.default_efficiency)?;
        require_positive("gas_constant", self.gas_constant)?;
        require_finite("atmospheric_pressure_bar", self.atmospheric_pressure_bar)?;
        self.lambda_limits.validate()?;
        if self.default_efficiency < 0.0 {
            return Err(CalcError::parameter(
                "default_efficiency",
                "must not be negative",
            ));
        }
        Ok(())
    }
}
