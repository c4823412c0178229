//! Injector Flow Model
//!
//! Injectors are rated at a fixed pressure differential. With a manifold
//! referenced regulator the rail tracks manifold pressure and the
//! differential stays at the regulator setting. With a fixed regulator the
//! differential shrinks as load rises and reaches zero at
//! `load == base_pressure`, where the injector can no longer flow.

use serde::{Deserialize, Serialize};

use crate::error::{require_positive, CalcError, Result};
use crate::unit_conversion::{self, DEFAULT_REFERENCE_DIFFERENTIAL_BAR};

/// Fuel pressure regulator behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationMode {
    /// Rail pressure follows manifold pressure; differential is constant
    #[default]
    Referenced,
    /// Rail pressure is fixed against atmosphere; differential = base − load
    Fixed,
}

/// Injector characteristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectorSpec {
    /// Rated flow per injector, mg/ms, at `reference_differential`
    pub nominal_flow_mg_per_ms: f64,
    /// Differential the rating was measured at, bar
    #[serde(default = "default_reference_differential")]
    pub reference_differential: f64,
    /// Regulator setting, bar
    #[serde(default = "default_reference_differential")]
    pub base_pressure: f64,
    /// Injectors firing together for one cylinder charge
    #[serde(default = "default_count")]
    pub count_per_bank: u32,
    #[serde(default)]
    /// How the regulator tracks manifold pressure
    pub regulation: RegulationMode,
}

fn default_reference_differential() -> f64 {
    DEFAULT_REFERENCE_DIFFERENTIAL_BAR
}

fn default_count() -> u32 {
    1
}

impl InjectorSpec {
    /// Referenced regulator at the rating differential, one injector
    pub fn new(nominal_flow_mg_per_ms: f64) -> Self {
        Self {
            nominal_flow_mg_per_ms,
            reference_differential: DEFAULT_REFERENCE_DIFFERENTIAL_BAR,
            base_pressure: DEFAULT_REFERENCE_DIFFERENTIAL_BAR,
            count_per_bank: 1,
            regulation: RegulationMode::Referenced,
        }
    }

    /// Same as [`InjectorSpec::new`] with the rating given in lb/h
    pub fn from_lb_per_hour(lb_per_hour: f64) -> Self {
        Self::new(unit_conversion::lb_per_hour_to_mg_per_ms(lb_per_hour))
    }

    /// Same as [`InjectorSpec::new`] with the rating given in cc/min
    pub fn from_cc_per_min(cc_per_min: f64, density_g_per_cc: f64) -> Self {
        Self::new(unit_conversion::cc_per_min_to_mg_per_ms(
            cc_per_min,
            density_g_per_cc,
        ))
    }

    /// Set regulation mode and regulator pressure
    pub fn with_regulation(mut self, regulation: RegulationMode, base_pressure: f64) -> Self {
        self.regulation = regulation;
        self.base_pressure = base_pressure;
        self
    }

    /// Set injectors per cylinder
    pub fn with_count(mut self, count_per_bank: u32) -> Self {
        self.count_per_bank = count_per_bank;
        self
    }

    /// Flow and pressures must be positive, count at least 1
    pub fn validate(&self) -> Result<()> {
        require_positive("injector.nominal_flow_mg_per_ms", self.nominal_flow_mg_per_ms)?;
        require_positive("injector.reference_differential", self.reference_differential)?;
        if !self.base_pressure.is_finite() {
            return Err(CalcError::parameter(
                "injector.base_pressure",
                format!("{} is not finite", self.base_pressure),
            ));
        }
        if self.count_per_bank == 0 {
            return Err(CalcError::parameter("injector.count_per_bank", "must be >= 1"));
        }
        Ok(())
    }

    /// Pressure differential across the injector at `load` (bar, relative)
    pub fn rail_differential(&self, load: f64) -> f64 {
        match self.regulation {
            RegulationMode::Referenced => self.base_pressure,
            RegulationMode::Fixed => self.base_pressure - load,
        }
    }

    /// Flow of one injector at the differential seen at `load`
    pub fn flow_at_load(&self, load: f64) -> f64 {
        effective_mass_flow(self, self.rail_differential(load))
    }

    /// Combined flow of the bank at `load`
    pub fn bank_flow_at_load(&self, load: f64) -> f64 {
        self.flow_at_load(load) * f64::from(self.count_per_bank)
    }
}

/// Mass flow of one injector (mg/ms) at `rail_differential` bar
///
/// Exactly 0 for a differential at or below zero.
pub fn effective_mass_flow(spec: &InjectorSpec, rail_differential: f64) -> f64 {
    unit_conversion::mass_flow_rate(
        spec.nominal_flow_mg_per_ms,
        rail_differential,
        spec.reference_differential,
    )
}
