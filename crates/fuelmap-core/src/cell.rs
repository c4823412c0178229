//! Cell Calculator
//!
//! The per-cell fuel model. For one (load, speed) cell:
//!
//! 1. absolute manifold pressure = atmosphere + load
//! 2. air mass per cylinder from the ideal gas law, scaled by efficiency
//! 3. fuel mass = air mass / (stoich × lambda)
//! 4. base time = fuel mass / injector bank flow at this load
//! 5. multiplier compensations in order, then additive ones summed
//! 6. floor at the minimum actuator time
//!
//! A cell whose injector flow is zero (collapsed differential) is saturated:
//! it reports the minimum time and is flagged invalid.

use serde::{Deserialize, Serialize};

use crate::curve::{CompensationCurve, CompensationKind, OperatingConditions};
use crate::injector::InjectorSpec;
use crate::unit_conversion::{absolute_pressure_with, bar_to_pascal, kelvin};

/// Operating point of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellInput {
    /// Relative manifold pressure, bar
    pub load: f64,
    /// Engine speed, RPM
    pub speed: f64,
    /// Volumetric efficiency
    pub efficiency: f64,
    /// Target lambda (multiple of stoichiometric)
    pub lambda: f64,
}

/// Computed actuator time for one cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellOutput {
    /// Final injection time, ms
    pub time_ms: f64,
    /// Time before compensations and floor, ms (0 when saturated)
    pub base_time_ms: f64,
    /// False when the injector could not flow at this load
    pub valid: bool,
}

/// Fuel model parameters shared by every cell of one request
#[derive(Debug, Clone, Copy)]
pub struct CellCalculator<'a> {
    /// Stoichiometric air/fuel mass ratio
    pub stoich_ratio: f64,
    /// Swept volume of one cylinder, cc
    pub displacement_per_cylinder_cc: f64,
    /// Injector feeding each cylinder
    pub injector: &'a InjectorSpec,
    /// Applied to every cell in order
    pub compensations: &'a [CompensationCurve],
    /// Inputs of the compensation curves
    pub conditions: OperatingConditions,
    /// Injection time floor, ms
    pub min_time_ms: f64,
    /// Specific gas constant of air, J/(kg·K)
    pub gas_constant: f64,
    /// Ambient pressure added to relative load, bar
    pub atmospheric_pressure_bar: f64,
}

impl CellCalculator<'_> {
    /// Trapped air mass per cylinder, mg
    pub fn air_mass_mg(&self, load: f64, efficiency: f64) -> f64 {
        let pressure_pa = bar_to_pascal(absolute_pressure_with(load, self.atmospheric_pressure_bar));
        let volume_m3 = self.displacement_per_cylinder_cc * 1e-6;
        let temperature_k = kelvin(self.conditions.intake_air_temp_c);
        let mass_kg = pressure_pa * volume_m3 * efficiency / (self.gas_constant * temperature_k);
        (mass_kg * 1e6).max(0.0)
    }

    /// Fuel mass per cylinder for the target lambda, mg
    pub fn fuel_mass_mg(&self, load: f64, efficiency: f64, lambda: f64) -> f64 {
        self.air_mass_mg(load, efficiency) / (self.stoich_ratio * lambda)
    }

    /// Injection time for one cell
    pub fn compute(&self, input: CellInput) -> CellOutput {
        let flow = self.injector.bank_flow_at_load(input.load);
        if flow <= 0.0 {
            tracing::trace!(
                "Injector saturated at load {} bar, {} rpm",
                input.load,
                input.speed
            );
            return CellOutput {
                time_ms: self.min_time_ms,
                base_time_ms: 0.0,
                valid: false,
            };
        }

        let fuel_mg = self.fuel_mass_mg(input.load, input.efficiency, input.lambda);
        self.finish(fuel_mg / flow)
    }

    /// Compensations and the time floor on top of an uncompensated base time
    ///
    /// The base time is proportional to air mass, so a base time scaled by an
    /// efficiency ratio finishes to the same result as a full [`compute`].
    ///
    /// [`compute`]: CellCalculator::compute
    pub fn finish(&self, base_time_ms: f64) -> CellOutput {
        CellOutput {
            time_ms: self.compensate(base_time_ms).max(self.min_time_ms),
            base_time_ms,
            valid: true,
        }
    }

    /// Apply multipliers in order, then the sum of additive offsets
    pub fn compensate(&self, base_time_ms: f64) -> f64 {
        let scaled = self
            .compensations
            .iter()
            .filter(|c| c.kind == CompensationKind::Multiplier)
            .fold(base_time_ms, |t, c| t * c.eval(&self.conditions));
        let offset: f64 = self
            .compensations
            .iter()
            .filter(|c| c.kind == CompensationKind::AdditiveMs)
            .map(|c| c.eval(&self.conditions))
            .sum();
        scaled + offset
    }
}
