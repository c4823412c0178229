//! Unit Conversion Functions
//!
//! Conversions used by the fuel model:
//! - Pressure: relative ↔ absolute bar, bar ↔ kPa/Pa/PSI, kPa ↔ PSI
//! - Temperature: °C ↔ K, °C ↔ °F
//! - Air-Fuel Ratio: Lambda ↔ AFR per [`FuelType`]
//! - Injector flow: lb/h, cc/min, kg/h ↔ mg/ms
//! - Flow at rated differential → flow at actual differential
//!
//! Every function is total: no panics, no errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Atmospheric pressure used to turn relative load into absolute pressure (bar)
pub const ATMOSPHERIC_BAR: f64 = 1.0;

/// Pressure differential injectors are rated at unless stated otherwise (bar)
pub const DEFAULT_REFERENCE_DIFFERENTIAL_BAR: f64 = 3.0;

const KELVIN_OFFSET: f64 = 273.15;
const PSI_PER_BAR: f64 = 14.503773773020923;
const KG_PER_LB: f64 = 0.45359237;

/// Relative pressure (bar, gauge) to absolute pressure (bar)
pub fn absolute_pressure(relative_bar: f64) -> f64 {
    ATMOSPHERIC_BAR + relative_bar
}

/// Relative pressure to absolute with an explicit atmospheric reference
pub fn absolute_pressure_with(relative_bar: f64, atmospheric_bar: f64) -> f64 {
    atmospheric_bar + relative_bar
}

/// Convert Celsius to Kelvin
pub fn kelvin(celsius: f64) -> f64 {
    celsius + KELVIN_OFFSET
}

/// Convert Celsius to Fahrenheit
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Convert bar to Pascal
pub fn bar_to_pascal(bar: f64) -> f64 {
    bar * 100_000.0
}

/// Convert bar to kPa
pub fn bar_to_kpa(bar: f64) -> f64 {
    bar * 100.0
}

/// Convert kPa to bar
pub fn kpa_to_bar(kpa: f64) -> f64 {
    kpa / 100.0
}

/// Convert kPa to PSI
pub fn kpa_to_psi(kpa: f64) -> f64 {
    kpa * PSI_PER_BAR / 100.0
}

/// Convert PSI to kPa
pub fn psi_to_kpa(psi: f64) -> f64 {
    psi * 100.0 / PSI_PER_BAR
}

/// Convert bar to PSI
pub fn bar_to_psi(bar: f64) -> f64 {
    bar * PSI_PER_BAR
}

/// Convert PSI to bar
pub fn psi_to_bar(psi: f64) -> f64 {
    psi / PSI_PER_BAR
}

/// Convert pounds to kilograms
pub fn lbs_to_kg(lbs: f64) -> f64 {
    lbs * KG_PER_LB
}

/// Convert kilograms to pounds
pub fn kg_to_lbs(kg: f64) -> f64 {
    kg / KG_PER_LB
}

/// Injector rating in lb/h to mg/ms
///
/// 1 lb/h = 453 592.37 mg / 3 600 000 ms.
pub fn lb_per_hour_to_mg_per_ms(lb_per_hour: f64) -> f64 {
    lb_per_hour * KG_PER_LB * 1_000_000.0 / 3_600_000.0
}

/// Mass flow in mg/ms to lb/h
pub fn mg_per_ms_to_lb_per_hour(mg_per_ms: f64) -> f64 {
    mg_per_ms * 3_600_000.0 / (KG_PER_LB * 1_000_000.0)
}

/// Volumetric rating in cc/min to mg/ms for a liquid of `density_g_per_cc`
pub fn cc_per_min_to_mg_per_ms(cc_per_min: f64, density_g_per_cc: f64) -> f64 {
    // cc/min * g/cc = g/min; g/min * 1000 / 60000 = mg/ms
    cc_per_min * density_g_per_cc / 60.0
}

/// Mass flow in mg/ms to cc/min for a liquid of `density_g_per_cc`
///
/// Returns 0 for a non-positive density.
pub fn mg_per_ms_to_cc_per_min(mg_per_ms: f64, density_g_per_cc: f64) -> f64 {
    if density_g_per_cc <= 0.0 {
        return 0.0;
    }
    mg_per_ms * 60.0 / density_g_per_cc
}

/// Mass flow in kg/h to mg/ms
pub fn kg_per_hour_to_mg_per_ms(kg_per_hour: f64) -> f64 {
    kg_per_hour * 1_000_000.0 / 3_600_000.0
}

/// Mass flow in mg/ms to kg/h
pub fn mg_per_ms_to_kg_per_hour(mg_per_ms: f64) -> f64 {
    mg_per_ms * 3.6
}

/// Scale a flow rated at `reference_differential` to `actual_differential`
///
/// Flow through an orifice goes with the square root of the pressure drop.
/// A non-positive actual or reference differential yields exactly 0.
pub fn mass_flow_rate(
    nominal_flow_at_ref: f64,
    actual_differential: f64,
    reference_differential: f64,
) -> f64 {
    if actual_differential <= 0.0 || reference_differential <= 0.0 {
        return 0.0;
    }
    nominal_flow_at_ref * (actual_differential / reference_differential).sqrt()
}

/// [`mass_flow_rate`] with the usual 3 bar rating differential
pub fn mass_flow_rate_default(nominal_flow_at_ref: f64, actual_differential: f64) -> f64 {
    mass_flow_rate(
        nominal_flow_at_ref,
        actual_differential,
        DEFAULT_REFERENCE_DIFFERENTIAL_BAR,
    )
}

/// Fuels with a known stoichiometric ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    /// Pump gasoline, 14.7:1
    #[default]
    Gasoline,
    /// 85% ethanol blend
    E85,
    /// Pure ethanol
    Ethanol,
    /// Pure methanol
    Methanol,
    /// Liquefied petroleum gas
    Lpg,
    /// Compressed natural gas, no liquid density
    Cng,
    /// Road diesel
    Diesel,
}

impl FuelType {
    /// Stoichiometric air/fuel mass ratio
    pub fn stoich_afr(self) -> f64 {
        match self {
            FuelType::Gasoline => 14.7,
            FuelType::E85 => 9.8,
            FuelType::Ethanol => 9.0,
            FuelType::Methanol => 6.4,
            FuelType::Lpg => 15.5,
            FuelType::Cng => 17.2,
            FuelType::Diesel => 14.5,
        }
    }

    /// Liquid density in g/cc at room temperature, `None` for gaseous fuels
    pub fn liquid_density(self) -> Option<f64> {
        match self {
            FuelType::Gasoline => Some(0.745),
            FuelType::E85 => Some(0.785),
            FuelType::Ethanol => Some(0.789),
            FuelType::Methanol => Some(0.792),
            FuelType::Lpg => Some(0.51),
            FuelType::Cng => None,
            FuelType::Diesel => Some(0.832),
        }
    }
}

impl FromStr for FuelType {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to gasoline
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "e85" => FuelType::E85,
            "ethanol" | "e100" => FuelType::Ethanol,
            "methanol" => FuelType::Methanol,
            "lpg" | "propane" => FuelType::Lpg,
            "cng" | "natural_gas" => FuelType::Cng,
            "diesel" => FuelType::Diesel,
            _ => FuelType::Gasoline,
        })
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FuelType::Gasoline => "gasoline",
            FuelType::E85 => "e85",
            FuelType::Ethanol => "ethanol",
            FuelType::Methanol => "methanol",
            FuelType::Lpg => "lpg",
            FuelType::Cng => "cng",
            FuelType::Diesel => "diesel",
        };
        f.write_str(name)
    }
}

/// Convert Lambda to AFR for the given fuel
pub fn lambda_to_afr(lambda: f64, fuel: FuelType) -> f64 {
    lambda * fuel.stoich_afr()
}

/// Convert AFR to Lambda for the given fuel
pub fn afr_to_lambda(afr: f64, fuel: FuelType) -> f64 {
    afr / fuel.stoich_afr()
}
