//! 1-D curves and compensation curves
//!
//! Curves are evaluated by linear interpolation inside their domain and hold
//! the first/last value outside it. They are never extrapolated.

use serde::{Deserialize, Serialize};

use crate::error::{CalcError, Result};
use crate::resample::interpolate_1d;

/// Ordered `(input, output)` breakpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct Curve {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Curve {
    /// Build a curve; inputs must be finite and strictly increasing
    pub fn new(name: &str, points: Vec<(f64, f64)>) -> Result<Self> {
        if points.is_empty() {
            return Err(CalcError::curve(name, "needs at least one point"));
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(CalcError::curve(name, "points must be finite"));
        }
        if points.windows(2).any(|pair| pair[1].0 <= pair[0].0) {
            return Err(CalcError::curve(name, "inputs must be strictly increasing"));
        }
        let (xs, ys) = points.into_iter().unzip();
        Ok(Self { xs, ys })
    }

    /// A curve that returns `value` everywhere
    pub fn constant(value: f64) -> Self {
        Self {
            xs: vec![0.0],
            ys: vec![value],
        }
    }

    /// Evaluate at `x`
    pub fn eval(&self, x: f64) -> f64 {
        interpolate_1d(x, &self.xs, &self.ys)
    }

    /// Breakpoints in input order
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    /// Number of breakpoints
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// Always false for a validated curve
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

impl TryFrom<Vec<(f64, f64)>> for Curve {
    type Error = CalcError;

    fn try_from(points: Vec<(f64, f64)>) -> Result<Self> {
        Curve::new("curve", points)
    }
}

impl From<Curve> for Vec<(f64, f64)> {
    fn from(curve: Curve) -> Self {
        curve.xs.into_iter().zip(curve.ys).collect()
    }
}

/// Operating input a compensation curve is indexed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationAxis {
    /// Coolant temperature, °C
    CoolantTemp,
    /// Intake air temperature, °C
    IntakeAirTemp,
    /// Supply voltage, V
    SupplyVoltage,
}

/// How a compensation curve's output is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationKind {
    /// Multiplies the base injection time (1.0 = no change)
    Multiplier,
    /// Added to the injection time, in milliseconds (dead time)
    AdditiveMs,
}

/// One compensation applied by the cell calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationCurve {
    /// Display name
    pub name: String,
    /// Condition the curve is looked up with
    pub axis: CompensationAxis,
    /// Multiplier or additive offset
    pub kind: CompensationKind,
    /// Input to factor (or ms) breakpoints
    pub curve: Curve,
}

impl CompensationCurve {
    /// Compensation of any axis and kind
    pub fn new(
        name: impl Into<String>,
        axis: CompensationAxis,
        kind: CompensationKind,
        points: Vec<(f64, f64)>,
    ) -> Result<Self> {
        let name = name.into();
        let curve = Curve::new(&name, points)?;
        Ok(Self {
            name,
            axis,
            kind,
            curve,
        })
    }

    /// Coolant warm-up enrichment multiplier
    pub fn warmup(points: Vec<(f64, f64)>) -> Result<Self> {
        Self::new(
            "warmup",
            CompensationAxis::CoolantTemp,
            CompensationKind::Multiplier,
            points,
        )
    }

    /// Intake air temperature correction multiplier
    pub fn air_temp_correction(points: Vec<(f64, f64)>) -> Result<Self> {
        Self::new(
            "air_temp_correction",
            CompensationAxis::IntakeAirTemp,
            CompensationKind::Multiplier,
            points,
        )
    }

    /// Voltage dependent dead time, in ms
    pub fn dead_time(points: Vec<(f64, f64)>) -> Result<Self> {
        Self::new(
            "dead_time",
            CompensationAxis::SupplyVoltage,
            CompensationKind::AdditiveMs,
            points,
        )
    }

    /// Curve output at the current operating point
    pub fn eval(&self, conditions: &OperatingConditions) -> f64 {
        self.curve.eval(conditions.input(self.axis))
    }
}

/// Operating point the compensation curves are evaluated at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatingConditions {
    /// Coolant temperature, °C
    pub coolant_temp_c: f64,
    /// Intake air temperature, °C
    pub intake_air_temp_c: f64,
    /// Battery voltage, V
    pub supply_voltage: f64,
}

impl Default for OperatingConditions {
    fn default() -> Self {
        Self {
            coolant_temp_c: 85.0,
            intake_air_temp_c: 25.0,
            supply_voltage: 13.8,
        }
    }
}

impl OperatingConditions {
    /// Value of the given compensation input
    pub fn input(&self, axis: CompensationAxis) -> f64 {
        match axis {
            CompensationAxis::CoolantTemp => self.coolant_temp_c,
            CompensationAxis::IntakeAirTemp => self.intake_air_temp_c,
            CompensationAxis::SupplyVoltage => self.supply_voltage,
        }
    }
}
