//! Lambda Target Grid
//!
//! Builds the target lambda (air/fuel ratio as a multiple of stoichiometric)
//! over (load, speed):
//!
//! ```text
//! lambda = base(load) × closed_loop_factor × speed_shape(rpm) × user_factor(rpm)
//! ```
//!
//! The product is always clipped into [`LambdaLimits`], so a malformed shaping
//! input can never produce a dangerously lean or rich target.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::axis::AxisSeries;
use crate::curve::Curve;
use crate::error::{require_positive, CalcError, Result};
use crate::resample::{self, check_shape, interpolate_1d, SampleMethod};

/// Safe lambda multiplier range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LambdaLimits {
    /// Richest allowed target
    pub min: f64,
    /// Leanest allowed target
    pub max: f64,
}

impl Default for LambdaLimits {
    fn default() -> Self {
        Self { min: 0.6, max: 1.5 }
    }
}

impl LambdaLimits {
    /// Both bounds positive and ordered
    pub fn validate(&self) -> Result<()> {
        require_positive("lambda_limits.min", self.min)?;
        require_positive("lambda_limits.max", self.max)?;
        if self.min > self.max {
            return Err(CalcError::parameter(
                "lambda_limits",
                format!("min {} is above max {}", self.min, self.max),
            ));
        }
        Ok(())
    }

    /// Clip into range. NaN goes to the rich bound.
    pub fn clamp(&self, lambda: f64) -> f64 {
        if lambda.is_nan() {
            return self.min;
        }
        lambda.clamp(self.min, self.max)
    }

    /// Whether [`LambdaLimits::clamp`] would change `lambda`
    pub fn clips(&self, lambda: f64) -> bool {
        !(lambda >= self.min && lambda <= self.max)
    }
}

// (load bar, lambda) breakpoints of the named base curves
const ECONOMY: [(f64, f64); 5] = [
    (-1.0, 1.05),
    (-0.4, 1.05),
    (0.0, 0.98),
    (0.5, 0.88),
    (2.0, 0.80),
];
const BALANCED: [(f64, f64); 6] = [
    (-1.0, 1.0),
    (-0.3, 1.0),
    (0.0, 0.95),
    (0.5, 0.85),
    (1.5, 0.78),
    (3.0, 0.75),
];
const PERFORMANCE: [(f64, f64); 6] = [
    (-1.0, 0.98),
    (-0.3, 0.95),
    (0.0, 0.88),
    (0.5, 0.82),
    (1.5, 0.76),
    (3.0, 0.72),
];

fn eval_points(points: &[(f64, f64)], load: f64) -> f64 {
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    interpolate_1d(load, &xs, &ys)
}

/// Base lambda by load
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LambdaStrategy {
    /// 1.0 everywhere
    Stoichiometric,
    /// Lean cruise, mild enrichment under boost
    Economy,
    /// Stoichiometric cruise, moderate enrichment under boost
    #[default]
    Balanced,
    /// Rich everywhere above cruise
    Performance,
    /// Caller supplied (load, lambda) curve
    Manual(Curve),
}

impl LambdaStrategy {
    /// Base lambda at `load`
    pub fn base_by_load(&self, load: f64) -> f64 {
        match self {
            LambdaStrategy::Stoichiometric => 1.0,
            LambdaStrategy::Economy => eval_points(&ECONOMY, load),
            LambdaStrategy::Balanced => eval_points(&BALANCED, load),
            LambdaStrategy::Performance => eval_points(&PERFORMANCE, load),
            LambdaStrategy::Manual(curve) => curve.eval(load),
        }
    }
}

impl FromStr for LambdaStrategy {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stoichiometric" | "stoich" => Ok(LambdaStrategy::Stoichiometric),
            "economy" => Ok(LambdaStrategy::Economy),
            "balanced" => Ok(LambdaStrategy::Balanced),
            "performance" => Ok(LambdaStrategy::Performance),
            other => Err(CalcError::parameter(
                "lambda.strategy",
                format!("unknown strategy '{other}'"),
            )),
        }
    }
}

/// Inputs shaping the lambda target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LambdaShaping {
    /// Base lambda by load
    pub strategy: LambdaStrategy,
    /// Scalar applied to the whole surface
    pub closed_loop_factor: f64,
    /// RPM-dependent multiplier, 1.0 when absent
    pub speed_shape: Option<Curve>,
    /// User RPM trim, 1.0 when absent
    pub user_speed_factor: Option<Curve>,
}

impl Default for LambdaShaping {
    fn default() -> Self {
        Self {
            strategy: LambdaStrategy::default(),
            closed_loop_factor: 1.0,
            speed_shape: None,
            user_speed_factor: None,
        }
    }
}

impl LambdaShaping {
    /// Closed-loop factor must be positive
    pub fn validate(&self) -> Result<()> {
        require_positive("lambda.closed_loop_factor", self.closed_loop_factor)
    }

    /// True when neither RPM term can change the target
    pub fn is_speed_invariant(&self) -> bool {
        let flat = |curve: &Option<Curve>| {
            curve
                .as_ref()
                .map_or(true, |c| c.points().all(|(_, y)| y == 1.0))
        };
        flat(&self.speed_shape) && flat(&self.user_speed_factor)
    }
}

/// Evaluates the lambda target for one request
#[derive(Debug, Clone, Copy)]
pub struct LambdaTargetGrid<'a> {
    shaping: &'a LambdaShaping,
    limits: LambdaLimits,
}

impl<'a> LambdaTargetGrid<'a> {
    /// Target grid for `shaping`, clipped into `limits`
    pub fn new(shaping: &'a LambdaShaping, limits: LambdaLimits) -> Self {
        Self { shaping, limits }
    }

    /// Active clip range
    pub fn limits(&self) -> LambdaLimits {
        self.limits
    }

    /// Unclipped composite
    pub fn raw_multiplier(&self, load: f64, speed: f64) -> f64 {
        let speed_shape = self
            .shaping
            .speed_shape
            .as_ref()
            .map_or(1.0, |c| c.eval(speed));
        let user = self
            .shaping
            .user_speed_factor
            .as_ref()
            .map_or(1.0, |c| c.eval(speed));
        self.shaping.strategy.base_by_load(load)
            * self.shaping.closed_loop_factor
            * speed_shape
            * user
    }

    /// Clipped target at (load, speed)
    pub fn target_ratio_multiplier(&self, load: f64, speed: f64) -> f64 {
        self.limits.clamp(self.raw_multiplier(load, speed))
    }

    /// Unclipped load-only target
    pub fn raw_line_lambda(&self, load: f64) -> f64 {
        self.shaping.strategy.base_by_load(load) * self.shaping.closed_loop_factor
    }

    /// Clipped load-only target, no RPM terms
    pub fn line_lambda(&self, load: f64) -> f64 {
        self.limits.clamp(self.raw_line_lambda(load))
    }

    /// Full surface on the given axes and the number of cells that were clipped
    pub fn build(
        &self,
        load_axis: &AxisSeries,
        speed_axis: &AxisSeries,
    ) -> (LambdaTargetSurface, usize) {
        let mut clipped = 0;
        let values: Vec<Vec<f64>> = load_axis
            .values()
            .iter()
            .map(|&load| {
                speed_axis
                    .values()
                    .iter()
                    .map(|&speed| {
                        let raw = self.raw_multiplier(load, speed);
                        if self.limits.clips(raw) {
                            clipped += 1;
                        }
                        self.limits.clamp(raw)
                    })
                    .collect()
            })
            .collect();

        let surface = LambdaTargetSurface {
            load_axis: load_axis.clone(),
            speed_axis: speed_axis.clone(),
            values,
        };
        (surface, clipped)
    }
}

/// Lambda targets indexed `[load][speed]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLambdaSurface")]
pub struct LambdaTargetSurface {
    load_axis: AxisSeries,
    speed_axis: AxisSeries,
    values: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct RawLambdaSurface {
    load_axis: AxisSeries,
    speed_axis: AxisSeries,
    values: Vec<Vec<f64>>,
}

impl TryFrom<RawLambdaSurface> for LambdaTargetSurface {
    type Error = CalcError;

    fn try_from(raw: RawLambdaSurface) -> Result<Self> {
        LambdaTargetSurface::new(raw.load_axis, raw.speed_axis, raw.values)
    }
}

impl LambdaTargetSurface {
    /// Wrap caller-computed values; they are clipped when the engine uses them
    pub fn new(load_axis: AxisSeries, speed_axis: AxisSeries, values: Vec<Vec<f64>>) -> Result<Self> {
        check_shape("lambda surface", &values, load_axis.len(), speed_axis.len())?;
        Ok(Self {
            load_axis,
            speed_axis,
            values,
        })
    }

    /// Surface rows, bar
    pub fn load_axis(&self) -> &AxisSeries {
        &self.load_axis
    }

    /// Surface columns, RPM
    pub fn speed_axis(&self) -> &AxisSeries {
        &self.speed_axis
    }

    /// Lambda values, `[load][speed]`
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Lambda at any (load, speed), edges held
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

    /// Reindexed onto other axes and clipped into `limits`
    ///
    /// Returns the surface and how many of its cells were clipped.
    pub fn conform(
        &self,
        load_axis: &AxisSeries,
        speed_axis: &AxisSeries,
        method: SampleMethod,
        limits: LambdaLimits,
    ) -> (LambdaTargetSurface, usize) {
        let mut clipped = 0;
        let values: Vec<Vec<f64>> = resample::resample(
            &self.values,
            &self.load_axis,
            &self.speed_axis,
            load_axis,
            speed_axis,
            method,
        )
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|v| {
                    if limits.clips(v) {
                        clipped += 1;
                    }
                    limits.clamp(v)
                })
                .collect()
        })
        .collect();

        let surface = LambdaTargetSurface {
            load_axis: load_axis.clone(),
            speed_axis: speed_axis.clone(),
            values,
        };
        (surface, clipped)
    }
}
