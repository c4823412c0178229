//! Map Derivation Engine
//!
//! Produces the 1-D injection curve at a reference speed and the full
//! load × speed injection table for one [`CalculationRequest`].
//!
//! Two derivations share the [`CellCalculator`]:
//! - **Open loop**: the curve is computed with a load-only lambda, then each
//!   table cell is the curve value scaled by `efficiency(load, rpm) /
//!   efficiency(load, reference rpm)` and the global scale.
//! - **Closed loop**: every cell is computed on its own with the full lambda
//!   surface, then scaled.
//!
//! The engine keeps no state between calls.

use serde::{Deserialize, Serialize};

use crate::axis::AxisSeries;
use crate::cell::{CellCalculator, CellInput, CellOutput};
use crate::config::EngineConfig;
use crate::curve::{CompensationCurve, OperatingConditions};
use crate::error::{require_finite, require_positive, CalcError, Result};
use crate::injector::InjectorSpec;
use crate::lambda::{LambdaShaping, LambdaTargetGrid, LambdaTargetSurface};
use crate::unit_conversion::FuelType;
use crate::ve_grid::EfficiencyGrid;

/// Which derivation builds the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationMode {
    /// Table scaled from the reference-speed curve by efficiency ratio
    #[default]
    OpenLoop,
    /// Every cell recomputed with the per-cell lambda target
    ClosedLoop,
}

/// Everything needed for one derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    /// Stoichiometric air/fuel mass ratio of the fuel
    pub stoich_ratio: f64,
    /// Total engine displacement, cc
    pub displacement_cc: f64,
    /// Number of cylinders
    pub cylinders: u32,
    /// Injector feeding each cylinder
    pub injector: InjectorSpec,
    /// Applied in order; multipliers before additive offsets
    #[serde(default)]
    pub compensations: Vec<CompensationCurve>,
    /// Inputs of the compensation curves
    #[serde(default)]
    pub conditions: OperatingConditions,
    /// Injection time floor, ms
    #[serde(default)]
    pub min_time_ms: f64,
    /// Open or closed loop
    #[serde(default)]
    pub mode: DerivationMode,
    /// RPM of the 1-D curve; median of `speed_axis` when absent
    #[serde(default)]
    pub reference_speed: Option<f64>,
    /// Applied to the 2-D table only
    #[serde(default = "default_global_scale")]
    pub global_scale: f64,
    /// Table rows, bar
    pub load_axis: AxisSeries,
    /// Table columns, RPM
    pub speed_axis: AxisSeries,
    /// Lambda target inputs
    #[serde(default)]
    pub lambda: LambdaShaping,
}

fn default_global_scale() -> f64 {
    1.0
}

impl CalculationRequest {
    /// Request with defaults for everything but engine, injector and axes
    pub fn new(
        fuel: FuelType,
        displacement_cc: f64,
        cylinders: u32,
        injector: InjectorSpec,
        load_axis: AxisSeries,
        speed_axis: AxisSeries,
    ) -> Self {
        Self {
            stoich_ratio: fuel.stoich_afr(),
            displacement_cc,
            cylinders,
            injector,
            compensations: Vec::new(),
            conditions: OperatingConditions::default(),
            min_time_ms: 0.0,
            mode: DerivationMode::default(),
            reference_speed: None,
            global_scale: default_global_scale(),
            load_axis,
            speed_axis,
            lambda: LambdaShaping::default(),
        }
    }

    /// Parse a request handed over as JSON
    pub fn from_json(content: &str) -> Result<Self> {
        let request: CalculationRequest = serde_json::from_str(content)?;
        request.validate()?;
        Ok(request)
    }

    /// Swept volume of one cylinder, cc
    pub fn displacement_per_cylinder(&self) -> f64 {
        self.displacement_cc / f64::from(self.cylinders.max(1))
    }

    /// Explicit reference speed, or the median of the speed axis
    pub fn effective_reference_speed(&self) -> f64 {
        self.reference_speed
            .unwrap_or_else(|| self.speed_axis.median())
    }

    /// Reject values no derivation can use
    pub fn validate(&self) -> Result<()> {
        require_positive("stoich_ratio", self.stoich_ratio)?;
        require_positive("displacement_cc", self.displacement_cc)?;
        if self.cylinders == 0 {
            return Err(CalcError::parameter("cylinders", "must be >= 1"));
        }
        self.injector.validate()?;
        self.lambda.validate()?;
        require_positive("global_scale", self.global_scale)?;
        require_finite("min_time_ms", self.min_time_ms)?;
        if self.min_time_ms < 0.0 {
            return Err(CalcError::parameter("min_time_ms", "must not be negative"));
        }
        require_finite("conditions.coolant_temp_c", self.conditions.coolant_temp_c)?;
        require_finite("conditions.supply_voltage", self.conditions.supply_voltage)?;
        require_finite("conditions.intake_air_temp_c", self.conditions.intake_air_temp_c)?;
        if self.conditions.intake_air_temp_c <= -273.15 {
            return Err(CalcError::parameter(
                "conditions.intake_air_temp_c",
                "must be above absolute zero",
            ));
        }
        if let Some(rpm) = self.reference_speed {
            require_finite("reference_speed", rpm)?;
        }
        Ok(())
    }
}

/// 1-D curve at the reference speed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveResult {
    /// Curve input axis, bar
    pub load_axis: AxisSeries,
    /// RPM the curve was computed at
    pub reference_speed: f64,
    /// Injection time per load bin, ms
    pub values: Vec<f64>,
    /// False where the injector differential collapsed
    pub valid: Vec<bool>,
}

/// Output of one derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// Derivation that produced the table
    pub mode: DerivationMode,
    /// Reference-speed curve
    pub curve: CurveResult,
    /// Table columns, RPM
    pub speed_axis: AxisSeries,
    /// Injection time, ms, indexed `[load][speed]`
    pub table: Vec<Vec<f64>>,
    /// False where the injector differential collapsed
    pub valid: Vec<Vec<bool>>,
    /// Lambda cells pulled back into the safe range
    pub lambda_clipped: usize,
}

impl CalculationResult {
    /// Table rows, bar
    pub fn load_axis(&self) -> &AxisSeries {
        &self.curve.load_axis
    }

    /// Number of invalid table cells
    pub fn saturated_cells(&self) -> usize {
        self.valid.iter().flatten().filter(|v| !**v).count()
    }

    /// Table value at grid indices
    pub fn cell(&self, load_idx: usize, speed_idx: usize) -> Option<f64> {
        self.table.get(load_idx).and_then(|row| row.get(speed_idx)).copied()
    }
}

/// Inputs resolved onto the request axes
struct Prepared<'a> {
    request: &'a CalculationRequest,
    calc: CellCalculator<'a>,
    lambda: LambdaTargetGrid<'a>,
    reference_speed: f64,
    /// `[load][speed]` on the request axes
    efficiency: Vec<Vec<f64>>,
    /// Per load bin, at the reference speed
    efficiency_at_ref: Vec<f64>,
}

/// Entry point for map derivation
#[derive(Debug, Clone, Default)]
pub struct MapDerivationEngine {
    config: EngineConfig,
}

impl MapDerivationEngine {
    /// Engine with a validated config
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active config
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Derive the curve and table
    ///
    /// `lambda_surface` replaces the surface built from `request.lambda` in
    /// closed-loop mode; it is resampled onto the request axes and clipped.
    /// Open-loop mode uses the load-only lambda and ignores it.
    pub fn derive(
        &self,
        request: &CalculationRequest,
        grid: &EfficiencyGrid,
        lambda_surface: Option<&LambdaTargetSurface>,
    ) -> Result<CalculationResult> {
        let prep = self.prepare(request, grid)?;
        tracing::debug!(
            "Deriving {:?} map: {}x{} cells, reference speed {} rpm",
            request.mode,
            request.load_axis.len(),
            request.speed_axis.len(),
            prep.reference_speed
        );

        let result = match request.mode {
            DerivationMode::OpenLoop => self.derive_open_loop(&prep),
            DerivationMode::ClosedLoop => self.derive_closed_loop(&prep, lambda_surface),
        };

        tracing::debug!(
            "Derived {:?} map: {} saturated cells, {} lambda cells clipped",
            result.mode,
            result.saturated_cells(),
            result.lambda_clipped
        );
        Ok(result)
    }

    /// Derive only the 1-D curve at the reference speed with the load-only lambda
    pub fn derive_curve(
        &self,
        request: &CalculationRequest,
        grid: &EfficiencyGrid,
    ) -> Result<CurveResult> {
        let prep = self.prepare(request, grid)?;
        Ok(self.reference_curve(&prep, |load| prep.lambda.line_lambda(load)))
    }

    fn prepare<'a>(
        &'a self,
        request: &'a CalculationRequest,
        grid: &EfficiencyGrid,
    ) -> Result<Prepared<'a>> {
        request.validate()?;

        let reference_speed = request.effective_reference_speed();
        if !request.speed_axis.contains(reference_speed) {
            tracing::warn!(
                "Reference speed {reference_speed} rpm is outside the speed axis [{}, {}]",
                request.speed_axis.first(),
                request.speed_axis.last()
            );
        }

        let method = self.config.efficiency_sampling;
        let efficiency = grid
            .resampled(&request.load_axis, &request.speed_axis, method)
            .values()
            .to_vec();
        let efficiency_at_ref = request
            .load_axis
            .values()
            .iter()
            .map(|&load| grid.sample(load, reference_speed, method))
            .collect();

        let calc = CellCalculator {
            stoich_ratio: request.stoich_ratio,
            displacement_per_cylinder_cc: request.displacement_per_cylinder(),
            injector: &request.injector,
            compensations: &request.compensations,
            conditions: request.conditions,
            min_time_ms: request.min_time_ms,
            gas_constant: self.config.gas_constant,
            atmospheric_pressure_bar: self.config.atmospheric_pressure_bar,
        };

        Ok(Prepared {
            request,
            calc,
            lambda: LambdaTargetGrid::new(&request.lambda, self.config.lambda_limits),
            reference_speed,
            efficiency,
            efficiency_at_ref,
        })
    }

    /// Cells at the reference speed, one per load bin
    fn reference_cells(
        &self,
        prep: &Prepared<'_>,
        lambda_at: impl Fn(f64) -> f64,
    ) -> Vec<CellOutput> {
        prep.request
            .load_axis
            .values()
            .iter()
            .zip(&prep.efficiency_at_ref)
            .map(|(&load, &efficiency)| {
                prep.calc.compute(CellInput {
                    load,
                    speed: prep.reference_speed,
                    efficiency,
                    lambda: lambda_at(load),
                })
            })
            .collect()
    }

    fn reference_curve(&self, prep: &Prepared<'_>, lambda_at: impl Fn(f64) -> f64) -> CurveResult {
        curve_from_cells(prep, &self.reference_cells(prep, lambda_at))
    }

    fn derive_open_loop(&self, prep: &Prepared<'_>) -> CalculationResult {
        let request = prep.request;
        let limits = self.config.lambda_limits;
        let reference = self.reference_cells(prep, |load| prep.lambda.line_lambda(load));

        let mut table: Vec<Vec<f64>> = Vec::with_capacity(request.load_axis.len());
        let mut valid: Vec<Vec<bool>> = Vec::with_capacity(request.load_axis.len());
        let mut lambda_clipped = 0;

        for (li, &load) in request.load_axis.values().iter().enumerate() {
            let line_lambda = prep.lambda.line_lambda(load);
            if limits.clips(prep.lambda.raw_line_lambda(load)) {
                lambda_clipped += request.speed_axis.len();
            }
            let eff_ref = prep.efficiency_at_ref[li];
            let mut row = Vec::with_capacity(request.speed_axis.len());
            let mut row_valid = Vec::with_capacity(request.speed_axis.len());

            for (si, &speed) in request.speed_axis.values().iter().enumerate() {
                let eff = prep.efficiency[li][si];
                // Only the base time scales with efficiency; offsets and the
                // floor are applied per cell
                let output = if !reference[li].valid {
                    reference[li]
                } else if eff_ref > 0.0 {
                    prep.calc.finish(reference[li].base_time_ms * (eff / eff_ref).max(0.0))
                } else {
                    tracing::trace!(
                        "No reference efficiency at load {load}, computing cell ({load}, {speed}) directly"
                    );
                    prep.calc.compute(CellInput {
                        load,
                        speed,
                        efficiency: eff,
                        lambda: line_lambda,
                    })
                };
                row.push(scale_cell(output, request));
                row_valid.push(output.valid);
            }
            table.push(row);
            valid.push(row_valid);
        }

        CalculationResult {
            mode: DerivationMode::OpenLoop,
            curve: curve_from_cells(prep, &reference),
            speed_axis: request.speed_axis.clone(),
            table,
            valid,
            lambda_clipped,
        }
    }

    fn derive_closed_loop(
        &self,
        prep: &Prepared<'_>,
        supplied: Option<&LambdaTargetSurface>,
    ) -> CalculationResult {
        let request = prep.request;
        let limits = self.config.lambda_limits;

        let (surface, lambda_clipped) = match supplied {
            Some(surface) => surface.conform(
                &request.load_axis,
                &request.speed_axis,
                self.config.efficiency_sampling,
                limits,
            ),
            None => prep.lambda.build(&request.load_axis, &request.speed_axis),
        };

        let curve = match supplied {
            Some(_) => self.reference_curve(prep, |load| {
                limits.clamp(surface.sample(
                    load,
                    prep.reference_speed,
                    self.config.efficiency_sampling,
                ))
            }),
            None => self.reference_curve(prep, |load| {
                prep.lambda
                    .target_ratio_multiplier(load, prep.reference_speed)
            }),
        };

        let mut table: Vec<Vec<f64>> = Vec::with_capacity(request.load_axis.len());
        let mut valid: Vec<Vec<bool>> = Vec::with_capacity(request.load_axis.len());

        for (li, &load) in request.load_axis.values().iter().enumerate() {
            let outputs: Vec<CellOutput> = request
                .speed_axis
                .values()
                .iter()
                .enumerate()
                .map(|(si, &speed)| {
                    prep.calc.compute(CellInput {
                        load,
                        speed,
                        efficiency: prep.efficiency[li][si],
                        lambda: surface.values()[li][si],
                    })
                })
                .collect();
            table.push(outputs.iter().map(|o| scale_cell(*o, request)).collect());
            valid.push(outputs.iter().map(|o| o.valid).collect());
        }

        CalculationResult {
            mode: DerivationMode::ClosedLoop,
            curve,
            speed_axis: request.speed_axis.clone(),
            table,
            valid,
            lambda_clipped,
        }
    }
}

fn curve_from_cells(prep: &Prepared<'_>, cells: &[CellOutput]) -> CurveResult {
    CurveResult {
        load_axis: prep.request.load_axis.clone(),
        reference_speed: prep.reference_speed,
        values: cells.iter().map(|c| c.time_ms).collect(),
        valid: cells.iter().map(|c| c.valid).collect(),
    }
}

/// Global scale then the time floor; saturated cells stay at the floor
fn scale_cell(output: CellOutput, request: &CalculationRequest) -> f64 {
    if !output.valid {
        return request.min_time_ms;
    }
    (output.time_ms * request.global_scale).max(request.min_time_ms)
}
