//! # FuelMap Core Library
//!
//! Physical fuel model behind the FuelMap tuning tool.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Unit conversions for pressure, temperature, AFR and injector flow
//! - An injector flow model for referenced and fixed fuel regulators
//! - A per-cell injection time model with compensation curves
//! - Lambda target surfaces with a safety clamp
//! - Open-loop and closed-loop derivation of 1-D curves and 2-D tables
//! - Grid resampling between differing load/speed axes
//!
//! All calculations are pure: nothing is cached or mutated between calls, so
//! independent requests can run on any number of threads.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fuelmap_core::prelude::*;
//!
//! let load = AxisSeries::new("load", vec![-0.6, 0.0, 0.5, 1.0])?;
//! let rpm = AxisSeries::new("rpm", vec![1000.0, 3000.0, 5000.0, 7000.0])?;
//! let ve = EfficiencyGrid::uniform(load.clone(), rpm.clone(), 0.9)?;
//!
//! let injector = InjectorSpec::from_lb_per_hour(42.0);
//! let request = CalculationRequest::new(FuelType::Gasoline, 2000.0, 4, injector, load, rpm);
//!
//! let engine = MapDerivationEngine::default();
//! let result = engine.derive(&request, &ve, None)?;
//! println!("{:?}", result.table);
//! ```

pub mod axis;
pub mod cell;
pub mod config;
pub mod curve;
pub mod derive;
pub mod error;
pub mod injector;
pub mod lambda;
pub mod resample;
pub mod unit_conversion;
pub mod ve_grid;

pub use error::{CalcError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::axis::AxisSeries;
    pub use crate::cell::{CellCalculator, CellInput, CellOutput};
    pub use crate::config::EngineConfig;
    pub use crate::curve::{
        CompensationAxis, CompensationCurve, CompensationKind, Curve, OperatingConditions,
    };
    pub use crate::derive::{
        CalculationRequest, CalculationResult, CurveResult, DerivationMode, MapDerivationEngine,
    };
    pub use crate::error::CalcError;
    pub use crate::injector::{effective_mass_flow, InjectorSpec, RegulationMode};
    pub use crate::lambda::{
        LambdaLimits, LambdaShaping, LambdaStrategy, LambdaTargetGrid, LambdaTargetSurface,
    };
    pub use crate::resample::SampleMethod;
    pub use crate::unit_conversion::FuelType;
    pub use crate::ve_grid::EfficiencyGrid;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
