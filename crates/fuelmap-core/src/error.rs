//! Calculation errors
//!
//! Only boundary validation produces errors. Saturated cells and clamped
//! lookups are reported in-band through the returned data.

use thiserror::Error;

/// Errors that can occur before a calculation starts
#[derive(Error, Debug)]
pub enum CalcError {
    /// Axis too short, too long, non-finite or not strictly increasing
    #[error("Invalid axis '{name}': {reason}")]
    InvalidAxis {
        /// Axis name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Grid values do not match the axis lengths
    #[error("Shape mismatch in {grid}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Grid name
        grid: String,
        /// (rows, columns) from the axes
        expected: (usize, usize),
        /// (rows, columns) supplied
        actual: (usize, usize),
    },

    /// Curve breakpoints are empty, non-finite or unordered
    #[error("Invalid curve '{name}': {reason}")]
    InvalidCurve {
        /// Curve name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// A request or config value is out of range
    #[error("Invalid value for '{field}': {reason}")]
    InvalidParameter {
        /// Field path
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// Reading or writing a config file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config or request JSON could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl CalcError {
    pub(crate) fn axis(name: &str, reason: impl Into<String>) -> Self {
        CalcError::InvalidAxis {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn curve(name: &str, reason: impl Into<String>) -> Self {
        CalcError::InvalidCurve {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parameter(field: &str, reason: impl Into<String>) -> Self {
        CalcError::InvalidParameter {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, CalcError>;

/// Reject NaN, infinities and values `<= 0`
pub(crate) fn require_positive(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(CalcError::parameter(field, format!("{value} is not finite")));
    }
    if value <= 0.0 {
        return Err(CalcError::parameter(field, format!("{value} must be > 0")));
    }
    Ok(())
}

/// Reject NaN and infinities
pub(crate) fn require_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CalcError::parameter(field, format!("{value} is not finite")))
    }
}
