//! Conversion between user-unit positions and integer encoder counts.
//!
//! The motion controller reports position in encoder counts; users think in
//! physical units (mm, degrees). `resolution` is the signed size of one count in
//! user units, so `counts = position / resolution + offset`. A negative
//! resolution describes an inverted encoder: increasing user position means
//! decreasing counts.
//!
//! Three rounding policies are used, one per kind of quantity:
//!
//! | Policy          | Used for                      | Rounding                     |
//! |-----------------|-------------------------------|------------------------------|
//! | `LowerBound`    | threshold-compare start count | floor                        |
//! | `StepMagnitude` | rising-edge spacing           | ceil of the absolute value   |
//! | `Sample`        | sequence-table row positions  | truncate toward zero         |
//!
//! Conversions never fail; range checking against the trigger hardware happens
//! in [`device_count`], called by the program builders.

use serde::{Deserialize, Serialize};

use crate::error::{FlyScanError, ScanResult};

/// Smallest count the trigger hardware position registers can hold.
pub const DEVICE_COUNT_MIN: i64 = i32::MIN as i64;
/// Largest count the trigger hardware position registers can hold.
pub const DEVICE_COUNT_MAX: i64 = i32::MAX as i64;

/// How a fractional count is turned into an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Floor. The programmed threshold never lies past where motion has reached.
    LowerBound,
    /// Ceiling of the magnitude. Spacing is never tighter than requested.
    StepMagnitude,
    /// Truncate toward zero. Rows are discrete target points, not bounds.
    Sample,
}

/// Signed encoder resolution and integer offset for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// User units per encoder count (may be negative)
    pub resolution: f64,
    /// Count reported at user position zero
    #[serde(default)]
    pub offset: i64,
}

impl EncoderConfig {
    /// Create an encoder configuration, rejecting a zero or non-finite resolution.
    pub fn new(resolution: f64, offset: i64) -> ScanResult<Self> {
        let config = Self { resolution, offset };
        config.validate()?;
        Ok(config)
    }

    /// Check the `resolution != 0` invariant.
    pub fn validate(&self) -> ScanResult<()> {
        if !self.resolution.is_finite() || self.resolution == 0.0 {
            return Err(FlyScanError::InvalidScanSpec(format!(
                "encoder resolution must be finite and non-zero, got {}",
                self.resolution
            )));
        }
        Ok(())
    }

    /// Convert a position (or, for `StepMagnitude`, a distance) to counts.
    pub fn to_counts(&self, position: f64, rounding: Rounding) -> i64 {
        to_counts(position, self.resolution, self.offset, rounding)
    }

    /// Position in user units of an integer count.
    pub fn position_from(&self, counts: i64) -> f64 {
        (counts - self.offset) as f64 * self.resolution
    }

    /// True when increasing user position means decreasing counts.
    pub fn is_inverted(&self) -> bool {
        self.resolution < 0.0
    }
}

/// Convert a user-unit value to encoder counts under the given rounding policy.
///
/// `StepMagnitude` values are distances, so the offset cancels and is not
/// applied; the result is always non-negative.
pub fn to_counts(position: f64, resolution: f64, offset: i64, rounding: Rounding) -> i64 {
    let raw = position / resolution;
    match rounding {
        Rounding::LowerBound => raw.floor() as i64 + offset,
        Rounding::StepMagnitude => raw.abs().ceil() as i64,
        Rounding::Sample => raw.trunc() as i64 + offset,
    }
}

/// Narrow a count to the trigger hardware's register width.
pub fn device_count(position: f64, count: i64) -> ScanResult<i32> {
    i32::try_from(count).map_err(|_| FlyScanError::EncoderRange {
        position,
        count,
        min: DEVICE_COUNT_MIN,
        max: DEVICE_COUNT_MAX,
    })
}
