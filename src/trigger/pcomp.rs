//! Uniform threshold-compare (position-compare) programs.
//!
//! A position-compare block emits a pulse when the monitored encoder count
//! crosses `start_count`, then again every `step_count` counts, `pulse_count`
//! times, watching for crossings in `direction`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoder::{device_count, EncoderConfig, Rounding};
use crate::error::{FlyScanError, ScanResult};

/// Sense in which the compare block watches the encoder count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Counts increase during the sweep
    Increasing,
    /// Counts decrease during the sweep
    Decreasing,
}

/// Program for a threshold-compare trigger block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdCompareProgram {
    /// Count at which the first pulse fires
    pub start_count: i32,
    /// Counts between rising edges (>= 1)
    pub step_count: u32,
    /// Number of pulses to emit
    pub pulse_count: u32,
    /// Pulse width in counts
    pub pulse_width: u32,
    /// Crossing direction
    pub direction: Direction,
}

/// Build a program for `num` evenly spaced samples from `start` to `stop`.
///
/// Direction combines the sign of the sample spacing with the sign of the
/// encoder resolution, so an inverted encoder flips it.
pub fn uniform(
    start: f64,
    stop: f64,
    num: usize,
    encoder: &EncoderConfig,
    pulse_width: u32,
) -> ScanResult<ThresholdCompareProgram> {
    if num < 2 {
        return Err(FlyScanError::InvalidScanSpec(format!(
            "a uniform trigger program needs at least 2 samples, got {num}"
        )));
    }
    if !start.is_finite() || !stop.is_finite() {
        return Err(FlyScanError::InvalidScanSpec(format!(
            "scan bounds must be finite, got start={start} stop={stop}"
        )));
    }
    encoder.validate()?;
    if pulse_width == 0 {
        return Err(FlyScanError::InvalidScanSpec(
            "pulse width must be at least one count".to_string(),
        ));
    }

    let width = (stop - start) / (num - 1) as f64;
    let direction = if width / encoder.resolution > 0.0 {
        Direction::Increasing
    } else {
        Direction::Decreasing
    };

    let start_count = device_count(start, encoder.to_counts(start, Rounding::LowerBound))?;
    let step = encoder.to_counts(width, Rounding::StepMagnitude);
    if step < 1 {
        return Err(FlyScanError::InvalidScanSpec(format!(
            "sample spacing {width} is below one encoder count"
        )));
    }
    let step_count = u32::try_from(step).map_err(|_| FlyScanError::EncoderRange {
        position: width,
        count: step,
        min: 1,
        max: i64::from(u32::MAX),
    })?;
    let pulse_count = u32::try_from(num).map_err(|_| {
        FlyScanError::InvalidScanSpec(format!("{num} samples exceed the pulse counter"))
    })?;

    // The last pulse must also land inside the device range.
    let sense: i64 = match direction {
        Direction::Increasing => 1,
        Direction::Decreasing => -1,
    };
    let last = i64::from(start_count)
        + sense * i64::from(step_count) * (i64::from(pulse_count) - 1);
    device_count(stop, last)?;

    debug!(
        "Threshold-compare program: start={} step={} pulses={} {:?}",
        start_count, step_count, pulse_count, direction
    );

    Ok(ThresholdCompareProgram {
        start_count,
        step_count,
        pulse_count,
        pulse_width,
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(resolution: f64) -> EncoderConfig {
        EncoderConfig::new(resolution, 0).unwrap()
    }

    #[test]
    fn test_inverted_encoder_program() {
        let program = uniform(0.0, 10.0, 11, &encoder(-1.0 / 10000.0), 1).unwrap();
        assert_eq!(program.direction, Direction::Decreasing);
        assert_eq!(program.start_count, 0);
        assert_eq!(program.step_count, 10000);
        assert_eq!(program.pulse_count, 11);
        assert_eq!(program.pulse_width, 1);
    }

    #[test]
    fn test_direction_sign_rule() {
        let cases = [
            (0.0, 10.0, 0.001),
            (10.0, 0.0, 0.001),
            (0.0, 10.0, -0.001),
            (10.0, 0.0, -0.001),
            (-3.0, -1.0, 0.25),
            (-1.0, -3.0, -0.25),
        ];
        for (start, stop, resolution) in cases {
            let program = uniform(start, stop, 5, &encoder(resolution), 1).unwrap();
            let width: f64 = stop - start;
            let same_sign = width.signum() == resolution.signum();
            assert_eq!(
                program.direction == Direction::Increasing,
                same_sign,
                "start={start} stop={stop} resolution={resolution}"
            );
        }
    }

    #[test]
    fn test_pulse_count_matches_samples() {
        for num in [2usize, 3, 17, 1000] {
            let program = uniform(1.0, 9.0, num, &encoder(0.0001), 1).unwrap();
            assert_eq!(program.pulse_count as usize, num);
        }
    }

    #[test]
    fn test_start_rounds_down() {
        // 0.00015 / 0.0001 = 1.4999.. -> floor 1; -0.00015 -> -2
        let up = uniform(0.00015, 1.0, 2, &encoder(0.0001), 1).unwrap();
        assert_eq!(up.start_count, 1);
        let down = uniform(-0.00015, 1.0, 2, &encoder(0.0001), 1).unwrap();
        assert_eq!(down.start_count, -2);
    }

    #[test]
    fn test_step_rounds_up() {
        // spacing of 1.5 counts is programmed as 2
        let program = uniform(0.0, 0.0003, 3, &encoder(0.0001), 1).unwrap();
        assert_eq!(program.step_count, 2);
    }

    #[test]
    fn test_too_few_samples() {
        let err = uniform(0.0, 1.0, 1, &encoder(0.001), 1).unwrap_err();
        assert!(matches!(err, FlyScanError::InvalidScanSpec(_)));
    }

    #[test]
    fn test_degenerate_and_non_finite_bounds() {
        assert!(uniform(1.0, 1.0, 5, &encoder(0.001), 1).is_err());
        assert!(uniform(f64::NAN, 1.0, 5, &encoder(0.001), 1).is_err());
        assert!(uniform(0.0, f64::INFINITY, 5, &encoder(0.001), 1).is_err());
    }

    #[test]
    fn test_out_of_device_range() {
        let err = uniform(0.0, 1.0e9, 2, &encoder(0.01), 1).unwrap_err();
        assert!(matches!(err, FlyScanError::EncoderRange { .. }));
    }
}
