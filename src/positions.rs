//! Target-position generators for sequence-table scans.

use crate::error::{FlyScanError, ScanResult};

/// `num` evenly spaced points from `start` toward `stop`, excluding `stop`.
pub fn linear(start: f64, stop: f64, num: usize) -> ScanResult<Vec<f64>> {
    check_bounds(start, stop)?;
    if num == 0 {
        return Err(FlyScanError::InvalidScanSpec(
            "need at least one position".to_string(),
        ));
    }
    let step = (stop - start) / num as f64;
    Ok((0..num).map(|i| start + step * i as f64).collect())
}

/// `intervals + 1` points from `start` to `end` spaced along half a cosine
/// period, so spacing is tight near both ends and widest in the middle.
///
/// `p[i] = start + 0.5 * (1 - cos(pi * i / intervals)) * (end - start)`
pub fn cosine_eased(start: f64, end: f64, intervals: usize) -> ScanResult<Vec<f64>> {
    check_bounds(start, end)?;
    if intervals == 0 {
        return Err(FlyScanError::InvalidScanSpec(
            "cosine spacing needs at least one interval".to_string(),
        ));
    }
    let span = end - start;
    Ok((0..=intervals)
        .map(|i| {
            let theta = std::f64::consts::PI * i as f64 / intervals as f64;
            start + span * 0.5 * (1.0 - theta.cos())
        })
        .collect())
}

fn check_bounds(start: f64, stop: f64) -> ScanResult<()> {
    if start.is_finite() && stop.is_finite() {
        Ok(())
    } else {
        Err(FlyScanError::InvalidScanSpec(format!(
            "position bounds must be finite, got {start} and {stop}"
        )))
    }
}
