//! Sweep planning: expand a scan request into direction-alternating segments.
//!
//! Consecutive sweeps run `(start, stop)`, `(stop, start)`, `(start, stop)`, ...
//! so the axis never travels back to the start without taking data. Segment
//! `n` uses trigger resource `n % 2`.
//!
//! The motion envelope of a segment is the nominal range extended by `runup` at
//! both ends in the direction of travel. Trigger programs always use the
//! nominal bounds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capabilities::FlyMotorInfo;
use crate::error::{FlyScanError, ScanResult};

/// One of the two interchangeable trigger resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerId {
    /// Resource 0
    A,
    /// Resource 1
    B,
}

impl TriggerId {
    /// Resource used by the segment at `index`.
    pub fn for_segment(index: usize) -> Self {
        if index % 2 == 0 {
            TriggerId::A
        } else {
            TriggerId::B
        }
    }

    /// Slot in the trigger pool (0 or 1).
    pub fn index(self) -> usize {
        match self {
            TriggerId::A => 0,
            TriggerId::B => 1,
        }
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerId::A => write!(f, "trigger_a"),
            TriggerId::B => write!(f, "trigger_b"),
        }
    }
}

/// A continuous-motion scan request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSpecification {
    /// First sample position of the first sweep
    pub start: f64,
    /// Last sample position of the first sweep
    pub stop: f64,
    /// Samples per sweep (>= 2)
    pub num_samples: usize,
    /// Seconds per sample (> 0)
    pub duration_per_sample: f64,
    /// Number of sweeps (>= 1)
    #[serde(default = "default_num_sweeps")]
    pub num_sweeps: usize,
    /// Extra travel beyond each bound (>= 0)
    #[serde(default)]
    pub runup: f64,
}

fn default_num_sweeps() -> usize {
    1
}

impl ScanSpecification {
    /// Single-sweep scan without run-up.
    pub fn new(start: f64, stop: f64, num_samples: usize, duration_per_sample: f64) -> Self {
        Self {
            start,
            stop,
            num_samples,
            duration_per_sample,
            num_sweeps: 1,
            runup: 0.0,
        }
    }

    /// Set the number of sweeps.
    pub fn with_sweeps(mut self, num_sweeps: usize) -> Self {
        self.num_sweeps = num_sweeps;
        self
    }

    /// Set the run-up distance.
    pub fn with_runup(mut self, runup: f64) -> Self {
        self.runup = runup;
        self
    }

    /// Check all invariants; no hardware is involved.
    pub fn validate(&self) -> ScanResult<()> {
        if !self.start.is_finite() || !self.stop.is_finite() {
            return Err(FlyScanError::InvalidScanSpec(format!(
                "scan bounds must be finite, got start={} stop={}",
                self.start, self.stop
            )));
        }
        if self.start == self.stop {
            return Err(FlyScanError::InvalidScanSpec(format!(
                "scan start and stop are both {}",
                self.start
            )));
        }
        if self.num_samples < 2 {
            return Err(FlyScanError::InvalidScanSpec(format!(
                "num_samples must be >= 2, got {}",
                self.num_samples
            )));
        }
        if !(self.duration_per_sample.is_finite() && self.duration_per_sample > 0.0) {
            return Err(FlyScanError::InvalidScanSpec(format!(
                "duration_per_sample must be positive, got {}",
                self.duration_per_sample
            )));
        }
        if self.num_sweeps < 1 {
            return Err(FlyScanError::InvalidScanSpec(
                "num_sweeps must be >= 1".to_string(),
            ));
        }
        if !(self.runup.is_finite() && self.runup >= 0.0) {
            return Err(FlyScanError::InvalidScanSpec(format!(
                "runup must be a non-negative distance, got {}",
                self.runup
            )));
        }
        Ok(())
    }

    /// Trigger events over the whole scan.
    pub fn total_events(&self) -> u64 {
        (self.num_samples * self.num_sweeps) as u64
    }

    /// Time for one nominal sweep.
    pub fn sweep_time(&self) -> f64 {
        self.num_samples as f64 * self.duration_per_sample
    }
}

/// One sweep between two nominal bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSegment {
    /// Position in the scan, from 0
    pub index: usize,
    /// Nominal start of this sweep
    pub start_pos: f64,
    /// Nominal end of this sweep
    pub stop_pos: f64,
    /// Trigger resource that arms this sweep
    pub trigger_resource_id: TriggerId,
}

/// Expands a validated [`ScanSpecification`] into segments and motion envelopes.
#[derive(Debug, Clone)]
pub struct SweepPlanner<'a> {
    spec: &'a ScanSpecification,
}

impl<'a> SweepPlanner<'a> {
    /// Validate the specification and wrap it.
    pub fn new(spec: &'a ScanSpecification) -> ScanResult<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    /// `num_sweeps` segments alternating direction and trigger resource.
    pub fn segments(&self) -> Vec<SweepSegment> {
        (0..self.spec.num_sweeps)
            .map(|index| {
                let (start_pos, stop_pos) = if index % 2 == 0 {
                    (self.spec.start, self.spec.stop)
                } else {
                    (self.spec.stop, self.spec.start)
                };
                SweepSegment {
                    index,
                    start_pos,
                    stop_pos,
                    trigger_resource_id: TriggerId::for_segment(index),
                }
            })
            .collect()
    }

    /// Motion for a segment: nominal bounds plus run-up, at the sampling velocity.
    pub fn motion_for(&self, segment: &SweepSegment) -> FlyMotorInfo {
        motion_envelope(
            segment.start_pos,
            segment.stop_pos,
            self.spec.sweep_time(),
            self.spec.runup,
        )
    }
}

/// Extend `start..stop` by `runup` at both ends, keeping the velocity implied by
/// covering the nominal span in `nominal_time`.
pub fn motion_envelope(start: f64, stop: f64, nominal_time: f64, runup: f64) -> FlyMotorInfo {
    let sign = if start < stop { 1.0 } else { -1.0 };
    let span = (stop - start).abs();
    let time_for_move = if span > 0.0 {
        nominal_time * (span + 2.0 * runup) / span
    } else {
        nominal_time
    };
    FlyMotorInfo {
        start_position: start - sign * runup,
        end_position: stop + sign * runup,
        time_for_move,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(segments: &[SweepSegment]) -> Vec<(f64, f64)> {
        segments.iter().map(|s| (s.start_pos, s.stop_pos)).collect()
    }

    #[test]
    fn test_three_sweeps_ping_pong() {
        let spec = ScanSpecification::new(1.0, 9.0, 11, 0.01).with_sweeps(3);
        let planner = SweepPlanner::new(&spec).unwrap();
        let segments = planner.segments();
        assert_eq!(bounds(&segments), vec![(1.0, 9.0), (9.0, 1.0), (1.0, 9.0)]);
    }

    #[test]
    fn test_segment_count_and_alternating_resources() {
        for k in 1..=6 {
            let spec = ScanSpecification::new(-2.0, 3.0, 5, 0.1).with_sweeps(k);
            let segments = SweepPlanner::new(&spec).unwrap().segments();
            assert_eq!(segments.len(), k);
            for (i, segment) in segments.iter().enumerate() {
                assert_eq!(segment.index, i);
                assert_eq!(segment.trigger_resource_id.index(), i % 2);
                let expected_start = if i % 2 == 0 { -2.0 } else { 3.0 };
                assert_eq!(segment.start_pos, expected_start);
            }
        }
    }

    #[test]
    fn test_runup_extends_motion_not_bounds() {
        let spec = ScanSpecification::new(1.0, 9.0, 8, 0.5)
            .with_sweeps(2)
            .with_runup(1.0);
        let planner = SweepPlanner::new(&spec).unwrap();
        let segments = planner.segments();
        assert_eq!(bounds(&segments), vec![(1.0, 9.0), (9.0, 1.0)]);

        let forward = planner.motion_for(&segments[0]);
        assert_eq!(forward.start_position, 0.0);
        assert_eq!(forward.end_position, 10.0);
        // 8 units in 4 s -> 2 units/s, 10 units in 5 s
        assert!((forward.time_for_move - 5.0).abs() < 1e-12);

        let backward = planner.motion_for(&segments[1]);
        assert_eq!(backward.start_position, 10.0);
        assert_eq!(backward.end_position, 0.0);
    }

    #[test]
    fn test_no_runup_motion_matches_bounds() {
        let spec = ScanSpecification::new(5.0, 2.0, 4, 0.25);
        let planner = SweepPlanner::new(&spec).unwrap();
        let motion = planner.motion_for(&planner.segments()[0]);
        assert_eq!(motion.start_position, 5.0);
        assert_eq!(motion.end_position, 2.0);
        assert_eq!(motion.time_for_move, 1.0);
    }

    #[test]
    fn test_invalid_specifications() {
        let base = ScanSpecification::new(0.0, 1.0, 10, 0.1);
        let cases = vec![
            ScanSpecification { num_samples: 1, ..base.clone() },
            ScanSpecification { stop: 0.0, ..base.clone() },
            ScanSpecification { start: f64::NAN, ..base.clone() },
            ScanSpecification { duration_per_sample: 0.0, ..base.clone() },
            ScanSpecification { num_sweeps: 0, ..base.clone() },
            ScanSpecification { runup: -0.5, ..base.clone() },
        ];
        for spec in cases {
            assert!(
                matches!(SweepPlanner::new(&spec), Err(FlyScanError::InvalidScanSpec(_))),
                "{spec:?} should be rejected"
            );
        }
        assert!(SweepPlanner::new(&base).is_ok());
    }

    #[test]
    fn test_total_events() {
        let spec = ScanSpecification::new(0.0, 1.0, 25, 0.1).with_sweeps(4);
        assert_eq!(spec.total_events(), 100);
    }
}
