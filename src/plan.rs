//! Scan plans: segments, motion and trigger programs, ready for orchestration.
//!
//! A [`ScanPlan`] is built once per scan call and is immutable afterwards. All
//! validation happens here, so a plan that exists can be handed to the
//! orchestrator without further checks on its contents.

use serde::{Deserialize, Serialize};

use crate::capabilities::{DetectorTrigger, FlyMotorInfo, TriggerInfo};
use crate::encoder::EncoderConfig;
use crate::error::{FlyScanError, ScanResult};
use crate::sweep::{motion_envelope, ScanSpecification, SweepPlanner, SweepSegment, TriggerId};
use crate::trigger::{SeqRowTemplate, TriggerKind, TriggerProgram, TriggerProgramBuilder};

/// Hardware settings that shape programs and the writer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSettings {
    /// Threshold-compare pulse width in counts
    pub pulse_width: u32,
    /// Timing/outputs for every sequence-table row
    pub row: SeqRowTemplate,
    /// Sequencer tick in microseconds
    pub prescale_us: f64,
    /// Writer gating mode
    pub trigger_mode: DetectorTrigger,
    /// Writer dead time between events, seconds
    pub deadtime: f64,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            pulse_width: 1,
            row: SeqRowTemplate::default(),
            prescale_us: 1.0,
            trigger_mode: DetectorTrigger::ConstantGate,
            deadtime: 1e-5,
        }
    }
}

/// A fly scan over explicit, possibly non-uniform, target positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceScan {
    /// Target positions of the first sweep, in order
    pub positions: Vec<f64>,
    /// Seconds per target position
    pub duration_per_sample: f64,
    /// Number of sweeps; odd sweeps visit the positions in reverse
    #[serde(default = "default_one")]
    pub num_sweeps: usize,
    /// Extra travel beyond the outermost targets
    #[serde(default)]
    pub runup: f64,
    /// Passes through the table per sweep
    #[serde(default = "default_one_u32")]
    pub repeats: u32,
}

fn default_one() -> usize {
    1
}

fn default_one_u32() -> u32 {
    1
}

impl SequenceScan {
    /// Single sweep through `positions`, one pass each.
    pub fn new(positions: Vec<f64>, duration_per_sample: f64) -> Self {
        Self {
            positions,
            duration_per_sample,
            num_sweeps: 1,
            runup: 0.0,
            repeats: 1,
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

    /// Set passes through the table per sweep.
    pub fn with_repeats(mut self, repeats: u32) -> Self {
        self.repeats = repeats;
        self
    }

    fn validate(&self) -> ScanResult<()> {
        if self.positions.is_empty() {
            return Err(FlyScanError::InvalidScanSpec(
                "sequence scan needs at least one target position".to_string(),
            ));
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
}

/// Everything the orchestrator needs for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSegment {
    /// Nominal bounds and trigger resource
    pub segment: SweepSegment,
    /// Move including run-up
    pub motion: FlyMotorInfo,
    /// Program for `segment.trigger_resource_id`
    pub program: TriggerProgram,
}

/// Ordered segments plus the one-off writer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPlan {
    segments: Vec<PlannedSegment>,
    writer: TriggerInfo,
}

impl ScanPlan {
    /// Uniformly sampled scan with threshold-compare programs.
    pub fn uniform(
        spec: &ScanSpecification,
        encoder: &EncoderConfig,
        settings: &PlanSettings,
    ) -> ScanResult<Self> {
        let planner = SweepPlanner::new(spec)?;
        let builder = TriggerProgramBuilder::new(*encoder)
            .with_pulse_width(settings.pulse_width)
            .with_row_template(settings.row);

        let segments = planner
            .segments()
            .into_iter()
            .map(|segment| {
                let program =
                    builder.uniform(segment.start_pos, segment.stop_pos, spec.num_samples)?;
                Ok(PlannedSegment {
                    motion: planner.motion_for(&segment),
                    program: TriggerProgram::ThresholdCompare(program),
                    segment,
                })
            })
            .collect::<ScanResult<Vec<_>>>()?;

        Ok(Self::assemble(
            segments,
            spec.duration_per_sample,
            settings,
        ))
    }

    /// Scan over explicit target positions with sequence-table programs.
    ///
    /// Motion covers the full extent of the targets in the direction from the
    /// first to the last position, so the first and last must differ.
    pub fn sequence(
        scan: &SequenceScan,
        encoder: &EncoderConfig,
        settings: &PlanSettings,
    ) -> ScanResult<Self> {
        scan.validate()?;
        let first = scan.positions[0];
        let last = scan.positions[scan.positions.len() - 1];
        if first == last {
            return Err(FlyScanError::InvalidScanSpec(format!(
                "first and last target positions are both {first}; travel direction is undefined"
            )));
        }

        let (low, high) = scan
            .positions
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| {
                (lo.min(p), hi.max(p))
            });
        let (start, stop) = if last > first { (low, high) } else { (high, low) };
        let sweep_time = scan.positions.len() as f64 * scan.duration_per_sample;

        let builder = TriggerProgramBuilder::new(*encoder)
            .with_pulse_width(settings.pulse_width)
            .with_row_template(settings.row);
        let forward = builder.sequence_info(&scan.positions, scan.repeats, settings.prescale_us)?;
        let reversed_positions: Vec<f64> = scan.positions.iter().rev().copied().collect();
        let backward =
            builder.sequence_info(&reversed_positions, scan.repeats, settings.prescale_us)?;

        let segments = (0..scan.num_sweeps)
            .map(|index| {
                let (start_pos, stop_pos, info) = if index % 2 == 0 {
                    (start, stop, forward.clone())
                } else {
                    (stop, start, backward.clone())
                };
                PlannedSegment {
                    segment: SweepSegment {
                        index,
                        start_pos,
                        stop_pos,
                        trigger_resource_id: TriggerId::for_segment(index),
                    },
                    motion: motion_envelope(start_pos, stop_pos, sweep_time, scan.runup),
                    program: TriggerProgram::SequenceTable(info),
                }
            })
            .collect();

        Ok(Self::assemble(
            segments,
            scan.duration_per_sample,
            settings,
        ))
    }

    fn assemble(
        segments: Vec<PlannedSegment>,
        duration_per_sample: f64,
        settings: &PlanSettings,
    ) -> Self {
        let total_event_count = segments
            .iter()
            .map(|s| s.program.expected_pulses())
            .sum();
        Self {
            segments,
            writer: TriggerInfo {
                total_event_count,
                trigger_mode: settings.trigger_mode,
                per_event_exposure: duration_per_sample,
                deadtime: settings.deadtime,
            },
        }
    }

    /// Segments in execution order.
    pub fn segments(&self) -> &[PlannedSegment] {
        &self.segments
    }

    /// Writer configuration applied once before the first segment.
    pub fn writer_info(&self) -> &TriggerInfo {
        &self.writer
    }

    /// Events expected over the whole scan.
    pub fn total_events(&self) -> u64 {
        self.writer.total_event_count
    }

    /// Trigger kinds each pool slot must support for this plan.
    pub fn required_kinds(&self) -> Vec<(TriggerId, TriggerKind)> {
        let mut kinds: Vec<(TriggerId, TriggerKind)> = self
            .segments
            .iter()
            .map(|s| (s.segment.trigger_resource_id, s.program.kind()))
            .collect();
        kinds.sort_by_key(|(id, _)| id.index());
        kinds.dedup();
        kinds
    }
}
