//! Trigger programs for the position-triggering hardware.
//!
//! Two strategies:
//!
//! - [`pcomp`]: uniform spacing, programmed as a threshold-compare block
//!   (start count, step, pulse count, direction)
//! - [`seq_table`]: arbitrary target positions, programmed as a sequencer
//!   table with one row per position
//!
//! [`TriggerProgramBuilder`] binds an [`EncoderConfig`] and the row/pulse
//! settings so callers only supply positions.

pub mod pcomp;
pub mod seq_table;

use serde::{Deserialize, Serialize};

use crate::encoder::EncoderConfig;
use crate::error::{FlyScanError, ScanResult};

pub use pcomp::{Direction, ThresholdCompareProgram};
pub use seq_table::{
    OutputPattern, Row, SeqCondition, SeqRowTemplate, SequenceTable, MAX_SEQ_TABLE_ROWS, OUTA,
    OUTB, OUTC, OUTD, OUTE, OUTF,
};

/// Which kind of trigger hardware a program targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Position-compare block
    ThresholdCompare,
    /// Sequencer block
    SequenceTable,
}

/// A sequence table together with how the sequencer should play it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeqTableInfo {
    /// Rows to load
    pub table: SequenceTable,
    /// Passes through the whole table
    pub repeats: u32,
    /// Duration of one phase tick in microseconds
    pub prescale_us: f64,
}

/// Program loaded into one trigger resource for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerProgram {
    /// Uniformly spaced pulses
    ThresholdCompare(ThresholdCompareProgram),
    /// One row per target position
    SequenceTable(SeqTableInfo),
}

impl TriggerProgram {
    /// Hardware kind needed to run this program.
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerProgram::ThresholdCompare(_) => TriggerKind::ThresholdCompare,
            TriggerProgram::SequenceTable(_) => TriggerKind::SequenceTable,
        }
    }

    /// Trigger events the program produces when run to completion.
    pub fn expected_pulses(&self) -> u64 {
        match self {
            TriggerProgram::ThresholdCompare(p) => u64::from(p.pulse_count),
            TriggerProgram::SequenceTable(info) => {
                info.table.pulses_per_pass() * u64::from(info.repeats)
            }
        }
    }
}

/// Builds trigger programs for one encoder.
#[derive(Debug, Clone)]
pub struct TriggerProgramBuilder {
    encoder: EncoderConfig,
    pulse_width: u32,
    row: SeqRowTemplate,
}

impl TriggerProgramBuilder {
    /// Builder with a one-count pulse width and the default row template.
    pub fn new(encoder: EncoderConfig) -> Self {
        Self {
            encoder,
            pulse_width: 1,
            row: SeqRowTemplate::default(),
        }
    }

    /// Set the threshold-compare pulse width in counts.
    pub fn with_pulse_width(mut self, pulse_width: u32) -> Self {
        self.pulse_width = pulse_width;
        self
    }

    /// Set the timing/outputs copied into every sequence-table row.
    pub fn with_row_template(mut self, row: SeqRowTemplate) -> Self {
        self.row = row;
        self
    }

    /// Encoder used for conversions.
    pub fn encoder(&self) -> &EncoderConfig {
        &self.encoder
    }

    /// Uniform strategy: `num` samples from `start` to `stop` inclusive.
    pub fn uniform(&self, start: f64, stop: f64, num: usize) -> ScanResult<ThresholdCompareProgram> {
        pcomp::uniform(start, stop, num, &self.encoder, self.pulse_width)
    }

    /// Sequence-table strategy: one row per target position.
    pub fn sequence(&self, positions: &[f64]) -> ScanResult<SequenceTable> {
        seq_table::from_positions(positions, &self.encoder, &self.row)
    }

    /// Sequence table wrapped with its repeat count and prescale.
    pub fn sequence_info(
        &self,
        positions: &[f64],
        repeats: u32,
        prescale_us: f64,
    ) -> ScanResult<SeqTableInfo> {
        if repeats == 0 {
            return Err(FlyScanError::InvalidScanSpec(
                "sequence table repeats must be at least 1".to_string(),
            ));
        }
        if !(prescale_us.is_finite() && prescale_us > 0.0) {
            return Err(FlyScanError::InvalidScanSpec(format!(
                "sequence table prescale must be positive, got {prescale_us}"
            )));
        }
        Ok(SeqTableInfo {
            table: self.sequence(positions)?,
            repeats,
            prescale_us,
        })
    }
}
