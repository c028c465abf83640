//! Sequence-table programs for non-uniformly spaced trigger positions.
//!
//! Each row waits for the encoder count to pass its `position_count` (above or
//! below, per `condition`), then plays two timed output phases. One row per
//! target position; the comparison sense is derived per consecutive pair so a
//! trajectory that doubles back within a sweep still triggers every row.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoder::{device_count, EncoderConfig, Rounding};
use crate::error::{FlyScanError, ScanResult};

/// Maximum number of rows the sequencer block accepts.
pub const MAX_SEQ_TABLE_ROWS: usize = 4096;

/// Output bit for OUTA in an [`OutputPattern`] phase mask.
pub const OUTA: u8 = 1 << 0;
/// Output bit for OUTB.
pub const OUTB: u8 = 1 << 1;
/// Output bit for OUTC.
pub const OUTC: u8 = 1 << 2;
/// Output bit for OUTD.
pub const OUTD: u8 = 1 << 3;
/// Output bit for OUTE.
pub const OUTE: u8 = 1 << 4;
/// Output bit for OUTF.
pub const OUTF: u8 = 1 << 5;

/// Position condition a row waits on before playing its phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeqCondition {
    /// Encoder count above the row position
    GreaterThan,
    /// Encoder count below the row position
    LessThan,
}

/// Output levels (OUTA..OUTF bitmask) during each of the two row phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputPattern {
    /// Outputs held during phase 1
    pub phase1: u8,
    /// Outputs held during phase 2
    pub phase2: u8,
}

/// One sequencer row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Times the row is played (>= 1)
    pub repeats: u16,
    /// Position condition
    pub condition: SeqCondition,
    /// Threshold in encoder counts
    pub position_count: i32,
    /// Phase 1 and phase 2 durations, in prescaled ticks
    pub phase_durations: [u32; 2],
    /// Output levels per phase
    pub output_pattern: OutputPattern,
}

/// Timing and output fields shared by every generated row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqRowTemplate {
    /// Phase 1 duration in prescaled ticks
    pub phase1_time: u32,
    /// Phase 2 duration in prescaled ticks
    pub phase2_time: u32,
    /// Output pattern per phase
    pub outputs: OutputPattern,
}

impl Default for SeqRowTemplate {
    fn default() -> Self {
        Self {
            phase1_time: 1,
            phase2_time: 1,
            outputs: OutputPattern {
                phase1: OUTA,
                phase2: 0,
            },
        }
    }
}

/// Ordered sequencer program, one row per target position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceTable {
    /// Rows in execution order
    pub rows: Vec<Row>,
}

impl SequenceTable {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Trigger pulses produced by one pass through the table.
    pub fn pulses_per_pass(&self) -> u64 {
        self.rows.iter().map(|row| u64::from(row.repeats)).sum()
    }
}

/// Build a sequence table from ordered target positions.
///
/// Row `i` compares `GreaterThan` when the next position's count is above its
/// own and `LessThan` otherwise; the last row reuses the previous row's
/// condition. A single-row table compares `GreaterThan`.
pub fn from_positions(
    positions: &[f64],
    encoder: &EncoderConfig,
    template: &SeqRowTemplate,
) -> ScanResult<SequenceTable> {
    if positions.is_empty() {
        return Err(FlyScanError::InvalidScanSpec(
            "sequence table needs at least one target position".to_string(),
        ));
    }
    if positions.len() > MAX_SEQ_TABLE_ROWS {
        return Err(FlyScanError::InvalidScanSpec(format!(
            "{} target positions exceed the {MAX_SEQ_TABLE_ROWS}-row sequence table",
            positions.len()
        )));
    }
    if let Some(bad) = positions.iter().find(|p| !p.is_finite()) {
        return Err(FlyScanError::InvalidScanSpec(format!(
            "target position {bad} is not finite"
        )));
    }
    encoder.validate()?;

    let counts = positions
        .iter()
        .map(|&p| device_count(p, encoder.to_counts(p, Rounding::Sample)))
        .collect::<ScanResult<Vec<i32>>>()?;

    let mut conditions: Vec<SeqCondition> = counts
        .windows(2)
        .map(|pair| {
            if pair[1] > pair[0] {
                SeqCondition::GreaterThan
            } else {
                SeqCondition::LessThan
            }
        })
        .collect();
    let last = conditions
        .last()
        .copied()
        .unwrap_or(SeqCondition::GreaterThan);
    conditions.push(last);

    let rows: Vec<Row> = counts
        .iter()
        .zip(conditions)
        .map(|(&position_count, condition)| Row {
            repeats: 1,
            condition,
            position_count,
            phase_durations: [template.phase1_time, template.phase2_time],
            output_pattern: template.outputs,
        })
        .collect();

    debug!("Sequence table built with {} rows", rows.len());
    Ok(SequenceTable { rows })
}
