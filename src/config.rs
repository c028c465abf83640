//! Fly-scan configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/flyscan.toml` (base configuration)
//! 2. Environment variables prefixed with `FLYSCAN_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! FLYSCAN_APPLICATION__LOG_LEVEL=debug
//! FLYSCAN_ENCODER__RESOLUTION=-0.0001
//! FLYSCAN_TIMEOUTS__KICKOFF_MS=2000
//! FLYSCAN_TRIGGER__DESIGN=pcomp_reset
//! ```
//!
//! # Example
//!
//! ```no_run
//! use flyscan::config::FlyScanConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = FlyScanConfig::load()?;
//!     let encoder = config.encoder()?;
//!     println!("Resolution: {}", encoder.resolution);
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::DetectorTrigger;
use crate::encoder::EncoderConfig;
use crate::orchestrator::HandshakeTimeouts;
use crate::plan::{PlanSettings, SequenceScan};
use crate::trigger::{OutputPattern, SeqRowTemplate};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level fly-scan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlyScanConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Scanned-axis encoder
    pub encoder: EncoderSection,
    /// Handshake timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Trigger program settings
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// Data-writer settings
    #[serde(default)]
    pub writer: WriterConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Encoder calibration for the scanned axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderSection {
    /// User units per count; sign gives the count direction
    pub resolution: f64,
    /// Count at user position zero
    #[serde(default)]
    pub offset: i64,
}

/// Handshake timeouts in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// `stage` and design application
    #[serde(default = "default_stage_ms")]
    pub stage_ms: u64,
    /// `prepare`, including the move to the run-up start
    #[serde(default = "default_prepare_ms")]
    pub prepare_ms: u64,
    /// `kickoff`
    #[serde(default = "default_kickoff_ms")]
    pub kickoff_ms: u64,
    /// Added to the planned move time when waiting for motion to finish
    #[serde(default = "default_complete_margin_ms")]
    pub complete_margin_ms: u64,
    /// Each `stop`/`unstage` during teardown
    #[serde(default = "default_teardown_ms")]
    pub teardown_ms: u64,
}

/// Trigger program configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Threshold-compare pulse width in counts
    #[serde(default = "default_pulse_width")]
    pub pulse_width: u32,
    /// Sequencer tick in microseconds
    #[serde(default = "default_prescale_us")]
    pub prescale_us: f64,
    /// Passes through a sequence table per sweep
    #[serde(default = "default_table_repeats")]
    pub table_repeats: u32,
    /// Design applied while staging, if any
    #[serde(default)]
    pub design: Option<String>,
    /// Sequence-table row template
    #[serde(default)]
    pub row: RowConfig,
}

/// Sequence-table row template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowConfig {
    /// Phase 1 duration in prescaled ticks
    #[serde(default = "default_phase_time")]
    pub phase1_time: u32,
    /// Phase 2 duration in prescaled ticks
    #[serde(default = "default_phase_time")]
    pub phase2_time: u32,
    /// Output bitmask during phase 1 (bit 0 = OUTA)
    #[serde(default = "default_phase1_outputs")]
    pub phase1_outputs: u8,
    /// Output bitmask during phase 2
    #[serde(default)]
    pub phase2_outputs: u8,
}

/// Data-writer configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Minimum gap between events in seconds
    #[serde(default = "default_deadtime_s")]
    pub deadtime_s: f64,
    /// Detector gating mode
    #[serde(default)]
    pub trigger_mode: DetectorTrigger,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "flyscan".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stage_ms() -> u64 {
    5000
}

fn default_prepare_ms() -> u64 {
    10000
}

fn default_kickoff_ms() -> u64 {
    1000
}

fn default_complete_margin_ms() -> u64 {
    5000
}

fn default_teardown_ms() -> u64 {
    2000
}

fn default_pulse_width() -> u32 {
    1
}

fn default_prescale_us() -> f64 {
    1.0
}

fn default_table_repeats() -> u32 {
    1
}

fn default_phase_time() -> u32 {
    1
}

fn default_phase1_outputs() -> u8 {
    crate::trigger::OUTA
}

fn default_deadtime_s() -> f64 {
    1e-5
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stage_ms: default_stage_ms(),
            prepare_ms: default_prepare_ms(),
            kickoff_ms: default_kickoff_ms(),
            complete_margin_ms: default_complete_margin_ms(),
            teardown_ms: default_teardown_ms(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            pulse_width: default_pulse_width(),
            prescale_us: default_prescale_us(),
            table_repeats: default_table_repeats(),
            design: None,
            row: RowConfig::default(),
        }
    }
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            phase1_time: default_phase_time(),
            phase2_time: default_phase_time(),
            phase1_outputs: default_phase1_outputs(),
            phase2_outputs: 0,
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            deadtime_s: default_deadtime_s(),
            trigger_mode: DetectorTrigger::default(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl FlyScanConfig {
    /// Defaults for everything, with the given encoder resolution.
    pub fn with_resolution(resolution: f64) -> Self {
        Self {
            application: ApplicationConfig::default(),
            encoder: EncoderSection {
                resolution,
                offset: 0,
            },
            timeouts: TimeoutConfig::default(),
            trigger: TriggerConfig::default(),
            writer: WriterConfig::default(),
        }
    }

    /// Load configuration from `config/flyscan.toml` and environment variables
    ///
    /// Precedence (highest first): `FLYSCAN_` environment variables, then the file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/flyscan.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed, a required field is
    /// missing, or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FLYSCAN_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns a ConfigError with a descriptive message for any validation failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let resolution = self.encoder.resolution;
        if !resolution.is_finite() || resolution == 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid encoder resolution {resolution}. Must be finite and non-zero"
            )));
        }

        if self.trigger.pulse_width == 0 {
            return Err(ConfigError::ValidationError(
                "trigger.pulse_width must be > 0".to_string(),
            ));
        }
        if !(self.trigger.prescale_us.is_finite() && self.trigger.prescale_us > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid trigger.prescale_us {}. Must be > 0",
                self.trigger.prescale_us
            )));
        }
        if self.trigger.table_repeats == 0 {
            return Err(ConfigError::ValidationError(
                "trigger.table_repeats must be > 0".to_string(),
            ));
        }
        if let Some(design) = &self.trigger.design {
            if design.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "trigger.design cannot be empty".to_string(),
                ));
            }
        }

        let row = &self.trigger.row;
        if row.phase1_time == 0 || row.phase2_time == 0 {
            return Err(ConfigError::ValidationError(
                "trigger.row phase times must be > 0".to_string(),
            ));
        }
        let all_outputs = crate::trigger::OUTA
            | crate::trigger::OUTB
            | crate::trigger::OUTC
            | crate::trigger::OUTD
            | crate::trigger::OUTE
            | crate::trigger::OUTF;
        if (row.phase1_outputs | row.phase2_outputs) & !all_outputs != 0 {
            return Err(ConfigError::ValidationError(format!(
                "trigger.row outputs use bits outside OUTA..OUTF (0x{all_outputs:02x})"
            )));
        }

        if !(self.writer.deadtime_s.is_finite() && self.writer.deadtime_s >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid writer.deadtime_s {}. Must be >= 0",
                self.writer.deadtime_s
            )));
        }

        Ok(())
    }

    /// Encoder calibration for planning.
    pub fn encoder(&self) -> Result<EncoderConfig, ConfigError> {
        EncoderConfig::new(self.encoder.resolution, self.encoder.offset)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Handshake timeouts for the orchestrator.
    pub fn timeouts(&self) -> HandshakeTimeouts {
        let t = &self.timeouts;
        HandshakeTimeouts {
            stage: Duration::from_millis(t.stage_ms),
            prepare: Duration::from_millis(t.prepare_ms),
            kickoff: Duration::from_millis(t.kickoff_ms),
            complete_margin: Duration::from_millis(t.complete_margin_ms),
            teardown: Duration::from_millis(t.teardown_ms),
        }
    }

    /// Program and writer settings for planning.
    pub fn plan_settings(&self) -> PlanSettings {
        let row = &self.trigger.row;
        PlanSettings {
            pulse_width: self.trigger.pulse_width,
            row: SeqRowTemplate {
                phase1_time: row.phase1_time,
                phase2_time: row.phase2_time,
                outputs: OutputPattern {
                    phase1: row.phase1_outputs,
                    phase2: row.phase2_outputs,
                },
            },
            prescale_us: self.trigger.prescale_us,
            trigger_mode: self.writer.trigger_mode,
            deadtime: self.writer.deadtime_s,
        }
    }

    /// Sequence scan over `positions` using the configured table repeats.
    pub fn sequence_scan(&self, positions: Vec<f64>, duration_per_sample: f64) -> SequenceScan {
        SequenceScan::new(positions, duration_per_sample).with_repeats(self.trigger.table_repeats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_minimal_file_fills_defaults() {
        let file = write_config("[encoder]\nresolution = -0.0001\n");
        let config = FlyScanConfig::load_from(file.path()).unwrap();

        assert_eq!(config.encoder.resolution, -0.0001);
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.timeouts.kickoff_ms, 1000);
        assert_eq!(config.trigger.pulse_width, 1);
        assert_eq!(config.writer.deadtime_s, 1e-5);
        assert_eq!(config.plan_settings(), PlanSettings::default());
        assert_eq!(config.timeouts(), HandshakeTimeouts::default());
    }

    #[test]
    #[serial]
    fn test_missing_resolution_is_load_error() {
        let file = write_config("[application]\nname = \"bench\"\n");
        let err = FlyScanConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config(
            "[encoder]\nresolution = -0.0001\n\n[timeouts]\nkickoff_ms = 500\n",
        );
        std::env::set_var("FLYSCAN_TIMEOUTS__KICKOFF_MS", "2500");
        std::env::set_var("FLYSCAN_TRIGGER__DESIGN", "pcomp_reset");
        let result = FlyScanConfig::load_from(file.path());
        std::env::remove_var("FLYSCAN_TIMEOUTS__KICKOFF_MS");
        std::env::remove_var("FLYSCAN_TRIGGER__DESIGN");

        let config = result.unwrap();
        assert_eq!(config.timeouts().kickoff, Duration::from_millis(2500));
        assert_eq!(config.trigger.design.as_deref(), Some("pcomp_reset"));
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let config = FlyScanConfig::with_resolution(0.0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid encoder resolution"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = FlyScanConfig::with_resolution(1e-4);
        config.application.log_level = "verbose".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Invalid log_level"));
    }

    #[test]
    fn test_row_outputs_outside_range_rejected() {
        let mut config = FlyScanConfig::with_resolution(1e-4);
        config.trigger.row.phase2_outputs = 0x40;
        assert!(config.validate().is_err());
        config.trigger.row.phase2_outputs = crate::trigger::OUTB;
        assert!(config.validate().is_ok());
        assert_eq!(config.plan_settings().row.outputs.phase2, crate::trigger::OUTB);
    }

    #[test]
    fn test_encoder_conversion() {
        let mut config = FlyScanConfig::with_resolution(-1e-4);
        config.encoder.offset = 42;
        let encoder = config.encoder().unwrap();
        assert_eq!(encoder.offset, 42);
        assert!(encoder.is_inverted());
    }

    #[test]
    fn test_sequence_scan_uses_table_repeats() {
        let mut config = FlyScanConfig::with_resolution(1e-4);
        config.trigger.table_repeats = 3;
        let scan = config.sequence_scan(vec![1.0, 2.0, 4.0], 0.1);
        assert_eq!(scan.repeats, 3);
        assert_eq!(scan.num_sweeps, 1);
    }
}
