//! Error types for fly-scan planning and orchestration.
//!
//! `FlyScanError` is the single error type returned by the crate. It separates
//! failures that are detected before any hardware is touched from failures that
//! happen while a scan session holds the hardware:
//!
//! - **`InvalidScanSpec`**: the requested scan or position list cannot be turned
//!   into a trigger program (too few samples, degenerate or non-finite bounds,
//!   empty position list). Raised during planning, never after staging.
//! - **`EncoderRange`**: a computed encoder count does not fit the trigger
//!   device's 32-bit position registers.
//! - **`DeviceTimeout`** / **`Device`**: a collaborator failed to acknowledge a
//!   `stage`/`prepare`/`kickoff`/`complete` call in time, or returned an error.
//! - **`Cancelled`**: the caller cancelled the scan at a suspension point.
//! - **`OrchestrationAbort`**: wraps any of the above when it ends an active
//!   session, together with the errors collected during teardown.
//!
//! Collaborator traits return `anyhow::Result`; the orchestrator converts those
//! failures into `Device` with the original error kept as `source`.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::orchestrator::{Operation, Resource};

/// Convenience alias for results using the crate error type.
pub type ScanResult<T> = std::result::Result<T, FlyScanError>;

/// Boxed collaborator error, converted from `anyhow::Error`.
pub type DeviceError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum FlyScanError {
    #[error("Invalid scan specification: {0}")]
    InvalidScanSpec(String),

    #[error("Encoder count {count} for position {position} is outside the device range [{min}, {max}]")]
    EncoderRange {
        position: f64,
        count: i64,
        min: i64,
        max: i64,
    },

    #[error("{resource} did not acknowledge {operation} within {timeout:?}")]
    DeviceTimeout {
        resource: Resource,
        operation: Operation,
        timeout: Duration,
    },

    #[error("{resource} {operation} failed: {source}")]
    Device {
        resource: Resource,
        operation: Operation,
        #[source]
        source: DeviceError,
    },

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Scan aborted{}: {cause}", segment_suffix(.segment))]
    OrchestrationAbort {
        segment: Option<usize>,
        #[source]
        cause: Box<FlyScanError>,
        teardown_errors: Vec<FlyScanError>,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn segment_suffix(segment: &Option<usize>) -> String {
    match segment {
        Some(index) => format!(" in segment {index}"),
        None => String::new(),
    }
}

impl FlyScanError {
    /// The failure that ended the scan, looking through `OrchestrationAbort`.
    pub fn root_cause(&self) -> &FlyScanError {
        match self {
            FlyScanError::OrchestrationAbort { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Errors recorded while tearing down an aborted session.
    pub fn teardown_errors(&self) -> &[FlyScanError] {
        match self {
            FlyScanError::OrchestrationAbort {
                teardown_errors, ..
            } => teardown_errors,
            _ => &[],
        }
    }

    /// True for errors raised before any hardware interaction.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FlyScanError::InvalidScanSpec(_) | FlyScanError::EncoderRange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::TriggerId;

    #[test]
    fn test_error_display() {
        let err = FlyScanError::InvalidScanSpec("num_samples must be >= 2".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid scan specification: num_samples must be >= 2"
        );
    }

    #[test]
    fn test_timeout_display_names_resource() {
        let err = FlyScanError::DeviceTimeout {
            resource: Resource::Trigger(TriggerId::B),
            operation: Operation::Kickoff,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.to_string(), "trigger_b did not acknowledge kickoff within 1s");
    }

    #[test]
    fn test_root_cause_survives_abort() {
        let err = FlyScanError::OrchestrationAbort {
            segment: Some(2),
            cause: Box::new(FlyScanError::Cancelled),
            teardown_errors: vec![FlyScanError::DeviceTimeout {
                resource: Resource::Motion,
                operation: Operation::Stop,
                timeout: Duration::from_millis(50),
            }],
        };
        assert!(matches!(err.root_cause(), FlyScanError::Cancelled));
        assert_eq!(err.teardown_errors().len(), 1);
        assert_eq!(err.to_string(), "Scan aborted in segment 2: Scan cancelled");
    }

    #[test]
    fn test_device_error_keeps_source() {
        let err = FlyScanError::Device {
            resource: Resource::Writer,
            operation: Operation::Prepare,
            source: anyhow::anyhow!("file already open").into(),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("file already open"));
        assert!(!err.is_validation());
    }
}
