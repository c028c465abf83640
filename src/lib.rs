//! Fly-scan trigger coordination.
//!
//! A fly scan samples a detector while a motor moves continuously. Trigger
//! hardware compares live encoder counts against a program and fires the
//! detector at the requested positions, so the scan is only as good as the
//! program and the ordering of the hardware handshake. This crate provides:
//!
//! - [`encoder`]: user-unit to encoder-count conversion with explicit rounding
//! - [`trigger`]: threshold-compare and sequence-table trigger programs
//! - [`sweep`] and [`plan`]: ping-pong sweep planning and complete scan plans
//! - [`orchestrator`]: the dual-flyer handshake across motion, two trigger
//!   resources and a data writer, with timeouts, cancellation and teardown
//!
//! Hardware is reached only through the async traits in [`capabilities`];
//! [`hardware::mock`] implements them for tests.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = FlyScanConfig::load()?;
//! flyscan::logging::init_logging(&config.application.log_level);
//!
//! let spec = ScanSpecification::new(0.0, 10.0, 11, 0.01).with_sweeps(4);
//! let plan = ScanPlan::uniform(&spec, &config.encoder()?, &config.plan_settings())?;
//!
//! let orchestrator = DualFlyerOrchestrator::new(motor, TriggerPool::new(pcomp1, pcomp2), writer)
//!     .with_timeouts(config.timeouts());
//! let report = orchestrator.run(&plan).await?;
//! ```

pub mod capabilities;
pub mod config;
pub mod encoder;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod orchestrator;
pub mod plan;
pub mod positions;
pub mod sweep;
pub mod trigger;

pub use capabilities::{
    DataWriter, DesignStore, DetectorTrigger, FlyMotor, FlyMotorInfo, MotionHandle,
    TriggerDevice, TriggerInfo,
};
pub use config::{ConfigError, FlyScanConfig};
pub use encoder::{EncoderConfig, Rounding};
pub use error::{FlyScanError, ScanResult};
pub use orchestrator::{
    CancelToken, Canceller, DualFlyerOrchestrator, HandshakeTimeouts, ScanReport, SessionState,
    TriggerPool,
};
pub use plan::{PlanSettings, ScanPlan, SequenceScan};
pub use sweep::{ScanSpecification, SweepPlanner, SweepSegment, TriggerId};
pub use trigger::{TriggerKind, TriggerProgram, TriggerProgramBuilder};
