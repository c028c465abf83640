//! Flyable Hardware Capabilities
//!
//! The orchestrator drives three kinds of autonomous hardware through small
//! async capability traits. Each follows the same handshake:
//!
//! - `stage()` / `unstage()` bracket a whole scan (default no-ops)
//! - `prepare(..)` loads the segment parameters and returns once the device has
//!   acknowledged them
//! - `kickoff()` starts the device (for a trigger resource: arms it) and returns
//!   once it has started
//! - `complete()` returns once the device has finished
//! - `stop()` halts motion or disarms a trigger; the writer has no `stop` and is
//!   only unstaged, so data already written stays
//!
//! # Contract
//! - All methods take `&self`; implementations use interior mutability
//! - Methods return `anyhow::Result`; timeouts are applied by the caller, so an
//!   implementation may block for as long as the hardware needs
//! - Positions are in user units; trigger programs are already in encoder counts
//!
//! # Example
//!
//! ```rust,ignore
//! motion.prepare(&info).await?;          // move to start of run-up
//! trigger.prepare(&program).await?;
//! trigger.kickoff().await?;              // armed before motion starts
//! motion.kickoff(handle).await?;
//! motion.complete(handle).await?;
//! trigger.complete().await?;
//! ```

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::trigger::{TriggerKind, TriggerProgram};

/// Constant-velocity move request for a fly scan segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlyMotorInfo {
    /// Where the move starts (including run-up)
    pub start_position: f64,
    /// Where the move ends (including run-up)
    pub end_position: f64,
    /// Seconds from start to end
    pub time_for_move: f64,
}

impl FlyMotorInfo {
    /// Velocity in user units per second (signed).
    pub fn velocity(&self) -> f64 {
        (self.end_position - self.start_position) / self.time_for_move
    }
}

/// Handle identifying a prepared move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotionHandle(pub u64);

impl fmt::Display for MotionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "move#{}", self.0)
    }
}

/// How the data writer gates its detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorTrigger {
    /// One frame per gate pulse, with a fixed exposure
    #[default]
    ConstantGate,
    /// One frame per rising edge
    EdgeTrigger,
    /// Free-running on the writer's own clock
    Internal,
}

/// Data-writer configuration for a whole scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    /// Frames to expect across every segment
    pub total_event_count: u64,
    /// Gating mode
    pub trigger_mode: DetectorTrigger,
    /// Exposure per event in seconds
    pub per_event_exposure: f64,
    /// Minimum gap between events in seconds
    pub deadtime: f64,
}

/// Capability: constant-velocity motion along the scanned axis.
#[async_trait]
pub trait FlyMotor: Send + Sync {
    /// Reserve the axis for a scan.
    async fn stage(&self) -> Result<()> {
        Ok(())
    }

    /// Move to the start of the envelope and load the velocity profile.
    async fn prepare(&self, info: &FlyMotorInfo) -> Result<MotionHandle>;

    /// Start the move; returns once the axis is moving.
    async fn kickoff(&self, handle: MotionHandle) -> Result<()>;

    /// Returns once the move has ended.
    async fn complete(&self, handle: MotionHandle) -> Result<()>;

    /// Decelerate and hold position.
    async fn stop(&self) -> Result<()>;

    /// Release the axis.
    async fn unstage(&self) -> Result<()> {
        Ok(())
    }
}

/// Capability: position-triggering block (threshold-compare or sequencer).
#[async_trait]
pub trait TriggerDevice: Send + Sync {
    /// Program kinds this block can run.
    fn supports(&self, kind: TriggerKind) -> bool;

    /// Reserve the block for a scan.
    async fn stage(&self) -> Result<()> {
        Ok(())
    }

    /// Load a program. The block must not fire until kicked off.
    async fn prepare(&self, program: &TriggerProgram) -> Result<()>;

    /// Arm the block; returns once it reports active.
    async fn kickoff(&self) -> Result<()>;

    /// Returns once every programmed pulse has been emitted.
    async fn complete(&self) -> Result<()>;

    /// Disarm immediately.
    async fn stop(&self) -> Result<()>;

    /// Release the block.
    async fn unstage(&self) -> Result<()> {
        Ok(())
    }
}

/// Capability: detector gate and file writer counting trigger events.
#[async_trait]
pub trait DataWriter: Send + Sync {
    /// Open the writer for a scan.
    async fn stage(&self) -> Result<()> {
        Ok(())
    }

    /// Configure the expected event count and gating.
    async fn prepare(&self, info: &TriggerInfo) -> Result<()>;

    /// Start accepting events.
    async fn kickoff(&self) -> Result<()>;

    /// Returns once every expected event has been written.
    async fn complete(&self) -> Result<()>;

    /// Close the writer.
    async fn unstage(&self) -> Result<()> {
        Ok(())
    }
}

/// Persisted trigger-hardware configurations ("designs").
///
/// Applying a design resets the trigger hardware to a known wiring before a
/// scan; what a design contains is opaque here.
#[async_trait]
pub trait DesignStore: Send + Sync {
    /// Apply the named design.
    async fn apply(&self, name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_sign() {
        let forward = FlyMotorInfo {
            start_position: 0.0,
            end_position: 10.0,
            time_for_move: 5.0,
        };
        assert_eq!(forward.velocity(), 2.0);
        let back = FlyMotorInfo {
            start_position: 10.0,
            end_position: 0.0,
            time_for_move: 5.0,
        };
        assert_eq!(back.velocity(), -2.0);
    }

    #[test]
    fn test_detector_trigger_default() {
        assert_eq!(DetectorTrigger::default(), DetectorTrigger::ConstantGate);
        let json = serde_json::to_string(&DetectorTrigger::EdgeTrigger).unwrap();
        assert_eq!(json, "\"edge_trigger\"");
    }
}
