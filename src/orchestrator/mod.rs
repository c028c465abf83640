//! Dual-flyer orchestration of motion, trigger and data-writer hardware.
//!
//! The three subsystems run on independent clocks, so consistency comes only
//! from the order of the handshake calls:
//!
//! 1. Stage everything (applying the trigger design first, if one is set)
//! 2. Prepare and kick off the writer once, with the total event count
//! 3. Per segment, using trigger resource `segment % 2`:
//!    motion prepare → trigger prepare → trigger kickoff (armed) →
//!    motion kickoff → motion complete → trigger complete
//! 4. Complete the writer, unstage everything
//!
//! The trigger is armed before motion starts so no crossing is missed, and a
//! segment finishes completely before the next one is prepared.
//!
//! Each call is bounded by a timeout and races the cancel token. Any failure
//! after the session starts stops whatever is active, unstages all resources
//! and is returned as [`FlyScanError::OrchestrationAbort`]; errors during that
//! teardown are collected alongside, never in place of, the original cause.
//! Nothing already written is removed.

mod cancel;
mod pool;
mod session;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capabilities::{DataWriter, DesignStore, FlyMotor};
use crate::error::{FlyScanError, ScanResult};
use crate::plan::{PlannedSegment, ScanPlan};

pub use crate::sweep::TriggerId;
pub use cancel::{CancelToken, Canceller};
pub use pool::TriggerPool;
pub use session::{ActiveResources, OrchestrationSession, Operation, Resource, SessionState};

/// Acknowledgement timeouts for each handshake step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeTimeouts {
    /// `stage` and design application
    pub stage: Duration,
    /// `prepare` (motion prepare includes the move to the run-up start)
    pub prepare: Duration,
    /// `kickoff`
    pub kickoff: Duration,
    /// Added to the planned move time for motion `complete`; used alone for
    /// trigger and writer `complete`
    pub complete_margin: Duration,
    /// Each `stop`/`unstage` call during teardown
    pub teardown: Duration,
}

impl Default for HandshakeTimeouts {
    fn default() -> Self {
        Self {
            stage: Duration::from_secs(5),
            prepare: Duration::from_secs(10),
            kickoff: Duration::from_secs(1),
            complete_margin: Duration::from_secs(5),
            teardown: Duration::from_secs(2),
        }
    }
}

/// Outcome of a scan that ran to completion.
#[derive(Debug)]
pub struct ScanReport {
    /// Session identifier
    pub session_id: Uuid,
    /// When staging began
    pub started_at: DateTime<Utc>,
    /// When the last resource was unstaged
    pub finished_at: DateTime<Utc>,
    /// Segments that reached `SegmentDone`
    pub segments_completed: usize,
    /// Events the writer was told to expect
    pub total_events: u64,
    /// Every state the session passed through
    pub states: Vec<SessionState>,
    /// Non-fatal errors from unstaging
    pub teardown_errors: Vec<FlyScanError>,
}

/// Drives one motion axis, two alternating trigger resources and a writer.
pub struct DualFlyerOrchestrator {
    motion: Arc<dyn FlyMotor>,
    triggers: TriggerPool,
    writer: Arc<dyn DataWriter>,
    design: Option<(Arc<dyn DesignStore>, String)>,
    timeouts: HandshakeTimeouts,
}

impl DualFlyerOrchestrator {
    /// Orchestrator with default timeouts and no design.
    pub fn new(
        motion: Arc<dyn FlyMotor>,
        triggers: TriggerPool,
        writer: Arc<dyn DataWriter>,
    ) -> Self {
        Self {
            motion,
            triggers,
            writer,
            design: None,
            timeouts: HandshakeTimeouts::default(),
        }
    }

    /// Replace the handshake timeouts.
    pub fn with_timeouts(mut self, timeouts: HandshakeTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Apply the named design from `store` while staging.
    pub fn with_design(mut self, store: Arc<dyn DesignStore>, name: impl Into<String>) -> Self {
        self.design = Some((store, name.into()));
        self
    }

    /// Timeouts in effect.
    pub fn timeouts(&self) -> &HandshakeTimeouts {
        &self.timeouts
    }

    /// Run `plan` to completion.
    pub async fn run(&self, plan: &ScanPlan) -> ScanResult<ScanReport> {
        self.run_until(plan, CancelToken::never()).await
    }

    /// Run `plan`, stopping early if `cancel` fires.
    pub async fn run_until(&self, plan: &ScanPlan, mut cancel: CancelToken) -> ScanResult<ScanReport> {
        self.check_capabilities(plan)?;

        let mut session = OrchestrationSession::new();
        let started_at = Utc::now();
        info!(
            "Fly scan {} starting: {} segments, {} events",
            session.id(),
            plan.segments().len(),
            plan.total_events()
        );

        match self.drive(plan, &mut session, &mut cancel).await {
            Ok(()) => {
                self.unstage_all(&mut session).await;
                session.transition(SessionState::Unstaged);
                let teardown_errors = session.take_teardown_errors();
                if !teardown_errors.is_empty() {
                    warn!(
                        "Fly scan {} finished with {} unstage errors",
                        session.id(),
                        teardown_errors.len()
                    );
                }
                info!(
                    "Fly scan {} complete: {} segments",
                    session.id(),
                    session.segments_completed()
                );
                Ok(ScanReport {
                    session_id: session.id(),
                    started_at,
                    finished_at: Utc::now(),
                    segments_completed: session.segments_completed(),
                    total_events: plan.total_events(),
                    states: session.history().to_vec(),
                    teardown_errors,
                })
            }
            Err(cause) => {
                let segment = session.current_segment();
                error!(
                    "Fly scan {} aborting in state {}: {}",
                    session.id(),
                    session.state(),
                    cause
                );
                self.teardown(&mut session).await;
                session.transition(SessionState::Unstaged);
                Err(FlyScanError::OrchestrationAbort {
                    segment,
                    cause: Box::new(cause),
                    teardown_errors: session.take_teardown_errors(),
                })
            }
        }
    }

    fn check_capabilities(&self, plan: &ScanPlan) -> ScanResult<()> {
        for (id, kind) in plan.required_kinds() {
            if self.triggers.unsupported(id, kind) {
                return Err(FlyScanError::InvalidScanSpec(format!(
                    "{id} cannot run {kind:?} programs"
                )));
            }
        }
        Ok(())
    }

    async fn drive(
        &self,
        plan: &ScanPlan,
        session: &mut OrchestrationSession,
        cancel: &mut CancelToken,
    ) -> ScanResult<()> {
        let t = self.timeouts;

        if let Some((store, name)) = &self.design {
            info!("Applying trigger design '{}'", name);
            acknowledge(Resource::Designs, Operation::ApplyDesign, t.stage, cancel, store.apply(name))
                .await?;
        }
        acknowledge(Resource::Motion, Operation::Stage, t.stage, cancel, self.motion.stage()).await?;
        for (id, trigger) in self.triggers.iter() {
            acknowledge(Resource::Trigger(id), Operation::Stage, t.stage, cancel, trigger.stage())
                .await?;
        }
        acknowledge(Resource::Writer, Operation::Stage, t.stage, cancel, self.writer.stage()).await?;
        session.transition(SessionState::Staged);

        let writer_info = plan.writer_info();
        acknowledge(
            Resource::Writer,
            Operation::Prepare,
            t.prepare,
            cancel,
            self.writer.prepare(writer_info),
        )
        .await?;
        session.transition(SessionState::Prepared(Resource::Writer));
        acknowledge(Resource::Writer, Operation::Kickoff, t.kickoff, cancel, self.writer.kickoff())
            .await?;
        session.transition(SessionState::Armed(Resource::Writer));

        for planned in plan.segments() {
            self.run_segment(planned, session, cancel).await?;
        }

        acknowledge(
            Resource::Writer,
            Operation::Complete,
            t.complete_margin,
            cancel,
            self.writer.complete(),
        )
        .await?;
        debug!("Writer complete after {} events", writer_info.total_event_count);
        Ok(())
    }

    async fn run_segment(
        &self,
        planned: &PlannedSegment,
        session: &mut OrchestrationSession,
        cancel: &mut CancelToken,
    ) -> ScanResult<()> {
        let t = self.timeouts;
        let index = planned.segment.index;
        let id = planned.segment.trigger_resource_id;
        let trigger = self.triggers.get(id);
        let trigger_resource = Resource::Trigger(id);

        session.begin_segment(index);
        info!(
            "Segment {}: {} -> {} using {}",
            index, planned.segment.start_pos, planned.segment.stop_pos, id
        );

        session.motion_engaged();
        let handle = acknowledge(
            Resource::Motion,
            Operation::Prepare,
            t.prepare,
            cancel,
            self.motion.prepare(&planned.motion),
        )
        .await?;
        session.transition(SessionState::Prepared(Resource::Motion));

        session.trigger_engaged(id);
        acknowledge(
            trigger_resource,
            Operation::Prepare,
            t.prepare,
            cancel,
            trigger.prepare(&planned.program),
        )
        .await?;
        session.transition(SessionState::Prepared(trigger_resource));

        acknowledge(trigger_resource, Operation::Kickoff, t.kickoff, cancel, trigger.kickoff())
            .await?;
        session.transition(SessionState::Armed(trigger_resource));

        acknowledge(
            Resource::Motion,
            Operation::Kickoff,
            t.kickoff,
            cancel,
            self.motion.kickoff(handle),
        )
        .await?;
        session.transition(SessionState::Moving);

        let move_time = Duration::try_from_secs_f64(planned.motion.time_for_move)
            .unwrap_or(Duration::MAX)
            .saturating_add(t.complete_margin);
        acknowledge(
            Resource::Motion,
            Operation::Complete,
            move_time,
            cancel,
            self.motion.complete(handle),
        )
        .await?;
        acknowledge(
            trigger_resource,
            Operation::Complete,
            t.complete_margin,
            cancel,
            trigger.complete(),
        )
        .await?;

        session.finish_segment(index);
        info!("Segment {} done", index);
        Ok(())
    }

    /// Stop what is active, then release everything. Never cancelled.
    async fn teardown(&self, session: &mut OrchestrationSession) {
        let active = session.active();
        if active.motion {
            self.best_effort(session, Resource::Motion, Operation::Stop, self.motion.stop())
                .await;
        }
        if let Some(id) = active.trigger {
            let trigger = self.triggers.get(id);
            self.best_effort(session, Resource::Trigger(id), Operation::Stop, trigger.stop())
                .await;
        }
        self.unstage_all(session).await;
    }

    async fn unstage_all(&self, session: &mut OrchestrationSession) {
        self.best_effort(session, Resource::Motion, Operation::Unstage, self.motion.unstage())
            .await;
        for (id, trigger) in self.triggers.iter() {
            self.best_effort(session, Resource::Trigger(id), Operation::Unstage, trigger.unstage())
                .await;
        }
        self.best_effort(session, Resource::Writer, Operation::Unstage, self.writer.unstage())
            .await;
    }

    async fn best_effort<F>(
        &self,
        session: &mut OrchestrationSession,
        resource: Resource,
        operation: Operation,
        call: F,
    ) where
        F: Future<Output = anyhow::Result<()>>,
    {
        let mut never = CancelToken::never();
        if let Err(err) =
            acknowledge(resource, operation, self.timeouts.teardown, &mut never, call).await
        {
            warn!("Teardown: {}", err);
            session.record_teardown_error(err);
        }
    }
}

impl std::fmt::Debug for DualFlyerOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualFlyerOrchestrator")
            .field("triggers", &self.triggers)
            .field("design", &self.design.as_ref().map(|(_, name)| name))
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// Await one handshake call, bounded by `limit` and raced against `cancel`.
async fn acknowledge<T, F>(
    resource: Resource,
    operation: Operation,
    limit: Duration,
    cancel: &mut CancelToken,
    call: F,
) -> ScanResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    debug!("{} {}", resource, operation);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FlyScanError::Cancelled),
        outcome = tokio::time::timeout(limit, call) => match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(FlyScanError::Device {
                resource,
                operation,
                source: source.into(),
            }),
            Err(_) => Err(FlyScanError::DeviceTimeout {
                resource,
                operation,
                timeout: limit,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncoderConfig;
    use crate::hardware::mock::{CallLog, MockMotor, MockTrigger, MockWriter, Scripted};
    use crate::plan::PlanSettings;
    use crate::sweep::ScanSpecification;
    use tracing_test::traced_test;

    fn plan(num_sweeps: usize) -> ScanPlan {
        let spec = ScanSpecification::new(0.0, 10.0, 11, 0.01).with_sweeps(num_sweeps);
        let encoder = EncoderConfig::new(-1e-4, 0).unwrap();
        ScanPlan::uniform(&spec, &encoder, &PlanSettings::default()).unwrap()
    }

    fn orchestrator(log: &CallLog, trigger_b: MockTrigger) -> DualFlyerOrchestrator {
        DualFlyerOrchestrator::new(
            Arc::new(MockMotor::new(log.clone())),
            TriggerPool::new(
                Arc::new(MockTrigger::new("trigger_a", log.clone())),
                Arc::new(trigger_b),
            ),
            Arc::new(MockWriter::new(log.clone())),
        )
    }

    #[traced_test]
    #[tokio::test]
    async fn test_segments_are_logged() {
        let log = CallLog::new();
        let report = orchestrator(&log, MockTrigger::new("trigger_b", log.clone()))
            .run(&plan(2))
            .await
            .unwrap();

        assert_eq!(report.segments_completed, 2);
        assert!(logs_contain("Segment 0: 0 -> 10 using trigger_a"));
        assert!(logs_contain("Segment 1: 10 -> 0 using trigger_b"));
        assert!(logs_contain("Segment 1 done"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_abort_and_teardown_are_logged() {
        let log = CallLog::new();
        let err = orchestrator(&log, MockTrigger::new("trigger_b", log.clone()).fail_on("kickoff"))
            .run(&plan(2))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FlyScanError::OrchestrationAbort {
                segment: Some(1),
                ..
            }
        ));
        assert!(logs_contain("aborting in state PREPARED(trigger_b)"));
    }

    #[tokio::test]
    async fn test_abort_display_names_segment() {
        let log = CallLog::new();
        let err = orchestrator(&log, MockTrigger::new("trigger_b", log.clone()).fail_on("prepare"))
            .run(&plan(2))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("Scan aborted in segment 1: trigger_b prepare failed"));
    }
}
