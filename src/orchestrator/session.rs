//! Session state machine and resource bookkeeping for one scan call.
//!
//! ```text
//! Idle -> Staged -> { Prepared(motion) -> Prepared(trigger_k) -> Armed(trigger_k)
//!                     -> Moving -> SegmentDone(n) }* -> Unstaged
//! ```
//!
//! Any failure jumps straight to `Unstaged` after teardown.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::FlyScanError;
use crate::sweep::TriggerId;

/// A hardware resource held by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    /// The scanned axis
    Motion,
    /// One of the two trigger resources
    Trigger(TriggerId),
    /// Detector gate / file writer
    Writer,
    /// Trigger-hardware design store
    Designs,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Motion => write!(f, "motion"),
            Resource::Trigger(id) => write!(f, "{id}"),
            Resource::Writer => write!(f, "writer"),
            Resource::Designs => write!(f, "designs"),
        }
    }
}

/// A handshake call on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Reserve for the scan
    Stage,
    /// Apply a persisted design
    ApplyDesign,
    /// Load segment parameters
    Prepare,
    /// Start / arm
    Kickoff,
    /// Wait for completion
    Complete,
    /// Abort
    Stop,
    /// Release
    Unstage,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Stage => "stage",
            Operation::ApplyDesign => "apply_design",
            Operation::Prepare => "prepare",
            Operation::Kickoff => "kickoff",
            Operation::Complete => "complete",
            Operation::Stop => "stop",
            Operation::Unstage => "unstage",
        };
        f.write_str(name)
    }
}

/// Orchestration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing touched yet
    Idle,
    /// All resources staged, writer not yet prepared
    Staged,
    /// Resource has acknowledged its segment parameters
    Prepared(Resource),
    /// Trigger resource is armed
    Armed(Resource),
    /// Motion kicked off
    Moving,
    /// Motion and trigger of segment `n` both reported done
    SegmentDone(usize),
    /// Resources released
    Unstaged,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::Staged => write!(f, "STAGED"),
            SessionState::Prepared(r) => write!(f, "PREPARED({r})"),
            SessionState::Armed(r) => write!(f, "ARMED({r})"),
            SessionState::Moving => write!(f, "MOVING(motion)"),
            SessionState::SegmentDone(n) => write!(f, "SEGMENT_DONE({n})"),
            SessionState::Unstaged => write!(f, "UNSTAGED"),
        }
    }
}

/// Which resources need stopping if the session ends early.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveResources {
    /// Motion has been prepared (and may be moving)
    pub motion: bool,
    /// Trigger resource that has been prepared or armed
    pub trigger: Option<TriggerId>,
}

/// Mutable state of one scan call.
#[derive(Debug)]
pub struct OrchestrationSession {
    id: Uuid,
    state: SessionState,
    history: Vec<SessionState>,
    active: ActiveResources,
    segment: Option<usize>,
    segments_completed: usize,
    teardown_errors: Vec<FlyScanError>,
}

impl OrchestrationSession {
    /// New session in `Idle`.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
            active: ActiveResources::default(),
            segment: None,
            segments_completed: 0,
            teardown_errors: Vec::new(),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Record a state transition.
    pub fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Begin segment `index`.
    pub fn begin_segment(&mut self, index: usize) {
        self.segment = Some(index);
    }

    /// Segment in progress, if any.
    pub fn current_segment(&self) -> Option<usize> {
        self.segment
    }

    /// Mark the segment finished; nothing is left running.
    pub fn finish_segment(&mut self, index: usize) {
        self.active = ActiveResources::default();
        self.segment = None;
        self.segments_completed += 1;
        self.transition(SessionState::SegmentDone(index));
    }

    /// Segments that reached `SegmentDone`.
    pub fn segments_completed(&self) -> usize {
        self.segments_completed
    }

    /// Resources to stop on abort.
    pub fn active(&self) -> ActiveResources {
        self.active
    }

    /// Motion has been prepared.
    pub fn motion_engaged(&mut self) {
        self.active.motion = true;
    }

    /// A trigger resource has been handed a program.
    pub fn trigger_engaged(&mut self, id: TriggerId) {
        self.active.trigger = Some(id);
    }

    /// Record an error from teardown.
    pub fn record_teardown_error(&mut self, err: FlyScanError) {
        self.teardown_errors.push(err);
    }

    /// Take the recorded teardown errors.
    pub fn take_teardown_errors(&mut self) -> Vec<FlyScanError> {
        std::mem::take(&mut self.teardown_errors)
    }
}

impl Default for OrchestrationSession {
    fn default() -> Self {
        Self::new()
    }
}
