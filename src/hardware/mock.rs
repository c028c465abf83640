//! Mock Hardware Implementations
//!
//! Simulated flyable devices for exercising the orchestrator without hardware.
//! All mocks use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockMotor` - constant-velocity axis that tracks its position
//! - `MockTrigger` - trigger resource that records loaded programs
//! - `MockWriter` - data writer that records its trigger info
//! - `MockDesignStore` - records applied design names
//!
//! Every mock writes `"<name>.<action>"` into a shared [`CallLog`] before
//! acting, so tests can assert the exact cross-device call order. Faults are
//! scripted per action through [`Scripted`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};

use crate::capabilities::{
    DataWriter, DesignStore, FlyMotor, FlyMotorInfo, MotionHandle, TriggerDevice, TriggerInfo,
};
use crate::trigger::{TriggerKind, TriggerProgram};

// =============================================================================
// CallLog - shared call recorder
// =============================================================================

/// Ordered record of every call made on a set of mocks.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, entry: String) {
        self.entries.lock().await.push(entry);
    }

    /// Snapshot of every entry so far.
    pub async fn calls(&self) -> Vec<String> {
        self.entries.lock().await.clone()
    }

    /// Number of entries equal to `entry`.
    pub async fn count(&self, entry: &str) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.as_str() == entry)
            .count()
    }

    /// Entries that name `device` (e.g. `"trigger_a"`).
    pub async fn calls_for(&self, device: &str) -> Vec<String> {
        let prefix = format!("{device}.");
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

// =============================================================================
// Script - per-device fault injection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultKind {
    Fail,
    Hang,
}

#[derive(Debug, Clone)]
struct Fault {
    action: String,
    // 1-based call number; `None` matches every call
    nth: Option<usize>,
    kind: FaultKind,
}

/// Name, log, scripted faults and per-action call counters for one mock.
#[derive(Debug)]
pub struct Script {
    name: String,
    log: CallLog,
    faults: Vec<Fault>,
    latency: Duration,
    counts: Mutex<HashMap<String, usize>>,
}

impl Script {
    fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
            faults: Vec::new(),
            latency: Duration::ZERO,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Log the call, apply latency, then any matching fault.
    async fn step(&self, action: &str) -> Result<()> {
        let entry = format!("{}.{}", self.name, action);
        self.log.record(entry.clone()).await;

        let call = {
            let mut counts = self.counts.lock().await;
            let n = counts.entry(action.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        let fault = self
            .faults
            .iter()
            .find(|f| f.action == action && f.nth.map_or(true, |n| n == call));
        match fault.map(|f| f.kind) {
            Some(FaultKind::Fail) => bail!("{entry} failed (call {call})"),
            Some(FaultKind::Hang) => std::future::pending::<Result<()>>().await,
            None => Ok(()),
        }
    }
}

/// Builder methods for scripting mock faults.
pub trait Scripted: Sized {
    /// Mutable access to the mock's script.
    fn script_mut(&mut self) -> &mut Script;

    /// Every call to `action` returns an error.
    fn fail_on(mut self, action: &str) -> Self {
        self.script_mut().faults.push(Fault {
            action: action.to_string(),
            nth: None,
            kind: FaultKind::Fail,
        });
        self
    }

    /// Only the `nth` call (1-based) to `action` returns an error.
    fn fail_on_nth(mut self, action: &str, nth: usize) -> Self {
        self.script_mut().faults.push(Fault {
            action: action.to_string(),
            nth: Some(nth),
            kind: FaultKind::Fail,
        });
        self
    }

    /// Every call to `action` never returns.
    fn hang_on(mut self, action: &str) -> Self {
        self.script_mut().faults.push(Fault {
            action: action.to_string(),
            nth: None,
            kind: FaultKind::Hang,
        });
        self
    }

    /// Delay every call by `latency`.
    fn with_latency(mut self, latency: Duration) -> Self {
        self.script_mut().latency = latency;
        self
    }
}

// =============================================================================
// MockMotor - simulated fly axis
// =============================================================================

/// Mock fly axis.
///
/// `prepare` jumps to the envelope start and hands out a fresh handle;
/// `kickoff`/`complete` reject any other handle. `complete` lands on the
/// envelope end.
#[derive(Debug)]
pub struct MockMotor {
    script: Script,
    position: RwLock<f64>,
    prepared: RwLock<Vec<FlyMotorInfo>>,
    next_handle: AtomicU64,
    current: RwLock<Option<MotionHandle>>,
}

impl MockMotor {
    /// New axis at 0.0 logging as `"motion"`.
    pub fn new(log: CallLog) -> Self {
        Self {
            script: Script::new("motion", log),
            position: RwLock::new(0.0),
            prepared: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            current: RwLock::new(None),
        }
    }

    /// Current position.
    pub async fn position(&self) -> f64 {
        *self.position.read().await
    }

    /// Every move requested so far.
    pub async fn moves(&self) -> Vec<FlyMotorInfo> {
        self.prepared.read().await.clone()
    }

    async fn check_handle(&self, handle: MotionHandle) -> Result<FlyMotorInfo> {
        if *self.current.read().await != Some(handle) {
            bail!("unknown motion handle {handle}");
        }
        match self.prepared.read().await.last() {
            Some(info) => Ok(*info),
            None => bail!("no move prepared"),
        }
    }
}

impl Scripted for MockMotor {
    fn script_mut(&mut self) -> &mut Script {
        &mut self.script
    }
}

#[async_trait]
impl FlyMotor for MockMotor {
    async fn stage(&self) -> Result<()> {
        self.script.step("stage").await
    }

    async fn prepare(&self, info: &FlyMotorInfo) -> Result<MotionHandle> {
        self.script.step("prepare").await?;
        *self.position.write().await = info.start_position;
        self.prepared.write().await.push(*info);
        let handle = MotionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        *self.current.write().await = Some(handle);
        Ok(handle)
    }

    async fn kickoff(&self, handle: MotionHandle) -> Result<()> {
        self.script.step("kickoff").await?;
        self.check_handle(handle).await.map(|_| ())
    }

    async fn complete(&self, handle: MotionHandle) -> Result<()> {
        self.script.step("complete").await?;
        let info = self.check_handle(handle).await?;
        *self.position.write().await = info.end_position;
        *self.current.write().await = None;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.script.step("stop").await?;
        *self.current.write().await = None;
        Ok(())
    }

    async fn unstage(&self) -> Result<()> {
        self.script.step("unstage").await
    }
}

// =============================================================================
// MockTrigger - simulated trigger resource
// =============================================================================

/// Mock trigger resource.
///
/// Refuses a new program while armed, so overlapping segments surface as errors.
#[derive(Debug)]
pub struct MockTrigger {
    script: Script,
    kinds: Vec<TriggerKind>,
    programs: RwLock<Vec<TriggerProgram>>,
    armed: RwLock<bool>,
}

impl MockTrigger {
    /// Resource logging as `name`, supporting every program kind.
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            script: Script::new(name, log),
            kinds: vec![TriggerKind::ThresholdCompare, TriggerKind::SequenceTable],
            programs: RwLock::new(Vec::new()),
            armed: RwLock::new(false),
        }
    }

    /// Restrict the supported program kinds.
    pub fn with_kinds(mut self, kinds: &[TriggerKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Every program loaded so far.
    pub async fn programs(&self) -> Vec<TriggerProgram> {
        self.programs.read().await.clone()
    }

    /// Whether the resource is armed.
    pub async fn is_armed(&self) -> bool {
        *self.armed.read().await
    }
}

impl Scripted for MockTrigger {
    fn script_mut(&mut self) -> &mut Script {
        &mut self.script
    }
}

#[async_trait]
impl TriggerDevice for MockTrigger {
    fn supports(&self, kind: TriggerKind) -> bool {
        self.kinds.contains(&kind)
    }

    async fn stage(&self) -> Result<()> {
        self.script.step("stage").await
    }

    async fn prepare(&self, program: &TriggerProgram) -> Result<()> {
        self.script.step("prepare").await?;
        if *self.armed.read().await {
            bail!("{} is armed; cannot load a new program", self.script.name);
        }
        self.programs.write().await.push(program.clone());
        Ok(())
    }

    async fn kickoff(&self) -> Result<()> {
        self.script.step("kickoff").await?;
        *self.armed.write().await = true;
        Ok(())
    }

    async fn complete(&self) -> Result<()> {
        self.script.step("complete").await?;
        *self.armed.write().await = false;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.script.step("stop").await?;
        *self.armed.write().await = false;
        Ok(())
    }

    async fn unstage(&self) -> Result<()> {
        self.script.step("unstage").await
    }
}

// =============================================================================
// MockWriter - simulated data writer
// =============================================================================

/// Mock data writer logging as `"writer"`.
#[derive(Debug)]
pub struct MockWriter {
    script: Script,
    infos: RwLock<Vec<TriggerInfo>>,
}

impl MockWriter {
    /// New writer.
    pub fn new(log: CallLog) -> Self {
        Self {
            script: Script::new("writer", log),
            infos: RwLock::new(Vec::new()),
        }
    }

    /// Trigger info from every `prepare` call.
    pub async fn infos(&self) -> Vec<TriggerInfo> {
        self.infos.read().await.clone()
    }
}

impl Scripted for MockWriter {
    fn script_mut(&mut self) -> &mut Script {
        &mut self.script
    }
}

#[async_trait]
impl DataWriter for MockWriter {
    async fn stage(&self) -> Result<()> {
        self.script.step("stage").await
    }

    async fn prepare(&self, info: &TriggerInfo) -> Result<()> {
        self.script.step("prepare").await?;
        self.infos.write().await.push(*info);
        Ok(())
    }

    async fn kickoff(&self) -> Result<()> {
        self.script.step("kickoff").await
    }

    async fn complete(&self) -> Result<()> {
        self.script.step("complete").await
    }

    async fn unstage(&self) -> Result<()> {
        self.script.step("unstage").await
    }
}

// =============================================================================
// MockDesignStore
// =============================================================================

/// Mock design store logging as `"designs"`.
#[derive(Debug)]
pub struct MockDesignStore {
    script: Script,
    applied: RwLock<Vec<String>>,
}

impl MockDesignStore {
    /// New store.
    pub fn new(log: CallLog) -> Self {
        Self {
            script: Script::new("designs", log),
            applied: RwLock::new(Vec::new()),
        }
    }

    /// Names applied so far.
    pub async fn applied(&self) -> Vec<String> {
        self.applied.read().await.clone()
    }
}

impl Scripted for MockDesignStore {
    fn script_mut(&mut self) -> &mut Script {
        &mut self.script
    }
}

#[async_trait]
impl DesignStore for MockDesignStore {
    async fn apply(&self, name: &str) -> Result<()> {
        self.script.step("apply").await?;
        self.applied.write().await.push(name.to_string());
        Ok(())
    }
}
