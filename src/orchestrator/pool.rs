//! Fixed pool of the two interchangeable trigger resources.

use std::sync::Arc;

use crate::capabilities::TriggerDevice;
use crate::sweep::TriggerId;
use crate::trigger::TriggerKind;

/// Two trigger resources indexed by [`TriggerId`]; segment `n` uses slot `n % 2`.
#[derive(Clone)]
pub struct TriggerPool {
    slots: [Arc<dyn TriggerDevice>; 2],
}

impl TriggerPool {
    /// Pool from resource A and resource B.
    pub fn new(a: Arc<dyn TriggerDevice>, b: Arc<dyn TriggerDevice>) -> Self {
        Self { slots: [a, b] }
    }

    /// Resource in slot `id`.
    pub fn get(&self, id: TriggerId) -> &Arc<dyn TriggerDevice> {
        &self.slots[id.index()]
    }

    /// Resource for the segment at `index`.
    pub fn for_segment(&self, index: usize) -> (TriggerId, &Arc<dyn TriggerDevice>) {
        let id = TriggerId::for_segment(index);
        (id, self.get(id))
    }

    /// Both slots with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (TriggerId, &Arc<dyn TriggerDevice>)> {
        [TriggerId::A, TriggerId::B]
            .into_iter()
            .map(move |id| (id, self.get(id)))
    }

    /// True if slot `id` cannot run `kind`.
    pub fn unsupported(&self, id: TriggerId, kind: TriggerKind) -> bool {
        !self.get(id).supports(kind)
    }
}

impl std::fmt::Debug for TriggerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerPool").field("slots", &2).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{CallLog, MockTrigger};

    #[test]
    fn test_segments_alternate_slots() {
        let log = CallLog::new();
        let pool = TriggerPool::new(
            Arc::new(MockTrigger::new("trigger_a", log.clone())),
            Arc::new(MockTrigger::new("trigger_b", log)),
        );
        let ids: Vec<TriggerId> = (0..5).map(|i| pool.for_segment(i).0).collect();
        assert_eq!(
            ids,
            vec![TriggerId::A, TriggerId::B, TriggerId::A, TriggerId::B, TriggerId::A]
        );
        assert_eq!(pool.iter().count(), 2);
    }

    #[test]
    fn test_capability_check() {
        let log = CallLog::new();
        let pool = TriggerPool::new(
            Arc::new(MockTrigger::new("trigger_a", log.clone())),
            Arc::new(
                MockTrigger::new("trigger_b", log).with_kinds(&[TriggerKind::ThresholdCompare]),
            ),
        );
        assert!(!pool.unsupported(TriggerId::A, TriggerKind::SequenceTable));
        assert!(pool.unsupported(TriggerId::B, TriggerKind::SequenceTable));
        assert!(!pool.unsupported(TriggerId::B, TriggerKind::ThresholdCompare));
    }
}
