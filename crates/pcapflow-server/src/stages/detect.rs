//! Content matching against the shared [`DetectContext`].

use std::sync::Arc;

use pcapflow_core::{Packet, Stage, StageError, ThreadInfo, Verdict};

use crate::rules::DetectContext;

/// Detect stage. One instance per detect worker, all sharing one context.
#[derive(Debug)]
pub struct DetectStage {
    context: Arc<DetectContext>,
    inspected: u64,
    alerts: u64,
}

impl DetectStage {
    /// Creates a stage matching `context`'s rules.
    #[must_use]
    pub fn new(context: Arc<DetectContext>) -> Self {
        Self {
            context,
            inspected: 0,
            alerts: 0,
        }
    }

    /// Alerts raised so far.
    #[must_use]
    pub fn alerts(&self) -> u64 {
        self.alerts
    }
}

impl Stage for DetectStage {
    fn thread_init(&mut self, thread: &ThreadInfo<'_>) -> Result<(), StageError> {
        tracing::debug!(
            worker = thread.worker_name,
            rules = self.context.len(),
            "detect engine ready"
        );
        Ok(())
    }

    fn process(&mut self, packet: &mut Packet) -> Result<Verdict, StageError> {
        self.inspected += 1;
        for rule in self.context.rules() {
            if rule.matches(&packet.data) {
                packet.matches.push(rule.sid());
                self.alerts += 1;
            }
        }
        Ok(Verdict::Pass)
    }

    fn thread_exit(&mut self, thread: &ThreadInfo<'_>) {
        tracing::debug!(
            worker = thread.worker_name,
            inspected = self.inspected,
            alerts = self.alerts,
            "detect engine finished"
        );
    }
}
