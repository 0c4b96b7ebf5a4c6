//! Per-flow TCP session tracker.
//!
//! Keeps packet and byte counts for every TCP flow seen by the worker,
//! keyed by the direction-normalised 5-tuple. Flows idle for longer than
//! [`FLOW_TIMEOUT_US`] of capture time are evicted.

use fxhash::FxHashMap;
use pcapflow_core::packet::IPPROTO_TCP;
use pcapflow_core::{FlowKey, Packet, Stage, StageError, ThreadInfo, Verdict};

/// Idle time, in capture microseconds, after which a flow is forgotten.
pub const FLOW_TIMEOUT_US: u64 = 60 * 1_000_000;

/// Packets between eviction sweeps.
const SWEEP_INTERVAL: u64 = 4096;

/// Counters for one flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowStats {
    /// Packets in either direction.
    pub packets: u64,
    /// Captured bytes in either direction.
    pub bytes: u64,
    /// Capture time of the first packet.
    pub first_seen_us: u64,
    /// Capture time of the latest packet.
    pub last_seen_us: u64,
}

/// Stream stage.
#[derive(Debug, Default)]
pub struct StreamStage {
    flows: FxHashMap<FlowKey, FlowStats>,
    seen: u64,
    evicted: u64,
}

impl StreamStage {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live flows.
    #[must_use]
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Stats for `flow` in either direction.
    #[must_use]
    pub fn flow(&self, flow: &FlowKey) -> Option<&FlowStats> {
        self.flows.get(&flow.normalized())
    }

    fn sweep(&mut self, now_us: u64) {
        let before = self.flows.len();
        self.flows
            .retain(|_, stats| now_us.saturating_sub(stats.last_seen_us) <= FLOW_TIMEOUT_US);
        self.evicted += (before - self.flows.len()) as u64;
    }
}

impl Stage for StreamStage {
    fn process(&mut self, packet: &mut Packet) -> Result<Verdict, StageError> {
        let Some(flow) = packet.flow.filter(|f| f.protocol == IPPROTO_TCP) else {
            return Ok(Verdict::Pass);
        };

        let stats = self.flows.entry(flow.normalized()).or_insert(FlowStats {
            first_seen_us: packet.timestamp_us,
            ..FlowStats::default()
        });
        stats.packets += 1;
        stats.bytes += packet.data.len() as u64;
        stats.last_seen_us = stats.last_seen_us.max(packet.timestamp_us);

        self.seen += 1;
        if self.seen % SWEEP_INTERVAL == 0 {
            self.sweep(packet.timestamp_us);
        }
        Ok(Verdict::Pass)
    }

    fn thread_exit(&mut self, thread: &ThreadInfo<'_>) {
        tracing::debug!(
            worker = thread.worker_name,
            packets = self.seen,
            live_flows = self.flows.len(),
            evicted = self.evicted,
            "stream tracker finished"
        );
    }
}
