//! # Topology Builder
//!
//! Composes stages and queues into workers according to a [`Strategy`] and
//! spawns them.
//!
//! ## Strategies
//!
//! ```text
//! Single (runmode "single"):
//!
//!   pool ─▶ PcapFile [receive, decode, stream, detect, outputs…] ─▶ pool
//!
//! FanOut (runmode "auto"):
//!
//!   pool ─▶ ReceivePcapFile ─▶ pickup-queue ─▶ Decode&Stream ─▶ stream-queue1
//!                               (exclusive)                     (round-robin)
//!                                                                    │
//!                                     ┌──────────┬───────────────────┤
//!                                     ▼          ▼                   ▼
//!                                  Detect1    Detect2    ...      DetectN
//!                                     └──────────┴─────┬─────────────┘
//!                                                      ▼
//!                                   alert-queue1 (exclusive) ─▶ Outputs ─▶ pool
//!
//! FlowAffine (runmode "autofp"):
//!
//!   pool ─▶ ReceivePcapFile [receive, decode] ─▶ pickup (flow, N shards)
//!                                                   │
//!                         ┌─────────────┬───────────┤
//!                         ▼             ▼           ▼
//!                      Detect1       Detect2  ... DetectN   [stream, detect, outputs…]
//!                         │             │           │
//!                         ▼             ▼           ▼
//!                        pool          pool        pool
//! ```
//!
//! ## Construction
//!
//! Every strategy runs the same steps on the calling thread:
//!
//! 1. **Configure**: validate tunables and compute the detect worker count.
//! 2. **Resolve**: look every stage up in the registry.
//! 3. **Allocate queues**.
//! 4. **Create workers**: descriptors, output wiring, graph validation.
//! 5. **Place**: CPU affinity and priority per worker.
//! 6. **Spawn**: create stage instances, start every thread behind a
//!    [`StartGate`], open the gate once all of them initialised.
//!
//! Steps 1-5 produce a [`TopologyPlan`] without starting anything. A failure
//! at any step is returned as a [`TopologyError`]; if it happens during
//! spawn, every thread already started is released through the aborted gate
//! and joined before the error is returned.

mod graph;

pub use graph::{GraphNode, TopologyGraph};

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::config::TopologyConfig;
use crate::error::{InitError, TopologyError};
use crate::packet::Packet;
use crate::placement::{
    detect_worker_count, role_placement, PlacementPolicy, PlacementState,
};
use crate::queue::{DispatchPolicy, QueueInfo, QueueSet, RecyclePool};
use crate::stage::{BoundContext, StageId, StageRef, StageRegistry};
use crate::worker::{
    InputEndpoint, OutputEndpoint, StartGate, WorkerCounters, WorkerHandle, WorkerId,
    WorkerInfo, WorkerRole, WorkerSpec,
};

/// Group label of the rotated detect workers.
pub const DETECT_GROUP: &str = "Detect";

/// Topology strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Strategy {
    /// One worker runs the whole pipeline.
    Single,
    /// Receive, decode, N detect workers fed round-robin, one output worker.
    FanOut,
    /// Receive+decode feeding N flow-sharded workers that run the rest.
    #[default]
    FlowAffine,
}

impl Strategy {
    /// Run mode name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::FanOut => "auto",
            Self::FlowAffine => "autofp",
        }
    }

    /// One-line description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Single => "single threaded pcap file mode",
            Self::FanOut => "multi threaded pcap file mode, detect threads fed round-robin",
            Self::FlowAffine => {
                "multi threaded pcap file mode, packets from each flow assigned to a single detect thread"
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned for an unknown run mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown runmode '{0}' (expected single, auto or autofp)")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "auto" | "fanout" | "fan-out" => Ok(Self::FanOut),
            "autofp" | "flow" | "flow-affine" => Ok(Self::FlowAffine),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Appends output stages to output-bearing workers.
pub trait OutputWiring {
    /// Attaches the outputs to `worker`. Called once per output-bearing
    /// worker, before spawn.
    ///
    /// # Errors
    ///
    /// Returns an error if the stages cannot be appended.
    fn attach(&self, worker: &mut WorkerSpec) -> Result<(), TopologyError>;
}

/// Output wiring from a resolved list of output stages.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredOutputs {
    stages: Vec<StageRef>,
}

impl ConfiguredOutputs {
    /// Resolves `outputs`, binding each to `context`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::StageNotFound`] for an unregistered output.
    pub fn resolve(
        registry: &dyn StageRegistry,
        outputs: &[StageId],
        context: Option<&BoundContext>,
    ) -> Result<Self, TopologyError> {
        let stages = outputs
            .iter()
            .map(|&id| StageRef::resolve(registry, id, context.cloned()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }

    /// Output stage ids.
    #[must_use]
    pub fn ids(&self) -> Vec<StageId> {
        self.stages.iter().map(StageRef::id).collect()
    }
}

impl OutputWiring for ConfiguredOutputs {
    fn attach(&self, worker: &mut WorkerSpec) -> Result<(), TopologyError> {
        for stage in &self.stages {
            worker.push_stage(stage.clone())?;
        }
        Ok(())
    }
}

/// Resolved stage references shared by all strategies.
struct ResolvedStages {
    receive: StageRef,
    decode: StageRef,
    stream: StageRef,
    detect: StageRef,
}

/// Builds topologies from a configuration and a stage registry.
pub struct TopologyBuilder<'a> {
    config: &'a TopologyConfig,
    registry: &'a dyn StageRegistry,
    detect_ctx: BoundContext,
    outputs: Option<&'a dyn OutputWiring>,
}

impl<'a> TopologyBuilder<'a> {
    /// Creates a builder. `detect_ctx` is bound to every detect stage.
    #[must_use]
    pub fn new(
        config: &'a TopologyConfig,
        registry: &'a dyn StageRegistry,
        detect_ctx: BoundContext,
    ) -> Self {
        Self {
            config,
            registry,
            detect_ctx,
            outputs: None,
        }
    }

    /// Replaces the configured output stages with custom wiring.
    #[must_use]
    pub fn with_output_wiring(mut self, wiring: &'a dyn OutputWiring) -> Self {
        self.outputs = Some(wiring);
        self
    }

    /// Builds and spawns a topology.
    ///
    /// # Errors
    ///
    /// Returns the first construction failure; no worker is left running.
    pub fn build(&self, strategy: Strategy) -> Result<Topology, TopologyError> {
        self.plan(strategy)?.spawn()
    }

    /// Runs every construction step except spawning.
    ///
    /// # Errors
    ///
    /// Returns the first construction failure.
    pub fn plan(&self, strategy: Strategy) -> Result<TopologyPlan, TopologyError> {
        let config = self.config;

        // Configure
        config.validate()?;
        let pcap_file = config.require_pcap_file()?.to_path_buf();
        let detect_count = match strategy {
            Strategy::Single => 1,
            Strategy::FanOut | Strategy::FlowAffine => detect_worker_count(
                config.cpu_count,
                config.detect_thread_ratio,
                config.detect_override(),
            ),
        };
        tracing::debug!(
            %strategy,
            cpu_count = config.cpu_count,
            detect_count,
            "configured topology"
        );

        // Resolve
        let stages = self.resolve_stages(pcap_file)?;
        let configured;
        let outputs: &dyn OutputWiring = match self.outputs {
            Some(wiring) => wiring,
            None => {
                let log_dir: BoundContext = Arc::new(config.log_dir.clone());
                configured =
                    ConfiguredOutputs::resolve(self.registry, &config.outputs, Some(&log_dir))?;
                &configured
            }
        };
        tracing::debug!(%strategy, "resolved stages");

        // Allocate queues and create workers
        let mut queues = QueueSet::new(config.queue_capacity);
        let mut workers = match strategy {
            Strategy::Single => single_workers(&stages, outputs)?,
            Strategy::FanOut => fan_out_workers(&stages, outputs, &mut queues, detect_count)?,
            Strategy::FlowAffine => {
                flow_affine_workers(&stages, outputs, &mut queues, detect_count)?
            }
        };
        queues.check_claimed()?;
        let infos: Vec<WorkerInfo> = workers.iter().map(WorkerSpec::info).collect();
        let graph = TopologyGraph::from_workers(&infos);
        graph.validate()?;
        tracing::debug!(
            %strategy,
            workers = workers.len(),
            queues = queues.len(),
            paths = graph.path_count(),
            "created workers"
        );

        // Place
        place_workers(config, &mut workers);

        Ok(TopologyPlan {
            strategy,
            workers,
            queues,
            graph,
            pool: RecyclePool::new(config.max_pending_packets),
        })
    }

    fn resolve_stages(&self, pcap_file: PathBuf) -> Result<ResolvedStages, TopologyError> {
        let pcap_ctx: BoundContext = Arc::new(pcap_file);
        Ok(ResolvedStages {
            receive: StageRef::resolve(self.registry, StageId::ReceivePcapFile, Some(pcap_ctx))?,
            decode: StageRef::resolve(self.registry, StageId::DecodePcapFile, None)?,
            stream: StageRef::resolve(self.registry, StageId::StreamTcp, None)?,
            detect: StageRef::resolve(
                self.registry,
                StageId::Detect,
                Some(Arc::clone(&self.detect_ctx)),
            )?,
        })
    }
}

impl fmt::Debug for TopologyBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyBuilder")
            .field("config", self.config)
            .field("custom_outputs", &self.outputs.is_some())
            .finish_non_exhaustive()
    }
}

fn reserve_workers(n: usize) -> Result<Vec<WorkerSpec>, TopologyError> {
    let mut workers = Vec::new();
    workers
        .try_reserve_exact(n)
        .map_err(|source| TopologyError::Allocation {
            what: "worker descriptors",
            source,
        })?;
    Ok(workers)
}

fn single_workers(
    stages: &ResolvedStages,
    outputs: &dyn OutputWiring,
) -> Result<Vec<WorkerSpec>, TopologyError> {
    let mut workers = reserve_workers(1)?;
    let mut worker = WorkerSpec::new(
        WorkerId(0),
        "PcapFile",
        WorkerRole::Single,
        InputEndpoint::Pool,
        OutputEndpoint::Pool,
    );
    for stage in [&stages.receive, &stages.decode, &stages.stream, &stages.detect] {
        worker.push_stage(stage.clone())?;
    }
    outputs.attach(&mut worker)?;
    workers.push(worker);
    Ok(workers)
}

fn fan_out_workers(
    stages: &ResolvedStages,
    outputs: &dyn OutputWiring,
    queues: &mut QueueSet<Packet>,
    detect_count: usize,
) -> Result<Vec<WorkerSpec>, TopologyError> {
    let pickup = queues.create("pickup-queue", DispatchPolicy::Exclusive, 1)?;
    let stream = queues.create("stream-queue1", DispatchPolicy::RoundRobin, detect_count)?;
    let alert = queues.create("alert-queue1", DispatchPolicy::Exclusive, 1)?;

    let mut workers = reserve_workers(detect_count.saturating_add(3))?;

    let mut receive = WorkerSpec::new(
        WorkerId(0),
        "ReceivePcapFile",
        WorkerRole::Receive,
        InputEndpoint::Pool,
        OutputEndpoint::Queue(pickup.producer()),
    );
    receive.push_stage(stages.receive.clone())?;
    workers.push(receive);

    let mut decode = WorkerSpec::new(
        WorkerId(1),
        "Decode&Stream",
        WorkerRole::Decode,
        InputEndpoint::Queue(pickup.consumer(0)?),
        OutputEndpoint::Queue(stream.producer()),
    );
    decode.push_stage(stages.decode.clone())?;
    decode.push_stage(stages.stream.clone())?;
    workers.push(decode);

    for i in 0..detect_count {
        let mut detect = WorkerSpec::new(
            WorkerId(2 + i),
            format!("Detect{}", i + 1),
            WorkerRole::Detect,
            InputEndpoint::Queue(stream.consumer(i)?),
            OutputEndpoint::Queue(alert.producer()),
        )
        .with_group(DETECT_GROUP)
        .with_role_index(i);
        detect.push_stage(stages.detect.clone())?;
        workers.push(detect);
    }

    let mut output = WorkerSpec::new(
        WorkerId(2 + detect_count),
        "Outputs",
        WorkerRole::Output,
        InputEndpoint::Queue(alert.consumer(0)?),
        OutputEndpoint::Pool,
    );
    outputs.attach(&mut output)?;
    workers.push(output);

    Ok(workers)
}

fn flow_affine_workers(
    stages: &ResolvedStages,
    outputs: &dyn OutputWiring,
    queues: &mut QueueSet<Packet>,
    detect_count: usize,
) -> Result<Vec<WorkerSpec>, TopologyError> {
    let pickup = queues.create("pickup", DispatchPolicy::FlowAffine, detect_count)?;

    let mut workers = reserve_workers(detect_count.saturating_add(1))?;

    // Decode runs here: the flow key only exists after decoding.
    let mut receive = WorkerSpec::new(
        WorkerId(0),
        "ReceivePcapFile",
        WorkerRole::Receive,
        InputEndpoint::Pool,
        OutputEndpoint::Queue(pickup.producer()),
    );
    receive.push_stage(stages.receive.clone())?;
    receive.push_stage(stages.decode.clone())?;
    workers.push(receive);

    for i in 0..detect_count {
        let mut detect = WorkerSpec::new(
            WorkerId(1 + i),
            format!("Detect{}", i + 1),
            WorkerRole::Detect,
            InputEndpoint::Queue(pickup.consumer(i)?),
            OutputEndpoint::Pool,
        )
        .with_group(DETECT_GROUP)
        .with_role_index(i);
        detect.push_stage(stages.stream.clone())?;
        detect.push_stage(stages.detect.clone())?;
        outputs.attach(&mut detect)?;
        workers.push(detect);
    }

    Ok(workers)
}

/// Assigns CPU affinity and priority: rotation for detect workers, role CPU
/// sets for the others.
fn place_workers(config: &TopologyConfig, workers: &mut [WorkerSpec]) {
    let policy = PlacementPolicy::new(config.cpu_count, config.cpu_affinity);
    let mut state = PlacementState::new(config.cpu_count);

    for worker in workers.iter_mut() {
        let placement = match worker.role() {
            WorkerRole::Single => continue,
            WorkerRole::Detect => {
                let (placement, next) = state.place(&policy);
                state = next;
                placement
            }
            WorkerRole::Receive => role_placement(&policy, &config.cpu_sets.receive),
            WorkerRole::Decode => role_placement(&policy, &config.cpu_sets.decode),
            WorkerRole::Output => role_placement(&policy, &config.cpu_sets.output),
        };
        if placement.is_pinned() {
            tracing::info!(
                worker = worker.name(),
                cpus = ?placement.cpus,
                priority = ?placement.priority,
                "placed worker"
            );
        }
        worker.set_placement(placement);
    }
}

/// A fully constructed topology that has not been started.
pub struct TopologyPlan {
    strategy: Strategy,
    workers: Vec<WorkerSpec>,
    queues: QueueSet<Packet>,
    graph: TopologyGraph,
    pool: RecyclePool,
}

impl TopologyPlan {
    /// Strategy of the plan.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Worker descriptors, in spawn order.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.workers.iter().map(WorkerSpec::info).collect()
    }

    /// Queue descriptors.
    #[must_use]
    pub fn queues(&self) -> Vec<QueueInfo> {
        self.queues.infos()
    }

    /// Worker graph.
    #[must_use]
    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    /// Creates stage instances and starts every worker.
    ///
    /// Threads are spawned behind a closed start gate and report after
    /// applying placement and running stage init. The gate opens only when
    /// every worker reported success.
    ///
    /// # Errors
    ///
    /// Returns the first stage creation, spawn, or init failure. All threads
    /// already spawned have exited and been joined when it returns.
    pub fn spawn(self) -> Result<Topology, TopologyError> {
        let Self {
            strategy,
            workers,
            queues,
            graph,
            pool,
        } = self;
        // Only workers hold queue endpoints from here on.
        let queues = queues.into_infos();

        let mut prepared = Vec::new();
        prepared
            .try_reserve_exact(workers.len())
            .map_err(|source| TopologyError::Allocation {
                what: "worker instances",
                source,
            })?;
        for spec in workers {
            prepared.push(spec.instantiate(&pool)?);
        }

        let gate = StartGate::new();
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded();
        let mut handles: Vec<WorkerHandle> = Vec::with_capacity(prepared.len());

        for (index, worker) in prepared.into_iter().enumerate() {
            tracing::debug!(worker = %worker.info().name, "spawning worker");
            match worker.spawn(index, &gate, ready_tx.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    abort_and_join(&gate, handles);
                    return Err(e);
                }
            }
        }
        drop(ready_tx);

        for _ in 0..handles.len() {
            match ready_rx.recv() {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(source))) => {
                    let worker = handles
                        .get(index)
                        .map_or_else(|| format!("#{index}"), |h| h.info().name.clone());
                    tracing::error!(%worker, error = %source, "worker failed to initialise");
                    abort_and_join(&gate, handles);
                    return Err(TopologyError::WorkerInit { worker, source });
                }
                Err(_) => {
                    let worker = handles
                        .iter()
                        .find(|h| h.is_finished())
                        .map_or_else(|| "unknown".to_string(), |h| h.info().name.clone());
                    abort_and_join(&gate, handles);
                    return Err(TopologyError::WorkerInit {
                        worker,
                        source: InitError::Vanished,
                    });
                }
            }
        }

        gate.open();
        tracing::info!(
            %strategy,
            workers = handles.len(),
            "topology running: {}",
            strategy.description()
        );

        Ok(Topology {
            strategy,
            workers: handles,
            queues,
            graph,
            pool,
            offline: true,
        })
    }
}

impl fmt::Debug for TopologyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyPlan")
            .field("strategy", &self.strategy)
            .field("workers", &self.workers)
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}

fn abort_and_join(gate: &StartGate, handles: Vec<WorkerHandle>) {
    gate.abort();
    for handle in handles {
        let name = handle.info().name.clone();
        if handle.join().is_err() {
            tracing::warn!(worker = %name, "worker panicked during aborted start");
        }
    }
}

/// A running topology.
pub struct Topology {
    strategy: Strategy,
    workers: Vec<WorkerHandle>,
    queues: Vec<QueueInfo>,
    graph: TopologyGraph,
    pool: RecyclePool,
    offline: bool,
}

impl Topology {
    /// Strategy the topology was built with.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Worker metadata, in spawn order.
    pub fn workers(&self) -> impl Iterator<Item = &WorkerInfo> {
        self.workers.iter().map(WorkerHandle::info)
    }

    /// Number of workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue metadata.
    #[must_use]
    pub fn queues(&self) -> &[QueueInfo] {
        &self.queues
    }

    /// Worker graph.
    #[must_use]
    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    /// The packet buffer pool.
    #[must_use]
    pub fn pool(&self) -> &RecyclePool {
        &self.pool
    }

    /// Returns true: packets are processed as fast as they are read, and
    /// timestamps come from the capture rather than the wall clock.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Current counters per worker.
    #[must_use]
    pub fn counters(&self) -> Vec<(String, WorkerCounters)> {
        self.workers
            .iter()
            .map(|w| (w.info().name.clone(), w.counters()))
            .collect()
    }

    /// Current counters summed per group label.
    #[must_use]
    pub fn group_stats(&self) -> BTreeMap<String, WorkerCounters> {
        group_counters(
            self.workers
                .iter()
                .map(|w| (w.info().group.as_deref(), w.counters())),
        )
    }

    /// Waits for every worker to drain and exit.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::WorkerPanicked`] for the first worker that
    /// panicked. The remaining workers are still joined.
    pub fn join(self) -> Result<TopologyReport, TopologyError> {
        let mut reports = Vec::with_capacity(self.workers.len());
        let mut first_error = None;
        for handle in self.workers {
            let info = handle.info().clone();
            match handle.join() {
                Ok(counters) => reports.push(WorkerReport { info, counters }),
                Err(e) => {
                    tracing::error!(worker = %info.name, "worker panicked");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let groups = group_counters(
            reports
                .iter()
                .map(|r| (r.info.group.as_deref(), r.counters)),
        );
        tracing::info!(strategy = %self.strategy, workers = reports.len(), "topology finished");
        Ok(TopologyReport {
            strategy: self.strategy,
            workers: reports,
            groups,
        })
    }
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("strategy", &self.strategy)
            .field("workers", &self.workers)
            .field("queues", &self.queues)
            .field("offline", &self.offline)
            .finish_non_exhaustive()
    }
}

fn group_counters<'a>(
    counters: impl Iterator<Item = (Option<&'a str>, WorkerCounters)>,
) -> BTreeMap<String, WorkerCounters> {
    let mut groups: BTreeMap<String, WorkerCounters> = BTreeMap::new();
    for (group, c) in counters {
        if let Some(group) = group {
            groups.entry(group.to_string()).or_default().merge(&c);
        }
    }
    groups
}

/// Final counters of one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    /// Worker metadata.
    pub info: WorkerInfo,
    /// Final counters.
    pub counters: WorkerCounters,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    /// Strategy that ran.
    pub strategy: Strategy,
    /// Per-worker counters, in spawn order.
    pub workers: Vec<WorkerReport>,
    /// Counters summed per group label.
    pub groups: BTreeMap<String, WorkerCounters>,
}

impl TopologyReport {
    /// Packets that reached a sink worker and were recycled after passing
    /// every stage.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.workers
            .iter()
            .filter(|r| r.info.output == crate::worker::EndpointInfo::Pool)
            .map(|r| r.counters.processed)
            .sum()
    }
}

/// Builds and spawns `strategy`.
///
/// # Errors
///
/// Returns the first construction failure; no worker is left running.
pub fn build(
    strategy: Strategy,
    config: &TopologyConfig,
    registry: &dyn StageRegistry,
    detect_ctx: BoundContext,
) -> Result<Topology, TopologyError> {
    TopologyBuilder::new(config, registry, detect_ctx).build(strategy)
}

/// Builds and spawns the single-pipeline strategy.
///
/// # Errors
///
/// See [`build`].
pub fn build_single(
    config: &TopologyConfig,
    registry: &dyn StageRegistry,
    detect_ctx: BoundContext,
) -> Result<Topology, TopologyError> {
    build(Strategy::Single, config, registry, detect_ctx)
}

/// Builds and spawns the fixed fan-out strategy.
///
/// # Errors
///
/// See [`build`].
pub fn build_fan_out(
    config: &TopologyConfig,
    registry: &dyn StageRegistry,
    detect_ctx: BoundContext,
) -> Result<Topology, TopologyError> {
    build(Strategy::FanOut, config, registry, detect_ctx)
}

/// Builds and spawns the flow-affine sharded strategy.
///
/// # Errors
///
/// See [`build`].
pub fn build_flow_affine(
    config: &TopologyConfig,
    registry: &dyn StageRegistry,
    detect_ctx: BoundContext,
) -> Result<Topology, TopologyError> {
    build(Strategy::FlowAffine, config, registry, detect_ctx)
}

#[cfg(test)]
mod tests;
