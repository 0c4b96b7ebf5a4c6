//! # Workers
//!
//! A worker is one long-lived OS thread running an ordered list of stages
//! over packets taken from its input and handed to its output.
//!
//! ## Lifecycle
//!
//! ```text
//!   WorkerSpec ──instantiate──▶ PreparedWorker ──spawn──▶ thread
//!   (builder-owned)             (stage instances)          │
//!                                                          ▼
//!                                         apply placement, stage init
//!                                                          │ report ready
//!                                                          ▼
//!                                                  wait on StartGate
//!                                              open │            │ aborted
//!                                                   ▼            ▼
//!                                               run loop       exit
//! ```
//!
//! ## Run Loop
//!
//! 1. Take a packet: a fresh buffer from the recycle pool for the source
//!    role, otherwise the next item of the input shard. A closed and drained
//!    input, or a closed pool, ends the loop.
//! 2. Run every stage in order. `Drop` or a stage error stops the pipeline
//!    and recycles the buffer; `EndOfInput` recycles it and ends the loop.
//! 3. Forward the packet to the output queue, or recycle it for the sink.
//!
//! When the loop ends the worker drops its output producer, which is how
//! shutdown propagates downstream.
//!
//! A worker that panics closes the recycle pool while unwinding. Packets
//! queued for it are stranded, so the source could otherwise block forever
//! waiting for a free buffer; instead it stops reading and the surviving
//! workers drain.

mod affinity;
mod gate;

pub use affinity::CPU_SET_CAPACITY;
pub use gate::StartGate;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::error::{InitError, TopologyError};
use crate::packet::Packet;
use crate::placement::Placement;
use crate::queue::{Consumer, Dequeued, Producer, RecyclePool, RECYCLE_POOL_NAME};
use crate::stage::{Stage, StageId, StageRef, ThreadInfo, Verdict};

/// Worker identifier, unique within a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// Role a worker plays in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerRole {
    /// Runs the whole pipeline.
    Single,
    /// Source: reads the capture.
    Receive,
    /// Decode and stream tracking.
    Decode,
    /// Rotated detect (or shard) worker.
    Detect,
    /// Sink: output stages.
    Output,
}

/// Where a worker takes packets from.
pub enum InputEndpoint {
    /// Fresh buffers from the recycle pool (source role).
    Pool,
    /// One shard of a queue.
    Queue(Consumer<Packet>),
}

impl InputEndpoint {
    /// Descriptor of the endpoint.
    #[must_use]
    pub fn info(&self) -> EndpointInfo {
        match self {
            Self::Pool => EndpointInfo::Pool,
            Self::Queue(consumer) => EndpointInfo::Queue {
                name: consumer.name().to_string(),
                shard: Some(consumer.shard()),
            },
        }
    }
}

/// Where a worker hands packets to.
pub enum OutputEndpoint {
    /// Back to the recycle pool (sink role).
    Pool,
    /// A queue.
    Queue(Producer<Packet>),
}

impl OutputEndpoint {
    /// Descriptor of the endpoint.
    #[must_use]
    pub fn info(&self) -> EndpointInfo {
        match self {
            Self::Pool => EndpointInfo::Pool,
            Self::Queue(producer) => EndpointInfo::Queue {
                name: producer.name().to_string(),
                shard: None,
            },
        }
    }
}

/// Read-only descriptor of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum EndpointInfo {
    /// The recycle pool.
    Pool,
    /// A named queue; `shard` is set on the consumer side.
    Queue {
        /// Queue name.
        name: String,
        /// Consumed shard.
        shard: Option<usize>,
    },
}

impl EndpointInfo {
    /// Name of the queue or pool.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Pool => RECYCLE_POOL_NAME,
            Self::Queue { name, .. } => name,
        }
    }
}

impl fmt::Display for EndpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool => f.write_str(RECYCLE_POOL_NAME),
            Self::Queue {
                name,
                shard: Some(shard),
            } => write!(f, "{name}[{shard}]"),
            Self::Queue { name, shard: None } => f.write_str(name),
        }
    }
}

/// Builder-owned worker descriptor.
pub struct WorkerSpec {
    id: WorkerId,
    name: String,
    role: WorkerRole,
    role_index: usize,
    group: Option<String>,
    stages: Vec<StageRef>,
    input: InputEndpoint,
    output: OutputEndpoint,
    placement: Placement,
}

impl WorkerSpec {
    /// Creates a descriptor with no stages and no placement.
    #[must_use]
    pub fn new(
        id: WorkerId,
        name: impl Into<String>,
        role: WorkerRole,
        input: InputEndpoint,
        output: OutputEndpoint,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            role_index: 0,
            group: None,
            stages: Vec::new(),
            input,
            output,
            placement: Placement::unpinned(),
        }
    }

    /// Sets the group label.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets the position among workers sharing the role.
    #[must_use]
    pub fn with_role_index(mut self, index: usize) -> Self {
        self.role_index = index;
        self
    }

    /// Appends a stage to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Allocation`] if the stage list cannot grow.
    pub fn push_stage(&mut self, stage: StageRef) -> Result<(), TopologyError> {
        self.stages
            .try_reserve(1)
            .map_err(|source| TopologyError::Allocation {
                what: "stage pipeline",
                source,
            })?;
        self.stages.push(stage);
        Ok(())
    }

    /// Sets the placement.
    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
    }

    /// Worker id.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role.
    #[must_use]
    pub fn role(&self) -> WorkerRole {
        self.role
    }

    /// Group label.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Stage pipeline.
    #[must_use]
    pub fn stages(&self) -> &[StageRef] {
        &self.stages
    }

    /// Placement.
    #[must_use]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Read-only descriptor.
    #[must_use]
    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
            group: self.group.clone(),
            stages: self.stages.iter().map(StageRef::id).collect(),
            input: self.input.info(),
            output: self.output.info(),
            placement: self.placement.clone(),
        }
    }

    /// Creates one stage instance per pipeline entry.
    pub(crate) fn instantiate(self, pool: &RecyclePool) -> Result<PreparedWorker, TopologyError> {
        let info = self.info();
        let mut stages = Vec::new();
        stages
            .try_reserve_exact(self.stages.len())
            .map_err(|source| TopologyError::Allocation {
                what: "stage instances",
                source,
            })?;
        for stage in &self.stages {
            let instance = stage
                .instantiate()
                .map_err(|source| TopologyError::StageCreate {
                    worker: self.name.clone(),
                    stage: stage.id(),
                    source,
                })?;
            stages.push((stage.id(), instance));
        }
        Ok(PreparedWorker {
            info,
            role_index: self.role_index,
            stages,
            input: self.input,
            output: self.output,
            pool: pool.clone(),
            stats: Arc::new(WorkerStats::default()),
        })
    }
}

impl fmt::Debug for WorkerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("stages", &self.stages)
            .field("input", &self.input.info())
            .field("output", &self.output.info())
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

/// Read-only worker metadata, available after spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    /// Worker id.
    pub id: WorkerId,
    /// Thread name.
    pub name: String,
    /// Role.
    pub role: WorkerRole,
    /// Group label ("Detect" for rotated workers).
    pub group: Option<String>,
    /// Stage pipeline, in execution order.
    pub stages: Vec<StageId>,
    /// Input endpoint.
    pub input: EndpointInfo,
    /// Output endpoint.
    pub output: EndpointInfo,
    /// CPU affinity and priority.
    pub placement: Placement,
}

/// Live per-worker counters.
#[derive(Debug, Default)]
pub struct WorkerStats {
    received: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
}

impl WorkerStats {
    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> WorkerCounters {
        WorkerCounters {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerCounters {
    /// Packets taken from the input.
    pub received: u64,
    /// Packets that passed every stage and were handed on.
    pub processed: u64,
    /// Packets dropped by a stage verdict, a stage error, or a closed output.
    pub dropped: u64,
    /// Stage runtime errors.
    pub errors: u64,
}

impl WorkerCounters {
    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &WorkerCounters) {
        self.received += other.received;
        self.processed += other.processed;
        self.dropped += other.dropped;
        self.errors += other.errors;
    }
}

/// A worker with its stage instances, ready to be spawned.
pub(crate) struct PreparedWorker {
    info: WorkerInfo,
    role_index: usize,
    stages: Vec<(StageId, Box<dyn Stage>)>,
    input: InputEndpoint,
    output: OutputEndpoint,
    pool: RecyclePool,
    stats: Arc<WorkerStats>,
}

/// Readiness report sent by a worker thread: its position in the spawn
/// order and the outcome of its initialisation.
pub(crate) type ReadyReport = (usize, Result<(), InitError>);

impl PreparedWorker {
    pub(crate) fn info(&self) -> &WorkerInfo {
        &self.info
    }

    /// Spawns the thread. It initialises, reports on `ready`, then waits on
    /// `gate` before touching any queue.
    pub(crate) fn spawn(
        self,
        index: usize,
        gate: &StartGate,
        ready: Sender<ReadyReport>,
    ) -> Result<WorkerHandle, TopologyError> {
        let info = self.info.clone();
        let stats = Arc::clone(&self.stats);
        let gate = gate.clone();

        let thread = thread::Builder::new()
            .name(info.name.clone())
            .spawn(move || worker_thread_main(self, index, &gate, ready))
            .map_err(|source| TopologyError::SpawnFailed {
                worker: info.name.clone(),
                source,
            })?;

        Ok(WorkerHandle {
            info,
            stats,
            thread: Some(thread),
        })
    }
}

/// Closes the pool if the worker thread unwinds.
struct PanicGuard {
    worker: String,
    pool: RecyclePool,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(worker = %self.worker, "worker panicked, closing packet pool");
            self.pool.close();
        }
    }
}

fn worker_thread_main(
    mut worker: PreparedWorker,
    index: usize,
    gate: &StartGate,
    ready: Sender<ReadyReport>,
) {
    let _guard = PanicGuard {
        worker: worker.info.name.clone(),
        pool: worker.pool.clone(),
    };
    let init = init_worker_thread(&mut worker);
    let failed = init.is_err();
    // Receiver outlives every report; nothing to do if it is gone.
    let _ = ready.send((index, init));
    drop(ready);
    if failed {
        return;
    }

    if !gate.wait() {
        tracing::debug!(worker = %worker.info.name, "start aborted");
        worker.exit_stages();
        return;
    }

    tracing::info!(
        worker = %worker.info.name,
        input = %worker.info.input,
        output = %worker.info.output,
        cpus = ?worker.info.placement.cpus,
        "worker running"
    );
    worker.run();
    worker.exit_stages();
    let counters = worker.stats.snapshot();
    tracing::debug!(
        worker = %worker.info.name,
        processed = counters.processed,
        dropped = counters.dropped,
        "worker finished"
    );
}

/// Applies placement and runs per-thread stage init.
fn init_worker_thread(worker: &mut PreparedWorker) -> Result<(), InitError> {
    affinity::apply_placement(&worker.info.name, &worker.info.placement)?;
    let thread = ThreadInfo {
        worker_name: &worker.info.name,
        role_index: worker.role_index,
    };
    for (id, stage) in &mut worker.stages {
        stage
            .thread_init(&thread)
            .map_err(|source| InitError::Stage { stage: *id, source })?;
    }
    Ok(())
}

impl PreparedWorker {
    fn run(&mut self) {
        let mut closed_output_logged = false;
        loop {
            let mut packet = match &self.input {
                InputEndpoint::Pool => match self.pool.acquire() {
                    Some(packet) => packet,
                    None => break,
                },
                InputEndpoint::Queue(consumer) => match consumer.pop() {
                    Dequeued::Item(packet) => packet,
                    Dequeued::Shutdown => break,
                },
            };
            WorkerStats::bump(&self.stats.received);

            match self.run_stages(&mut packet) {
                Verdict::Pass => {}
                Verdict::Drop => {
                    WorkerStats::bump(&self.stats.dropped);
                    self.pool.release(packet);
                    continue;
                }
                Verdict::EndOfInput => {
                    self.pool.release(packet);
                    break;
                }
            }

            match &self.output {
                OutputEndpoint::Pool => {
                    WorkerStats::bump(&self.stats.processed);
                    self.pool.release(packet);
                }
                OutputEndpoint::Queue(producer) => match producer.push(packet) {
                    Ok(()) => WorkerStats::bump(&self.stats.processed),
                    Err(packet) => {
                        if !closed_output_logged {
                            tracing::warn!(
                                worker = %self.info.name,
                                queue = producer.name(),
                                "output closed, recycling packets"
                            );
                            closed_output_logged = true;
                        }
                        WorkerStats::bump(&self.stats.dropped);
                        self.pool.release(packet);
                    }
                },
            }
        }
        // Closes this worker's side of the output queue.
        self.output = OutputEndpoint::Pool;
    }

    fn run_stages(&mut self, packet: &mut Packet) -> Verdict {
        for (id, stage) in &mut self.stages {
            match stage.process(packet) {
                Ok(Verdict::Pass) => {}
                Ok(verdict) => return verdict,
                Err(e) => {
                    tracing::error!(
                        worker = %self.info.name,
                        stage = %id,
                        seq = packet.seq,
                        error = %e,
                        "stage failed, dropping packet"
                    );
                    WorkerStats::bump(&self.stats.errors);
                    return Verdict::Drop;
                }
            }
        }
        Verdict::Pass
    }

    fn exit_stages(&mut self) {
        let thread = ThreadInfo {
            worker_name: &self.info.name,
            role_index: self.role_index,
        };
        for (_, stage) in &mut self.stages {
            stage.thread_exit(&thread);
        }
    }
}

/// Handle to a spawned worker thread.
pub struct WorkerHandle {
    info: WorkerInfo,
    stats: Arc<WorkerStats>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Worker metadata.
    #[must_use]
    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }

    /// Current counters.
    #[must_use]
    pub fn counters(&self) -> WorkerCounters {
        self.stats.snapshot()
    }

    /// Returns true once the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, thread::JoinHandle::is_finished)
    }

    /// Waits for the thread and returns its final counters.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::WorkerPanicked`] if the thread panicked.
    pub fn join(mut self) -> Result<WorkerCounters, TopologyError> {
        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| TopologyError::WorkerPanicked(self.info.name.clone()))?;
        }
        Ok(self.stats.snapshot())
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.info.name)
            .field("finished", &self.is_finished())
            .field("counters", &self.counters())
            .finish_non_exhaustive()
    }
}
