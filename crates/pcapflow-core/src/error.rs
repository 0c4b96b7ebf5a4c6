//! Error types for topology construction.
//!
//! Every construction failure is terminal. Lower-level steps return these
//! errors; the caller that owns the process decides to abort.

use std::collections::TryReserveError;
use std::fmt;

use crate::config::ConfigError;
use crate::queue::QueueError;
use crate::stage::{StageError, StageId};

/// Construction step in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    /// Reading tunables.
    Configure,
    /// Resolving stage references.
    Resolve,
    /// Allocating queues.
    AllocateQueues,
    /// Creating worker descriptors and stage instances.
    CreateWorkers,
    /// Applying CPU affinity and priority.
    Place,
    /// Spawning worker threads.
    Spawn,
    /// Running (after a successful build).
    Run,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configure => "configure",
            Self::Resolve => "resolve stages",
            Self::AllocateQueues => "allocate queues",
            Self::CreateWorkers => "create workers",
            Self::Place => "place workers",
            Self::Spawn => "spawn workers",
            Self::Run => "run",
        };
        f.write_str(name)
    }
}

/// Failure while a worker thread initialised itself.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// Pinning the thread to its CPU set failed.
    #[error("failed to set CPU affinity to {cpus:?}: {message}")]
    Affinity {
        /// Requested CPU ids.
        cpus: Vec<usize>,
        /// OS error message.
        message: String,
    },

    /// A stage's per-thread init failed.
    #[error("stage {stage} thread init failed: {source}")]
    Stage {
        /// Failing stage.
        stage: StageId,
        /// Underlying stage error.
        #[source]
        source: StageError,
    },

    /// The thread exited before reporting.
    #[error("worker thread exited before reporting readiness")]
    Vanished,
}

/// Errors that abort topology construction.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// A required tunable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A stage is not present in the registry.
    #[error("stage {0} not found in registry")]
    StageNotFound(StageId),

    /// Queue allocation failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Could not reserve memory for descriptors.
    #[error("allocation failed for {what}: {source}")]
    Allocation {
        /// What was being allocated.
        what: &'static str,
        /// Underlying reservation error.
        #[source]
        source: TryReserveError,
    },

    /// A stage factory refused to create an instance.
    #[error("failed to create stage {stage} for worker {worker}: {source}")]
    StageCreate {
        /// Worker name.
        worker: String,
        /// Stage being created.
        stage: StageId,
        /// Underlying stage error.
        #[source]
        source: StageError,
    },

    /// The worker graph contains a cycle.
    #[error("cycle detected involving worker: {0}")]
    CycleDetected(String),

    /// A worker or queue shard is not connected.
    #[error("disconnected topology: {0}")]
    Disconnected(String),

    /// The OS refused to create a thread.
    #[error("failed to spawn worker {worker}: {source}")]
    SpawnFailed {
        /// Worker name.
        worker: String,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// A spawned worker failed its thread init.
    #[error("worker {worker} failed to initialise: {source}")]
    WorkerInit {
        /// Worker name.
        worker: String,
        /// What failed.
        #[source]
        source: InitError,
    },

    /// A worker thread panicked while running.
    #[error("worker {0} panicked")]
    WorkerPanicked(String),
}

impl TopologyError {
    /// The construction step that failed.
    #[must_use]
    pub fn step(&self) -> BuildStep {
        match self {
            Self::Config(_) => BuildStep::Configure,
            Self::StageNotFound(_) => BuildStep::Resolve,
            Self::Queue(_) => BuildStep::AllocateQueues,
            Self::Allocation { .. }
            | Self::StageCreate { .. }
            | Self::CycleDetected(_)
            | Self::Disconnected(_) => BuildStep::CreateWorkers,
            Self::WorkerInit {
                source: InitError::Affinity { .. },
                ..
            } => BuildStep::Place,
            Self::SpawnFailed { .. } | Self::WorkerInit { .. } => BuildStep::Spawn,
            Self::WorkerPanicked(_) => BuildStep::Run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TopologyError::StageNotFound(StageId::StreamTcp);
        assert_eq!(err.to_string(), "stage StreamTcp not found in registry");
        assert_eq!(err.step(), BuildStep::Resolve);
    }

    #[test]
    fn test_affinity_failure_is_placement_step() {
        let err = TopologyError::WorkerInit {
            worker: "Detect1".to_string(),
            source: InitError::Affinity {
                cpus: vec![3],
                message: "Invalid argument".to_string(),
            },
        };
        assert_eq!(err.step(), BuildStep::Place);
        assert_eq!(err.step().to_string(), "place workers");
    }

    #[test]
    fn test_stage_init_failure_is_spawn_step() {
        let err = TopologyError::WorkerInit {
            worker: "Detect2".to_string(),
            source: InitError::Stage {
                stage: StageId::Detect,
                source: StageError::Other("boom".to_string()),
            },
        };
        assert_eq!(err.step(), BuildStep::Spawn);
        assert!(err.to_string().contains("Detect2"));
    }
}
