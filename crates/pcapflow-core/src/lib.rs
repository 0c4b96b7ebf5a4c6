//! # `pcapflow` Core
//!
//! Execution-topology builder for offline packet inspection.
//!
//! Given a stored capture and a detection context, this crate builds the
//! worker threads that read, decode, reassemble, inspect, and emit results
//! for every packet, connects them with queues, and places them on CPUs.
//!
//! This crate provides:
//! - **Stages**: closed set of stage ids resolved through a registry
//! - **Queues**: exclusive, round-robin and flow-affine dispatch, plus the
//!   packet buffer pool
//! - **Workers**: one OS thread per worker, two-phase start
//! - **Placement**: detect worker count, CPU rotation and priority classes
//! - **Topology**: the single, fan-out and flow-affine strategies
//!
//! ## Design Principles
//!
//! 1. **Fail fast** - every construction error surfaces before any packet
//!    moves, and no worker is left running
//! 2. **No globals** - placement state and queue handles are explicit values
//! 3. **Drain to completion** - end of input closes queues downstream
//!
//! ## Example
//!
//! ```rust,ignore
//! use pcapflow_core::{build, Config, Strategy, TopologyConfig};
//!
//! let config = TopologyConfig::from_config(&Config::load("pcapflow.yaml")?, num_cpus::get())?;
//! let topology = build(config.strategy, &config, &registry, detect_ctx)?;
//! let report = topology.join()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)] // Allowed only for the affinity and priority syscalls
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod packet;
pub mod placement;
pub mod queue;
pub mod stage;
pub mod topology;
pub mod worker;

// Re-export key types
pub use config::{Config, ConfigError, ConfigKey, RoleCpuSets, TopologyConfig};
pub use error::{BuildStep, InitError, TopologyError};
pub use packet::{FlowKey, Packet};
pub use placement::{Placement, PlacementPolicy, PlacementState, PriorityClass};
pub use queue::{DispatchPolicy, QueueError, QueueInfo};
pub use stage::{
    BoundContext, Stage, StageError, StageFactory, StageId, StageRef, StageRegistry,
    StaticStageRegistry, ThreadInfo, Verdict,
};
pub use topology::{
    build, build_fan_out, build_flow_affine, build_single, ConfiguredOutputs, OutputWiring,
    Strategy, Topology, TopologyBuilder, TopologyPlan, TopologyReport,
};
pub use worker::{WorkerCounters, WorkerInfo, WorkerSpec};
