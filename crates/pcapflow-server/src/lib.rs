//! # `pcapflow` Server
//!
//! Offline capture runner: reads a pcap file through the topology built by
//! `pcapflow-core`, using the reference stages in [`stages`].
//!
//! ```text
//! pcapflow.yaml ──► Config ──► TopologyConfig ──┐
//! rules ──────────► DetectContext ──────────────┼──► build ──► join ──► summary
//! stages::registry ─────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod pcap;
pub mod rules;
pub mod run;
pub mod stages;

pub use rules::{DetectContext, RuleError};
pub use run::{detect_context, log_summary, run, write_stats};
