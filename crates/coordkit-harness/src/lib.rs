//! Stress harness for the coordkit primitives.
//!
//! This crate provides:
//! - Scenario sets: versioned JSON descriptions of multi-threaded workloads
//! - Workloads: one per primitive, each checking its invariant after joining
//! - A runner that emits structured JSONL logs per scenario
//! - Reports: summary counts, failure markers and replay controls
//! - Artifact indexing with SHA-256 integrity

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod structured_log;
pub mod workloads;

pub use config::{HarnessConfig, StressProfile};
pub use error::{HarnessError, HarnessResult};
pub use report::StressReport;
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::{ScenarioCase, ScenarioKind, ScenarioSet};
