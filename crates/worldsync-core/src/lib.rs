//! Orchestration for the Worldsync server.
//!
//! This crate wires the live world to its persistence pipeline and drives
//! both from a single simulation thread. Each frame fires due timers,
//! hands every changed snapshot to the save worker, and collects the
//! worker's results.
//!
//! # Modules
//!
//! - [`config`] -- Loading `worldsync-config.yaml` into strongly-typed
//!   structs.
//! - [`loader`] -- Startup load of stored snapshots into the world.
//! - [`simulation`] -- [`Simulation`](simulation::Simulation), the
//!   per-frame tick and the shutdown flush.
//! - [`runner`] -- The bounded async run loop.

pub mod config;
pub mod loader;
pub mod runner;
pub mod simulation;

pub use config::{ConfigError, ServerConfig};
pub use loader::LoadSummary;
pub use runner::{RunEndReason, RunResult, RunnerError, log_run_end, run_server};
pub use simulation::{FrameSummary, Simulation, SimulationError};
