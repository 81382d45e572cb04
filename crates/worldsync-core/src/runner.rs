//! Server run loop.
//!
//! [`run_server`] drives [`Simulation::tick`] at a fixed interval until a
//! stop is requested or the configured frame limit is reached. Persistence
//! faults are logged and the loop carries on, unless the configuration
//! says to stop on them. A broken world invariant aborts the process
//! before anything else can be saved.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::simulation::{FrameSummary, Simulation, SimulationError};

/// Errors that end the run loop early.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A persistence fault with `fatal_on_persist_error` set.
    #[error("stopping on persistence fault: {source}")]
    Persist {
        /// The underlying fault.
        #[from]
        source: SimulationError,
    },
}

/// Why the run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEndReason {
    /// The stop flag was raised.
    Stopped,
    /// `max_ticks` frames ran.
    MaxTicksReached,
}

/// Result of a run.
#[derive(Debug, Clone, Copy)]
pub struct RunResult {
    /// Why the loop ended.
    pub end_reason: RunEndReason,
    /// The last frame that ran, if any.
    pub final_summary: Option<FrameSummary>,
    /// Frames run by this call.
    pub total_ticks: u64,
    /// Persistence faults logged and skipped.
    pub persist_faults: u64,
}

/// Run frames until `stop` is raised or `config.max_ticks` is reached.
///
/// # Errors
///
/// Returns [`RunnerError::Persist`] for a persistence fault when
/// `config.fatal_on_persist_error` is set.
pub async fn run_server(
    sim: &mut Simulation,
    config: &RunConfig,
    stop: &AtomicBool,
) -> Result<RunResult, RunnerError> {
    let mut last_summary: Option<FrameSummary> = None;
    let mut total_ticks: u64 = 0;
    let mut persist_faults: u64 = 0;

    info!(
        max_ticks = config.max_ticks,
        tick_interval_ms = config.tick_interval_ms,
        "Server loop starting"
    );

    loop {
        if stop.load(Ordering::Acquire) {
            info!(total_ticks, "Stop requested");
            return Ok(RunResult {
                end_reason: RunEndReason::Stopped,
                final_summary: last_summary,
                total_ticks,
                persist_faults,
            });
        }

        match sim.tick() {
            Ok(summary) => last_summary = Some(summary),
            Err(e) if e.is_fatal() => abort_on_invariant(&e),
            Err(e) if config.fatal_on_persist_error => {
                error!(frame = sim.frame(), error = %e, "Persistence fault, stopping");
                return Err(e.into());
            }
            Err(e) => {
                persist_faults = persist_faults.saturating_add(1);
                warn!(frame = sim.frame(), error = %e, "Persistence fault, continuing");
            }
        }
        total_ticks = total_ticks.saturating_add(1);

        if config.max_ticks > 0 && total_ticks >= config.max_ticks {
            info!(total_ticks, max_ticks = config.max_ticks, "Tick limit reached");
            return Ok(RunResult {
                end_reason: RunEndReason::MaxTicksReached,
                final_summary: last_summary,
                total_ticks,
                persist_faults,
            });
        }

        if config.tick_interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(config.tick_interval_ms)).await;
        }
    }
}

fn abort_on_invariant(e: &SimulationError) -> ! {
    error!(error = %e, "World invariant violated, aborting");
    std::process::abort()
}

/// Log the end of a run.
pub fn log_run_end(result: &RunResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        persist_faults = result.persist_faults,
        final_frame = result.final_summary.as_ref().map(|s| s.frame),
        "Server loop ended"
    );
    if result.final_summary.is_none() {
        warn!("Server loop ended with no frames executed");
    }
}
