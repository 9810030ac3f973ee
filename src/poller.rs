//! Bounded, cancellable polling of workflow run state.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::RunState;
use crate::engine::WorkflowEngine;
use crate::error::{EngineError, PollError};

/// Repeatedly query `run_id`'s state until it is terminal.
///
/// `Pending` and `Running` wait out one `interval` and re-probe; `Completed`
/// and `Failed` return immediately. The wait is bounded by `max_wait`
/// (exceeding it returns [`PollError::Timeout`]) and cancellable through
/// `cancel` — the caller owns both policies. A `RunNotFound` for an id
/// obtained from `start_run` is a broken engine contract and fails loudly
/// rather than looping.
pub async fn poll_until_terminal(
    engine: &dyn WorkflowEngine,
    run_id: &str,
    interval: Duration,
    max_wait: Duration,
    cancel: &CancellationToken,
) -> Result<RunState, PollError> {
    if interval.is_zero() {
        return Err(PollError::InvariantViolation("poll interval must be non-zero".into()));
    }
    let deadline = Instant::now() + max_wait;
    loop {
        match engine.get_status(run_id).await {
            Ok(state) if state.is_terminal() => return Ok(state),
            Ok(_) => {}
            Err(EngineError::RunNotFound { run_id }) => {
                error!(run_id = %run_id, "status query lost track of a started run");
                return Err(PollError::InvariantViolation(format!(
                    "run {run_id} vanished while being polled"
                )));
            }
            Err(e) => return Err(PollError::Engine(e)),
        }
        if Instant::now() >= deadline {
            return Err(PollError::Timeout);
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
