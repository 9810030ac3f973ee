//! Error types for seqbus.
//!
//! The taxonomy follows the boundaries of the system: step failures are
//! expected and recoverable, transport and engine failures are collaborator
//! outages, and invariant violations are programming errors that must fail
//! loudly.

use thiserror::Error;

/// Expected, recoverable failure raised by a workflow step.
///
/// A `ProcessingError` never crosses the engine boundary as an error: it is
/// captured as a [`crate::StepOutcome`] and turns the run `Failed`, which in
/// turn makes the delivery redeliverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProcessingError(pub String);

impl ProcessingError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors raised by a [`crate::transport::SessionTransport`].
///
/// A receive that times out is *not* an error — it is the normal idle
/// condition and surfaces as `Ok(None)`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Acknowledge or abandon was attempted with a token the transport does
    /// not hold a claim for. Releasing a claim twice is an integration error.
    #[error("unknown or already released delivery token: {0}")]
    UnknownToken(String),

    /// Filesystem-backed transport I/O failure.
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted queue data could not be decoded.
    #[error("corrupt queue data: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors raised by the workflow engine facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine is not accepting new runs (shut down or refusing work).
    #[error("engine is not accepting new runs")]
    Unavailable,

    /// No run record exists for the queried id. Must never happen for ids
    /// returned by `start_run` under correct use.
    #[error("unknown run id: {run_id}")]
    RunNotFound { run_id: String },
}

/// Errors raised by [`crate::poller::poll_until_terminal`].
#[derive(Debug, Error)]
pub enum PollError {
    /// The run did not reach a terminal state within the allowed wait.
    #[error("run did not reach a terminal state within the allowed wait")]
    Timeout,

    /// The poll was cancelled by the caller's cancellation token.
    #[error("poll cancelled")]
    Cancelled,

    /// The engine's status contract was broken (e.g. a started run vanished).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The engine failed the status query outright.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Fatal-for-this-cycle errors surfaced by the coordinator.
///
/// Every variant implies the ordering-key claim was already released via
/// abandon before the error propagated; the expected run-`Failed` path is a
/// [`crate::coordinator::CycleOutcome`], not an error.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("poll error: {0}")]
    Poll(#[from] PollError),
}

/// Invalid [`crate::config::ProcessorConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The status poll interval must be a positive duration; a zero interval
    /// would busy-spin against the engine.
    #[error("poll_interval must be non-zero")]
    ZeroPollInterval,
}
