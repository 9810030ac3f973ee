//! Session-locked sequential message processing.
//!
//! This crate consumes messages from an ordered queue one ordering key at a
//! time: while a message's workflow is in flight, the transport holds an
//! exclusive claim on that key and no later message for the key can be
//! received anywhere. It provides:
//!
//! - Public data model: [`Message`], [`RunState`], [`StepOutcome`],
//!   [`WorkflowRun`]
//! - A [`transport::SessionTransport`] boundary with in-memory and
//!   filesystem-backed implementations (peek-lock receive, acknowledge,
//!   abandon, publish)
//! - A [`engine::WorkflowEngine`] facade that sequences the fixed two-step
//!   pipeline (`HandleMessage`, then `QueueMessage`) per run
//! - The [`coordinator::Processor`], which ties one delivery to one run and
//!   releases the claim on every exit path
//!
//! A run that completes acknowledges its delivery and advances the stream; a
//! run that fails abandons it, and the transport redelivers the same message
//! ahead of anything newer on its ordering key.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod loader;
pub mod poller;
pub mod transport;

use serde::{Deserialize, Serialize};

pub use config::ProcessorConfig;
pub use coordinator::{CycleOutcome, Processor};
pub use engine::registry::{StepRegistry, StepRegistryBuilder};
pub use engine::{InProcessEngine, WorkflowEngine};
pub use error::{ConfigError, CycleError, EngineError, PollError, ProcessingError, TransportError};
pub use transport::{Delivery, DeliveryHandle, SessionTransport};

/// Identifier of one workflow run, as returned by
/// [`engine::WorkflowEngine::start_run`].
pub type RunId = String;

/// A logical message on a stream.
///
/// Bodies are opaque text; the `ordering_key` groups messages that must be
/// delivered and fully processed in strict arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub body: String,
    pub ordering_key: String,
}

impl Message {
    pub fn new(body: impl Into<String>, ordering_key: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ordering_key: ordering_key.into(),
        }
    }
}

/// Lifecycle of a workflow run.
///
/// `Pending` and `Running` are transient; `Completed` and `Failed` are
/// terminal and a run never transitions out of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunState {
    /// Accepted by the engine, no step executed yet.
    Pending,
    /// At least one step executing or between steps.
    Running,
    /// Every step succeeded.
    Completed,
    /// A step failed; later steps were not executed.
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// Outcome of one step execution, recorded for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: String,
    pub success: bool,
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn succeeded(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Record of one workflow run: one execution attempt of the step pipeline
/// for one message delivery.
///
/// Created by `start_run`, mutated only by the engine as steps complete, and
/// immutable once `status` is terminal. A redelivered message gets a fresh
/// run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowRun {
    pub run_id: RunId,
    pub input: Message,
    pub status: RunState,
    pub step_results: Vec<StepOutcome>,
}
