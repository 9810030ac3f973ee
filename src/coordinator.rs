//! The session-locked coordinator: one exclusive claim, one workflow run,
//! hold-until-terminal.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ProcessorConfig;
use crate::engine::WorkflowEngine;
use crate::error::{ConfigError, CycleError, PollError};
use crate::poller;
use crate::transport::{DeliveryHandle, SessionTransport};
use crate::{RunId, RunState};

/// How one processing cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No message arrived within the transport's receive timeout.
    Idle,
    /// The run completed; the delivery was acknowledged and the stream
    /// advanced.
    Completed { run_id: RunId },
    /// The run failed; the delivery was abandoned and will be redelivered
    /// ahead of anything newer on its ordering key.
    FailedWillRetry { run_id: RunId, attempt: u32 },
}

/// Ties a single message delivery to a single workflow run and enforces the
/// hold-until-terminal discipline: the ordering-key claim acquired by the
/// receive stays held until the run is terminal, and is released exactly once
/// on every exit path.
pub struct Processor {
    transport: Arc<dyn SessionTransport>,
    engine: Arc<dyn WorkflowEngine>,
    config: ProcessorConfig,
}

impl Processor {
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        engine: Arc<dyn WorkflowEngine>,
        config: ProcessorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport,
            engine,
            config,
        })
    }

    /// Run one processing cycle: receive under claim, start the run, poll to
    /// terminal, then acknowledge (the only consuming path) or abandon.
    ///
    /// An expected run failure is an `Ok(FailedWillRetry)` outcome, not an
    /// error; `Err` means a collaborator misbehaved — and the claim was
    /// released via abandon before the error propagated.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleOutcome, CycleError> {
        let Some(delivery) = self.transport.receive_exclusive(&self.config.input_queue).await? else {
            return Ok(CycleOutcome::Idle);
        };
        let message = delivery.message;
        let handle = delivery.handle;
        let attempt = delivery.attempt;
        info!(ordering_key = %message.ordering_key, attempt, "processing message");

        let run_id = match self.engine.start_run(message.clone()).await {
            Ok(run_id) => run_id,
            Err(e) => {
                error!(error = %e, "engine rejected the run; abandoning delivery");
                self.release(handle).await?;
                return Err(CycleError::Engine(e));
            }
        };

        let polled = poller::poll_until_terminal(
            self.engine.as_ref(),
            &run_id,
            self.config.poll_interval,
            self.config.max_poll_wait,
            cancel,
        )
        .await;

        match polled {
            Ok(RunState::Completed) => {
                self.transport.acknowledge(handle).await?;
                info!(run_id = %run_id, "run completed; delivery acknowledged");
                Ok(CycleOutcome::Completed { run_id })
            }
            Ok(RunState::Failed) => {
                warn!(run_id = %run_id, attempt, "run failed; delivery abandoned for redelivery");
                self.release(handle).await?;
                Ok(CycleOutcome::FailedWillRetry { run_id, attempt })
            }
            Ok(state) => {
                self.release(handle).await?;
                Err(CycleError::Poll(PollError::InvariantViolation(format!(
                    "poller returned non-terminal state {state:?}"
                ))))
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "polling did not resolve; abandoning delivery");
                self.release(handle).await?;
                Err(CycleError::Poll(e))
            }
        }
    }

    /// Host loop: cycle until cancelled. Expected run failures are routine
    /// and keep the loop alive; engine and transport errors terminate it —
    /// they mean the surrounding system is unhealthy.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), CycleError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.run_cycle(&cancel).await {
                Ok(_) => {}
                Err(CycleError::Poll(PollError::Cancelled)) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "processing cycle failed");
                    return Err(e);
                }
            }
        }
    }

    /// Abandon the delivery, surfacing release failures instead of dropping
    /// them: a lost abandon risks a stuck claim or a lost message.
    async fn release(&self, handle: DeliveryHandle) -> Result<(), CycleError> {
        self.transport.abandon(handle).await.map_err(|e| {
            error!(error = %e, "failed to abandon delivery; claim may be stuck until lease expiry");
            CycleError::Transport(e)
        })
    }
}
