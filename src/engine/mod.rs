//! Workflow engine facade: one run per inbound message, status on demand.
//!
//! The engine accepts a run, spawns its execution, and exposes the run's
//! current [`RunState`] to pollers. Step execution is strictly sequential
//! within a run: `HandleMessage` first, and `QueueMessage` only if it
//! succeeded. Step failures are captured as [`StepOutcome`] data and turn the
//! run `Failed`; they are never thrown across the engine boundary.

pub mod registry;
pub mod steps;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::{Message, RunId, RunState, StepOutcome, WorkflowRun};

pub use registry::{FnStep, StepHandler, StepRegistry, StepRegistryBuilder};

/// Contract the coordinator depends on: start a run, observe its state.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Accept a run for `input` and return its id. Returns quickly — the
    /// step pipeline executes on a background task. Fails with
    /// [`EngineError::Unavailable`] once the engine stops accepting runs.
    async fn start_run(&self, input: Message) -> Result<RunId, EngineError>;

    /// Current state of a run. [`EngineError::RunNotFound`] for unknown ids —
    /// never for ids returned by [`WorkflowEngine::start_run`] under correct
    /// use.
    async fn get_status(&self, run_id: &str) -> Result<RunState, EngineError>;
}

/// In-process [`WorkflowEngine`] sequencing registered steps per run.
pub struct InProcessEngine {
    steps: StepRegistry,
    pipeline: Vec<String>,
    runs: Arc<Mutex<HashMap<RunId, WorkflowRun>>>,
    accepting: AtomicBool,
    joins: Mutex<Vec<JoinHandle<()>>>,
    run_seq: AtomicU64,
}

impl InProcessEngine {
    /// Start an engine running the fixed two-step pipeline.
    pub fn start(steps: StepRegistry) -> Arc<Self> {
        Self::start_with_pipeline(steps, vec![steps::HANDLE_MESSAGE.into(), steps::QUEUE_MESSAGE.into()])
    }

    /// Start an engine with an explicit step sequence (useful for tests).
    pub fn start_with_pipeline(steps: StepRegistry, pipeline: Vec<String>) -> Arc<Self> {
        // Install a default subscriber if none set (ok to call many times)
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
            .try_init();
        Arc::new(Self {
            steps,
            pipeline,
            runs: Arc::new(Mutex::new(HashMap::new())),
            accepting: AtomicBool::new(true),
            joins: Mutex::new(Vec::new()),
            run_seq: AtomicU64::new(1),
        })
    }

    /// Diagnostic snapshot of a run record.
    pub async fn run(&self, run_id: &str) -> Option<WorkflowRun> {
        self.runs.lock().await.get(run_id).cloned()
    }

    /// Stop accepting runs and abort in-flight executions.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let mut joins = self.joins.lock().await;
        for j in joins.drain(..) {
            j.abort();
        }
    }

    fn next_run_id(&self) -> RunId {
        let now_ns = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = self.run_seq.fetch_add(1, Ordering::Relaxed);
        format!("run-{now_ns:x}-{seq:x}")
    }

    /// Drive one run through the pipeline, updating its record as steps
    /// complete. Stops at the first failed step; later steps never execute.
    async fn execute_run(
        steps: StepRegistry,
        pipeline: Vec<String>,
        runs: Arc<Mutex<HashMap<RunId, WorkflowRun>>>,
        run_id: RunId,
        input: Message,
    ) {
        Self::set_status(&runs, &run_id, RunState::Running).await;
        for step in &pipeline {
            let outcome = match steps.get(step) {
                Some(handler) => match handler.invoke(input.body.clone()).await {
                    Ok(()) => StepOutcome::succeeded(step),
                    Err(e) => StepOutcome::failed(step, e.to_string()),
                },
                None => StepOutcome::failed(step, format!("unregistered:{step}")),
            };
            let failed = !outcome.success;
            Self::record_outcome(&runs, &run_id, outcome).await;
            if failed {
                warn!(run_id = %run_id, step = %step, "step failed; run is terminal");
                Self::set_status(&runs, &run_id, RunState::Failed).await;
                return;
            }
        }
        info!(run_id = %run_id, "run completed");
        Self::set_status(&runs, &run_id, RunState::Completed).await;
    }

    async fn record_outcome(runs: &Mutex<HashMap<RunId, WorkflowRun>>, run_id: &str, outcome: StepOutcome) {
        if let Some(run) = runs.lock().await.get_mut(run_id) {
            run.step_results.push(outcome);
        }
    }

    /// Terminal states are final: a transition out of one is ignored.
    async fn set_status(runs: &Mutex<HashMap<RunId, WorkflowRun>>, run_id: &str, status: RunState) {
        if let Some(run) = runs.lock().await.get_mut(run_id) {
            if !run.status.is_terminal() {
                run.status = status;
            }
        }
    }
}

#[async_trait]
impl WorkflowEngine for InProcessEngine {
    async fn start_run(&self, input: Message) -> Result<RunId, EngineError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable);
        }
        let run_id = self.next_run_id();
        self.runs.lock().await.insert(
            run_id.clone(),
            WorkflowRun {
                run_id: run_id.clone(),
                input: input.clone(),
                status: RunState::Pending,
                step_results: Vec::new(),
            },
        );
        info!(run_id = %run_id, ordering_key = %input.ordering_key, "run accepted");
        let handle = tokio::spawn(Self::execute_run(
            self.steps.clone(),
            self.pipeline.clone(),
            self.runs.clone(),
            run_id.clone(),
            input,
        ));
        self.joins.lock().await.push(handle);
        Ok(run_id)
    }

    async fn get_status(&self, run_id: &str) -> Result<RunState, EngineError> {
        self.runs
            .lock()
            .await
            .get(run_id)
            .map(|run| run.status)
            .ok_or_else(|| EngineError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }
}
