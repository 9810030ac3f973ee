use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use seqbus::engine::steps;
use seqbus::{
    EngineError, InProcessEngine, Message, PollError, ProcessingError, RunState, StepRegistry, WorkflowEngine, poller,
};

mod common;

const POLL: Duration = Duration::from_millis(5);
const WAIT: Duration = Duration::from_secs(5);

async fn poll(engine: &InProcessEngine, run_id: &str) -> RunState {
    poller::poll_until_terminal(engine, run_id, POLL, WAIT, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn completed_run_records_both_steps_in_order() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let trace_handle = trace.clone();
    let trace_queue = trace.clone();
    let registry = StepRegistry::builder()
        .register(steps::HANDLE_MESSAGE, move |_body: String| {
            let trace = trace_handle.clone();
            async move {
                // Linger so an out-of-order QueueMessage would be observable.
                tokio::time::sleep(Duration::from_millis(20)).await;
                trace.lock().await.push(steps::HANDLE_MESSAGE);
                Ok(())
            }
        })
        .register(steps::QUEUE_MESSAGE, move |_body: String| {
            let trace = trace_queue.clone();
            async move {
                trace.lock().await.push(steps::QUEUE_MESSAGE);
                Ok(())
            }
        })
        .build();
    let engine = InProcessEngine::start(registry);

    let run_id = engine.start_run(Message::new("m0", "k")).await.unwrap();
    assert_eq!(poll(&engine, &run_id).await, RunState::Completed);

    assert_eq!(*trace.lock().await, vec![steps::HANDLE_MESSAGE, steps::QUEUE_MESSAGE]);
    let run = engine.run(&run_id).await.unwrap();
    assert_eq!(run.status, RunState::Completed);
    assert_eq!(run.step_results.len(), 2);
    assert!(run.step_results.iter().all(|o| o.success));
}

#[tokio::test]
async fn failed_handle_skips_queue_message() {
    let emissions = Arc::new(AtomicU32::new(0));
    let emissions_in_step = emissions.clone();
    let registry = StepRegistry::builder()
        .register(steps::HANDLE_MESSAGE, |_body: String| async move {
            Err(ProcessingError::new("boom"))
        })
        .register(steps::QUEUE_MESSAGE, move |_body: String| {
            let emissions = emissions_in_step.clone();
            async move {
                emissions.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .build();
    let engine = InProcessEngine::start(registry);

    let run_id = engine.start_run(Message::new("m0", "k")).await.unwrap();
    assert_eq!(poll(&engine, &run_id).await, RunState::Failed);

    let run = engine.run(&run_id).await.unwrap();
    assert_eq!(run.step_results.len(), 1);
    assert_eq!(run.step_results[0].step, steps::HANDLE_MESSAGE);
    assert_eq!(run.step_results[0].error.as_deref(), Some("boom"));
    assert_eq!(emissions.load(Ordering::SeqCst), 0, "no emission for a failed run");
}

#[tokio::test]
async fn unregistered_step_fails_the_run() {
    let engine = InProcessEngine::start(StepRegistry::default());

    let run_id = engine.start_run(Message::new("m0", "k")).await.unwrap();
    assert_eq!(poll(&engine, &run_id).await, RunState::Failed);

    let run = engine.run(&run_id).await.unwrap();
    assert_eq!(
        run.step_results[0].error.as_deref(),
        Some("unregistered:HandleMessage")
    );
}

#[tokio::test]
async fn status_of_unknown_run_is_run_not_found() {
    let engine = InProcessEngine::start(StepRegistry::default());
    let err = engine.get_status("no-such-run").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::RunNotFound {
            run_id: "no-such-run".into()
        }
    );
}

#[tokio::test]
async fn shutdown_engine_rejects_new_runs() {
    let engine = InProcessEngine::start(StepRegistry::default());
    engine.shutdown().await;
    let err = engine.start_run(Message::new("m0", "k")).await.unwrap_err();
    assert_eq!(err, EngineError::Unavailable);
}

#[tokio::test]
async fn default_steps_emit_derived_output() {
    let transport = common::test_transport();
    let config = common::test_config();
    let engine = InProcessEngine::start(steps::default_steps(transport.clone(), &config));

    let run_id = engine.start_run(Message::new("hello", "k")).await.unwrap();
    assert_eq!(poll(&engine, &run_id).await, RunState::Completed);

    let outputs = seqbus::loader::drain(transport.as_ref(), common::OUTPUT_QUEUE).await.unwrap();
    assert_eq!(outputs, vec!["processed: hello".to_string()]);
}

#[tokio::test]
async fn poller_rejects_zero_interval() {
    let engine = InProcessEngine::start(StepRegistry::default());
    let err = poller::poll_until_terminal(&*engine, "r", Duration::ZERO, WAIT, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::InvariantViolation(_)));
}

#[tokio::test]
async fn poller_honors_cancellation() {
    // A run that never terminates: HandleMessage sleeps far past the test.
    let registry = StepRegistry::builder()
        .register(steps::HANDLE_MESSAGE, |_body: String| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .register(steps::QUEUE_MESSAGE, |_body: String| async move { Ok(()) })
        .build();
    let engine = InProcessEngine::start(registry);
    let run_id = engine.start_run(Message::new("m0", "k")).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = poller::poll_until_terminal(&*engine, &run_id, POLL, WAIT, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::Cancelled));
    engine.shutdown().await;
}
