#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use seqbus::engine::steps;
use seqbus::transport::{InMemorySessionTransport, SessionTransport};
use seqbus::{ProcessingError, ProcessorConfig, StepRegistry};

pub const INPUT_QUEUE: &str = "inbound";
pub const OUTPUT_QUEUE: &str = "outbound";
pub const OUTPUT_KEY: &str = "SingleSession";

pub fn test_config() -> ProcessorConfig {
    ProcessorConfig {
        input_queue: INPUT_QUEUE.into(),
        output_queue: OUTPUT_QUEUE.into(),
        output_ordering_key: OUTPUT_KEY.into(),
        poll_interval: Duration::from_millis(10),
        max_poll_wait: Duration::from_secs(5),
        fault_injection: false,
        simulated_processing_duration: Duration::ZERO,
    }
}

pub fn test_transport() -> Arc<InMemorySessionTransport> {
    Arc::new(InMemorySessionTransport::new(Duration::from_millis(100), 10))
}

/// Step set with the production emit step but a caller-supplied
/// `HandleMessage`, so tests can script failures deterministically.
pub fn steps_with_handler<F, Fut>(
    transport: Arc<dyn SessionTransport>,
    config: &ProcessorConfig,
    handle: F,
) -> StepRegistry
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), ProcessingError>> + Send + 'static,
{
    let output_queue = config.output_queue.clone();
    let output_key = config.output_ordering_key.clone();
    StepRegistry::builder()
        .register(steps::HANDLE_MESSAGE, handle)
        .register(steps::QUEUE_MESSAGE, move |body: String| {
            let transport = transport.clone();
            let output_queue = output_queue.clone();
            let output_key = output_key.clone();
            async move {
                transport
                    .publish(&output_queue, format!("processed: {body}"), &output_key)
                    .await
                    .map_err(|e| ProcessingError::new(format!("emit failed: {e}")))
            }
        })
        .build()
}

/// Step set whose `HandleMessage` fails the first `fail_attempts` invocations
/// and succeeds afterwards.
pub fn scripted_steps(
    transport: Arc<dyn SessionTransport>,
    config: &ProcessorConfig,
    fail_attempts: u32,
) -> StepRegistry {
    let remaining = Arc::new(AtomicU32::new(fail_attempts));
    steps_with_handler(transport, config, move |_body: String| {
        let remaining = remaining.clone();
        async move {
            if remaining.load(Ordering::SeqCst) > 0 {
                remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(ProcessingError::new("scripted failure"));
            }
            Ok(())
        }
    })
}
