//! The workflow step set: simulate handling a message, then emit the result.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use super::registry::StepRegistry;
use crate::config::ProcessorConfig;
use crate::error::ProcessingError;
use crate::transport::SessionTransport;

/// Step names of the fixed two-step pipeline.
pub const HANDLE_MESSAGE: &str = "HandleMessage";
pub const QUEUE_MESSAGE: &str = "QueueMessage";

/// Injected failures fire on 2 of 10 draws when fault injection is enabled.
const FAULT_THRESHOLD: u32 = 8;
/// Bounds of the random jitter added to the simulated processing duration.
const JITTER_MIN_MS: u64 = 100;
const JITTER_MAX_MS: u64 = 1000;

/// Build the production step set.
///
/// `HandleMessage` models variable-duration work (base duration plus bounded
/// jitter) and, when fault injection is enabled, fails before doing anything
/// on roughly 20% of invocations — no output is emitted for a failed run.
/// `QueueMessage` publishes the derived result to the configured output
/// queue; the engine only reaches it after `HandleMessage` succeeded.
pub fn default_steps(transport: Arc<dyn SessionTransport>, config: &ProcessorConfig) -> StepRegistry {
    let fault_injection = config.fault_injection;
    let base_duration = config.simulated_processing_duration;
    let output_queue = config.output_queue.clone();
    let output_key = config.output_ordering_key.clone();

    StepRegistry::builder()
        .register(HANDLE_MESSAGE, move |body: String| async move {
            info!(message = %body, "handling message");
            if fault_injection && rand::thread_rng().gen_range(0..10) >= FAULT_THRESHOLD {
                warn!(message = %body, "intermittent error injected");
                return Err(ProcessingError::new("intermittent processing error"));
            }
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(JITTER_MIN_MS..JITTER_MAX_MS));
            tokio::time::sleep(base_duration + jitter).await;
            Ok(())
        })
        .register(QUEUE_MESSAGE, move |body: String| {
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
