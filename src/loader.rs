//! Queue seeding and draining helpers.

use tracing::info;

use crate::error::TransportError;
use crate::transport::SessionTransport;

/// Place `count` generated messages on `queue` under a single ordering key,
/// so they are delivered and processed in strict sequence.
pub async fn load_messages(
    transport: &dyn SessionTransport,
    queue: &str,
    ordering_key: &str,
    count: usize,
) -> Result<(), TransportError> {
    for i in 0..count {
        transport
            .publish(queue, format!("This is message {i}"), ordering_key)
            .await?;
    }
    info!(queue, count, "messages placed on queue");
    Ok(())
}

/// Receive and acknowledge everything currently on `queue`, returning bodies
/// in delivery order. Stops at the first receive timeout.
pub async fn drain(transport: &dyn SessionTransport, queue: &str) -> Result<Vec<String>, TransportError> {
    let mut bodies = Vec::new();
    while let Some(delivery) = transport.receive_exclusive(queue).await? {
        bodies.push(delivery.message.body);
        transport.acknowledge(delivery.handle).await?;
    }
    Ok(bodies)
}
