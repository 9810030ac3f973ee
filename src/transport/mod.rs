//! Message-stream boundary: session-exclusive receive, acknowledge, abandon,
//! publish.
//!
//! The transport owns the ordering-key claims. A receive locks the delivered
//! message's key until the claim is released exactly once through
//! [`SessionTransport::acknowledge`] or [`SessionTransport::abandon`]; while
//! the claim is held, no receiver anywhere is handed another message for that
//! key.

pub mod fs;
pub mod in_memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Message;
use crate::error::TransportError;

pub use fs::FsSessionTransport;
pub use in_memory::InMemorySessionTransport;

/// Opaque token pairing one delivery with the claim it holds.
///
/// Required to acknowledge or abandon that specific delivery; consuming APIs
/// take it by value, so one handle releases one claim at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryHandle {
    pub(crate) queue: String,
    pub(crate) token: String,
}

/// One receive of a message under an exclusive ordering-key claim.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub handle: DeliveryHandle,
    /// How many times this logical message has been delivered, this receive
    /// included (1-based).
    pub attempt: u32,
}

/// Boundary operations of the message stream.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Receive the next message of the oldest unclaimed ordering key on
    /// `queue`, claiming that key. Returns `Ok(None)` when nothing became
    /// available within the transport's receive timeout — the normal idle
    /// condition, not an error.
    async fn receive_exclusive(&self, queue: &str) -> Result<Option<Delivery>, TransportError>;

    /// Permanently consume the delivery and release its ordering-key claim.
    /// The only path that removes a message from the stream for good.
    async fn acknowledge(&self, handle: DeliveryHandle) -> Result<(), TransportError>;

    /// Release the claim without consuming. The message becomes the *next*
    /// delivery for its ordering key — never pushed behind newer messages —
    /// unless its delivery ceiling is exhausted, in which case the transport
    /// dead-letters it instead.
    async fn abandon(&self, handle: DeliveryHandle) -> Result<(), TransportError>;

    /// Append a message to the back of `ordering_key`'s queue on `queue`.
    async fn publish(&self, queue: &str, body: String, ordering_key: &str) -> Result<(), TransportError>;
}
