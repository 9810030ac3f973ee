//! In-memory session-queue transport.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Delivery, DeliveryHandle, SessionTransport};
use crate::Message;
use crate::error::TransportError;

#[derive(Debug, Clone)]
struct QueuedMessage {
    body: String,
    delivery_count: u32,
}

#[derive(Debug, Clone)]
struct LockedDelivery {
    queue: String,
    ordering_key: String,
    body: String,
    delivery_count: u32,
}

#[derive(Default)]
struct QueueState {
    /// Per ordering key, FIFO of pending messages.
    sessions: HashMap<String, VecDeque<QueuedMessage>>,
    /// Ordering keys in first-publish order; receive scans this for fairness.
    key_order: Vec<String>,
    /// Keys currently held by an unreleased delivery.
    claimed: HashSet<String>,
    dead_letters: Vec<Message>,
}

/// Process-local [`SessionTransport`] backed by per-key FIFO queues.
///
/// Claims live in process memory, so they die with the process; use
/// [`super::FsSessionTransport`] when claims must outlive a restart.
pub struct InMemorySessionTransport {
    queues: Mutex<HashMap<String, QueueState>>,
    locked: Mutex<HashMap<String, LockedDelivery>>,
    receive_timeout: Duration,
    max_delivery_attempts: u32,
    token_seq: AtomicU64,
}

impl InMemorySessionTransport {
    const RECEIVE_POLL_MS: u64 = 10;

    pub fn new(receive_timeout: Duration, max_delivery_attempts: u32) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            locked: Mutex::new(HashMap::new()),
            receive_timeout,
            max_delivery_attempts,
            token_seq: AtomicU64::new(1),
        }
    }

    /// Messages that exhausted their delivery ceiling on `queue`, oldest first.
    pub async fn dead_letters(&self, queue: &str) -> Vec<Message> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }

    fn next_token(&self) -> String {
        let now_ns = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = self.token_seq.fetch_add(1, Ordering::Relaxed);
        format!("{now_ns:x}-{seq:x}")
    }

    async fn try_receive(&self, queue: &str) -> Option<Delivery> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue)?;
        let key = state
            .key_order
            .iter()
            .find(|k| {
                !state.claimed.contains(k.as_str())
                    && state.sessions.get(k.as_str()).is_some_and(|q| !q.is_empty())
            })?
            .clone();
        let mut item = state.sessions.get_mut(&key)?.pop_front()?;
        item.delivery_count += 1;
        state.claimed.insert(key.clone());
        let token = self.next_token();
        let locked = LockedDelivery {
            queue: queue.to_string(),
            ordering_key: key.clone(),
            body: item.body.clone(),
            delivery_count: item.delivery_count,
        };
        drop(queues);
        self.locked.lock().await.insert(token.clone(), locked);
        Some(Delivery {
            message: Message {
                body: item.body,
                ordering_key: key,
            },
            handle: DeliveryHandle {
                queue: queue.to_string(),
                token,
            },
            attempt: item.delivery_count,
        })
    }
}

#[async_trait::async_trait]
impl SessionTransport for InMemorySessionTransport {
    async fn receive_exclusive(&self, queue: &str) -> Result<Option<Delivery>, TransportError> {
        let deadline = Instant::now() + self.receive_timeout;
        loop {
            if let Some(delivery) = self.try_receive(queue).await {
                debug!(queue, ordering_key = %delivery.message.ordering_key, attempt = delivery.attempt, "delivered under claim");
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(Self::RECEIVE_POLL_MS)).await;
        }
    }

    async fn acknowledge(&self, handle: DeliveryHandle) -> Result<(), TransportError> {
        let locked = self
            .locked
            .lock()
            .await
            .remove(&handle.token)
            .ok_or_else(|| TransportError::UnknownToken(handle.token.clone()))?;
        let mut queues = self.queues.lock().await;
        if let Some(state) = queues.get_mut(&locked.queue) {
            state.claimed.remove(&locked.ordering_key);
        }
        debug!(queue = %locked.queue, ordering_key = %locked.ordering_key, "delivery acknowledged");
        Ok(())
    }

    async fn abandon(&self, handle: DeliveryHandle) -> Result<(), TransportError> {
        let locked = self
            .locked
            .lock()
            .await
            .remove(&handle.token)
            .ok_or_else(|| TransportError::UnknownToken(handle.token.clone()))?;
        let mut queues = self.queues.lock().await;
        let state = queues.entry(locked.queue.clone()).or_default();
        state.claimed.remove(&locked.ordering_key);
        if locked.delivery_count >= self.max_delivery_attempts {
            warn!(
                queue = %locked.queue,
                ordering_key = %locked.ordering_key,
                attempts = locked.delivery_count,
                "delivery ceiling exhausted; dead-lettering message"
            );
            state.dead_letters.push(Message {
                body: locked.body,
                ordering_key: locked.ordering_key,
            });
        } else {
            // Front of the key's queue: the abandoned message stays the next
            // delivery for its ordering key.
            state
                .sessions
                .entry(locked.ordering_key.clone())
                .or_default()
                .push_front(QueuedMessage {
                    body: locked.body,
                    delivery_count: locked.delivery_count,
                });
            debug!(queue = %locked.queue, ordering_key = %locked.ordering_key, "delivery abandoned; message redeliverable");
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, body: String, ordering_key: &str) -> Result<(), TransportError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();
        if !state.sessions.contains_key(ordering_key) {
            state.key_order.push(ordering_key.to_string());
        }
        state
            .sessions
            .entry(ordering_key.to_string())
            .or_default()
            .push_back(QueuedMessage {
                body,
                delivery_count: 0,
            });
        Ok(())
    }
}
