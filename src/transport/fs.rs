//! Filesystem-backed session-queue transport writing JSONL per queue.
//!
//! Claims are lock sidecar files, so they survive a process restart: a new
//! transport opened on the same root honors existing claims until their lease
//! expires, at which point the locked message is returned to its queue.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Delivery, DeliveryHandle, SessionTransport};
use crate::Message;
use crate::error::TransportError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct QueueEntry {
    body: String,
    ordering_key: String,
    delivery_count: u32,
}

/// [`SessionTransport`] persisting queues as JSONL files under a root
/// directory, with one lock sidecar per held claim.
pub struct FsSessionTransport {
    root: PathBuf,
    receive_timeout: Duration,
    max_delivery_attempts: u32,
    lock_duration: Duration,
}

impl FsSessionTransport {
    const RECEIVE_POLL_MS: u64 = 10;
    const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(300);

    /// Create a transport rooted at the given directory with the default
    /// claim lease. If `reset_on_create` is true, existing data under the
    /// root is deleted first.
    pub fn new(
        root: impl AsRef<Path>,
        reset_on_create: bool,
        receive_timeout: Duration,
        max_delivery_attempts: u32,
    ) -> Self {
        Self::new_with_lease(
            root,
            reset_on_create,
            receive_timeout,
            max_delivery_attempts,
            Self::DEFAULT_LOCK_DURATION,
        )
    }

    /// Create a transport with an explicit claim lease (useful for tests).
    pub fn new_with_lease(
        root: impl AsRef<Path>,
        reset_on_create: bool,
        receive_timeout: Duration,
        max_delivery_attempts: u32,
        lock_duration: Duration,
    ) -> Self {
        let path = root.as_ref().to_path_buf();
        if reset_on_create {
            let _ = std::fs::remove_dir_all(&path);
        }
        let _ = std::fs::create_dir_all(&path);
        Self {
            root: path,
            receive_timeout,
            max_delivery_attempts,
            lock_duration,
        }
    }

    fn queue_file(&self, queue: &str) -> PathBuf {
        self.root.join(format!("{queue}.jsonl"))
    }

    fn dead_letter_file(&self, queue: &str) -> PathBuf {
        self.root.join(format!("{queue}.dlq.jsonl"))
    }

    fn lock_dir(&self, queue: &str) -> PathBuf {
        self.root.join(".locks").join(queue)
    }

    fn lock_path(&self, queue: &str, token: &str) -> PathBuf {
        self.lock_dir(queue).join(format!("{token}.lock"))
    }

    fn read_entries(path: &Path) -> Result<Vec<QueueEntry>, TransportError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str::<QueueEntry>(line)?);
        }
        Ok(out)
    }

    /// Rewrite a queue file atomically via tmp + rename.
    fn write_entries(path: &Path, entries: &[QueueEntry]) -> Result<(), TransportError> {
        let tmp = path.with_extension("jsonl.tmp");
        {
            use std::io::Write as _;
            let mut tf = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            for entry in entries {
                let line = serde_json::to_string(entry)?;
                tf.write_all(line.as_bytes())?;
                tf.write_all(b"\n")?;
            }
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn append_entry(path: &Path, entry: &QueueEntry) -> Result<(), TransportError> {
        use std::io::Write as _;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(entry)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Ordering keys currently claimed on `queue`. Lock files older than the
    /// lease are reclaimed here: their message goes back to the front of the
    /// queue and the stale claim disappears.
    fn claimed_keys(&self, queue: &str) -> Result<HashSet<String>, TransportError> {
        let mut claimed = HashSet::new();
        let dir = self.lock_dir(queue);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(claimed),
            Err(e) => return Err(e.into()),
        };
        for dirent in entries {
            let dirent = dirent?;
            let lock_path = dirent.path();
            let expired = dirent
                .metadata()?
                .modified()?
                .elapsed()
                .map(|age| age > self.lock_duration)
                .unwrap_or(false);
            let entry: QueueEntry = serde_json::from_str(&std::fs::read_to_string(&lock_path)?)?;
            if expired {
                warn!(queue, ordering_key = %entry.ordering_key, "claim lease expired; returning message to queue");
                let mut pending = Self::read_entries(&self.queue_file(queue))?;
                pending.insert(0, entry);
                Self::write_entries(&self.queue_file(queue), &pending)?;
                std::fs::remove_file(&lock_path)?;
            } else {
                claimed.insert(entry.ordering_key);
            }
        }
        Ok(claimed)
    }

    fn next_token() -> String {
        let now_ns = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        format!("{now_ns:x}-{pid:x}")
    }

    fn try_receive(&self, queue: &str) -> Result<Option<Delivery>, TransportError> {
        let claimed = self.claimed_keys(queue)?;
        let qf = self.queue_file(queue);
        let mut entries = Self::read_entries(&qf)?;
        let Some(idx) = entries.iter().position(|e| !claimed.contains(&e.ordering_key)) else {
            return Ok(None);
        };
        let mut entry = entries.remove(idx);
        Self::write_entries(&qf, &entries)?;
        entry.delivery_count += 1;
        let token = Self::next_token();
        std::fs::create_dir_all(self.lock_dir(queue))?;
        std::fs::write(self.lock_path(queue, &token), serde_json::to_string(&entry)?)?;
        Ok(Some(Delivery {
            message: Message {
                body: entry.body,
                ordering_key: entry.ordering_key,
            },
            handle: DeliveryHandle {
                queue: queue.to_string(),
                token,
            },
            attempt: entry.delivery_count,
        }))
    }
}

#[async_trait::async_trait]
impl SessionTransport for FsSessionTransport {
    async fn receive_exclusive(&self, queue: &str) -> Result<Option<Delivery>, TransportError> {
        let deadline = Instant::now() + self.receive_timeout;
        loop {
            if let Some(delivery) = self.try_receive(queue)? {
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
        let path = self.lock_path(&handle.queue, &handle.token);
        if !path.exists() {
            return Err(TransportError::UnknownToken(handle.token));
        }
        std::fs::remove_file(&path)?;
        debug!(queue = %handle.queue, "delivery acknowledged");
        Ok(())
    }

    async fn abandon(&self, handle: DeliveryHandle) -> Result<(), TransportError> {
        let path = self.lock_path(&handle.queue, &handle.token);
        if !path.exists() {
            return Err(TransportError::UnknownToken(handle.token));
        }
        let entry: QueueEntry = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        if entry.delivery_count >= self.max_delivery_attempts {
            warn!(
                queue = %handle.queue,
                ordering_key = %entry.ordering_key,
                attempts = entry.delivery_count,
                "delivery ceiling exhausted; dead-lettering message"
            );
            Self::append_entry(&self.dead_letter_file(&handle.queue), &entry)?;
        } else {
            // Front of the queue file: the abandoned message stays the next
            // delivery for its ordering key.
            let qf = self.queue_file(&handle.queue);
            let mut entries = Self::read_entries(&qf)?;
            entries.insert(0, entry);
            Self::write_entries(&qf, &entries)?;
            debug!(queue = %handle.queue, "delivery abandoned; message redeliverable");
        }
        std::fs::remove_file(&path)?;
        Ok(())
    }

    async fn publish(&self, queue: &str, body: String, ordering_key: &str) -> Result<(), TransportError> {
        Self::append_entry(
            &self.queue_file(queue),
            &QueueEntry {
                body,
                ordering_key: ordering_key.to_string(),
                delivery_count: 0,
            },
        )
    }
}

impl FsSessionTransport {
    /// Messages that exhausted their delivery ceiling on `queue`, oldest first.
    pub fn dead_letters(&self, queue: &str) -> Result<Vec<Message>, TransportError> {
        Ok(Self::read_entries(&self.dead_letter_file(queue))?
            .into_iter()
            .map(|e| Message {
                body: e.body,
                ordering_key: e.ordering_key,
            })
            .collect())
    }
}
