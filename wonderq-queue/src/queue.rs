//! FIFO queue with lease-based delivery
//!
//! Messages wait in a ready FIFO until leased by `pop_front`. Leased messages
//! sit in an id-keyed processing set until confirmed, or until their lease
//! expires and they are appended back to the tail of the ready FIFO.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::QueueError;
use crate::message::{ExpireHook, Message, MessageError, MessageId, MessageState};

/// Default lease duration applied when a push does not specify one
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_millis(1000);

/// Default number of messages leased by `pop_batch`
pub const DEFAULT_RECEIVE_BATCH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub lease_duration: Duration,
    pub receive_batch: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            receive_batch: DEFAULT_RECEIVE_BATCH,
        }
    }
}

/// Snapshot of a message handed to a consumer by `pop_front`
#[derive(Debug, Clone, PartialEq)]
pub struct LeasedMessage {
    pub id: MessageId,
    pub body: Value,
    pub receive_count: u32,
    pub lease_duration: Duration,
}

impl LeasedMessage {
    fn from_message(message: &Message) -> Self {
        Self {
            id: message.id(),
            body: message.body().clone(),
            receive_count: message.receive_count(),
            lease_duration: message.lease_duration(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub available: usize,
    pub processing: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    processing: HashMap<MessageId, Message>,
}

struct Inner {
    name: String,
    config: QueueConfig,
    on_expire: ExpireHook,
    state: Mutex<QueueState>,
}

impl Inner {
    fn requeue_expired(&self, id: MessageId, lease: u32) {
        let mut state = self.state.lock();

        let expired = state
            .processing
            .get_mut(&id)
            .is_some_and(|message| message.expire(lease));
        if !expired {
            debug!(queue = %self.name, message_id = %id, lease, "Ignoring stale lease timer");
            return;
        }

        if let Some(message) = state.processing.remove(&id) {
            warn!(
                queue = %self.name,
                message_id = %id,
                receive_count = lease,
                "Lease expired, requeueing message"
            );
            state.ready.push_back(message);
        }
    }
}

/// Handle to a queue. Clones share the same queue.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<Inner>,
}

impl Queue {
    pub fn new(name: impl Into<String>, config: QueueConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let on_expire: ExpireHook = Arc::new(move |id, lease| {
                if let Some(inner) = weak.upgrade() {
                    inner.requeue_expired(id, lease);
                }
            });

            Inner {
                name: name.into(),
                config,
                on_expire,
                state: Mutex::new(QueueState::default()),
            }
        });

        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Push a message with the queue's default lease duration
    pub fn push(&self, body: Value) -> MessageId {
        self.push_with_lease(body, self.inner.config.lease_duration)
    }

    /// Push a message that will be leased for `lease_duration` at a time
    pub fn push_with_lease(&self, body: Value, lease_duration: Duration) -> MessageId {
        let message = Message::new(body, lease_duration, Arc::clone(&self.inner.on_expire));
        let id = message.id();

        self.inner.state.lock().ready.push_back(message);

        debug!(
            queue = %self.inner.name,
            message_id = %id,
            lease_ms = lease_duration.as_millis(),
            "Pushed message"
        );
        id
    }

    /// Lease up to `amount` messages from the head of the queue.
    ///
    /// Each lease arms a timer on the current Tokio runtime. Called outside a
    /// runtime, nothing is leased and the ready list is left as it was.
    pub fn pop_front(&self, amount: usize) -> Vec<LeasedMessage> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let mut leased = Vec::with_capacity(amount.min(state.ready.len()));
        while leased.len() < amount {
            let Some(mut message) = state.ready.pop_front() else {
                break;
            };

            match message.transition_to(MessageState::Processing) {
                Ok(()) => {}
                Err(e @ MessageError::NoRuntime(_)) => {
                    error!(queue = %self.inner.name, error = %e, "Cannot lease messages");
                    state.ready.push_front(message);
                    break;
                }
                Err(e @ MessageError::Terminal(_)) => {
                    error!(queue = %self.inner.name, error = %e, "Dropping finished message from ready list");
                    continue;
                }
            }

            leased.push(LeasedMessage::from_message(&message));
            state.processing.insert(message.id(), message);
        }

        debug!(queue = %self.inner.name, count = leased.len(), "Leased messages");
        leased
    }

    /// Lease up to the configured batch size
    pub fn pop_batch(&self) -> Vec<LeasedMessage> {
        self.pop_front(self.inner.config.receive_batch)
    }

    /// Confirm a leased message, removing it from the queue for good
    pub fn confirm(&self, id: MessageId) -> Result<(), QueueError> {
        let Some(mut message) = self.inner.state.lock().processing.remove(&id) else {
            warn!(queue = %self.inner.name, message_id = %id, "Message not confirmable");
            return Err(QueueError::NotConfirmable(id));
        };

        message
            .transition_to(MessageState::Done)
            .map_err(|_| QueueError::NotConfirmable(id))?;

        debug!(queue = %self.inner.name, message_id = %id, "Confirmed message");
        Ok(())
    }

    /// Number of messages ready to be leased
    pub fn available_count(&self) -> usize {
        self.inner.state.lock().ready.len()
    }

    /// Number of messages currently leased
    pub fn processing_count(&self) -> usize {
        self.inner.state.lock().processing.len()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        QueueStats {
            name: self.inner.name.clone(),
            available: state.ready.len(),
            processing: state.processing.len(),
        }
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue_with_lease(ms: u64) -> Queue {
        Queue::new(
            "my-queue",
            QueueConfig {
                lease_duration: Duration::from_millis(ms),
                ..QueueConfig::default()
            },
        )
    }

    fn push_orders(queue: &Queue, count: usize) -> Vec<MessageId> {
        (0..count)
            .map(|i| queue.push(json!({ "order": i })))
            .collect()
    }

    #[tokio::test]
    async fn test_pop_front_is_fifo() {
        let queue = queue_with_lease(1000);
        let ids = push_orders(&queue, 100);

        let result = queue.pop_front(1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, ids[0]);
        assert_eq!(result[0].body, json!({ "order": 0 }));

        let next: Vec<MessageId> = queue.pop_front(3).into_iter().map(|m| m.id).collect();
        assert_eq!(next, ids[1..4]);
    }

    #[test]
    fn test_pop_front_outside_runtime_keeps_messages() {
        let queue = queue_with_lease(1000);
        let ids = push_orders(&queue, 3);

        assert!(queue.pop_front(2).is_empty());
        assert_eq!(queue.available_count(), 3);
        assert_eq!(queue.processing_count(), 0);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let leased: Vec<MessageId> =
            runtime.block_on(async { queue.pop_front(3).into_iter().map(|m| m.id).collect() });
        assert_eq!(leased, ids);
    }

    #[tokio::test]
    async fn test_pop_batch_uses_configured_size() {
        let queue = queue_with_lease(1000);
        push_orders(&queue, 25);

        assert_eq!(queue.pop_batch().len(), DEFAULT_RECEIVE_BATCH);
        assert_eq!(queue.available_count(), 25 - DEFAULT_RECEIVE_BATCH);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let queue = queue_with_lease(1000);
        push_orders(&queue, 10);

        let first: Vec<MessageId> = queue.pop_front(4).into_iter().map(|m| m.id).collect();
        assert_eq!(queue.available_count(), 6);
        assert_eq!(queue.processing_count(), 4);

        let rest: Vec<MessageId> = queue.pop_front(100).into_iter().map(|m| m.id).collect();
        assert_eq!(rest.len(), 6);
        assert!(rest.iter().all(|id| !first.contains(id)));
        assert_eq!(queue.available_count(), 0);
    }

    #[tokio::test]
    async fn test_over_request_returns_what_is_ready() {
        let queue = queue_with_lease(1000);
        push_orders(&queue, 3);

        assert_eq!(queue.pop_front(50).len(), 3);
        assert!(queue.pop_front(50).is_empty());
        assert!(queue.pop_front(0).is_empty());
    }

    #[tokio::test]
    async fn test_confirm_succeeds_exactly_once() {
        let queue = queue_with_lease(1000);
        let id = queue.push(json!("hello"));

        queue.pop_front(1);
        assert!(queue.confirm(id).is_ok());
        assert_eq!(queue.confirm(id), Err(QueueError::NotConfirmable(id)));
        assert_eq!(queue.processing_count(), 0);
    }

    #[tokio::test]
    async fn test_confirm_requires_lease() {
        let queue = queue_with_lease(1000);
        let id = queue.push(json!("hello"));

        assert_eq!(queue.confirm(id), Err(QueueError::NotConfirmable(id)));

        let unknown = MessageId::new();
        assert_eq!(queue.confirm(unknown), Err(QueueError::NotConfirmable(unknown)));
        assert_eq!(queue.available_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_lease_is_redelivered() {
        let queue = queue_with_lease(50);
        let id = queue.push(json!({ "order": 0 }));

        let first = queue.pop_front(10);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].receive_count, 1);
        assert_eq!(queue.available_count(), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(queue.available_count(), 1);
        assert_eq!(queue.processing_count(), 0);

        let second = queue.pop_front(10);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, id);
        assert_eq!(second[0].receive_count, 2);
        assert_eq!(queue.available_count(), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(queue.available_count(), 1);
    }

    #[tokio::test]
    async fn test_confirm_after_expiry_fails() {
        let queue = queue_with_lease(50);
        let id = queue.push(json!("late"));

        queue.pop_front(1);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(queue.confirm(id), Err(QueueError::NotConfirmable(id)));
        assert_eq!(queue.available_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_message_goes_to_tail() {
        let queue = queue_with_lease(50);
        let first = queue.push(json!("first"));

        queue.pop_front(1);
        let second = queue.push_with_lease(json!("second"), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(300)).await;

        let order: Vec<MessageId> = queue.pop_front(2).into_iter().map(|m| m.id).collect();
        assert_eq!(order, vec![second, first]);
    }

    #[tokio::test]
    async fn test_stale_timer_after_confirm_is_ignored() {
        let queue = queue_with_lease(60_000);
        let id = queue.push(json!("confirmed"));
        push_orders(&queue, 1);

        queue.pop_front(1);
        queue.confirm(id).unwrap();

        queue.inner.requeue_expired(id, 1);
        assert_eq!(queue.available_count(), 1);
        assert_eq!(queue.processing_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_timer_after_release_is_ignored() {
        let queue = queue_with_lease(60_000);
        let id = queue.push(json!("leased twice"));

        queue.pop_front(1);
        queue.inner.requeue_expired(id, 1);
        assert_eq!(queue.available_count(), 1);
        assert_eq!(queue.processing_count(), 0);

        let second = queue.pop_front(1);
        assert_eq!(second[0].receive_count, 2);

        // Lease 1 already ended, only lease 2 may requeue
        queue.inner.requeue_expired(id, 1);
        assert_eq!(queue.available_count(), 0);
        assert_eq!(queue.processing_count(), 1);

        queue.inner.requeue_expired(id, 2);
        assert_eq!(queue.available_count(), 1);
        assert_eq!(queue.processing_count(), 0);
    }

    #[tokio::test]
    async fn test_push_with_lease_overrides_default() {
        let queue = queue_with_lease(10_000);
        queue.push_with_lease(json!("short"), Duration::from_millis(50));
        let leased = queue.pop_front(1);
        assert_eq!(leased[0].lease_duration, Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(queue.available_count(), 1);
    }

    #[tokio::test]
    async fn test_confirm_and_expiry_scenario() {
        let queue = queue_with_lease(100);
        push_orders(&queue, 4);

        let a = queue.pop_front(1);
        let b = queue.pop_front(1);
        assert_ne!(a[0].id, b[0].id);

        let rest = queue.pop_front(100);
        assert_eq!(rest.len(), 2);
        assert_eq!(queue.available_count(), 0);

        queue.confirm(a[0].id).unwrap();
        queue.confirm(b[0].id).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(queue.available_count(), 2);

        let redelivered: Vec<MessageId> =
            queue.pop_front(10).into_iter().map(|m| m.id).collect();
        assert_eq!(redelivered.len(), 2);
        assert!(!redelivered.contains(&a[0].id));
        assert!(!redelivered.contains(&b[0].id));
        assert!(rest.iter().all(|m| redelivered.contains(&m.id)));
    }

    #[tokio::test]
    async fn test_stats() {
        let queue = queue_with_lease(1000);
        push_orders(&queue, 5);
        queue.pop_front(2);

        assert_eq!(
            queue.stats(),
            QueueStats {
                name: "my-queue".to_string(),
                available: 3,
                processing: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_dropped_queue_does_not_fire_timers() {
        let queue = queue_with_lease(20);
        push_orders(&queue, 3);
        queue.pop_front(3);
        let weak = Arc::downgrade(&queue.inner);
        drop(queue);
        assert!(weak.upgrade().is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(weak.upgrade().is_none());
    }
}
