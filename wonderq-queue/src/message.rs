//! Message lifecycle and lease timer
//!
//! A message moves through three states:
//! - `Ready`: waiting in the queue to be leased
//! - `Processing`: leased by a consumer, with a lease timer armed
//! - `Done`: confirmed by the consumer, terminal
//!
//! The lease timer exists exactly while the message is `Processing`. When it
//! fires, the owning queue is notified through the message's expire hook.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Unique message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Ready,
    Processing,
    Done,
}

/// Callback invoked when a lease expires, with the message id and the lease number
pub type ExpireHook = Arc<dyn Fn(MessageId, u32) + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("Message {0} is already done")]
    Terminal(MessageId),

    #[error("Message {0} cannot be leased outside a Tokio runtime")]
    NoRuntime(MessageId),
}

/// One-shot lease timer; aborted when dropped
struct LeaseTimer {
    handle: Option<JoinHandle<()>>,
}

impl LeaseTimer {
    fn arm(
        runtime: &Handle,
        id: MessageId,
        lease: u32,
        duration: Duration,
        hook: ExpireHook,
    ) -> Self {
        let handle = runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            hook(id, lease);
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Let the timer task finish on its own. Used from inside the task itself.
    fn release(mut self) {
        self.handle.take();
    }
}

impl Drop for LeaseTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// A queued unit of work
pub struct Message {
    id: MessageId,
    body: Value,
    state: MessageState,
    lease_duration: Duration,
    receive_count: u32,
    timer: Option<LeaseTimer>,
    on_expire: ExpireHook,
}

impl Message {
    pub fn new(body: Value, lease_duration: Duration, on_expire: ExpireHook) -> Self {
        Self {
            id: MessageId::new(),
            body,
            state: MessageState::Ready,
            lease_duration,
            receive_count: 0,
            timer: None,
            on_expire,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Number of times this message has been leased
    pub fn receive_count(&self) -> u32 {
        self.receive_count
    }

    pub(crate) fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Move the message to `new_state`.
    ///
    /// Entering `Processing` starts a new lease and arms its timer. Any other
    /// transition cancels a pending timer. `Done` is terminal. Leasing needs a
    /// Tokio runtime for the timer; without one the message is left untouched.
    pub(crate) fn transition_to(&mut self, new_state: MessageState) -> Result<(), MessageError> {
        if self.state == MessageState::Done {
            return Err(MessageError::Terminal(self.id));
        }

        let runtime = match new_state {
            MessageState::Processing => Some(
                Handle::try_current().map_err(|_| MessageError::NoRuntime(self.id))?,
            ),
            _ => None,
        };

        self.cancel_timer();

        if let Some(runtime) = runtime {
            self.receive_count = self.receive_count.wrapping_add(1);
            self.timer = Some(LeaseTimer::arm(
                &runtime,
                self.id,
                self.receive_count,
                self.lease_duration,
                Arc::clone(&self.on_expire),
            ));
        }

        self.state = new_state;
        Ok(())
    }

    /// Reset to `Ready` after lease `lease` timed out.
    ///
    /// Does not arm a timer. Returns false if the message was confirmed or
    /// leased again since that timer was armed.
    pub(crate) fn expire(&mut self, lease: u32) -> bool {
        if self.state != MessageState::Processing || self.receive_count != lease {
            return false;
        }

        if let Some(timer) = self.timer.take() {
            timer.release();
        }
        self.state = MessageState::Ready;
        true
    }

    fn cancel_timer(&mut self) {
        self.timer.take();
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("lease_duration", &self.lease_duration)
            .field("receive_count", &self.receive_count)
            .field("leased", &self.timer.is_some())
            .finish_non_exhaustive()
    }
}
