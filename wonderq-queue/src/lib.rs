//! In-memory message queue with visibility-timeout leases
//!
//! Provides:
//! - Push, PopFront (lease) and Confirm on a FIFO queue
//! - Automatic requeue of leased messages whose lease expires
//! - A name-keyed registry of queues
//! - HTTP handlers exposing the queue operations

mod error;
pub mod handlers;
pub mod message;
pub mod queue;
mod registry;

pub use error::QueueError;
pub use handlers::{router, AppState};
pub use message::{MessageError, MessageId, MessageState};
pub use queue::{LeasedMessage, Queue, QueueConfig, QueueStats};
pub use registry::QueueRegistry;
