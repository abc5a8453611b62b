//! Test utilities for WonderQ
//!
//! Provides utilities for integration testing against the HTTP surface:
//! - Serve the queue router on a random local port
//! - Client helpers for push, receive and confirm
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wonderq_test::TestServer;
//!
//! #[tokio::test]
//! async fn test_push() {
//!     let server = TestServer::start().await.unwrap();
//!     let client = server.client();
//!
//!     let id = client.push(&serde_json::json!({"hello": "world"})).await.unwrap();
//!     println!("pushed {}", id);
//! }
//! ```

pub mod client;
pub mod server;

pub use client::{ClientError, ReceivedMessage, WonderQClient};
pub use server::{TestError, TestServer};

/// Queue created by `TestServer` and served on the root routes
pub const DEFAULT_QUEUE: &str = "wonderq";
