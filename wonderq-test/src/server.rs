//! Test server management

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;
use wonderq_queue::{AppState, Queue, QueueConfig, QueueRegistry};

use crate::DEFAULT_QUEUE;

/// A WonderQ router served in-process on a random port
pub struct TestServer {
    handle: JoinHandle<()>,
    registry: Arc<QueueRegistry>,
    base_url: String,
}

impl TestServer {
    /// Start a server with the default queue configuration
    pub async fn start() -> Result<Self, TestError> {
        Self::start_with_config(QueueConfig::default()).await
    }

    /// Start a server whose queues use `config` by default
    pub async fn start_with_config(config: QueueConfig) -> Result<Self, TestError> {
        let registry = Arc::new(QueueRegistry::with_defaults(config));
        registry
            .create_queue(DEFAULT_QUEUE)
            .map_err(|e| TestError::StartFailed(e.to_string()))?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let router = wonderq_queue::router(Arc::new(AppState::new(
            Arc::clone(&registry),
            DEFAULT_QUEUE,
        )));

        info!(port = port, "Starting WonderQ test server");
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "Test server stopped");
            }
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            handle,
            registry,
            base_url,
        })
    }

    /// Direct handle to the default queue, for inspecting state
    pub fn queue(&self) -> Queue {
        self.registry
            .get_queue(DEFAULT_QUEUE)
            .expect("default queue is created on start")
    }

    /// Get a client for the server
    pub fn client(&self) -> crate::WonderQClient {
        crate::WonderQClient::new(self.base_url.clone())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Errors that can occur with the test server
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("Failed to start server: {0}")]
    StartFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
