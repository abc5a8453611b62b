//! Client for interacting with a WonderQ server

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

/// Client for the WonderQ HTTP API
pub struct WonderQClient {
    base_url: String,
    client: Client,
}

impl WonderQClient {
    /// Create a new client
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { base_url, client }
    }

    // === Default queue ===

    /// Push a message to the default queue
    pub async fn push(&self, body: &Value) -> Result<String, ClientError> {
        self.push_to(&format!("{}/", self.base_url), body, None).await
    }

    /// Push a message with a lease timeout in milliseconds
    pub async fn push_with_timeout(&self, body: &Value, timeout_ms: u64) -> Result<String, ClientError> {
        self.push_to(&format!("{}/", self.base_url), body, Some(timeout_ms))
            .await
    }

    /// Lease messages from the default queue
    pub async fn receive(&self, amount: Option<usize>) -> Result<Vec<ReceivedMessage>, ClientError> {
        self.receive_from(&format!("{}/", self.base_url), amount).await
    }

    /// Confirm a leased message on the default queue
    pub async fn confirm(&self, id: &str) -> Result<(), ClientError> {
        self.confirm_at(&format!("{}/{}", self.base_url, id)).await
    }

    // === Named queues ===

    /// Create a named queue
    pub async fn create_queue(&self, name: &str, timeout_ms: Option<u64>) -> Result<(), ClientError> {
        let mut request = serde_json::json!({ "name": name });
        if let Some(timeout) = timeout_ms {
            request["timeout"] = timeout.into();
        }

        let response = self
            .client
            .post(format!("{}/queues", self.base_url))
            .json(&request)
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }

    /// Push a message to a named queue
    pub async fn push_named(&self, queue: &str, body: &Value) -> Result<String, ClientError> {
        self.push_to(&format!("{}/queues/{}", self.base_url, queue), body, None)
            .await
    }

    /// Lease messages from a named queue
    pub async fn receive_named(
        &self,
        queue: &str,
        amount: Option<usize>,
    ) -> Result<Vec<ReceivedMessage>, ClientError> {
        self.receive_from(&format!("{}/queues/{}", self.base_url, queue), amount)
            .await
    }

    /// Confirm a leased message on a named queue
    pub async fn confirm_named(&self, queue: &str, id: &str) -> Result<(), ClientError> {
        self.confirm_at(&format!("{}/queues/{}/{}", self.base_url, queue, id))
            .await
    }

    // === Requests ===

    async fn push_to(&self, url: &str, body: &Value, timeout_ms: Option<u64>) -> Result<String, ClientError> {
        let mut request = self.client.post(url).json(body);
        if let Some(timeout) = timeout_ms {
            request = request.query(&[("timeout", timeout)]);
        }

        let response = expect_status(request.send().await?, StatusCode::CREATED).await?;
        let sent: SendResponse = response.json().await?;
        Ok(sent.message_id)
    }

    async fn receive_from(
        &self,
        url: &str,
        amount: Option<usize>,
    ) -> Result<Vec<ReceivedMessage>, ClientError> {
        let mut request = self.client.get(url);
        if let Some(amount) = amount {
            request = request.query(&[("amount", amount)]);
        }

        let response = expect_status(request.send().await?, StatusCode::OK).await?;
        let received: ReceiveResponse = response.json().await?;
        Ok(received.messages)
    }

    async fn confirm_at(&self, url: &str) -> Result<(), ClientError> {
        let response = self.client.patch(url).send().await?;
        expect_status(response, StatusCode::NO_CONTENT).await?;
        Ok(())
    }
}

async fn expect_status(
    response: reqwest::Response,
    expected: StatusCode,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }

    let body: Value = response.json().await.unwrap_or(Value::Null);
    Err(ClientError::Status {
        status: status.as_u16(),
        code: body["code"].as_str().unwrap_or_default().to_string(),
        message: body["error"].as_str().unwrap_or_default().to_string(),
    })
}

/// A message leased from the queue
#[derive(Debug, Clone, Deserialize)]
pub struct ReceivedMessage {
    pub id: String,
    pub body: Value,
}

#[derive(Debug, Deserialize)]
struct ReceiveResponse {
    messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "messageID")]
    message_id: String,
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Unexpected status {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },
}

impl ClientError {
    /// HTTP status of a rejected request
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
        }
    }
}
