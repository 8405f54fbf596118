/**
 * REST API Client
 *
 * The remote calls the synchronization engine depends on, behind the
 * `RemoteApi` trait so the engine can be driven by a fake in tests.
 *
 * Every response uses the envelope `{ "success": bool, "data": {...},
 * "message"?: string }`. Status updates carry an `Idempotency-Key` header so
 * a replayed pending mutation is recognizable on the server.
 */
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use crate::client::config::Config;
use crate::shared::error::RemoteError;
use crate::shared::{RequestId, RequestRecord, RequestStatus};

/// Header carrying the client-generated idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Remote calls consumed by the engine
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Full authoritative queue, in server order
    async fn fetch_queue_snapshot(&self) -> Result<Vec<RequestRecord>, RemoteError>;

    /// Apply one status change
    async fn submit_status_update(
        &self,
        request_id: &RequestId,
        new_status: RequestStatus,
        idempotency_key: Uuid,
    ) -> Result<(), RemoteError>;

    /// Requests assigned to the signed-in volunteer
    async fn fetch_assigned_requests(&self) -> Result<Vec<RequestRecord>, RemoteError>;

    /// Take the highest-priority request off the queue
    async fn dequeue_next(&self) -> Result<Option<RequestRecord>, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueueData {
    queue: Vec<RequestRecord>,
}

#[derive(Debug, Deserialize)]
struct AssignedData {
    requests: Vec<RequestRecord>,
}

#[derive(Debug, Deserialize)]
struct DequeueData {
    #[serde(default)]
    request: Option<RequestRecord>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// `RemoteApi` over HTTP
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    config: Config,
    client: Client,
}

impl HttpApiClient {
    pub fn new(config: Config) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.app().request_timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.get_token() {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(server_error(status, &body));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        if !envelope.success {
            return Err(RemoteError::Server {
                status: status.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| "request was not successful".to_string()),
            });
        }

        envelope
            .data
            .ok_or_else(|| RemoteError::Decode("response has no data".to_string()))
    }
}

fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(err.to_string())
    }
}

fn server_error(status: StatusCode, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });

    RemoteError::Server {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl RemoteApi for HttpApiClient {
    async fn fetch_queue_snapshot(&self) -> Result<Vec<RequestRecord>, RemoteError> {
        let url = self.config.api_url("/queue");
        let data: QueueData = self.send(self.client.get(&url)).await?;
        tracing::debug!(count = data.queue.len(), "fetched queue snapshot");
        Ok(data.queue)
    }

    async fn submit_status_update(
        &self,
        request_id: &RequestId,
        new_status: RequestStatus,
        idempotency_key: Uuid,
    ) -> Result<(), RemoteError> {
        let url = self
            .config
            .api_url(&format!("/update-status/{}", request_id));
        let request = self
            .client
            .put(&url)
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key.to_string())
            .json(&serde_json::json!({ "status": new_status }));

        let _: serde_json::Value = self.send(request).await?;
        Ok(())
    }

    async fn fetch_assigned_requests(&self) -> Result<Vec<RequestRecord>, RemoteError> {
        let url = self.config.api_url("/assigned-requests");
        let data: AssignedData = self.send(self.client.get(&url)).await?;
        Ok(data.requests)
    }

    async fn dequeue_next(&self) -> Result<Option<RequestRecord>, RemoteError> {
        let url = self.config.api_url("/dequeue");
        let data: DequeueData = self.send(self.client.post(&url)).await?;
        Ok(data.request)
    }
}
