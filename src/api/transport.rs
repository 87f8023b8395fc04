//! Transport to the messaging backend.
//!
//! # Responsibilities
//! - Define the backend contract as a trait (`MessagingApi`)
//! - Implement it over HTTP with `reqwest`
//! - Classify non-success responses by status at the point they are read
//! - Normalize absent collections to empty ones at this boundary

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{
    AuthResponse, AuthToken, Credentials, MarkAsReadRequest, MarkReadResponse, Message,
    SendMessageRequest, UnreadCount, User,
};
use crate::config::ApiConfig;
use crate::resilience::timeouts::with_timeout;

/// The backend as seen by the client: three resilient operations plus the
/// pass-through account and send calls.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn register(&self, credentials: &Credentials) -> ApiResult<User>;

    async fn login(&self, credentials: &Credentials) -> ApiResult<AuthToken>;

    async fn send_message(&self, username: &str, content: &str) -> ApiResult<Message>;

    /// Messages addressed to `username`. A `null` body is an empty list.
    async fn fetch_messages(&self, username: &str, token: &AuthToken) -> ApiResult<Vec<Message>>;

    async fn mark_read(
        &self,
        username: &str,
        message_ids: &[i64],
        token: &AuthToken,
    ) -> ApiResult<MarkReadResponse>;

    async fn unread_count(&self, username: &str, token: &AuthToken) -> ApiResult<UnreadCount>;
}

/// Optional error body; anything else in it is ignored.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// `MessagingApi` over HTTP/JSON.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the configured backend.
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let base_url: Url = config.base_url.parse().map_err(|e| {
            ApiError::InvalidConfig(format!("base URL '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidConfig(format!(
                "base URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let request_id = Uuid::new_v4();
        let call = async {
            let response = request
                .header("x-request-id", request_id.to_string())
                .send()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            handle_response(response, request_id).await
        };
        with_timeout(self.request_timeout, call).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response, request_id: Uuid) -> ApiResult<T> {
    let status = response.status();
    if !status.is_success() {
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message);

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                url = %url,
                request_id = %request_id,
                body = %body,
                "Backend server error"
            );
        }
        return Err(ApiError::from_status(status.as_u16(), message));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl MessagingApi for HttpTransport {
    async fn register(&self, credentials: &Credentials) -> ApiResult<User> {
        let request = self.client.post(self.endpoint(&["register"])).json(credentials);
        self.execute(request).await
    }

    async fn login(&self, credentials: &Credentials) -> ApiResult<AuthToken> {
        let request = self.client.post(self.endpoint(&["login"])).json(credentials);
        self.execute::<AuthResponse>(request).await.map(AuthToken::from)
    }

    async fn send_message(&self, username: &str, content: &str) -> ApiResult<Message> {
        let body = SendMessageRequest {
            content: content.to_string(),
        };
        let request = self
            .client
            .post(self.endpoint(&["messages", username]))
            .json(&body);
        self.execute(request).await
    }

    async fn fetch_messages(&self, username: &str, token: &AuthToken) -> ApiResult<Vec<Message>> {
        let request = self
            .client
            .get(self.endpoint(&["messages", username]))
            .bearer_auth(token.as_str());
        let messages: Option<Vec<Message>> = self.execute(request).await?;
        Ok(messages.unwrap_or_default())
    }

    async fn mark_read(
        &self,
        username: &str,
        message_ids: &[i64],
        token: &AuthToken,
    ) -> ApiResult<MarkReadResponse> {
        let body = MarkAsReadRequest {
            message_ids: message_ids.to_vec(),
        };
        let request = self
            .client
            .post(self.endpoint(&["messages", username, "read"]))
            .bearer_auth(token.as_str())
            .json(&body);
        self.execute(request).await
    }

    async fn unread_count(&self, username: &str, token: &AuthToken) -> ApiResult<UnreadCount> {
        let request = self
            .client
            .get(self.endpoint(&["messages", username, "unread"]))
            .bearer_auth(token.as_str());
        self.execute(request).await
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
