//! REST client for the chat backend.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses become [`ApiError::Status`] carrying the backend's
//! `message` field when present, so auth forms can show it inline. History
//! payloads are decoded per item: one malformed message is logged and
//! skipped rather than failing the whole conversation load.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{LoginResponse, Message, SignupResponse, User};

pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors produced by REST calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request could not be sent or its body read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("response parse failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ApiError {
    /// Whether the backend rejected our credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

/// Authentication endpoints, split out so the auth flow can be tested
/// without a live backend.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str) -> Result<LoginResponse, ApiError>;
    async fn signup(&self, first_name: &str, last_name: &str, email: &str) -> Result<SignupResponse, ApiError>;
    async fn me(&self, token: &str) -> Result<User, ApiError>;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the TLS backend fails to initialize.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /messages/users`: everyone the sidebar can list.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-2xx status, or bad JSON.
    pub async fn users(&self, token: &str) -> Result<Vec<User>, ApiError> {
        self.request(Method::GET, "/messages/users", Some(token), None).await
    }

    /// `GET /messages/:receiverId`: conversation history with one user.
    ///
    /// Items that fail normalization are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx status.
    pub async fn history(&self, token: &str, receiver_id: &str) -> Result<Vec<Message>, ApiError> {
        let path = format!("/messages/{receiver_id}");
        let items: Vec<Value> = self.request(Method::GET, &path, Some(token), None).await?;
        Ok(decode_messages(items))
    }

    /// `POST /messages/send/:receiverId`: non-realtime send.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-2xx status, or bad JSON.
    pub async fn send_message(
        &self,
        token: &str,
        receiver_id: &str,
        text: Option<&str>,
        image: Option<&str>,
    ) -> Result<Message, ApiError> {
        let path = format!("/messages/send/{receiver_id}");
        let body = send_body(text, image);
        self.request(Method::POST, &path, Some(token), Some(body)).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "api: request");

        let request = self.http.request(method, &url);
        let request = if let Some(token) = token { request.bearer_auth(token) } else { request };
        let request = if let Some(json) = body { request.json(&json) } else { request };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), message: error_message(&text, status.as_u16()) });
        }

        serde_json::from_str::<T>(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, email: &str) -> Result<LoginResponse, ApiError> {
        let body = serde_json::json!({ "email": email });
        self.request(Method::POST, "/auth/login", None, Some(body)).await
    }

    async fn signup(&self, first_name: &str, last_name: &str, email: &str) -> Result<SignupResponse, ApiError> {
        let body = serde_json::json!({ "firstName": first_name, "lastName": last_name, "email": email });
        self.request(Method::POST, "/auth/signup", None, Some(body)).await
    }

    async fn me(&self, token: &str) -> Result<User, ApiError> {
        self.request(Method::GET, "/auth/me", Some(token), None).await
    }
}

fn send_body(text: Option<&str>, image: Option<&str>) -> Value {
    let mut body = serde_json::Map::new();
    if let Some(text) = text {
        body.insert("text".to_owned(), Value::String(text.to_owned()));
    }
    if let Some(image) = image {
        body.insert("image".to_owned(), Value::String(image.to_owned()));
    }
    Value::Object(body)
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str, status: u16) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

/// Normalize a history payload, dropping entries that fail normalization.
pub(crate) fn decode_messages(items: Vec<Value>) -> Vec<Message> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Message>(item) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "api: dropping malformed message");
                None
            }
        })
        .collect()
}
