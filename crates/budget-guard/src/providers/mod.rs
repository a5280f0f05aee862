//! HTTP clients for the managed compute providers
//!
//! Each client wraps one provider API and returns typed payloads. All calls go
//! through a shared [`reqwest::Client`] built with an explicit timeout, and
//! every failure is classified into [`FetchError`].

pub mod cerebrium;
pub mod graphql;
pub mod runpod;

pub use cerebrium::{CerebriumAppSettings, CerebriumClient};
pub use runpod::RunpodClient;

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Longest slice of an error body kept in messages
const MAX_ERROR_BODY: usize = 200;

/// Errors from a provider call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// No answer within the client timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The provider could not be reached
    #[error("connection failed: {0}")]
    ConnectionFailure(String),

    /// Non-success status, with a truncated body
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// The body does not have the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // URLs may carry API keys as query parameters
        let err = err.without_url();

        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            Self::ConnectionFailure(err.to_string())
        }
    }
}

/// Build the HTTP client shared by every provider and the notifier
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("budget-guard/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))
}

/// Read the body, failing on a non-success status
pub(crate) async fn success_body(response: Response) -> std::result::Result<String, FetchError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            body: truncate(&body),
        });
    }
    Ok(body)
}

/// Check the status and decode a JSON body
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: Response,
) -> std::result::Result<T, FetchError> {
    let body = success_body(response).await?;
    serde_json::from_str(&body).map_err(|e| FetchError::MalformedResponse(e.to_string()))
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
