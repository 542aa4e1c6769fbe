//! Backend API client (identity sync and who-am-I).
//!
//! The backend owns its own user identity, distinct from the auth
//! provider's. `sync_user` exchanges a provider identity for a backend user
//! record plus a bearer token; `me` looks the user up again from a stored
//! token.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Structured error from a backend call.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// One-line summary suitable for display.
    pub message: String,
    /// Optional raw error body.
    pub details: Option<String>,
    /// HTTP status, when the backend answered at all.
    pub status: Option<u16>,
}

impl ApiError {
    /// Creates an error from a non-success response.
    ///
    /// Mines the backend's `detail` error field for a cleaner message when
    /// the body carries one.
    pub fn http_status(status: u16, body: &str) -> Self {
        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(detail) = json.get("detail").and_then(|v| v.as_str())
        {
            return Self {
                message: format!("HTTP {status}: {detail}"),
                details: Some(body.to_string()),
                status: Some(status),
            };
        }
        let details = if body.is_empty() {
            None
        } else {
            Some(body.to_string())
        };
        Self {
            message: format!("HTTP {status}"),
            details,
            status: Some(status),
        }
    }

    /// Creates a transport-level error.
    pub fn transport(err: &reqwest::Error) -> Self {
        Self {
            message: format!("request failed: {err}"),
            details: None,
            status: None,
        }
    }

    /// Creates a response-parse error.
    pub fn parse(err: &reqwest::Error) -> Self {
        Self {
            message: format!("invalid response: {err}"),
            details: None,
            status: None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Identity-sync response: the backend user record plus its issued token.
///
/// The token authorizes exactly this user; the two travel together.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncedUser {
    pub id: Uuid,
    pub email: String,
    pub backend_token: String,
}

/// Backend user record from `/api/auth/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendUser {
    pub id: Uuid,
    pub email: String,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SyncUserRequest<'a> {
    better_auth_id: &'a str,
    email: &'a str,
}

/// Backend API client.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Creates a client for the given backend base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchanges a provider identity for a backend user and token.
    ///
    /// # Errors
    /// Returns an error on transport failure, a non-success response, or a
    /// response missing the expected fields.
    pub async fn sync_user(
        &self,
        provider_user_id: &str,
        email: &str,
    ) -> Result<SyncedUser, ApiError> {
        let url = format!("{}/api/auth/sync-user", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&SyncUserRequest {
                better_auth_id: provider_user_id,
                email,
            })
            .send()
            .await
            .map_err(|e| ApiError::transport(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::http_status(status, &body));
        }

        response.json().await.map_err(|e| ApiError::parse(&e))
    }

    /// Fetches the backend user record for a bearer token.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success response.
    pub async fn me(&self, token: &str) -> Result<BackendUser, ApiError> {
        let url = format!("{}/api/auth/me", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| ApiError::transport(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::http_status(status, &body));
        }

        response.json().await.map_err(|e| ApiError::parse(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: `detail` field is mined for the message.
    #[test]
    fn test_http_status_extracts_detail() {
        let err = ApiError::http_status(403, r#"{"detail": "Access denied"}"#);
        assert_eq!(err.message, "HTTP 403: Access denied");
        assert_eq!(err.status, Some(403));
        assert!(err.details.is_some());
    }

    /// Test: non-JSON bodies fall back to the bare status line.
    #[test]
    fn test_http_status_plain_body() {
        let err = ApiError::http_status(502, "bad gateway");
        assert_eq!(err.message, "HTTP 502");
        assert_eq!(err.details.as_deref(), Some("bad gateway"));
    }

    /// Test: empty bodies carry no details.
    #[test]
    fn test_http_status_empty_body() {
        let err = ApiError::http_status(500, "");
        assert_eq!(err.message, "HTTP 500");
        assert!(err.details.is_none());
    }
}
