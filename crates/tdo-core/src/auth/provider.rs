//! Auth provider client.
//!
//! Wraps the third-party auth service behind a small trait so the bridge
//! and store can be exercised against a scripted provider in tests. The
//! provider owns its session cookie; `get_session` is a snapshot and may
//! not yet reflect a sign-in that just returned.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A provider-owned session snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    /// The provider's opaque user id.
    pub user_id: String,
    /// Email the session was established with.
    pub email: String,
}

/// Error categories for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The provider rejected the call (bad credentials, duplicate email, ...).
    Rejected,
    /// Transport-level failure.
    Transport,
    /// Response parsing failed or required fields were missing.
    Parse,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorKind::Rejected => write!(f, "rejected"),
            AuthErrorKind::Transport => write!(f, "transport"),
            AuthErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error from the provider with kind and details.
#[derive(Debug, Clone)]
pub struct AuthError {
    /// Error category.
    pub kind: AuthErrorKind,
    /// One-line summary suitable for display.
    pub message: String,
    /// Optional raw error body.
    pub details: Option<String>,
}

impl AuthError {
    /// Creates a new provider error.
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an error from a non-success response.
    ///
    /// The provider reports failures as `{"message": ...}`; that field is
    /// promoted to the display message when present.
    pub fn http_status(status: u16, body: &str) -> Self {
        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(message) = json.get("message").and_then(|v| v.as_str())
        {
            return Self {
                kind: AuthErrorKind::Rejected,
                message: message.to_string(),
                details: Some(body.to_string()),
            };
        }
        let details = if body.is_empty() {
            None
        } else {
            Some(body.to_string())
        };
        Self {
            kind: AuthErrorKind::Rejected,
            message: format!("HTTP {status}"),
            details,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(err: &reqwest::Error) -> Self {
        Self::new(AuthErrorKind::Transport, format!("request failed: {err}"))
    }

    /// Creates a response-parse error.
    pub fn parse(err: &reqwest::Error) -> Self {
        Self::new(AuthErrorKind::Parse, format!("invalid response: {err}"))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AuthError {}

/// Contract for the external auth service.
///
/// `get_session` gives no guarantee that a session created by a sign-in
/// call that already returned is visible yet; callers that need the
/// materialized session must poll (see the identity bridge).
#[allow(async_fn_in_trait)]
pub trait AuthProvider {
    /// Registers a new account. Registration alone does not guarantee an
    /// established session.
    async fn sign_up_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, AuthError>;

    /// Signs in with email credentials.
    async fn sign_in_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, AuthError>;

    /// Non-blocking snapshot of the current session, if any.
    async fn get_session(&self) -> Result<Option<ProviderSession>, AuthError>;

    /// Ends the provider session.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, Deserialize)]
struct SessionUser {
    id: String,
    email: String,
}

impl From<SessionUser> for ProviderSession {
    fn from(user: SessionUser) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
        }
    }
}

/// `get-session` answers `null` when no session exists, otherwise an
/// envelope holding the user.
#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    user: Option<SessionUser>,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    user: Option<SessionUser>,
}

#[derive(Debug, Serialize)]
struct EmailCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// HTTP implementation speaking the provider's REST endpoints.
///
/// The client keeps a cookie store: the provider session rides on a cookie
/// set by sign-in and read back by `get-session`, so all calls must share
/// one jar.
#[derive(Debug, Clone)]
pub struct HttpAuthProvider {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthProvider {
    /// Creates a provider client for the given base URL.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("build provider http client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn post_credentials(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, AuthError> {
        let url = format!("{}/api/auth/{endpoint}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EmailCredentials {
                email,
                password,
            })
            .send()
            .await
            .map_err(|e| AuthError::transport(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::http_status(status, &body));
        }

        let parsed: SignInResponse = response.json().await.map_err(|e| AuthError::parse(&e))?;
        match parsed.user {
            Some(user) => Ok(user.into()),
            None => Err(AuthError::new(
                AuthErrorKind::Parse,
                "response did not include a user",
            )),
        }
    }
}

impl AuthProvider for HttpAuthProvider {
    async fn sign_up_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, AuthError> {
        self.post_credentials("sign-up/email", email, password).await
    }

    async fn sign_in_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, AuthError> {
        self.post_credentials("sign-in/email", email, password).await
    }

    async fn get_session(&self) -> Result<Option<ProviderSession>, AuthError> {
        let url = format!("{}/api/auth/get-session", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::transport(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::http_status(status, &body));
        }

        let envelope: Option<SessionEnvelope> =
            response.json().await.map_err(|e| AuthError::parse(&e))?;
        Ok(envelope
            .and_then(|e| e.user)
            .map(ProviderSession::from))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let url = format!("{}/api/auth/sign-out", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| AuthError::transport(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::http_status(status, &body));
        }

        Ok(())
    }
}
