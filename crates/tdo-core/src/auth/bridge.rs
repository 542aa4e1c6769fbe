//! Identity bridging between the auth provider and the backend.
//!
//! The provider session is established asynchronously with respect to the
//! sign-in call returning, so a single immediate `get_session` check is
//! unreliable. `establish` waits a fixed initial delay and then re-polls a
//! bounded number of times; exhausting the budget is a deterministic
//! failure instead of an indefinite wait. The budget is configuration
//! (`BridgePolicy`), not constants buried in the loop.

use std::fmt;
use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

use crate::auth::provider::{AuthError, AuthProvider, ProviderSession};
use crate::backend::BackendClient;
use crate::config;

/// How the credentials should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMode {
    /// Sign in to an existing account.
    SignIn,
    /// Register first, then sign in with the same credentials.
    SignUp,
}

/// Timing and attempt budget for session polling.
#[derive(Debug, Clone, Copy)]
pub struct BridgePolicy {
    /// Delay before the first `get_session` check.
    pub initial_delay: Duration,
    /// Delay between subsequent checks.
    pub poll_delay: Duration,
    /// Re-checks after the initial one.
    pub max_polls: u32,
}

impl Default for BridgePolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            poll_delay: Duration::from_millis(200),
            max_polls: 5,
        }
    }
}

impl From<&config::BridgeConfig> for BridgePolicy {
    fn from(config: &config::BridgeConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            poll_delay: Duration::from_millis(config.poll_delay_ms),
            max_polls: config.max_polls,
        }
    }
}

/// A backend-recognized identity.
///
/// `backend_user_id` and `backend_token` were issued together by one sync
/// call; never use one without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgedIdentity {
    /// The provider's user id.
    pub provider_user_id: String,
    /// Email the identity was bridged with.
    pub email: String,
    /// The backend's own user id, scoping all task requests.
    pub backend_user_id: Uuid,
    /// Opaque bearer token for backend calls.
    pub backend_token: String,
}

/// Failures of the bridging sequence. Each step is terminal on its own
/// failure; the caller may re-invoke `establish` from scratch.
#[derive(Debug)]
pub enum BridgeError {
    /// A provider call (sign-up, sign-in, get-session) failed.
    Provider(AuthError),
    /// No populated provider session appeared within the poll budget.
    SessionNotEstablished,
    /// The materialized session is missing its user id or email.
    InvalidProviderUser,
    /// The backend rejected the identity sync. Not retried; sync failures
    /// are not treated as transient.
    SyncFailed(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Provider(e) => write!(f, "provider error: {e}"),
            BridgeError::SessionNotEstablished => {
                write!(f, "provider session was not established within the poll budget")
            }
            BridgeError::InvalidProviderUser => {
                write!(f, "provider session is missing a user id or email")
            }
            BridgeError::SyncFailed(message) => {
                write!(f, "backend identity sync failed: {message}")
            }
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AuthError> for BridgeError {
    fn from(err: AuthError) -> Self {
        BridgeError::Provider(err)
    }
}

/// Converts a just-established provider session into a backend-recognized
/// identity, tolerating the provider's session-propagation lag.
pub struct IdentityBridge<P> {
    provider: P,
    backend: BackendClient,
    policy: BridgePolicy,
}

impl<P: AuthProvider> IdentityBridge<P> {
    /// Creates a bridge with the default poll budget.
    pub fn new(provider: P, backend: BackendClient) -> Self {
        Self::with_policy(provider, backend, BridgePolicy::default())
    }

    /// Creates a bridge with an explicit poll budget.
    pub fn with_policy(provider: P, backend: BackendClient, policy: BridgePolicy) -> Self {
        Self {
            provider,
            backend,
            policy,
        }
    }

    /// Returns the provider client.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns the backend client.
    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Establishes a backend-recognized identity from provider credentials.
    ///
    /// Sign-up mode registers and then immediately signs in with the same
    /// credentials; the provider does not guarantee that sign-up alone
    /// creates a session.
    ///
    /// # Errors
    /// Every step is terminal on its own failure type; no step is retried
    /// beyond the session poll budget.
    pub async fn establish(
        &self,
        email: &str,
        password: &str,
        mode: SignMode,
    ) -> Result<BridgedIdentity, BridgeError> {
        if mode == SignMode::SignUp {
            self.provider.sign_up_email(email, password).await?;
        }
        self.provider.sign_in_email(email, password).await?;

        let session = self
            .wait_for_session()
            .await?
            .ok_or(BridgeError::SessionNotEstablished)?;

        if session.user_id.trim().is_empty() || session.email.trim().is_empty() {
            return Err(BridgeError::InvalidProviderUser);
        }

        let synced = self
            .backend
            .sync_user(&session.user_id, &session.email)
            .await
            .map_err(|e| BridgeError::SyncFailed(e.to_string()))?;

        Ok(BridgedIdentity {
            provider_user_id: session.user_id,
            email: session.email,
            backend_user_id: synced.id,
            backend_token: synced.backend_token,
        })
    }

    /// Polls for a populated session: one check after `initial_delay`, then
    /// up to `max_polls` re-checks spaced by `poll_delay`. Stops at the
    /// first session carrying a non-empty user id.
    async fn wait_for_session(&self) -> Result<Option<ProviderSession>, BridgeError> {
        sleep(self.policy.initial_delay).await;
        for attempt in 0..=self.policy.max_polls {
            if attempt > 0 {
                sleep(self.policy.poll_delay).await;
            }
            if let Some(session) = self.provider.get_session().await?
                && !session.user_id.trim().is_empty()
            {
                return Ok(Some(session));
            }
            tracing::debug!(attempt, "provider session not ready");
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::provider::AuthErrorKind;
    use crate::auth::provider::fake::FakeProvider;

    const BACKEND_USER_ID: &str = "9d2f7276-6a22-4cfc-9ef0-4f0fdbd4b8b9";

    fn fast_policy() -> BridgePolicy {
        BridgePolicy {
            initial_delay: Duration::from_millis(1),
            poll_delay: Duration::from_millis(1),
            max_polls: 5,
        }
    }

    fn sync_ok_body() -> serde_json::Value {
        serde_json::json!({
            "id": BACKEND_USER_ID,
            "email": "a@b.c",
            "backend_token": "backend-token-1",
        })
    }

    /// Test: a session appearing after a few polls bridges successfully,
    /// with the id/token pair taken from the sync response.
    #[tokio::test]
    async fn test_establish_bridges_after_polls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sync-user"))
            .and(body_json(serde_json::json!({
                "better_auth_id": "prov-1",
                "email": "a@b.c",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(sync_ok_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = FakeProvider::new();
        provider.push_session(None);
        provider.push_session(None);
        provider.set_steady_session(Some(FakeProvider::session("prov-1", "a@b.c")));

        let bridge = IdentityBridge::with_policy(
            provider.clone(),
            BackendClient::new(server.uri()),
            fast_policy(),
        );
        let identity = bridge
            .establish("a@b.c", "pw", SignMode::SignIn)
            .await
            .unwrap();

        assert_eq!(identity.provider_user_id, "prov-1");
        assert_eq!(identity.email, "a@b.c");
        assert_eq!(identity.backend_user_id.to_string(), BACKEND_USER_ID);
        assert_eq!(identity.backend_token, "backend-token-1");
        assert_eq!(provider.sign_in_calls(), 1);
        assert_eq!(provider.sign_up_calls(), 0);
        assert_eq!(provider.get_session_calls(), 3);
    }

    /// Test: an exhausted poll budget fails with zero sync calls.
    #[tokio::test]
    async fn test_establish_fails_without_session_and_without_sync() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sync-user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sync_ok_body()))
            .expect(0)
            .mount(&server)
            .await;

        let provider = FakeProvider::new();
        provider.set_steady_session(None);

        let bridge = IdentityBridge::with_policy(
            provider.clone(),
            BackendClient::new(server.uri()),
            fast_policy(),
        );
        let err = bridge
            .establish("a@b.c", "pw", SignMode::SignIn)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::SessionNotEstablished));
        // 1 initial check + 5 re-polls
        assert_eq!(provider.get_session_calls(), 6);
    }

    /// Test: sign-up mode registers, then signs in.
    #[tokio::test]
    async fn test_establish_sign_up_then_sign_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sync-user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sync_ok_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = FakeProvider::new();
        provider.set_steady_session(Some(FakeProvider::session("prov-1", "a@b.c")));

        let bridge = IdentityBridge::with_policy(
            provider.clone(),
            BackendClient::new(server.uri()),
            fast_policy(),
        );
        bridge
            .establish("a@b.c", "pw", SignMode::SignUp)
            .await
            .unwrap();

        assert_eq!(provider.sign_up_calls(), 1);
        assert_eq!(provider.sign_in_calls(), 1);
    }

    /// Test: a session without an email never reaches the backend.
    #[tokio::test]
    async fn test_establish_rejects_incomplete_provider_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sync-user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sync_ok_body()))
            .expect(0)
            .mount(&server)
            .await;

        let provider = FakeProvider::new();
        provider.set_steady_session(Some(FakeProvider::session("prov-1", "")));

        let bridge = IdentityBridge::with_policy(
            provider,
            BackendClient::new(server.uri()),
            fast_policy(),
        );
        let err = bridge
            .establish("a@b.c", "pw", SignMode::SignIn)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::InvalidProviderUser));
    }

    /// Test: a rejected sync carries the server's message and is not
    /// retried.
    #[tokio::test]
    async fn test_establish_sync_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sync-user"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "detail": "sync exploded",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = FakeProvider::new();
        provider.set_steady_session(Some(FakeProvider::session("prov-1", "a@b.c")));

        let bridge = IdentityBridge::with_policy(
            provider,
            BackendClient::new(server.uri()),
            fast_policy(),
        );
        let err = bridge
            .establish("a@b.c", "pw", SignMode::SignIn)
            .await
            .unwrap_err();

        match err {
            BridgeError::SyncFailed(message) => assert!(message.contains("sync exploded")),
            other => panic!("expected SyncFailed, got {other:?}"),
        }
    }

    /// Test: a failed sign-in stops before any session polling.
    #[tokio::test]
    async fn test_establish_sign_in_failure_stops_early() {
        let server = MockServer::start().await;

        let provider = FakeProvider::new();
        provider.fail_sign_in(AuthError::new(AuthErrorKind::Rejected, "bad credentials"));

        let bridge = IdentityBridge::with_policy(
            provider.clone(),
            BackendClient::new(server.uri()),
            fast_policy(),
        );
        let err = bridge
            .establish("a@b.c", "pw", SignMode::SignIn)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Provider(_)));
        assert_eq!(provider.get_session_calls(), 0);
    }
}
