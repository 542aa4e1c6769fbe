//! Session state for the application.
//!
//! The store is the single owner of "who is signed in". It is an explicit,
//! injected object — not an ambient singleton — and is only ever mutated
//! from the caller's task, so it needs no locking. Consumers subscribe for
//! change notifications; each lifecycle transition notifies exactly once.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::auth::bridge::{BridgedIdentity, IdentityBridge, SignMode};
use crate::auth::credentials::{CredentialCache, StoredCredentials};
use crate::auth::provider::{AuthProvider, ProviderSession};

/// Capacity of each subscriber channel.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 16;

/// Session lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// Startup recovery finished; `recovered` is true when a provider
    /// session was found.
    InitCompleted {
        recovered: bool,
    },
    /// An explicit sign-in or sign-up succeeded.
    SignedIn,
    /// Sign-out cleared the local session.
    SignedOut,
}

/// Receiver half handed to subscribers.
pub type SessionChangeRx = mpsc::Receiver<Arc<SessionChange>>;

/// Holds the current bridged identity and its loading state.
pub struct SessionStore<P> {
    bridge: IdentityBridge<P>,
    credentials: CredentialCache,
    current: Option<BridgedIdentity>,
    recovered: Option<ProviderSession>,
    loading: bool,
    subscribers: Vec<mpsc::Sender<Arc<SessionChange>>>,
}

impl<P: AuthProvider> SessionStore<P> {
    /// Creates a store persisting credentials at the default location.
    pub fn new(bridge: IdentityBridge<P>) -> Self {
        Self::with_credentials(bridge, CredentialCache::new())
    }

    /// Creates a store with an explicit credential cache.
    pub fn with_credentials(bridge: IdentityBridge<P>, credentials: CredentialCache) -> Self {
        Self {
            bridge,
            credentials,
            current: None,
            recovered: None,
            loading: true,
            subscribers: Vec::new(),
        }
    }

    /// The current bridged identity, if signed in.
    pub fn current(&self) -> Option<&BridgedIdentity> {
        self.current.as_ref()
    }

    /// A provider session recovered at init, before any bridging.
    pub fn recovered_session(&self) -> Option<&ProviderSession> {
        self.recovered.as_ref()
    }

    /// True until the init attempt has completed.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Subscribes to session transitions.
    ///
    /// Slow subscribers may miss changes (best-effort delivery); dropped
    /// receivers are pruned on the next notification.
    pub fn subscribe(&mut self) -> SessionChangeRx {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers.push(tx);
        rx
    }

    /// Startup recovery: snapshot the provider session without bridging.
    ///
    /// `current` stays `None` until an explicit sign-in or a resolver run;
    /// `loading` clears whether or not a session was found.
    pub async fn init(&mut self) {
        match self.bridge.provider().get_session().await {
            Ok(session) => self.recovered = session,
            Err(e) => {
                tracing::warn!(error = %e, "session recovery failed");
                self.recovered = None;
            }
        }
        self.loading = false;
        let recovered = self.recovered.is_some();
        self.notify(SessionChange::InitCompleted {
            recovered,
        });
    }

    /// Signs in and persists the issued credential.
    ///
    /// # Errors
    /// Bridge failures are surfaced to the caller; `current` is left
    /// untouched.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<BridgedIdentity> {
        self.establish(email, password, SignMode::SignIn).await
    }

    /// Registers, signs in, and persists the issued credential.
    ///
    /// # Errors
    /// Bridge failures are surfaced to the caller; `current` is left
    /// untouched.
    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<BridgedIdentity> {
        self.establish(email, password, SignMode::SignUp).await
    }

    async fn establish(
        &mut self,
        email: &str,
        password: &str,
        mode: SignMode,
    ) -> Result<BridgedIdentity> {
        let identity = self.bridge.establish(email, password, mode).await?;

        self.credentials
            .save(&StoredCredentials {
                backend_token: identity.backend_token.clone(),
                provider_user_id: identity.provider_user_id.clone(),
                email: identity.email.clone(),
            })
            .context("persist backend credential")?;

        self.current = Some(identity.clone());
        self.loading = false;
        self.notify(SessionChange::SignedIn);
        Ok(identity)
    }

    /// Signs out: best-effort provider call, then unconditional local
    /// clearing.
    ///
    /// A failed remote sign-out must not leave the app looking
    /// authenticated, so the local clear does not depend on it.
    ///
    /// # Errors
    /// Only credential-file removal can fail; local state is already
    /// cleared by then.
    pub async fn sign_out(&mut self) -> Result<()> {
        if let Err(e) = self.bridge.provider().sign_out().await {
            tracing::warn!(error = %e, "provider sign-out failed; clearing local session anyway");
        }

        self.current = None;
        self.recovered = None;
        self.notify(SessionChange::SignedOut);

        self.credentials
            .clear()
            .context("clear persisted credential")?;
        Ok(())
    }

    /// Best-effort fan-out; closed subscriber channels are removed.
    fn notify(&mut self, change: SessionChange) {
        let change = Arc::new(change);
        self.subscribers.retain(|tx| {
            match tx.try_send(Arc::clone(&change)) {
                Ok(()) | Err(TrySendError::Full(_)) => true, // drop this change, keep channel
                Err(TrySendError::Closed(_)) => false,       // remove closed channel
            }
        });
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::bridge::BridgePolicy;
    use crate::auth::provider::fake::FakeProvider;
    use crate::auth::provider::{AuthError, AuthErrorKind};
    use crate::backend::BackendClient;

    fn fast_policy() -> BridgePolicy {
        BridgePolicy {
            initial_delay: Duration::from_millis(1),
            poll_delay: Duration::from_millis(1),
            max_polls: 5,
        }
    }

    fn store_at(
        provider: FakeProvider,
        backend_url: &str,
        dir: &tempfile::TempDir,
    ) -> SessionStore<FakeProvider> {
        let bridge =
            IdentityBridge::with_policy(provider, BackendClient::new(backend_url), fast_policy());
        SessionStore::with_credentials(
            bridge,
            CredentialCache::at(dir.path().join("credentials.json")),
        )
    }

    async fn mount_sync_ok(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/auth/sync-user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "9d2f7276-6a22-4cfc-9ef0-4f0fdbd4b8b9",
                "email": "a@b.c",
                "backend_token": "backend-token-1",
            })))
            .mount(server)
            .await;
    }

    /// Test: init without a provider session clears loading and notifies
    /// exactly once.
    #[tokio::test]
    async fn test_init_without_session() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new();
        provider.set_steady_session(None);

        let mut store = store_at(provider, &server.uri(), &dir);
        let mut rx = store.subscribe();
        assert!(store.is_loading());

        store.init().await;

        assert!(!store.is_loading());
        assert!(store.current().is_none());
        assert!(store.recovered_session().is_none());
        assert_eq!(
            *rx.try_recv().unwrap(),
            SessionChange::InitCompleted {
                recovered: false
            }
        );
        assert!(rx.try_recv().is_err());
    }

    /// Test: init recovers a provider session but does not bridge.
    #[tokio::test]
    async fn test_init_recovers_session_unbridged() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new();
        provider.set_steady_session(Some(FakeProvider::session("prov-1", "a@b.c")));

        let mut store = store_at(provider, &server.uri(), &dir);
        let mut rx = store.subscribe();
        store.init().await;

        assert!(store.current().is_none());
        assert_eq!(store.recovered_session().unwrap().user_id, "prov-1");
        assert_eq!(
            *rx.try_recv().unwrap(),
            SessionChange::InitCompleted {
                recovered: true
            }
        );
    }

    /// Test: sign-in sets `current`, persists the credential, and notifies.
    #[tokio::test]
    async fn test_sign_in_persists_credential() {
        let server = MockServer::start().await;
        mount_sync_ok(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new();
        provider.set_steady_session(Some(FakeProvider::session("prov-1", "a@b.c")));

        let mut store = store_at(provider, &server.uri(), &dir);
        let mut rx = store.subscribe();

        let identity = store.sign_in("a@b.c", "pw").await.unwrap();
        assert_eq!(identity.backend_token, "backend-token-1");
        assert_eq!(store.current().unwrap(), &identity);

        let cache = CredentialCache::at(dir.path().join("credentials.json"));
        let stored = cache.load().unwrap().unwrap();
        assert_eq!(stored.backend_token, "backend-token-1");
        assert_eq!(stored.provider_user_id, "prov-1");

        assert_eq!(*rx.try_recv().unwrap(), SessionChange::SignedIn);
        assert!(rx.try_recv().is_err());
    }

    /// Test: a failed sign-in leaves `current` empty and notifies nothing.
    #[tokio::test]
    async fn test_sign_in_failure_leaves_state() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new();
        provider.fail_sign_in(AuthError::new(AuthErrorKind::Rejected, "bad credentials"));

        let mut store = store_at(provider, &server.uri(), &dir);
        let mut rx = store.subscribe();

        assert!(store.sign_in("a@b.c", "pw").await.is_err());
        assert!(store.current().is_none());
        assert!(rx.try_recv().is_err());
    }

    /// Test: sign-out clears everything even when the provider call fails.
    #[tokio::test]
    async fn test_sign_out_clears_despite_remote_failure() {
        let server = MockServer::start().await;
        mount_sync_ok(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new();
        provider.set_steady_session(Some(FakeProvider::session("prov-1", "a@b.c")));
        provider.fail_sign_out(AuthError::new(AuthErrorKind::Transport, "connection reset"));

        let mut store = store_at(provider.clone(), &server.uri(), &dir);
        store.sign_in("a@b.c", "pw").await.unwrap();
        let mut rx = store.subscribe();

        store.sign_out().await.unwrap();

        assert_eq!(provider.sign_out_calls(), 1);
        assert!(store.current().is_none());
        assert!(store.recovered_session().is_none());
        let cache = CredentialCache::at(dir.path().join("credentials.json"));
        assert_eq!(cache.load().unwrap(), None);
        assert_eq!(*rx.try_recv().unwrap(), SessionChange::SignedOut);
    }

    /// Test: dropped subscribers are pruned on the next notification.
    #[tokio::test]
    async fn test_notify_prunes_closed_subscribers() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new();
        provider.set_steady_session(None);

        let mut store = store_at(provider, &server.uri(), &dir);
        let rx = store.subscribe();
        let mut kept = store.subscribe();
        drop(rx);

        store.init().await;

        assert_eq!(store.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
