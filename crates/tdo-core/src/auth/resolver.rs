//! Backend user resolution.
//!
//! Derives the backend user id that scopes all task requests. Requires a
//! persisted backend credential; tolerates being invoked right after a
//! fresh sign-in by waiting one fixed settling delay (a single delay, not
//! a retry loop).

use std::fmt;
use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

use crate::auth::credentials::CredentialCache;
use crate::backend::BackendClient;

/// Default settling delay before the who-am-I call.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(150);

/// Resolution failures. All of them mean "not authenticated" to the
/// caller; `Unauthorized` additionally requires clearing the stored
/// credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No backend credential in persisted storage.
    NoCredential,
    /// The stored record carries no provider identity.
    NoProviderUser,
    /// The backend rejected the credential.
    Unauthorized(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NoCredential => write!(f, "no backend credential stored"),
            ResolveError::NoProviderUser => write!(f, "no provider user available"),
            ResolveError::Unauthorized(message) => {
                write!(f, "backend rejected the credential: {message}")
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Resolves the backend user id for the stored credential.
pub struct UserResolver {
    backend: BackendClient,
    credentials: CredentialCache,
    settle_delay: Duration,
}

impl UserResolver {
    /// Resolver reading the default credential location.
    pub fn new(backend: BackendClient) -> Self {
        Self::with_credentials(backend, CredentialCache::new())
    }

    /// Resolver reading an explicit credential cache.
    pub fn with_credentials(backend: BackendClient, credentials: CredentialCache) -> Self {
        Self {
            backend,
            credentials,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Overrides the settling delay.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Resolves the backend user id.
    ///
    /// # Errors
    /// `NoCredential` / `NoProviderUser` without any backend call;
    /// `Unauthorized` when the backend refuses the stored token (the
    /// caller must clear local credential state and re-authenticate).
    pub async fn resolve(&self) -> Result<Uuid, ResolveError> {
        let creds = match self.credentials.load() {
            Ok(Some(creds)) => creds,
            Ok(None) => return Err(ResolveError::NoCredential),
            Err(e) => {
                tracing::warn!(error = %e, "credential cache unreadable");
                return Err(ResolveError::NoCredential);
            }
        };

        if creds.provider_user_id.trim().is_empty() {
            return Err(ResolveError::NoProviderUser);
        }

        // Absorb session-propagation lag right after a fresh sign-in.
        sleep(self.settle_delay).await;

        match self.backend.me(&creds.backend_token).await {
            Ok(user) => Ok(user.id),
            Err(e) => Err(ResolveError::Unauthorized(e.to_string())),
        }
    }
}
