//! Authentication: provider client, identity bridge, session store,
//! credential persistence, and backend user resolution.
//!
//! The auth provider owns sign-in and its own session; the backend owns the
//! user identity that scopes task data. The bridge converts one into the
//! other; the store holds the result for the lifetime of the process.

pub mod bridge;
pub mod credentials;
pub mod provider;
pub mod resolver;
pub mod store;

pub use bridge::{BridgeError, BridgePolicy, BridgedIdentity, IdentityBridge, SignMode};
pub use credentials::{CredentialCache, StoredCredentials, mask_token};
pub use provider::{AuthError, AuthErrorKind, AuthProvider, HttpAuthProvider, ProviderSession};
pub use resolver::{ResolveError, UserResolver};
pub use store::{SessionChange, SessionChangeRx, SessionStore};
