//! Auth command handlers.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use tdo_core::auth::{
    BridgePolicy, CredentialCache, HttpAuthProvider, IdentityBridge, ResolveError, SessionStore,
    UserResolver, mask_token,
};
use tdo_core::backend::BackendClient;
use tdo_core::config::Config;

fn session_store(config: &Config) -> Result<SessionStore<HttpAuthProvider>> {
    let provider = HttpAuthProvider::new(config.provider_base_url()?)?;
    let backend = BackendClient::new(config.backend_base_url()?);
    let bridge = IdentityBridge::with_policy(provider, backend, BridgePolicy::from(&config.bridge));
    Ok(SessionStore::new(bridge))
}

fn read_password(provided: Option<String>) -> Result<String> {
    if let Some(password) = provided {
        return Ok(password);
    }

    print!("Password: ");
    io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read password from stdin")?;
    let password = line.trim().to_string();
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

pub async fn login(config: &Config, email: &str, password: Option<String>) -> Result<()> {
    let password = read_password(password)?;
    let mut store = session_store(config)?;
    store.sign_in(email, &password).await.context("sign in")?;
    println!("Logged in as {email}");
    Ok(())
}

pub async fn signup(config: &Config, email: &str, password: Option<String>) -> Result<()> {
    let password = read_password(password)?;
    let mut store = session_store(config)?;
    store.sign_up(email, &password).await.context("sign up")?;
    println!("Account created; logged in as {email}");
    Ok(())
}

pub async fn logout(config: &Config) -> Result<()> {
    let cache = CredentialCache::new();
    if cache.load().unwrap_or_default().is_none() {
        println!("Not logged in");
        return Ok(());
    }

    let mut store = session_store(config)?;
    store.sign_out().await.context("sign out")?;
    println!("Logged out");
    Ok(())
}

pub async fn whoami(config: &Config) -> Result<()> {
    let cache = CredentialCache::new();
    let Some(creds) = cache.load().context("read credential cache")? else {
        println!("Not logged in");
        return Ok(());
    };

    let resolver = UserResolver::new(BackendClient::new(config.backend_base_url()?))
        .settle_delay(config.resolver.settle_delay());
    match resolver.resolve().await {
        Ok(user_id) => {
            println!("{} ({user_id})", creds.email);
            println!("token: {}", mask_token(&creds.backend_token));
            Ok(())
        }
        Err(e) => {
            if matches!(e, ResolveError::Unauthorized(_)) {
                cache.clear().context("clear stale credential")?;
            }
            bail!("Not authenticated ({e}); run `tdo login`");
        }
    }
}
