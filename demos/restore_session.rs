//! Restore a saved session from the OS keyring and keep it up to date
//!
//! Credentials are stored as JSON under the `google-window-auth` service.
//! The client refreshes the access token when it has expired, and every
//! refreshed token set is written back to the keyring.
//!
//! Run with:
//!   GOOGLE_CLIENT_ID=... GOOGLE_CLIENT_SECRET=... cargo run --example restore_session

use anyhow::Context;
use google_window_auth::{Credentials, GoogleOAuthClient, OAuthConfig};
use tracing_subscriber::EnvFilter;

const KEYRING_SERVICE: &str = "google-window-auth";
const KEYRING_USER: &str = "default";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = OAuthConfig::builder()
        .client_id(std::env::var("GOOGLE_CLIENT_ID").context("GOOGLE_CLIENT_ID not set")?)
        .client_secret(std::env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default())
        .build();
    let client = GoogleOAuthClient::new(config)?;

    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    let saved = match entry.get_password() {
        Ok(json) => json,
        Err(keyring::Error::NoEntry) => {
            println!("No saved session. Sign in with the window flow first.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let credentials: Credentials = serde_json::from_str(&saved)?;
    client.set_credentials(credentials).await;

    let mut refreshed = client.subscribe();
    let access_token = client.access_token().await?;
    println!(
        "Access token: {}...",
        &access_token[..20.min(access_token.len())]
    );

    if let Ok(credentials) = refreshed.try_recv() {
        entry.set_password(&serde_json::to_string(&credentials)?)?;
        println!("Saved refreshed credentials to the keyring.");
    }

    if let Some(claims) = client
        .credentials()
        .await
        .and_then(|c| c.id_token_claims().ok().flatten())
    {
        println!("Signed in as: {}", claims.email.unwrap_or(claims.sub));
    }

    Ok(())
}
