use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use url::Url;

use crate::types::{TokenErrorResponse, TokenResponse};
use crate::{Credentials, GoogleAuthError, OAuthConfig, OOB_REDIRECT_URI, Result};

const REFRESH_CHANNEL_CAPACITY: usize = 16;

/// Async Google OAuth 2.0 client
///
/// Owns the configuration and the in-memory credential state. Refreshed
/// credentials are broadcast to every [`subscribe`](Self::subscribe)r.
///
/// # Example
///
/// ```no_run
/// use google_window_auth::{GoogleOAuthClient, OAuthConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = OAuthConfig::builder()
///     .client_id("my-app.apps.googleusercontent.com")
///     .client_secret("secret")
///     .build();
/// let client = GoogleOAuthClient::new(config)?;
///
/// println!("Visit: {}", client.generate_auth_url(&["profile".to_string(), "email".to_string()]));
/// let credentials = client.exchange_code("code").await?;
/// client.set_credentials(credentials).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GoogleOAuthClient {
    config: OAuthConfig,
    auth_url: Url,
    add_session_url: Url,
    http: reqwest::Client,
    credentials: RwLock<Option<Credentials>>,
    refresh_tx: broadcast::Sender<Credentials>,
}

impl GoogleOAuthClient {
    /// Create a new OAuth client with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the client id is empty or an endpoint URL is malformed
    pub fn new(config: OAuthConfig) -> Result<Self> {
        if config.client_id.trim().is_empty() {
            return Err(GoogleAuthError::InvalidConfig(
                "client_id must not be empty".to_string(),
            ));
        }
        let auth_url = Url::parse(&config.auth_url)?;
        Url::parse(&config.token_url)?;
        Url::parse(&config.revoke_url)?;
        let add_session_url = Url::parse(&config.add_session_url)?;
        if config.redirect_uri != OOB_REDIRECT_URI {
            Url::parse(&config.redirect_uri)?;
        }

        let (refresh_tx, _) = broadcast::channel(REFRESH_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            auth_url,
            add_session_url,
            http: reqwest::Client::new(),
            credentials: RwLock::new(None),
            refresh_tx,
        })
    }

    /// Configuration this client was built with
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Google's account chooser endpoint
    pub(crate) fn add_session_url(&self) -> &Url {
        &self.add_session_url
    }

    /// Build the authorization URL requesting offline access for `scopes`
    pub fn generate_auth_url(&self, scopes: &[String]) -> String {
        let mut url = self.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("access_type", "offline")
                .append_pair("scope", &scopes.join(" "))
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri);
            if let Some(prompt) = &self.config.prompt {
                query.append_pair("prompt", prompt);
            }
            if let Some(login_hint) = &self.config.login_hint {
                query.append_pair("login_hint", login_hint);
            }
        }
        url.to_string()
    }

    /// Exchange an authorization code for credentials
    ///
    /// The result is returned, not stored; see [`set_credentials`](Self::set_credentials).
    ///
    /// # Errors
    ///
    /// Returns an error if Google rejects the code or the request fails
    pub async fn exchange_code(&self, code: &str) -> Result<Credentials> {
        debug!("exchanging authorization code for tokens");

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        let token_response = token_response(response, GoogleAuthError::TokenExchange).await?;
        info!("authorization code exchanged");
        Ok(Credentials::from(token_response))
    }

    /// Replace the stored credentials
    pub async fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.write().await = Some(credentials);
    }

    /// Snapshot of the stored credentials
    pub async fn credentials(&self) -> Option<Credentials> {
        self.credentials.read().await.clone()
    }

    /// Forget the stored credentials
    pub async fn clear_credentials(&self) {
        self.credentials.write().await.take();
    }

    /// Refresh the stored access token and notify subscribers
    ///
    /// Google usually omits the refresh token from refresh responses; the
    /// previous one is kept in that case.
    ///
    /// # Errors
    ///
    /// Returns an error if no credentials or refresh token are stored, or the refresh fails.
    /// If the stored credentials were replaced while the request was in flight,
    /// the result is discarded and `TokenRefresh` is returned.
    pub async fn refresh_access_token(&self) -> Result<Credentials> {
        let refresh_token = {
            let guard = self.credentials.read().await;
            let current = guard.as_ref().ok_or(GoogleAuthError::NotAuthenticated)?;
            current
                .refresh_token
                .clone()
                .ok_or(GoogleAuthError::MissingRefreshToken)?
        };

        debug!("refreshing access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        let mut refreshed =
            Credentials::from(token_response(response, GoogleAuthError::TokenRefresh).await?);
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token.clone());
        }

        {
            let mut stored = self.credentials.write().await;
            let unchanged = stored
                .as_ref()
                .and_then(|c| c.refresh_token.as_deref())
                .is_some_and(|token| token == refresh_token);
            if !unchanged {
                warn!("credentials replaced during refresh, discarding refreshed tokens");
                return Err(GoogleAuthError::TokenRefresh(
                    "credentials were replaced while refreshing".to_string(),
                ));
            }
            *stored = Some(refreshed.clone());
        }
        if self.refresh_tx.send(refreshed.clone()).is_err() {
            debug!("no token listeners subscribed");
        }
        info!("access token refreshed");
        Ok(refreshed)
    }

    /// Return a usable access token, refreshing it first when expired
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when no credentials are stored, or the refresh error
    pub async fn access_token(&self) -> Result<String> {
        let current = self
            .credentials()
            .await
            .ok_or(GoogleAuthError::NotAuthenticated)?;

        if current.is_expired() && current.refresh_token.is_some() {
            return Ok(self.refresh_access_token().await?.access_token);
        }
        if current.is_expired() {
            warn!("access token expired and no refresh token is available");
        }
        Ok(current.access_token)
    }

    /// Revoke the stored credentials at Google and forget them
    ///
    /// The refresh token is revoked when present, which also invalidates
    /// the access tokens derived from it.
    pub async fn revoke_credentials(&self) -> Result<()> {
        let current = self
            .credentials()
            .await
            .ok_or(GoogleAuthError::NotAuthenticated)?;
        let token = current.refresh_token.unwrap_or(current.access_token);

        let response = self
            .http
            .post(&self.config.revoke_url)
            .form(&[("token", token.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GoogleAuthError::Http { status, body });
        }

        self.clear_credentials().await;
        info!("credentials revoked");
        Ok(())
    }

    /// Subscribe to refreshed credentials
    pub fn subscribe(&self) -> broadcast::Receiver<Credentials> {
        self.refresh_tx.subscribe()
    }
}

/// Decode a token endpoint response, mapping Google's error body through `on_error`
async fn token_response(
    response: reqwest::Response,
    on_error: fn(String) -> GoogleAuthError,
) -> Result<TokenResponse> {
    if response.status().is_success() {
        return Ok(response.json().await?);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<TokenErrorResponse>(&body) {
        Ok(error) => {
            warn!(status, error = %error.error, "token endpoint returned an error");
            Err(on_error(error.message()))
        }
        Err(_) => Err(GoogleAuthError::Http { status, body }),
    }
}
