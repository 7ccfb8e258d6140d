use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::window::WindowOptions;

/// Out-of-band redirect URI: Google shows the code in the page title instead of redirecting
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Scopes every client requests, appended when missing
pub const REQUIRED_SCOPES: &[&str] = &["profile", "email"];

pub(crate) const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub(crate) const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
pub(crate) const GOOGLE_ADD_SESSION_URL: &str = "https://accounts.google.com/AddSession";

/// Google OAuth credentials
///
/// Returned by the code exchange and by refreshes. Serializable so callers
/// can persist it themselves and restore it later with
/// [`GoogleOAuth::set_tokens`](crate::GoogleOAuth::set_tokens).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The access token used to authenticate API requests
    pub access_token: String,
    /// The refresh token, only issued for offline access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) when the access token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// OpenID Connect id token (JWT)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Token type, `Bearer` for Google
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Space-separated scopes actually granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Credentials {
    /// Check if the token is expired or will expire soon (within 5 minutes)
    ///
    /// Credentials without an expiry are never considered expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(_) => self.expires_in() <= Duration::from_secs(300),
            None => false,
        }
    }

    /// Get the duration until the token expires
    ///
    /// Returns `Duration::ZERO` if the token is already expired or carries no expiry.
    pub fn expires_in(&self) -> Duration {
        let now = now_secs();
        match self.expires_at {
            Some(expires_at) if expires_at > now => Duration::from_secs(expires_at - now),
            _ => Duration::ZERO,
        }
    }

    /// Decode the claims of the id token, if one was issued
    pub fn id_token_claims(&self) -> crate::Result<Option<crate::IdTokenClaims>> {
        self.id_token
            .as_deref()
            .map(crate::jwt::decode_id_token)
            .transpose()
    }
}

/// Configuration for the Google OAuth client
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client ID from the Google Cloud console
    pub client_id: String,
    pub client_secret: String,
    /// Requested scopes; `profile` and `email` are always added
    pub scopes: Vec<String>,
    /// Redirect URI (default: the out-of-band URI)
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    /// Account-chooser URL used when forcing a new session
    pub add_session_url: String,
    /// Optional `prompt` parameter (e.g. "consent", "select_account")
    pub prompt: Option<String>,
    /// Optional `login_hint` parameter
    pub login_hint: Option<String>,
    pub window: WindowOptions,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            scopes: Vec::new(),
            redirect_uri: OOB_REDIRECT_URI.to_string(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            revoke_url: GOOGLE_REVOKE_URL.to_string(),
            add_session_url: GOOGLE_ADD_SESSION_URL.to_string(),
            prompt: None,
            login_hint: None,
            window: WindowOptions::default(),
        }
    }
}

impl OAuthConfig {
    /// Create a new config builder
    pub fn builder() -> OAuthConfigBuilder {
        OAuthConfigBuilder::default()
    }
}

/// Builder for OAuthConfig
#[derive(Debug, Clone, Default)]
pub struct OAuthConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    scopes: Vec<String>,
    redirect_uri: Option<String>,
    auth_url: Option<String>,
    token_url: Option<String>,
    revoke_url: Option<String>,
    add_session_url: Option<String>,
    prompt: Option<String>,
    login_hint: Option<String>,
    window: Option<WindowOptions>,
}

impl OAuthConfigBuilder {
    /// Set the OAuth client ID
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the OAuth client secret
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Add a single scope
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Add several scopes
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Set the redirect URI
    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Set the authorization endpoint URL
    pub fn auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = Some(auth_url.into());
        self
    }

    /// Set the token exchange endpoint URL
    pub fn token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    /// Set the token revocation endpoint URL
    pub fn revoke_url(mut self, revoke_url: impl Into<String>) -> Self {
        self.revoke_url = Some(revoke_url.into());
        self
    }

    /// Set the account chooser URL used when forcing a new session
    pub fn add_session_url(mut self, add_session_url: impl Into<String>) -> Self {
        self.add_session_url = Some(add_session_url.into());
        self
    }

    /// Set the `prompt` parameter, e.g. `consent` or `select_account`
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set the `login_hint` parameter (email or account id to preselect)
    pub fn login_hint(mut self, login_hint: impl Into<String>) -> Self {
        self.login_hint = Some(login_hint.into());
        self
    }

    /// Set the options passed to the window provider
    pub fn window(mut self, window: WindowOptions) -> Self {
        self.window = Some(window);
        self
    }

    /// Build the OAuthConfig
    pub fn build(self) -> OAuthConfig {
        let defaults = OAuthConfig::default();
        OAuthConfig {
            client_id: self.client_id.unwrap_or(defaults.client_id),
            client_secret: self.client_secret.unwrap_or(defaults.client_secret),
            scopes: self.scopes,
            redirect_uri: self.redirect_uri.unwrap_or(defaults.redirect_uri),
            auth_url: self.auth_url.unwrap_or(defaults.auth_url),
            token_url: self.token_url.unwrap_or(defaults.token_url),
            revoke_url: self.revoke_url.unwrap_or(defaults.revoke_url),
            add_session_url: self.add_session_url.unwrap_or(defaults.add_session_url),
            prompt: self.prompt,
            login_hint: self.login_hint,
            window: self.window.unwrap_or(defaults.window),
        }
    }
}

/// Deduplicate scopes in order and append the required ones
pub(crate) fn normalize_scopes(scopes: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(scopes.len() + REQUIRED_SCOPES.len());
    let required = REQUIRED_SCOPES.iter().map(|s| s.to_string());
    for scope in scopes.iter().cloned().chain(required) {
        if !scope.is_empty() && !normalized.contains(&scope) {
            normalized.push(scope);
        }
    }
    normalized
}

/// Token response from Google's token endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// Error body from Google's token endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    pub fn message(self) -> String {
        self.error_description.unwrap_or(self.error)
    }
}

impl From<TokenResponse> for Credentials {
    fn from(response: TokenResponse) -> Self {
        Credentials {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_in.map(|secs| now_secs() + secs),
            id_token: response.id_token,
            token_type: response.token_type,
            scope: response.scope,
        }
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
