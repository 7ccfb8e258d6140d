use thiserror::Error;

/// Error types for Google OAuth window authentication
#[derive(Error, Debug)]
pub enum GoogleAuthError {
    /// The user closed the auth window before the flow completed
    #[error("User closed the window")]
    WindowClosed,

    /// Denial or error reported by Google, carrying the provider's message verbatim
    #[error("{0}")]
    Provider(String),

    #[error("An authorization window is already open for this client")]
    SessionInProgress,

    #[error("Window error: {0}")]
    Window(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("No credentials set")]
    NotAuthenticated,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: {status}: {body}")]
    Http { status: u16, body: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("JWT decode error: {0}")]
    JwtDecode(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for Google OAuth operations
pub type Result<T> = std::result::Result<T, GoogleAuthError>;
