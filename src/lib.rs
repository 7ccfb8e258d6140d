//! # google-window-auth
//!
//! Google OAuth 2.0 sign-in for desktop applications, driven through an
//! embedded browser window instead of a local redirect listener.
//!
//! The application supplies the window (any webview toolkit) by implementing
//! [`WindowProvider`]. The crate opens it on Google's consent page, watches
//! redirects and title changes for the authorization code, closes the window
//! and exchanges the code for [`Credentials`].
//!
//! ## Features
//!
//! - **Embedded consent flow**: out-of-band (title) and redirect based code capture
//! - **Account switching**: optionally route through Google's account chooser
//! - **Single session**: a second window while one is pending is rejected
//! - **Refresh notifications**: subscribe to refreshed credentials to persist them
//! - **Id token claims**: read the signed-in user's identity
//!
//! ## Quick Start
//!
//! ```no_run
//! use google_window_auth::{GoogleOAuth, OAuthConfig, WindowProvider};
//!
//! # async fn run<W: WindowProvider>(windows: W) -> Result<(), Box<dyn std::error::Error>> {
//! let config = OAuthConfig::builder()
//!     .client_id("my-app.apps.googleusercontent.com")
//!     .client_secret("secret")
//!     .build();
//! let auth = GoogleOAuth::new(config, windows)?;
//!
//! let mut refreshed = auth.subscribe_tokens();
//! let credentials = auth.open_auth_window_and_get_tokens(false).await?;
//! println!("Signed in, token expires in {:?}", credentials.expires_in());
//!
//! // later: persist whatever the client refreshes
//! while let Ok(credentials) = refreshed.recv().await {
//!     println!("new access token expires in {:?}", credentials.expires_in());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod jwt;
mod listener;
mod oauth;
mod types;
mod window;

// Public API exports
pub use client::GoogleOAuthClient;
pub use error::{GoogleAuthError, Result};
pub use jwt::{IdTokenClaims, decode_id_token};
pub use listener::AuthorizationListener;
pub use oauth::{GoogleOAuth, SessionState};
pub use types::{Credentials, OAuthConfig, OAuthConfigBuilder, OOB_REDIRECT_URI, REQUIRED_SCOPES};
pub use window::{AuthWindow, WindowEvent, WindowEvents, WindowOptions, WindowProvider};
