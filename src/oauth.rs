use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::listener::AuthorizationListener;
use crate::types::normalize_scopes;
use crate::window::{AuthWindow, WindowEvent, WindowProvider};
use crate::{Credentials, GoogleAuthError, GoogleOAuthClient, OAuthConfig, Result};

/// Lifecycle of the auth window session owned by a [`GoogleOAuth`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No window has been opened yet
    Idle,
    /// A window is open and waiting for the user
    Pending,
    /// The last window settled, with a code or an error
    Settled,
}

/// Google sign-in through an embedded window
///
/// Opens the consent page in a window supplied by `W`, captures the
/// authorization code from redirects or the page title, and exchanges it
/// for credentials. Only one window may be pending at a time.
///
/// # Example
///
/// ```no_run
/// use google_window_auth::{GoogleOAuth, OAuthConfig, WindowProvider};
///
/// # async fn sign_in<W: WindowProvider>(windows: W) -> google_window_auth::Result<()> {
/// let config = OAuthConfig::builder()
///     .client_id("my-app.apps.googleusercontent.com")
///     .client_secret("secret")
///     .scope("https://www.googleapis.com/auth/drive.readonly")
///     .build();
/// let auth = GoogleOAuth::new(config, windows)?;
///
/// let credentials = auth.open_auth_window_and_get_tokens(false).await?;
/// println!("Expires in: {:?}", credentials.expires_in());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GoogleOAuth<W> {
    client: GoogleOAuthClient,
    windows: W,
    scopes: Vec<String>,
    session: Mutex<SessionState>,
}

impl<W: WindowProvider> GoogleOAuth<W> {
    /// Create the helper; `profile` and `email` are added to the configured scopes
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(config: OAuthConfig, windows: W) -> Result<Self> {
        let scopes = normalize_scopes(&config.scopes);
        Ok(Self {
            client: GoogleOAuthClient::new(config)?,
            windows,
            scopes,
            session: Mutex::new(SessionState::Idle),
        })
    }

    /// Scopes requested by this helper
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// The underlying OAuth client
    pub fn client(&self) -> &GoogleOAuthClient {
        &self.client
    }

    /// Current state of the auth window session
    pub fn session_state(&self) -> SessionState {
        *self.lock_session()
    }

    /// Build the authorization URL
    ///
    /// With `force_add_session` the URL goes through Google's account
    /// chooser first, so the user can sign in with another account.
    pub fn generate_auth_url(&self, force_add_session: bool) -> String {
        let url = self.client.generate_auth_url(&self.scopes);
        if !force_add_session {
            return url;
        }

        let mut wrapped = self.client.add_session_url().clone();
        wrapped.query_pairs_mut().append_pair("continue", &url);
        wrapped.to_string()
    }

    /// Open the consent page and wait for the authorization code
    pub async fn get_authorization_code(&self, force_add_session: bool) -> Result<String> {
        let url = self.generate_auth_url(force_add_session);
        self.open_auth_window_and_get_authorization_code(&url).await
    }

    /// Open a window on `url` and wait until it yields a code or fails
    ///
    /// # Errors
    ///
    /// - `SessionInProgress` if another window of this helper is pending
    /// - `WindowClosed` if the user closes the window first
    /// - `Provider` with Google's message if access was denied
    pub async fn open_auth_window_and_get_authorization_code(&self, url: &str) -> Result<String> {
        let mut session = self.begin_session()?;

        let (window, mut events) = self.windows.open(&self.client.config().window)?;
        let mut window = OpenWindow::new(window);
        debug!("auth window opened");

        if let Err(e) = window.load_url(url) {
            window.close();
            session.settle();
            return Err(e);
        }

        let mut listener = AuthorizationListener::new(&self.client.config().redirect_uri);
        let (outcome, user_closed) = loop {
            // a dropped sender means the toolkit tore the window down
            let event = events.recv().await.unwrap_or(WindowEvent::Closed);
            if let Some(outcome) = listener.handle(&event, || window.title()) {
                break (outcome, event == WindowEvent::Closed);
            }
        };

        // detach listeners, then close outside the event turn that decided the flow
        drop(events);
        tokio::task::yield_now().await;
        if user_closed {
            window.mark_closed();
        } else {
            window.close();
        }
        session.settle();

        match &outcome {
            Ok(_) => info!("authorization code received"),
            Err(GoogleAuthError::WindowClosed) => info!("auth window closed by user"),
            Err(e) => warn!("authorization failed: {}", e),
        }
        outcome
    }

    /// Run the whole flow and store the resulting credentials in the client
    pub async fn open_auth_window_and_get_tokens(
        &self,
        force_add_session: bool,
    ) -> Result<Credentials> {
        let code = self.get_authorization_code(force_add_session).await?;
        let credentials = self.client.exchange_code(&code).await?;
        self.client.set_credentials(credentials.clone()).await;
        Ok(credentials)
    }

    /// Restore credentials obtained earlier
    pub async fn set_tokens(&self, credentials: Credentials) {
        self.client.set_credentials(credentials).await;
    }

    /// Receive credentials whenever the client refreshes them
    pub fn subscribe_tokens(&self) -> broadcast::Receiver<Credentials> {
        self.client.subscribe()
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_session(&self) -> Result<SessionGuard<'_>> {
        let mut state = self.lock_session();
        if *state == SessionState::Pending {
            return Err(GoogleAuthError::SessionInProgress);
        }
        *state = SessionState::Pending;
        Ok(SessionGuard {
            session: &self.session,
            settled: false,
        })
    }
}

/// Window that gets closed once, at the latest when the flow is dropped
struct OpenWindow<T: AuthWindow> {
    window: T,
    closed: bool,
}

impl<T: AuthWindow> OpenWindow<T> {
    fn new(window: T) -> Self {
        Self {
            window,
            closed: false,
        }
    }

    fn load_url(&mut self, url: &str) -> Result<()> {
        self.window.load_url(url)
    }

    fn title(&self) -> String {
        self.window.title()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.window.close();
        }
    }

    /// The user or toolkit already closed it
    fn mark_closed(&mut self) {
        self.closed = true;
    }
}

impl<T: AuthWindow> Drop for OpenWindow<T> {
    fn drop(&mut self) {
        if !self.closed {
            debug!("auth flow dropped, closing its window");
            self.close();
        }
    }
}

/// Marks the session settled, or idle again if the flow is dropped midway
struct SessionGuard<'a> {
    session: &'a Mutex<SessionState>,
    settled: bool,
}

impl SessionGuard<'_> {
    fn settle(&mut self) {
        self.settled = true;
        self.set(SessionState::Settled);
    }

    fn set(&self, state: SessionState) {
        *self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.set(SessionState::Idle);
        }
    }
}
