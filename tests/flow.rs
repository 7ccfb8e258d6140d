//! End-to-end tests of the window-driven flow.
//!
//! Windows are faked with a scripted provider; Google's token and revoke
//! endpoints are served by wiremock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use google_window_auth::{
    AuthWindow, Credentials, GoogleAuthError, GoogleOAuth, GoogleOAuthClient, OAuthConfig, Result,
    SessionState, WindowEvent, WindowEvents, WindowOptions, WindowProvider,
};

#[derive(Default)]
struct FakeState {
    script: Vec<WindowEvent>,
    title: String,
    opened: usize,
    loaded: Vec<String>,
    closes: usize,
    sender: Option<mpsc::UnboundedSender<WindowEvent>>,
    /// `load_url` fails
    broken: bool,
    /// drop the event sender once the script is queued
    hang_up: bool,
}

/// Window provider replaying a fixed list of events on every window it opens
#[derive(Clone, Default)]
struct FakeWindows {
    state: Arc<Mutex<FakeState>>,
}

impl FakeWindows {
    fn scripted(title: &str, script: Vec<WindowEvent>) -> Self {
        let windows = Self::default();
        {
            let mut state = windows.state.lock().unwrap();
            state.title = title.to_string();
            state.script = script;
        }
        windows
    }

    fn send(&self, event: WindowEvent) {
        let state = self.state.lock().unwrap();
        state.sender.as_ref().unwrap().send(event).unwrap();
    }

    fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    fn loaded(&self) -> Vec<String> {
        self.state.lock().unwrap().loaded.clone()
    }
}

struct FakeWindow {
    state: Arc<Mutex<FakeState>>,
}

impl AuthWindow for FakeWindow {
    fn load_url(&mut self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.broken {
            return Err(GoogleAuthError::Window("renderer crashed".to_string()));
        }
        state.loaded.push(url.to_string());
        Ok(())
    }

    fn title(&self) -> String {
        self.state.lock().unwrap().title.clone()
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closes += 1;
    }
}

impl WindowProvider for FakeWindows {
    type Window = FakeWindow;

    fn open(&self, _options: &WindowOptions) -> Result<(FakeWindow, WindowEvents)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        state.opened += 1;
        for event in &state.script {
            tx.send(event.clone()).unwrap();
        }
        if !state.hang_up {
            state.sender = Some(tx);
        }
        Ok((
            FakeWindow {
                state: Arc::clone(&self.state),
            },
            rx,
        ))
    }
}

fn redirect(new_url: &str) -> WindowEvent {
    WindowEvent::Redirect {
        old_url: "https://accounts.google.com/signin/oauth/consent".to_string(),
        new_url: new_url.to_string(),
    }
}

fn config(server_uri: &str) -> OAuthConfig {
    OAuthConfig::builder()
        .client_id("test-client.apps.googleusercontent.com")
        .client_secret("test-secret")
        .scope("https://www.googleapis.com/auth/drive.readonly")
        .token_url(format!("{}/token", server_uri))
        .revoke_url(format!("{}/revoke", server_uri))
        .build()
}

fn helper(windows: FakeWindows) -> GoogleOAuth<FakeWindows> {
    GoogleOAuth::new(config("http://127.0.0.1:9"), windows).unwrap()
}

fn stored(access_token: &str, refresh_token: Option<&str>, expires_at: Option<u64>) -> Credentials {
    Credentials {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at,
        id_token: None,
        token_type: Some("Bearer".to_string()),
        scope: None,
    }
}

#[tokio::test]
async fn test_closing_window_rejects_with_window_closed() {
    let windows = FakeWindows::scripted("Sign in - Google Accounts", vec![WindowEvent::Closed]);
    let auth = helper(windows.clone());

    let err = auth.get_authorization_code(false).await.unwrap_err();

    assert!(matches!(err, GoogleAuthError::WindowClosed));
    // the user already closed it
    assert_eq!(windows.closes(), 0);
    assert_eq!(auth.session_state(), SessionState::Settled);
}

#[tokio::test]
async fn test_redirect_error_rejects_with_description() {
    let windows = FakeWindows::scripted(
        "",
        vec![redirect(
            "http://localhost/?error=access_denied&error_description=The%20user%20denied%20access",
        )],
    );
    let auth = helper(windows.clone());

    let err = auth.get_authorization_code(false).await.unwrap_err();

    assert!(matches!(err, GoogleAuthError::Provider(_)));
    assert_eq!(err.to_string(), "The user denied access");
    assert_eq!(windows.closes(), 1);
}

#[tokio::test]
async fn test_redirect_code_resolves_and_closes_once() {
    let windows = FakeWindows::scripted(
        "",
        vec![
            redirect("https://accounts.google.com/signin/v2/challenge"),
            redirect("http://localhost/?code=ABC123"),
            WindowEvent::Closed,
        ],
    );
    let auth = helper(windows.clone());

    let code = auth.get_authorization_code(false).await.unwrap();

    assert_eq!(code, "ABC123");
    assert_eq!(windows.closes(), 1);
    let loaded = windows.loaded();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0], auth.generate_auth_url(false));
    assert!(loaded[0].contains("access_type=offline"));
}

#[tokio::test]
async fn test_title_success_resolves_code() {
    let windows = FakeWindows::scripted("Success code=XYZ", vec![WindowEvent::TitleChanged]);
    let auth = helper(windows.clone());

    assert_eq!(auth.get_authorization_code(false).await.unwrap(), "XYZ");
    assert_eq!(windows.closes(), 1);
}

#[tokio::test]
async fn test_title_denied_rejects_with_reason() {
    let windows = FakeWindows::scripted("Denied reason=blocked", vec![WindowEvent::TitleChanged]);
    let auth = helper(windows.clone());

    let err = auth.get_authorization_code(true).await.unwrap_err();

    assert_eq!(err.to_string(), "blocked");
    assert!(windows.loaded()[0].starts_with("https://accounts.google.com/AddSession?continue="));
}

#[tokio::test]
async fn test_second_window_rejected_while_pending() {
    let windows = FakeWindows::scripted("Sign in - Google Accounts", vec![]);
    let auth = Arc::new(helper(windows.clone()));
    let url = auth.generate_auth_url(false);

    let first = tokio::spawn({
        let auth = Arc::clone(&auth);
        let url = url.clone();
        async move { auth.open_auth_window_and_get_authorization_code(&url).await }
    });
    while auth.session_state() != SessionState::Pending {
        tokio::task::yield_now().await;
    }

    let err = auth
        .open_auth_window_and_get_authorization_code(&url)
        .await
        .unwrap_err();
    assert!(matches!(err, GoogleAuthError::SessionInProgress));
    assert_eq!(windows.opened(), 1);

    windows.send(redirect("http://localhost/?code=late"));
    assert_eq!(first.await.unwrap().unwrap(), "late");

    // a settled session can be restarted
    windows.state.lock().unwrap().script = vec![WindowEvent::Closed];
    assert!(matches!(
        auth.get_authorization_code(false).await,
        Err(GoogleAuthError::WindowClosed)
    ));
}

#[tokio::test]
async fn test_cancelled_flow_closes_its_window() {
    let windows = FakeWindows::scripted("Sign in - Google Accounts", vec![]);
    let auth = Arc::new(helper(windows.clone()));

    let first = tokio::spawn({
        let auth = Arc::clone(&auth);
        async move { auth.get_authorization_code(false).await }
    });
    while auth.session_state() != SessionState::Pending {
        tokio::task::yield_now().await;
    }

    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());
    assert_eq!(windows.closes(), 1);
    assert_eq!(auth.session_state(), SessionState::Idle);

    windows.state.lock().unwrap().script = vec![WindowEvent::Closed];
    assert!(matches!(
        auth.get_authorization_code(false).await,
        Err(GoogleAuthError::WindowClosed)
    ));
    assert_eq!(windows.opened(), 2);
    assert_eq!(windows.closes(), 1);
}

#[tokio::test]
async fn test_load_failure_closes_window_and_settles() {
    let windows = FakeWindows::scripted("", vec![redirect("http://localhost/?code=unused")]);
    windows.state.lock().unwrap().broken = true;
    let auth = helper(windows.clone());

    let err = auth.get_authorization_code(false).await.unwrap_err();

    assert!(matches!(err, GoogleAuthError::Window(_)));
    assert_eq!(windows.closes(), 1);
    assert_eq!(auth.session_state(), SessionState::Settled);
}

#[tokio::test]
async fn test_event_stream_ending_counts_as_closed() {
    let windows = FakeWindows::scripted("Sign in - Google Accounts", vec![WindowEvent::TitleChanged]);
    windows.state.lock().unwrap().hang_up = true;
    let auth = helper(windows.clone());

    let err = auth.get_authorization_code(false).await.unwrap_err();

    assert!(matches!(err, GoogleAuthError::WindowClosed));
    assert_eq!(windows.closes(), 0);
    assert_eq!(auth.session_state(), SessionState::Settled);
}

#[tokio::test]
async fn test_tokens_are_exchanged_and_stored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=ABC123"))
        .and(body_string_contains("client_secret=test-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.access",
            "refresh_token": "1//refresh",
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": "email profile https://www.googleapis.com/auth/drive.readonly",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let windows = FakeWindows::scripted("", vec![redirect("http://localhost/?code=ABC123")]);
    let auth = GoogleOAuth::new(config(&server.uri()), windows).unwrap();

    let credentials = auth.open_auth_window_and_get_tokens(false).await.unwrap();

    assert_eq!(credentials.access_token, "ya29.access");
    assert_eq!(credentials.refresh_token.as_deref(), Some("1//refresh"));
    assert!(!credentials.is_expired());
    assert_eq!(auth.client().credentials().await, Some(credentials));

    let restored = stored("restored", Some("1//other"), None);
    auth.set_tokens(restored.clone()).await;
    assert_eq!(auth.client().credentials().await, Some(restored));
}

#[tokio::test]
async fn test_exchange_error_surfaces_google_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Malformed auth code.",
        })))
        .mount(&server)
        .await;

    let windows = FakeWindows::scripted("Success code=bad", vec![WindowEvent::TitleChanged]);
    let auth = GoogleOAuth::new(config(&server.uri()), windows).unwrap();

    let err = auth.open_auth_window_and_get_tokens(false).await.unwrap_err();

    match err {
        GoogleAuthError::TokenExchange(msg) => assert_eq!(msg, "Malformed auth code."),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(auth.client().credentials().await, None);
}

#[tokio::test]
async fn test_refresh_is_forwarded_to_subscribers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh",
            "expires_in": 3599,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = GoogleOAuth::new(config(&server.uri()), FakeWindows::default()).unwrap();
    let mut refreshed = auth.subscribe_tokens();
    auth.set_tokens(stored("ya29.stale", Some("1//refresh"), Some(0))).await;

    let token = auth.client().access_token().await.unwrap();
    assert_eq!(token, "ya29.fresh");

    let event = refreshed.recv().await.unwrap();
    assert_eq!(event.access_token, "ya29.fresh");
    assert_eq!(event.refresh_token.as_deref(), Some("1//refresh"));
    assert_eq!(auth.client().credentials().await, Some(event));
}

#[tokio::test]
async fn test_valid_token_is_not_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let auth = GoogleOAuth::new(config(&server.uri()), FakeWindows::default()).unwrap();
    let expires_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600;
    auth.set_tokens(stored("ya29.valid", Some("1//refresh"), Some(expires_at))).await;

    assert_eq!(auth.client().access_token().await.unwrap(), "ya29.valid");
}

#[tokio::test]
async fn test_revoke_clears_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string_contains("token=1%2F%2Frefresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let auth = GoogleOAuth::new(config(&server.uri()), FakeWindows::default()).unwrap();
    auth.set_tokens(stored("ya29.access", Some("1//refresh"), None)).await;

    auth.client().revoke_credentials().await.unwrap();
    assert_eq!(auth.client().credentials().await, None);
}

#[tokio::test]
async fn test_refresh_discarded_when_credentials_replaced_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=1%2F%2Faccount-a"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "ya29.account-a-fresh",
                    "expires_in": 3599,
                    "token_type": "Bearer",
                }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(GoogleOAuthClient::new(config(&server.uri())).unwrap());
    let mut refreshed = client.subscribe();
    client
        .set_credentials(stored("ya29.account-a", Some("1//account-a"), Some(0)))
        .await;

    let refresh = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.refresh_access_token().await }
    });
    while server
        .received_requests()
        .await
        .is_none_or(|requests| requests.is_empty())
    {
        tokio::task::yield_now().await;
    }

    let account_b = stored("ya29.account-b", Some("1//account-b"), None);
    client.set_credentials(account_b.clone()).await;

    let err = refresh.await.unwrap().unwrap_err();
    assert!(matches!(err, GoogleAuthError::TokenRefresh(_)));
    assert_eq!(client.credentials().await, Some(account_b));
    assert!(refreshed.try_recv().is_err());
}
