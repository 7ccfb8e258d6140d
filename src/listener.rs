//! Turns window events into a single authorization outcome.

use tracing::debug;
use url::Url;

use crate::window::WindowEvent;
use crate::{GoogleAuthError, OOB_REDIRECT_URI, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Pending,
    Resolved,
    Rejected,
}

/// State machine bridging window events to an authorization code
///
/// Starts `Pending` and settles at most once, to `Resolved` or `Rejected`.
/// Events received after settling are ignored.
#[derive(Debug)]
pub struct AuthorizationListener {
    /// `None` inspects every redirect
    redirect_target: Option<Url>,
    state: ListenerState,
}

impl AuthorizationListener {
    /// Create a listener that inspects redirects aimed at `redirect_uri`
    ///
    /// A redirect matches when its scheme, host, port and path equal those of
    /// `redirect_uri`. With the out-of-band redirect URI every redirect is inspected.
    pub fn new(redirect_uri: &str) -> Self {
        let redirect_target = if redirect_uri == OOB_REDIRECT_URI {
            None
        } else {
            Url::parse(redirect_uri).ok()
        };
        Self {
            redirect_target,
            state: ListenerState::Pending,
        }
    }

    /// Whether the flow has already been decided
    pub fn is_settled(&self) -> bool {
        self.state != ListenerState::Pending
    }

    /// Feed one event; returns the outcome the first time the flow is decided
    ///
    /// `title` is only called for [`WindowEvent::TitleChanged`].
    pub fn handle(
        &mut self,
        event: &WindowEvent,
        title: impl FnOnce() -> String,
    ) -> Option<Result<String>> {
        if self.is_settled() {
            return None;
        }

        let outcome = match event {
            WindowEvent::Closed => Some(Err(GoogleAuthError::WindowClosed)),
            WindowEvent::Redirect { new_url, .. } => self.on_redirect(new_url),
            WindowEvent::TitleChanged => parse_title(&title()),
        }?;

        self.state = match outcome {
            Ok(_) => ListenerState::Resolved,
            Err(_) => ListenerState::Rejected,
        };
        Some(outcome)
    }

    fn on_redirect(&self, new_url: &str) -> Option<Result<String>> {
        let url = match Url::parse(new_url) {
            Ok(url) => url,
            Err(e) => {
                debug!("ignoring unparsable redirect: {}", e);
                return None;
            }
        };

        if let Some(target) = &self.redirect_target {
            let same_endpoint = url.scheme() == target.scheme()
                && url.host_str() == target.host_str()
                && url.port_or_known_default() == target.port_or_known_default()
                && url.path() == target.path();
            if !same_endpoint {
                return None;
            }
        }

        let mut code = None;
        let mut error = None;
        let mut description = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Some(Err(GoogleAuthError::Provider(description.unwrap_or(error))));
        }
        code.map(Ok)
    }
}

/// Parse the out-of-band title, e.g. `Success code=4/abc` or `Denied error=access_denied`
fn parse_title(title: &str) -> Option<Result<String>> {
    if title.starts_with("Denied") {
        Some(Err(GoogleAuthError::Provider(title_value(title))))
    } else if title.starts_with("Success") {
        Some(Ok(title_value(title)))
    } else {
        None
    }
}

/// Text after the first `=`, up to the next whitespace
fn title_value(title: &str) -> String {
    title
        .split_once('=')
        .map(|(_, rest)| rest)
        .unwrap_or_default()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}
