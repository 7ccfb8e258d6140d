//! Contract between the auth flow and the host application's windowing toolkit.
//!
//! The crate never renders anything itself. An application embeds its own
//! webview (wry, tauri, a native control...) and implements [`WindowProvider`]
//! so the flow can open a window, load the consent page and observe it.

use tokio::sync::mpsc;

use crate::Result;

/// Events a window reports while the consent page is shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    /// The window was closed, by the user or the toolkit
    Closed,
    /// The page issued a navigation redirect
    Redirect { old_url: String, new_url: String },
    /// The document title changed; read it with [`AuthWindow::title`]
    TitleChanged,
}

/// Receiving end of a window's event stream
///
/// Dropping it detaches every listener; the provider should treat a failed
/// send as "nobody is listening anymore".
pub type WindowEvents = mpsc::UnboundedReceiver<WindowEvent>;

/// A single toolkit window hosting the consent page
pub trait AuthWindow: Send {
    /// Navigate the window to `url`
    fn load_url(&mut self, url: &str) -> Result<()>;

    /// Current document title
    fn title(&self) -> String;

    /// Close the window
    fn close(&mut self);
}

/// Factory for auth windows
pub trait WindowProvider: Send + Sync {
    type Window: AuthWindow;

    /// Open a new window and return it with its event stream
    fn open(&self, options: &WindowOptions) -> Result<(Self::Window, WindowEvents)>;
}

/// Options handed to the window provider when opening a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOptions {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub always_on_top: bool,
    pub auto_hide_menu_bar: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Sign in with Google".to_string(),
            always_on_top: true,
            auto_hide_menu_bar: true,
        }
    }
}
