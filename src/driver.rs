//! The narrow interface the login flow consumes the browser engine through.
//!
//! The orchestrator and its collaborators only ever talk to a [`PageDriver`].
//! Process launch, DOM queries, network-idle detection, and screenshot capture
//! all live behind this trait, so the control logic can be exercised against
//! scripted fakes and the engine swapped without touching the state machine.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::SessionCookie;

/// Error surfaced by driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser engine error: {0}")]
    Message(String),
    #[error("stale element handle")]
    StaleElement,
}

/// Opaque reference to an element resolved by the engine.
///
/// The id is meaningful only to the driver that issued it; the flow holds a
/// handle for the duration of one action and never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Viewport dimensions for the launched browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1920,
            height: 1080,
        }
    }
}

/// Launch parameters for the local browser.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: String,
    pub args: Vec<String>,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        LaunchOptions {
            headless: true,
            viewport: Viewport::default(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
                .to_string(),
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-setuid-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_executable: None,
        }
    }
}

/// Blocking, strictly-sequential browser operations with explicit timeouts.
///
/// Implementations never terminate the process; they report outcomes and let
/// the orchestrator decide fatality.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate the page to `url`.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// Wait until in-flight network activity quiets down, up to `timeout`.
    /// Returning after the timeout is not an error.
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<(), DriverError>;

    /// The page's current location.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Resolve `selector` to a visible element, polling up to `timeout`.
    /// `None` means nothing visible matched; the search mutates no page state.
    async fn find_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError>;

    /// Click the previously-resolved element. Consumes the handle.
    async fn click(&self, element: ElementHandle) -> Result<(), DriverError>;

    /// Focus the previously-resolved element and type `value` into it.
    /// Consumes the handle.
    async fn fill(&self, element: ElementHandle, value: &str) -> Result<(), DriverError>;

    /// Trimmed inner text of up to `limit` elements matching `selector`.
    /// Used for diagnostics only.
    async fn visible_texts(&self, selector: &str, limit: usize)
    -> Result<Vec<String>, DriverError>;

    /// The full cookie jar of the browser context.
    async fn cookies(&self) -> Result<Vec<SessionCookie>, DriverError>;

    /// PNG screenshot of the current page.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Release the browser process. Must be safe to call on failure paths.
    async fn close(&self) -> Result<(), DriverError>;
}
