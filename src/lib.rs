//! Unattended delegated-login automation.
//!
//! The crate drives a headless browser through a third-party OAuth sign-in
//! sequence on a target web console, verifies the resulting session, persists
//! the session cookies for reuse, and performs best-effort keepalive visits.
//! The browser engine is consumed through the narrow [`driver::PageDriver`]
//! trait so the orchestration logic can be exercised against scripted fakes.

pub mod chromium;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod keepalive;
pub mod locator;
pub mod logging;
pub mod orchestrator;
pub mod redirect;
pub mod session;

pub use config::{Credentials, RunConfig};
pub use driver::{DriverError, ElementHandle, LaunchOptions, PageDriver};
pub use locator::{ElementLocator, LocatorMatch, SelectorChain};
pub use orchestrator::{LoginError, LoginOrchestrator, Phase, RunSummary, SettleDelays};
pub use redirect::{PollOutcome, RedirectPoller};
pub use session::{SessionArtifact, SessionCookie, SessionExtractor, SessionStore};
