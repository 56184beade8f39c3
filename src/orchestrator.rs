//! The login-orchestration state machine.
//!
//! Drives the browser through the ordered phases of the delegated-login flow,
//! owns every control decision, and maps phase outcomes onto the error
//! taxonomy. Collaborators (locator, poller, extractor, prober) only report
//! outcomes; fatality is decided here and nowhere else.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::time;

use crate::config::RunConfig;
use crate::diagnostics::ScreenshotLog;
use crate::driver::{DriverError, PageDriver};
use crate::keepalive::KeepaliveProber;
use crate::locator::{ElementLocator, LocatorMatch, SelectorChain, chains};
use crate::logging::RunLogger;
use crate::redirect::RedirectPoller;
use crate::session::{SessionExtractor, SessionStore};

const PROVIDER_HOST: &str = "github.com";
const PROVIDER_LOGIN_MARKERS: [&str; 2] = ["github.com/login", "github.com/session"];
const CONSENT_MARKER: &str = "github.com/login/oauth/authorize";
const SECOND_FACTOR_MARKER: &str = "two-factor";
const OTP_SELECTOR: &str = r#"input[name="otp"]"#;

/// Orchestration states. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    OpenSignin,
    AwaitProviderButton,
    ProviderAuthChallenge,
    TwoFactorCheck,
    OAuthAuthorize,
    AwaitTargetRedirect,
    VerifySession,
    Keepalive,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::OpenSignin => "open-signin",
            Phase::AwaitProviderButton => "await-provider-button",
            Phase::ProviderAuthChallenge => "provider-auth-challenge",
            Phase::TwoFactorCheck => "two-factor-check",
            Phase::OAuthAuthorize => "oauth-authorize",
            Phase::AwaitTargetRedirect => "await-target-redirect",
            Phase::VerifySession => "verify-session",
            Phase::Keepalive => "keepalive",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Fatal conditions a run can end in. Everything else degrades gracefully.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("selector chain for '{target}' exhausted; the target UI has changed or is unreachable")]
    ElementChainExhausted { target: &'static str },
    #[error("second-factor challenge detected at {url}")]
    SecondFactorRequired { url: String },
    #[error("still on the sign-in page after the login sequence: {url}")]
    StillOnSignin { url: String },
    #[error(transparent)]
    Engine(#[from] DriverError),
}

/// Named wait primitives, so timing assumptions stay explicit and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    /// Fixed settle after the initial navigation.
    pub post_nav: Duration,
    /// Fixed settle after a click/submit before re-reading page state.
    pub post_action: Duration,
    /// Hard cap on any single network-idle wait.
    pub idle_cap: Duration,
    /// How long the second-factor input probe may look.
    pub otp_probe: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            post_nav: Duration::from_secs(2),
            post_action: Duration::from_secs(3),
            idle_cap: Duration::from_secs(30),
            otp_probe: Duration::from_secs(2),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub final_url: String,
    pub cookies_saved: usize,
    pub keepalive_visits: usize,
}

/// Composes the flow components into the end-to-end login sequence.
pub struct LoginOrchestrator<'cfg> {
    config: &'cfg RunConfig,
    logger: RunLogger,
    locator: ElementLocator,
    poller: RedirectPoller,
    extractor: SessionExtractor,
    store: SessionStore,
    prober: KeepaliveProber,
    shots: ScreenshotLog,
    delays: SettleDelays,
    phase: Phase,
}

impl<'cfg> LoginOrchestrator<'cfg> {
    pub fn new(config: &'cfg RunConfig, logger: RunLogger) -> Self {
        Self {
            locator: ElementLocator::default(),
            poller: RedirectPoller::default(),
            extractor: SessionExtractor::new(config.cookie_domain.clone()),
            store: SessionStore::new(config.cookie_file.clone()),
            prober: KeepaliveProber::for_console(&config.console_url),
            shots: ScreenshotLog::new(config.screenshot_dir.clone(), config.debug),
            delays: SettleDelays::default(),
            phase: Phase::Init,
            config,
            logger,
        }
    }

    pub fn with_poller(mut self, poller: RedirectPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_locator(mut self, locator: ElementLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_delays(mut self, delays: SettleDelays) -> Self {
        self.delays = delays;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the full sequence. On any fatal outcome a final diagnostic
    /// screenshot is captured before the error is returned.
    pub async fn run<D>(&mut self, driver: &D) -> Result<RunSummary, LoginError>
    where
        D: PageDriver + ?Sized,
    {
        let result = self.drive(driver).await;
        if let Err(err) = &result {
            let phase = self.phase;
            self.phase = Phase::Failed;
            self.logger
                .error(format!("Run failed during {phase}: {err}"), Some("fatal"));
            self.checkpoint(driver, "error").await;
        }
        result
    }

    async fn drive<D>(&mut self, driver: &D) -> Result<RunSummary, LoginError>
    where
        D: PageDriver + ?Sized,
    {
        self.enter(Phase::OpenSignin);
        self.logger
            .info("Step 1: Opening console sign-in page", Some("login"));
        driver.goto(&self.config.signin_url()).await?;
        driver.wait_for_network_idle(self.delays.idle_cap).await?;
        time::sleep(self.delays.post_nav).await;
        self.checkpoint(driver, "console_signin").await;

        let url = driver.current_url().await?;
        self.logger.info(format!("Current URL: {url}"), Some("login"));

        if !is_signin_url(&url) {
            self.logger.info(
                "Already authenticated, skipping provider sign-in",
                Some("login"),
            );
            return self.verify_and_keepalive(driver).await;
        }

        self.enter(Phase::AwaitProviderButton);
        self.logger
            .info("Step 2: Clicking provider login button", Some("login"));
        let chain = chains::provider_button();
        match self.locator.resolve(driver, &chain).await {
            Some(found) => {
                driver.click(found.element).await?;
                self.logger.info(
                    format!("Clicked provider login button via '{}'", found.selector),
                    Some("login"),
                );
            }
            None => {
                self.log_visible_controls(driver).await;
                self.checkpoint(driver, "no_provider_button").await;
                return Err(LoginError::ElementChainExhausted {
                    target: chain.target(),
                });
            }
        }
        self.settle(driver).await?;
        self.checkpoint(driver, "after_provider_click").await;

        let url = driver.current_url().await?;
        self.logger.info(format!("Current URL: {url}"), Some("login"));

        if is_provider_login(&url) {
            self.enter(Phase::ProviderAuthChallenge);
            self.provider_auth(driver).await?;
            self.enter(Phase::TwoFactorCheck);
            self.two_factor_check(driver).await?;
        } else {
            self.logger.warn(
                format!("Not on provider login page ({url}); provider session may already be valid"),
                Some("provider"),
            );
        }

        self.enter(Phase::OAuthAuthorize);
        let url = driver.current_url().await?;
        if url.contains(PROVIDER_HOST) {
            self.oauth_authorize(driver, &url).await?;
        }
        self.checkpoint(driver, "after_oauth").await;

        self.enter(Phase::AwaitTargetRedirect);
        self.logger
            .info("Step 5: Waiting for redirect to the console", Some("redirect"));
        let target = self.config.target_domain.clone();
        let outcome = self
            .poller
            .wait_until(driver, &self.logger, |u| {
                u.contains(&target) && !is_signin_url(u)
            })
            .await;
        if outcome.succeeded {
            self.logger.info("Redirected to the console", Some("redirect"));
        } else {
            // Not fatal here; VerifySession performs the authoritative check.
            self.logger.warn(
                format!(
                    "Redirect wait timed out after {}s; deferring to session verification",
                    outcome.elapsed.as_secs()
                ),
                Some("redirect"),
            );
        }
        self.checkpoint(driver, "final_redirect").await;

        self.verify_and_keepalive(driver).await
    }

    async fn provider_auth<D>(&mut self, driver: &D) -> Result<(), LoginError>
    where
        D: PageDriver + ?Sized,
    {
        self.logger
            .info("Step 3: Provider authentication", Some("provider"));
        self.logger.info(
            format!(
                "Signing in as {} (token {})",
                self.config.credentials.identity,
                self.config.credentials.masked_secret()
            ),
            Some("provider"),
        );
        self.checkpoint(driver, "provider_login_page").await;

        let found = self.require(driver, chains::identity_field()).await?;
        driver
            .fill(found.element, &self.config.credentials.identity)
            .await?;
        self.logger.info("Identity entered", Some("provider"));

        let found = self.require(driver, chains::secret_field()).await?;
        driver
            .fill(found.element, self.config.credentials.secret())
            .await?;
        self.logger.info("Token entered as password", Some("provider"));
        self.checkpoint(driver, "provider_credentials_filled").await;

        let found = self.require(driver, chains::submit_button()).await?;
        driver.click(found.element).await?;
        self.logger.info("Login submitted", Some("provider"));

        self.settle(driver).await?;
        self.checkpoint(driver, "provider_after_login").await;
        Ok(())
    }

    async fn two_factor_check<D>(&mut self, driver: &D) -> Result<(), LoginError>
    where
        D: PageDriver + ?Sized,
    {
        let url = driver.current_url().await?;
        let challenged = url.contains(SECOND_FACTOR_MARKER)
            || driver
                .find_visible(OTP_SELECTOR, self.delays.otp_probe)
                .await
                .ok()
                .flatten()
                .is_some();
        if challenged {
            self.logger.error(
                "Second-factor challenge detected; cannot proceed unattended",
                Some("provider"),
            );
            self.checkpoint(driver, "provider_2fa_required").await;
            return Err(LoginError::SecondFactorRequired { url });
        }
        Ok(())
    }

    async fn oauth_authorize<D>(&mut self, driver: &D, url: &str) -> Result<(), LoginError>
    where
        D: PageDriver + ?Sized,
    {
        self.logger
            .info("Step 4: Handling authorization consent", Some("oauth"));
        if url.contains(CONSENT_MARKER) {
            self.checkpoint(driver, "oauth_authorize").await;
            let chain = chains::authorize_button();
            match self.locator.resolve(driver, &chain).await {
                Some(found) => {
                    driver.click(found.element).await?;
                    self.logger.info(
                        format!("Clicked authorize button via '{}'", found.selector),
                        Some("oauth"),
                    );
                }
                None => {
                    // Providers skip the consent screen for previously-authorized apps.
                    self.logger.warn(
                        "No authorize control found (assuming already authorized)",
                        Some("oauth"),
                    );
                }
            }
        }
        self.settle(driver).await?;
        Ok(())
    }

    async fn verify_and_keepalive<D>(&mut self, driver: &D) -> Result<RunSummary, LoginError>
    where
        D: PageDriver + ?Sized,
    {
        self.enter(Phase::VerifySession);
        self.logger.info("Step 6: Verifying session", Some("verify"));

        let url = driver.current_url().await?;
        self.logger.info(format!("Final URL: {url}"), Some("verify"));
        if is_signin_url(&url) {
            self.checkpoint(driver, "login_failed").await;
            return Err(LoginError::StillOnSignin { url });
        }

        let artifact = self.extractor.extract(driver).await?;
        let cookies_saved = if artifact.is_empty() {
            self.logger.warn(
                "No cookies matched the target domain; nothing persisted",
                Some("verify"),
            );
            0
        } else {
            match self.store.persist(&artifact).await {
                Ok(()) => {
                    self.logger.info(
                        format!(
                            "Saved {} session cookies to {}",
                            artifact.len(),
                            self.store.path().display()
                        ),
                        Some("verify"),
                    );
                    artifact.len()
                }
                Err(err) => {
                    self.logger.warn(
                        format!("Could not persist session artifact: {err}"),
                        Some("verify"),
                    );
                    0
                }
            }
        };

        self.enter(Phase::Keepalive);
        self.logger
            .info("Visiting pages to keep the session active", Some("keepalive"));
        let keepalive_visits = self.prober.run(driver, &self.logger).await;
        self.checkpoint(driver, "keepalive_done").await;

        self.enter(Phase::Done);
        self.logger.info("Login run complete", Some("login"));
        Ok(RunSummary {
            final_url: url,
            cookies_saved,
            keepalive_visits,
        })
    }

    /// Resolve a chain that the flow cannot continue without.
    async fn require<D>(
        &self,
        driver: &D,
        chain: SelectorChain,
    ) -> Result<LocatorMatch, LoginError>
    where
        D: PageDriver + ?Sized,
    {
        self.locator
            .resolve(driver, &chain)
            .await
            .ok_or(LoginError::ElementChainExhausted {
                target: chain.target(),
            })
    }

    async fn settle<D>(&self, driver: &D) -> Result<(), DriverError>
    where
        D: PageDriver + ?Sized,
    {
        time::sleep(self.delays.post_action).await;
        driver.wait_for_network_idle(self.delays.idle_cap).await
    }

    async fn checkpoint<D>(&mut self, driver: &D, name: &str)
    where
        D: PageDriver + ?Sized,
    {
        let logger = self.logger.clone();
        self.shots.capture(driver, &logger, name).await;
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.logger.debug(format!("Phase: {phase}"), Some("phase"));
    }

    /// Debugging aid when the provider button cannot be found: list what the
    /// page actually offers.
    async fn log_visible_controls<D>(&self, driver: &D)
    where
        D: PageDriver + ?Sized,
    {
        if let Ok(texts) = driver.visible_texts("button, a", 10).await {
            if !texts.is_empty() {
                self.logger.warn("Available controls on page:", Some("login"));
                for text in texts {
                    self.logger.warn(format!("  - {text}"), Some("login"));
                }
            }
        }
    }
}

fn is_signin_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("signin") || lower.contains("login")
}

fn is_provider_login(url: &str) -> bool {
    // The consent URL sits under the provider's login path but is handled by
    // its own phase, not the credential form.
    !url.contains(CONSENT_MARKER) && PROVIDER_LOGIN_MARKERS.iter().any(|m| url.contains(m))
}
