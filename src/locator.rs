//! Selector-fallback resolution of logical UI targets.
//!
//! Every interactive step of the login flow names a logical target ("provider
//! login button", "authorize button") backed by an ordered chain of candidate
//! selectors. The chain is a priority list: candidates are probed strictly in
//! order and the first visible match wins. Exhausting a chain is reported as
//! "not found", never as an error; the orchestrator decides whether that is
//! fatal.

use std::time::Duration;

use crate::driver::{ElementHandle, PageDriver};

/// Ordered candidate selectors for one logical UI target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorChain {
    target: &'static str,
    candidates: Vec<String>,
}

impl SelectorChain {
    pub fn new<I, S>(target: &'static str, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target,
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

/// The fixed chains the login flow relies on.
pub mod chains {
    use super::SelectorChain;

    /// "Continue with provider" control on the console sign-in page.
    pub fn provider_button() -> SelectorChain {
        SelectorChain::new(
            "provider login button",
            [
                r#"button:has-text("GitHub")"#,
                r#"a:has-text("GitHub")"#,
                r#"button:has-text("Continue with GitHub")"#,
                r#"button:has-text("Sign in with GitHub")"#,
                r#"[data-provider="github"]"#,
                r#"button:has(svg[class*="github"])"#,
                r#"a[href*="github"]"#,
            ],
        )
    }

    /// Identity (username) field on the provider login form.
    pub fn identity_field() -> SelectorChain {
        SelectorChain::new("identity field", [r#"input[name="login"]"#])
    }

    /// Secret (password/token) field on the provider login form.
    pub fn secret_field() -> SelectorChain {
        SelectorChain::new("secret field", [r#"input[name="password"]"#])
    }

    /// Submit control of the provider login form.
    pub fn submit_button() -> SelectorChain {
        SelectorChain::new(
            "submit button",
            [r#"input[type="submit"]"#, r#"button[type="submit"]"#],
        )
    }

    /// "Authorize" control on the OAuth consent screen.
    pub fn authorize_button() -> SelectorChain {
        SelectorChain::new(
            "authorize button",
            [
                r#"button[name="authorize"]"#,
                r#"button:has-text("Authorize")"#,
                r#"input[name="authorize"]"#,
                "#js-oauth-authorize-btn",
            ],
        )
    }
}

/// A resolved target: the winning selector and the element it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorMatch {
    pub selector: String,
    pub element: ElementHandle,
}

/// Resolves a [`SelectorChain`] to at most one element.
#[derive(Debug, Clone, Copy)]
pub struct ElementLocator {
    probe_timeout: Duration,
}

impl Default for ElementLocator {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
        }
    }
}

impl ElementLocator {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// Try each candidate strictly in order; return the first visible match.
    ///
    /// Candidates after the match are never probed. A probe failure (engine
    /// hiccup, invalid selector) counts as "no match for this candidate" and
    /// the search continues, mirroring the leniency the flow depends on.
    pub async fn resolve<D>(&self, driver: &D, chain: &SelectorChain) -> Option<LocatorMatch>
    where
        D: PageDriver + ?Sized,
    {
        for selector in chain.candidates() {
            match driver.find_visible(selector, self.probe_timeout).await {
                Ok(Some(element)) => {
                    return Some(LocatorMatch {
                        selector: selector.clone(),
                        element,
                    });
                }
                Ok(None) | Err(_) => continue,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, PageDriver};
    use crate::session::SessionCookie;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Driver that records every probed selector and reports a fixed set of
    /// selectors as visible.
    #[derive(Default)]
    struct ProbeDriver {
        visible: HashSet<String>,
        probed: Mutex<Vec<String>>,
        fail_on: HashSet<String>,
    }

    impl ProbeDriver {
        fn with_visible<const N: usize>(visible: [&str; N]) -> Self {
            Self {
                visible: visible.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn probed(&self) -> Vec<String> {
            self.probed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageDriver for ProbeDriver {
        async fn goto(&self, _url: &str) -> Result<(), DriverError> {
            Ok(())
        }

        async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<(), DriverError> {
            Ok(())
        }

        async fn current_url(&self) -> Result<String, DriverError> {
            Ok(String::new())
        }

        async fn find_visible(
            &self,
            selector: &str,
            _timeout: Duration,
        ) -> Result<Option<ElementHandle>, DriverError> {
            self.probed.lock().unwrap().push(selector.to_string());
            if self.fail_on.contains(selector) {
                return Err(DriverError::Message("probe failed".into()));
            }
            if self.visible.contains(selector) {
                Ok(Some(ElementHandle::new(1)))
            } else {
                Ok(None)
            }
        }

        async fn click(&self, _element: ElementHandle) -> Result<(), DriverError> {
            Ok(())
        }

        async fn fill(&self, _element: ElementHandle, _value: &str) -> Result<(), DriverError> {
            Ok(())
        }

        async fn visible_texts(
            &self,
            _selector: &str,
            _limit: usize,
        ) -> Result<Vec<String>, DriverError> {
            Ok(Vec::new())
        }

        async fn cookies(&self) -> Result<Vec<SessionCookie>, DriverError> {
            Ok(Vec::new())
        }

        async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
            Ok(Vec::new())
        }

        async fn close(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn chain_of(candidates: [&'static str; 4]) -> SelectorChain {
        SelectorChain::new("test target", candidates)
    }

    #[tokio::test]
    async fn stops_at_first_visible_candidate() {
        let driver = ProbeDriver::with_visible(["#b"]);
        let chain = chain_of(["#a", "#b", "#c", "#d"]);

        let found = ElementLocator::default()
            .resolve(&driver, &chain)
            .await
            .expect("match");

        assert_eq!(found.selector, "#b");
        // Candidates after the match are never evaluated.
        assert_eq!(driver.probed(), vec!["#a".to_string(), "#b".to_string()]);
    }

    #[tokio::test]
    async fn exhausted_chain_returns_none() {
        let driver = ProbeDriver::default();
        let chain = chain_of(["#a", "#b", "#c", "#d"]);

        let found = ElementLocator::default().resolve(&driver, &chain).await;

        assert!(found.is_none());
        assert_eq!(driver.probed().len(), 4);
    }

    #[tokio::test]
    async fn probe_failures_fall_through_to_next_candidate() {
        let mut driver = ProbeDriver::with_visible(["#c"]);
        driver.fail_on.insert("#a".to_string());
        let chain = chain_of(["#a", "#b", "#c", "#d"]);

        let found = ElementLocator::default()
            .resolve(&driver, &chain)
            .await
            .expect("match despite earlier probe failure");

        assert_eq!(found.selector, "#c");
    }

    #[test]
    fn default_chains_are_ordered_and_nonempty() {
        for chain in [
            chains::provider_button(),
            chains::identity_field(),
            chains::secret_field(),
            chains::submit_button(),
            chains::authorize_button(),
        ] {
            assert!(!chain.candidates().is_empty(), "{}", chain.target());
        }
        // The most specific provider-button candidate stays first.
        assert_eq!(
            chains::provider_button().candidates()[0],
            r#"button:has-text("GitHub")"#
        );
    }
}
