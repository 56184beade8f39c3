//! Bounded polling for the post-authorization redirect.

use std::time::Duration;

use tokio::time::{self, Instant};

use crate::driver::PageDriver;
use crate::logging::RunLogger;

/// Result of one polling run. Never an error: a timeout is an outcome, and
/// the authoritative session check happens later regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub succeeded: bool,
    pub final_url: String,
    pub elapsed: Duration,
}

/// Polls the current location until a predicate holds or a deadline elapses.
#[derive(Debug, Clone, Copy)]
pub struct RedirectPoller {
    interval: Duration,
    max_iterations: u32,
}

impl Default for RedirectPoller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_iterations: 30,
        }
    }
}

impl RedirectPoller {
    pub fn new(interval: Duration, max_iterations: u32) -> Self {
        Self {
            interval,
            max_iterations,
        }
    }

    /// Upper bound on how long one polling run can take.
    pub fn deadline(&self) -> Duration {
        self.interval * self.max_iterations
    }

    /// Poll until `is_target` holds for the current URL. Terminates within
    /// `max_iterations * interval`; URL read failures count as a non-match
    /// for that iteration.
    pub async fn wait_until<D, F>(&self, driver: &D, logger: &RunLogger, is_target: F) -> PollOutcome
    where
        D: PageDriver + ?Sized,
        F: Fn(&str) -> bool,
    {
        let started = Instant::now();
        let mut last_url = String::new();

        for iteration in 0..self.max_iterations {
            if let Ok(url) = driver.current_url().await {
                last_url = url;
            }
            if is_target(&last_url) {
                return PollOutcome {
                    succeeded: true,
                    final_url: last_url,
                    elapsed: started.elapsed(),
                };
            }
            if iteration % 5 == 0 {
                let prefix: String = last_url.chars().take(60).collect();
                logger.info(
                    format!("Waiting for redirect... ({iteration}s) - {prefix}"),
                    Some("redirect"),
                );
            }
            time::sleep(self.interval).await;
        }

        PollOutcome {
            succeeded: false,
            final_url: last_url,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, ElementHandle, PageDriver};
    use crate::session::SessionCookie;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Driver whose URL flips to the target after a fixed number of reads.
    struct FlippingDriver {
        reads: Mutex<u32>,
        flip_after: u32,
    }

    impl FlippingDriver {
        fn new(flip_after: u32) -> Self {
            Self {
                reads: Mutex::new(0),
                flip_after,
            }
        }
    }

    #[async_trait]
    impl PageDriver for FlippingDriver {
        async fn goto(&self, _url: &str) -> Result<(), DriverError> {
            Ok(())
        }

        async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<(), DriverError> {
            Ok(())
        }

        async fn current_url(&self) -> Result<String, DriverError> {
            let mut reads = self.reads.lock().unwrap();
            *reads += 1;
            if *reads > self.flip_after {
                Ok("https://console.example.io/dashboard".to_string())
            } else {
                Ok("https://idp.example.com/oauth/authorize".to_string())
            }
        }

        async fn find_visible(
            &self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<Option<ElementHandle>, DriverError> {
            Ok(None)
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

    fn quiet_logger() -> RunLogger {
        RunLogger::with_sink(crate::logging::LogLevel::Debug, std::sync::Arc::new(|_| {}))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_predicate_holds() {
        let driver = FlippingDriver::new(3);
        let poller = RedirectPoller::default();

        let outcome = poller
            .wait_until(&driver, &quiet_logger(), |url| {
                url.contains("console.example.io")
            })
            .await;

        assert!(outcome.succeeded);
        assert!(outcome.final_url.contains("/dashboard"));
        assert!(outcome.elapsed <= poller.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_bound_and_reports_last_url() {
        let driver = FlippingDriver::new(u32::MAX);
        let poller = RedirectPoller::new(Duration::from_secs(1), 30);

        let outcome = poller
            .wait_until(&driver, &quiet_logger(), |url| {
                url.contains("console.example.io")
            })
            .await;

        assert!(!outcome.succeeded);
        assert!(outcome.final_url.contains("idp.example.com"));
        // Termination guarantee: the run never outlives the deadline.
        assert!(outcome.elapsed <= poller.deadline() + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_match_skips_sleeping() {
        let driver = FlippingDriver::new(0);
        let poller = RedirectPoller::default();

        let outcome = poller
            .wait_until(&driver, &quiet_logger(), |url| !url.is_empty())
            .await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.elapsed, Duration::ZERO);
    }
}
