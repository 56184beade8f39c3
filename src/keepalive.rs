//! Best-effort post-login keepalive visits.
//!
//! Each target is visited in order with its own timeout; individual failures
//! are logged and never escalate. The run's exit status does not depend on
//! anything that happens here.

use std::time::Duration;

use tokio::time;

use crate::driver::PageDriver;
use crate::logging::RunLogger;

/// One keepalive destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveTarget {
    pub url: String,
    pub label: &'static str,
}

/// Sequentially visits a fixed list of URLs to keep the session marked active.
#[derive(Debug, Clone)]
pub struct KeepaliveProber {
    targets: Vec<KeepaliveTarget>,
    idle_timeout: Duration,
    dwell: Duration,
}

impl KeepaliveProber {
    pub fn new(targets: Vec<KeepaliveTarget>, idle_timeout: Duration, dwell: Duration) -> Self {
        Self {
            targets,
            idle_timeout,
            dwell,
        }
    }

    /// The standard visit list for a console base URL.
    pub fn for_console(console_url: &str) -> Self {
        let base = console_url.trim_end_matches('/');
        Self::new(
            vec![
                KeepaliveTarget {
                    url: format!("{base}/"),
                    label: "Dashboard",
                },
                KeepaliveTarget {
                    url: format!("{base}/apps"),
                    label: "Apps",
                },
            ],
            Duration::from_secs(15),
            Duration::from_secs(2),
        )
    }

    pub fn targets(&self) -> &[KeepaliveTarget] {
        &self.targets
    }

    /// Visit every target in order. Returns how many visits completed; the
    /// caller's outcome never depends on the count.
    pub async fn run<D>(&self, driver: &D, logger: &RunLogger) -> usize
    where
        D: PageDriver + ?Sized,
    {
        let mut visited = 0;
        for target in &self.targets {
            match driver.goto(&target.url).await {
                Ok(()) => {
                    if let Err(err) = driver.wait_for_network_idle(self.idle_timeout).await {
                        logger.warn(
                            format!("{} loaded but did not settle: {err}", target.label),
                            Some("keepalive"),
                        );
                    }
                    logger.info(format!("Visited {}", target.label), Some("keepalive"));
                    visited += 1;
                    time::sleep(self.dwell).await;
                }
                Err(err) => {
                    logger.warn(
                        format!("Could not visit {}: {err}", target.label),
                        Some("keepalive"),
                    );
                }
            }
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, ElementHandle, PageDriver};
    use crate::logging::{LogLevel, LogRecord, RunLogger};
    use crate::session::SessionCookie;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Driver that rejects navigation to configured URLs.
    #[derive(Default)]
    struct VisitDriver {
        reject: Vec<String>,
        visited: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageDriver for VisitDriver {
        async fn goto(&self, url: &str) -> Result<(), DriverError> {
            if self.reject.iter().any(|r| url.contains(r.as_str())) {
                return Err(DriverError::Message("navigation refused".into()));
            }
            self.visited.lock().unwrap().push(url.to_string());
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

    fn capture_logger() -> (RunLogger, Arc<Mutex<Vec<LogRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&records);
        let logger = RunLogger::with_sink(
            LogLevel::Debug,
            Arc::new(move |record: &LogRecord| {
                capture.lock().unwrap().push(record.clone());
            }),
        );
        (logger, records)
    }

    #[test]
    fn console_targets_cover_dashboard_and_apps() {
        let prober = KeepaliveProber::for_console("https://console.example.io/");
        let urls: Vec<&str> = prober.targets().iter().map(|t| t.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://console.example.io/",
                "https://console.example.io/apps"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn visits_every_target_in_order() {
        let driver = VisitDriver::default();
        let (logger, _) = capture_logger();
        let prober = KeepaliveProber::for_console("https://console.example.io");

        let visited = prober.run(&driver, &logger).await;

        assert_eq!(visited, 2);
        assert_eq!(
            driver.visited.lock().unwrap().as_slice(),
            &[
                "https://console.example.io/".to_string(),
                "https://console.example.io/apps".to_string()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_logged_and_do_not_stop_the_sweep() {
        let driver = VisitDriver {
            reject: vec!["/apps".to_string()],
            ..Default::default()
        };
        let (logger, records) = capture_logger();
        let prober = KeepaliveProber::for_console("https://console.example.io");

        let visited = prober.run(&driver, &logger).await;

        assert_eq!(visited, 1);
        let warned = records
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.level == LogLevel::Warn && r.message.contains("Apps"));
        assert!(warned, "expected a warning for the rejected visit");
    }
}
