//! Run configuration for the login keeper.
//!
//! Everything the run needs is resolved once at startup, from environment
//! variables (with optional `.env` support), into an immutable [`RunConfig`]
//! that is passed by reference into the orchestrator. Ambient state is never
//! re-read mid-run.

use std::env;
use std::fmt;
use std::path::PathBuf;

use dotenvy::dotenv;
use thiserror::Error;

/// Default console the login flow targets.
pub const DEFAULT_CONSOLE_URL: &str = "https://eu-central-1.run.claw.cloud";
/// Domain marker used to detect the post-login redirect.
pub const DEFAULT_TARGET_DOMAIN: &str = "claw.cloud";
/// Substring a cookie domain must contain to be persisted.
pub const DEFAULT_COOKIE_DOMAIN: &str = "claw";
/// Default location of the persisted cookie artifact.
pub const DEFAULT_COOKIE_FILE: &str = "cookies.json";

/// Identity-provider credentials, loaded once and read-only thereafter.
///
/// The secret is a personal access token submitted in place of a password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    secret: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Masked rendering safe for log lines: `**********...abcd`.
    pub fn masked_secret(&self) -> String {
        let chars: Vec<char> = self.secret.chars().collect();
        let suffix: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("{}...{}", "*".repeat(10), suffix)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &self.masked_secret())
            .finish()
    }
}

/// Immutable configuration for a single login run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub credentials: Credentials,
    /// Base URL of the target console.
    pub console_url: String,
    /// Domain substring that identifies the console in a redirect URL.
    pub target_domain: String,
    /// Substring a cookie's domain must contain to be retained.
    pub cookie_domain: String,
    /// Path the session artifact is written to.
    pub cookie_file: PathBuf,
    /// Directory for numbered checkpoint screenshots.
    pub screenshot_dir: PathBuf,
    /// Emit per-screenshot debug lines and verbose logging.
    pub debug: bool,
    /// Run the browser without a visible window.
    pub headless: bool,
    /// Explicit Chrome/Chromium binary, if the default discovery is not wanted.
    pub chrome_executable: Option<PathBuf>,
}

impl RunConfig {
    /// Read the configuration from the environment, after loading a `.env`
    /// file if one is present. Missing credentials fail here, before any
    /// browser is launched.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();

        let identity = required_var("GH_USERNAME")?;
        let secret = required_var("GH_PAT")?;

        let console_url = env_var("CONSOLE_URL")
            .unwrap_or_else(|| DEFAULT_CONSOLE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let target_domain =
            env_var("CONSOLE_DOMAIN").unwrap_or_else(|| DEFAULT_TARGET_DOMAIN.to_string());
        let cookie_domain =
            env_var("COOKIE_DOMAIN").unwrap_or_else(|| DEFAULT_COOKIE_DOMAIN.to_string());
        let cookie_file = env_var("COOKIE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COOKIE_FILE));
        let screenshot_dir = env_var("SCREENSHOT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let debug = match env_var("DEBUG_MODE") {
            Some(value) => parse_bool("DEBUG_MODE", &value)?,
            None => false,
        };
        let headless = match env_var("AUTOLOGIN_HEADLESS") {
            Some(value) => parse_bool("AUTOLOGIN_HEADLESS", &value)?,
            None => true,
        };
        let chrome_executable = env_var("CHROME_BIN").map(PathBuf::from);

        Ok(RunConfig {
            credentials: Credentials::new(identity, secret),
            console_url,
            target_domain,
            cookie_domain,
            cookie_file,
            screenshot_dir,
            debug,
            headless,
            chrome_executable,
        })
    }

    /// Full sign-in URL of the console.
    pub fn signin_url(&self) -> String {
        format!("{}/signin", self.console_url)
    }
}

/// Errors that can arise while constructing a [`RunConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not set")]
    MissingVar { var: &'static str },
    #[error("invalid boolean '{value}' for {var}")]
    InvalidBool { var: &'static str, value: String },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required_var(var: &'static str) -> Result<String, ConfigError> {
    env_var(var).ok_or(ConfigError::MissingVar { var })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(vars: &[(&str, Option<&str>)]) -> Self {
            let saved = vars
                .iter()
                .map(|(key, value)| {
                    let original = env::var(key).ok();
                    match value {
                        Some(v) => unsafe {
                            env::set_var(key, v);
                        },
                        None => unsafe {
                            env::remove_var(key);
                        },
                    };
                    ((*key).to_string(), original)
                })
                .collect();
            EnvGuard { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => unsafe {
                        env::set_var(&key, v);
                    },
                    None => unsafe {
                        env::remove_var(&key);
                    },
                }
            }
        }
    }

    fn with_env<F, T>(vars: &[(&str, Option<&str>)], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let lock = env_lock().lock().expect("env mutex poisoned");
        let guard = EnvGuard::new(vars);
        let result = f();
        drop(guard);
        drop(lock);
        result
    }

    const BASE: &[(&str, Option<&str>)] = &[
        ("GH_USERNAME", Some("octocat")),
        ("GH_PAT", Some("ghp_sometokenvalue1234")),
        ("DEBUG_MODE", None),
        ("AUTOLOGIN_HEADLESS", None),
        ("CONSOLE_URL", None),
        ("CONSOLE_DOMAIN", None),
        ("COOKIE_DOMAIN", None),
        ("COOKIE_FILE", None),
        ("SCREENSHOT_DIR", None),
        ("CHROME_BIN", None),
    ];

    #[test]
    fn defaults_resolve_without_optional_vars() {
        with_env(BASE, || {
            let config = RunConfig::from_env().expect("config");
            assert_eq!(config.credentials.identity, "octocat");
            assert_eq!(config.console_url, DEFAULT_CONSOLE_URL);
            assert_eq!(config.target_domain, DEFAULT_TARGET_DOMAIN);
            assert_eq!(config.cookie_domain, DEFAULT_COOKIE_DOMAIN);
            assert_eq!(config.cookie_file, PathBuf::from("cookies.json"));
            assert!(config.headless);
            assert!(!config.debug);
            assert_eq!(config.signin_url(), format!("{DEFAULT_CONSOLE_URL}/signin"));
        });
    }

    #[test]
    fn missing_identity_is_reported() {
        let mut vars = BASE.to_vec();
        vars[0] = ("GH_USERNAME", None);
        with_env(&vars, || {
            let err = RunConfig::from_env().expect_err("should fail");
            assert!(matches!(err, ConfigError::MissingVar { var: "GH_USERNAME" }));
        });
    }

    #[test]
    fn missing_secret_is_reported() {
        let mut vars = BASE.to_vec();
        vars[1] = ("GH_PAT", None);
        with_env(&vars, || {
            let err = RunConfig::from_env().expect_err("should fail");
            assert!(matches!(err, ConfigError::MissingVar { var: "GH_PAT" }));
        });
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let mut vars = BASE.to_vec();
        vars[1] = ("GH_PAT", Some("   "));
        with_env(&vars, || {
            assert!(RunConfig::from_env().is_err());
        });
    }

    #[test]
    fn overrides_and_booleans_parse() {
        let mut vars = BASE.to_vec();
        vars.extend_from_slice(&[
            ("CONSOLE_URL", Some("https://console.example.io/")),
            ("CONSOLE_DOMAIN", Some("example.io")),
            ("COOKIE_DOMAIN", Some("example")),
            ("COOKIE_FILE", Some("/tmp/session.json")),
            ("DEBUG_MODE", Some("true")),
            ("AUTOLOGIN_HEADLESS", Some("off")),
        ]);
        with_env(&vars, || {
            let config = RunConfig::from_env().expect("config");
            assert_eq!(config.console_url, "https://console.example.io");
            assert_eq!(config.signin_url(), "https://console.example.io/signin");
            assert_eq!(config.target_domain, "example.io");
            assert_eq!(config.cookie_domain, "example");
            assert_eq!(config.cookie_file, PathBuf::from("/tmp/session.json"));
            assert!(config.debug);
            assert!(!config.headless);
        });
    }

    #[test]
    fn invalid_boolean_is_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("DEBUG_MODE", Some("maybe")));
        with_env(&vars, || {
            let err = RunConfig::from_env().expect_err("should fail");
            assert!(matches!(
                err,
                ConfigError::InvalidBool {
                    var: "DEBUG_MODE",
                    ..
                }
            ));
        });
    }

    #[test]
    fn secret_never_appears_in_debug_output() {
        let creds = Credentials::new("octocat", "ghp_secretvalue9876");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("ghp_secretvalue9876"));
        assert!(rendered.contains("**********...9876"));
    }
}
