//! Session-cookie extraction and persistence.
//!
//! After a verified login the browser's cookie jar is filtered down to the
//! target domain and written out as a JSON array, atomically, so a crashed
//! run never leaves a truncated artifact behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::driver::{DriverError, PageDriver};

/// One cookie of the authenticated session, in the artifact's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Seconds since the epoch; absent for session-scoped cookies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    pub http_only: bool,
    pub secure: bool,
}

/// The ordered, domain-filtered cookie set of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionArtifact {
    pub cookies: Vec<SessionCookie>,
}

impl SessionArtifact {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }
}

/// Errors raised while persisting an artifact.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to write session artifact to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize session artifact: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}

/// Filters the browser's cookie jar down to the target domain.
#[derive(Debug, Clone)]
pub struct SessionExtractor {
    domain_filter: String,
}

impl SessionExtractor {
    pub fn new(domain_filter: impl Into<String>) -> Self {
        Self {
            domain_filter: domain_filter.into(),
        }
    }

    /// Retain only cookies whose domain contains the configured substring,
    /// preserving jar order.
    pub fn filter(&self, jar: Vec<SessionCookie>) -> SessionArtifact {
        let cookies = jar
            .into_iter()
            .filter(|cookie| cookie.domain.contains(&self.domain_filter))
            .collect();
        SessionArtifact { cookies }
    }

    /// Read the full jar from the driver and filter it. An empty result is a
    /// signal for the caller to log, not an error.
    pub async fn extract<D>(&self, driver: &D) -> Result<SessionArtifact, DriverError>
    where
        D: PageDriver + ?Sized,
    {
        let jar = driver.cookies().await?;
        Ok(self.filter(jar))
    }
}

/// Persists artifacts with a write-then-rename so readers never observe a
/// partial file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn persist(&self, artifact: &SessionArtifact) -> Result<(), SessionError> {
        let payload = serde_json::to_vec_pretty(artifact)
            .map_err(|source| SessionError::Serialize { source })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &payload)
            .await
            .map_err(|source| SessionError::Io {
                path: tmp.clone(),
                source,
            })?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| SessionError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }
}
