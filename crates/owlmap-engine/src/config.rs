//! Configuration for the engine and the HTTP backend.

use crate::types::BoundingBox;
use serde::{Deserialize, Serialize};
use url::Url;

/// Engine behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Viewport used when the caller has no bounds of its own (Great Britain).
    pub default_bounds: BoundingBox,
    /// Fetch knowledge records for orphaned geographic objects after each
    /// load cycle.
    pub resolve_missing: bool,
    /// Zoom level a search hit is opened at.
    pub detail_zoom: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_bounds: BoundingBox::new(-10.5, 49.85, 1.9, 58.75),
            resolve_missing: true,
            detail_zoom: 15,
        }
    }
}

/// Where and how to reach the map service.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub base_url: Url,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl BackendConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            user_agent: None,
        })
    }

    /// Load from `OWLMAP_BASE_URL`, `OWLMAP_TIMEOUT_SECS` and
    /// `OWLMAP_USER_AGENT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            std::env::var("OWLMAP_BASE_URL").map_err(|_| ConfigError::MissingBaseUrl)?;
        let mut config = Self::new(&base_url)?;

        if let Ok(timeout) = std::env::var("OWLMAP_TIMEOUT_SECS") {
            let secs = timeout
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("OWLMAP_TIMEOUT_SECS={timeout}")))?;
            config = config.with_timeout_secs(secs);
        }
        if let Ok(agent) = std::env::var("OWLMAP_USER_AGENT") {
            config = config.with_user_agent(&agent);
        }
        Ok(config)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_user_agent(mut self, agent: &str) -> Self {
        self.user_agent = Some(agent.to_string());
        self
    }

    /// Resolve an API path such as `api/1/items` against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ConfigError::Invalid(format!("{path}: {e}")))
    }
}

/// Base URLs are joined against, so they must end in `/`.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    let url = Url::parse(&raw).map_err(|e| ConfigError::Invalid(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid(format!("unsupported scheme {other}"))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No map backend configured. Set OWLMAP_BASE_URL")]
    MissingBaseUrl,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
