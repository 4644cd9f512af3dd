//! Configuration types for the ingestion pipeline and the reference server.
//!
//! Client-side behaviour is controlled through [`IngestConfig`], built via
//! [`IngestConfigBuilder`]. Server-side settings live in [`ServerConfig`],
//! which is normally read from the environment at boot.
//!
//! The downscale constants default to the values every gallery client has
//! always used (`800 × 400` footprint, `0.9` shrink per step). Changing them
//! changes the output dimensions of every oversized upload, so they are
//! configurable for tests and tooling rather than per request.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Width every oversized image is normalised to.
pub const TARGET_WIDTH: u32 = 800;
/// Height that, together with [`TARGET_WIDTH`], defines the size budget.
pub const MAX_HEIGHT: u32 = 400;
/// Pixel area above which the downscaler kicks in.
pub const MAX_FILE_SIZE: u64 = TARGET_WIDTH as u64 * MAX_HEIGHT as u64;
/// Shrink factor applied at every downscale step.
pub const RESIZE_BY: f64 = 0.9;

/// Environment variable holding the access-token signing secret.
pub const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
/// Environment variable holding the refresh-token signing secret.
pub const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";

/// Configuration for the ingestion pipeline and the gallery client.
///
/// # Example
/// ```rust
/// use gallery_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .api_base_url("http://localhost:3000")
///     .request_timeout_secs(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.target_width, 800);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Final width of a downscaled image. Default: 800.
    pub target_width: u32,

    /// Height paired with `target_width` for the size budget. Default: 400.
    pub max_height: u32,

    /// Per-step shrink factor, in `(0, 1)`. Default: 0.9.
    ///
    /// Shrinking in small steps keeps fine detail that a single large
    /// bilinear reduction would alias away.
    pub resize_by: f64,

    /// Largest pixel count the decoder will fully decode. Default: 50 MP.
    ///
    /// Checked from the image header before allocating, so a hostile file
    /// that claims to be 100 000 × 100 000 px fails fast.
    pub max_decoded_pixels: u64,

    /// Base URL of the gallery API, e.g. `http://localhost:3000`.
    pub api_base_url: String,

    /// Bearer token attached to mutations. `None` for anonymous calls.
    pub token: Option<String>,

    /// Per-request timeout in seconds. Default: 30.
    ///
    /// An upload cannot be aborted once sent, so every request carries a
    /// deadline instead of hanging on a stalled connection.
    pub request_timeout_secs: u64,

    /// Interval between gallery re-fetches while watching. Default: 1000 ms.
    pub poll_interval_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            target_width: TARGET_WIDTH,
            max_height: MAX_HEIGHT,
            resize_by: RESIZE_BY,
            max_decoded_pixels: 50_000_000,
            api_base_url: "http://localhost:3000".to_string(),
            token: None,
            request_timeout_secs: 30,
            poll_interval_ms: 1000,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("target_width", &self.target_width)
            .field("max_height", &self.max_height)
            .field("resize_by", &self.resize_by)
            .field("max_decoded_pixels", &self.max_decoded_pixels)
            .field("api_base_url", &self.api_base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    /// Pixel area above which an image is downscaled.
    pub fn max_file_size(&self) -> u64 {
        self.target_width as u64 * self.max_height as u64
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn target_width(mut self, px: u32) -> Self {
        self.config.target_width = px.max(1);
        self
    }

    pub fn max_height(mut self, px: u32) -> Self {
        self.config.max_height = px.max(1);
        self
    }

    pub fn resize_by(mut self, factor: f64) -> Self {
        self.config.resize_by = factor;
        self
    }

    pub fn max_decoded_pixels(mut self, px: u64) -> Self {
        self.config.max_decoded_pixels = px;
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.config.api_base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if !(c.resize_by > 0.0 && c.resize_by < 1.0) {
            return Err(IngestError::InvalidConfig(format!(
                "resize_by must be in (0, 1), got {}",
                c.resize_by
            )));
        }
        if c.max_decoded_pixels < c.max_file_size() {
            return Err(IngestError::InvalidConfig(format!(
                "max_decoded_pixels ({}) is below the downscale budget ({})",
                c.max_decoded_pixels,
                c.max_file_size()
            )));
        }
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(IngestError::InvalidConfig(format!(
                "api_base_url must be an HTTP/HTTPS URL, got '{}'",
                c.api_base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Server ───────────────────────────────────────────────────────────────

/// Configuration for the reference gallery server.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to. Default: `127.0.0.1:3000`.
    pub bind: SocketAddr,

    /// HS256 secret for access tokens.
    pub access_secret: String,

    /// HS256 secret for refresh tokens.
    pub refresh_secret: String,

    /// Access-token lifetime. Default: 3 hours.
    pub access_ttl_secs: u64,

    /// Refresh-token lifetime. Default: 7 days.
    pub refresh_ttl_secs: u64,

    /// Largest accepted request body. Default: 16 MiB.
    ///
    /// Images travel base64-encoded inside JSON, so this is roughly 4/3 of
    /// the largest raw image the server accepts.
    pub max_body_bytes: usize,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl ServerConfig {
    pub const DEFAULT_ACCESS_TTL_SECS: u64 = 3 * 60 * 60;
    pub const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 60 * 60;

    /// Build a config from explicit secrets with default everything else.
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
    ) -> Result<Self, IngestError> {
        let access_secret = access_secret.into();
        let refresh_secret = refresh_secret.into();
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(IngestError::InvalidConfig(
                "token secrets must not be empty".into(),
            ));
        }
        Ok(Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            access_secret,
            refresh_secret,
            access_ttl_secs: Self::DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: Self::DEFAULT_REFRESH_TTL_SECS,
            max_body_bytes: 16 * 1024 * 1024,
        })
    }

    /// Read both token secrets from the environment.
    ///
    /// A missing secret is a startup-fatal configuration error: the server
    /// must not come up able to mint tokens nobody can verify.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IngestError> {
        let access = lookup(ACCESS_SECRET_ENV).filter(|s| !s.is_empty());
        let refresh = lookup(REFRESH_SECRET_ENV).filter(|s| !s.is_empty());
        match (access, refresh) {
            (Some(access), Some(refresh)) => Self::new(access, refresh),
            (access, _) => {
                let missing = if access.is_none() {
                    ACCESS_SECRET_ENV
                } else {
                    REFRESH_SECRET_ENV
                };
                Err(IngestError::InvalidConfig(format!(
                    "{missing} is not set; both {ACCESS_SECRET_ENV} and {REFRESH_SECRET_ENV} are required"
                )))
            }
        }
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind = addr;
        self
    }

    pub fn access_ttl_secs(mut self, secs: u64) -> Self {
        self.access_ttl_secs = secs;
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}
