//! Error types for the gallery-ingest library.
//!
//! Two families of errors exist because two different parties see them:
//!
//! * [`IngestError`]: returned to whoever drives the ingestion pipeline or
//!   the gallery client. Decode, resize and encode failures belong to the
//!   single user action that triggered them and are recovered next to that
//!   action (a retry prompt). Upload and auth failures are rejected
//!   operations that the caller reports as a generic upload problem.
//!
//! * [`StoreError`] and [`AuthError`]: raised by a
//!   [`crate::store::GalleryStore`] and [`crate::auth::AuthManager`], and
//!   mapped to an HTTP status by [`crate::server`].
//!
//! None of these is fatal to the process. The only startup-fatal condition is
//! a missing token secret, reported as [`IngestError::InvalidConfig`] by
//! [`crate::config::ServerConfig::from_env`].

use std::path::Path;
use thiserror::Error;

/// All errors returned by the ingestion pipeline and the gallery client.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The file or rendered image could not be read or decoded.
    #[error("Could not decode image '{source_hint}': {detail}")]
    Decode { source_hint: String, detail: String },

    /// A drawing surface for the downscaler could not be allocated.
    #[error("Could not resize image: {detail}")]
    Resize { detail: String },

    /// Serialising a raster or a data-URL failed.
    #[error("Could not encode image: {detail}")]
    Encode { detail: String },

    // ── Transport errors ──────────────────────────────────────────────────
    /// Network failure, non-success status, or a malformed response body.
    #[error("Upload failed: {detail}")]
    Upload {
        detail: String,
        status: Option<u16>,
    },

    /// The request timed out client-side.
    #[error("Request to '{endpoint}' timed out after {secs}s")]
    Timeout { endpoint: String, secs: u64 },

    /// Missing or rejected credential for an owner-gated operation.
    #[error("Unauthorized: {detail}")]
    Auth { detail: String },

    /// The server does not know the requested gallery or image.
    #[error("Not found: {what}")]
    NotFound { what: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    pub(crate) fn decode(source_hint: impl Into<String>, detail: impl ToString) -> Self {
        IngestError::Decode {
            source_hint: source_hint.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn decode_path(path: &Path, detail: impl ToString) -> Self {
        Self::decode(path.display().to_string(), detail)
    }

    pub(crate) fn upload(detail: impl ToString) -> Self {
        IngestError::Upload {
            detail: detail.to_string(),
            status: None,
        }
    }

    /// True for errors that the user can fix by picking another image or
    /// trying again locally, as opposed to a rejected server operation.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            IngestError::Decode { .. } | IngestError::Resize { .. } | IngestError::Encode { .. }
        )
    }

    /// The message shown to an end user for this error.
    ///
    /// Local failures get a retry prompt; everything that went over the wire
    /// collapses into the generic upload message.
    pub fn user_message(&self) -> &'static str {
        match self {
            IngestError::Decode { .. } => {
                "That file could not be read as an image. Try another one."
            }
            IngestError::Resize { .. } | IngestError::Encode { .. } => {
                "The image could not be processed. Please try again."
            }
            _ => "There was a problem uploading the image.",
        }
    }
}

/// Errors raised by a gallery store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("{0}")]
    Conflict(String),

    #[error("Store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &str, id: &str) -> Self {
        StoreError::NotFound {
            what: format!("{kind} '{id}'"),
        }
    }
}

/// Errors raised while signing users in or checking their tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Unknown e-mail or wrong password; the two are not distinguished.
    #[error("Invalid email or password")]
    BadCredentials,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
