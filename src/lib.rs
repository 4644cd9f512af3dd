//! # gallery-ingest
//!
//! Image ingestion for a multi-user drawing gallery: pick or mark up an
//! image, shrink it to a sane footprint, encode it, and store it in a
//! gallery over HTTP.
//!
//! ## Why iterative downscaling?
//!
//! Phone photos arrive at 4000 px and more. A single bilinear reduction to
//! 800 px samples only a fraction of the source and aliases badly, so
//! oversized images are shrunk by 10 % per step and composed once at the
//! target width. The step arithmetic is fixed so output sizes are
//! reproducible.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file / bytes / rendered image
//!  │
//!  ├─ 1. Decode     PNG or JPEG → RasterImage (spawn_blocking)
//!  ├─ 2. Downscale  only when width × height > 320 000
//!  ├─ 3. Encode     data-URL, URL-safe for create_image
//!  └─ 4. Upload     POST /api/image via a Transport
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gallery_ingest::{ingest, GalleryClient, IngestConfig, UploadSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::builder()
//!         .api_base_url("http://localhost:3000")
//!         .build()?;
//!     let mut client = GalleryClient::from_config(&config)?;
//!     client.sign_in("ann@example.com", "secret").await?;
//!
//!     let image = ingest(
//!         &client,
//!         UploadSource::File("holiday.jpg".into()),
//!         "gallery-id",
//!         &config,
//!     )
//!     .await?;
//!     println!("stored {}", image.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `gallery-ingest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! The reference API server lives in [`server`] and is always built; the
//! end-to-end tests run the client against it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{GalleryClient, GalleryStream};
pub use config::{IngestConfig, IngestConfigBuilder, ServerConfig};
pub use error::{AuthError, IngestError, StoreError};
pub use ingest::{
    compress, create_gallery_from_file, ingest, prepare, upload, PreparedUpload, UploadSource,
};
pub use model::{
    AuthSession, Dimensions, EncodedImage, Gallery, GalleryImage, RasterImage, SourceFormat,
    UploadResult, User, WorkingRaster,
};
pub use pipeline::downscale::{DownscalePlan, Downscaled};
pub use pipeline::upload::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
pub use session::GallerySession;
pub use store::{GalleryStore, InMemoryGalleryStore};
