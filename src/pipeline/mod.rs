//! Pipeline stages for image ingestion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the transport can be swapped without touching the
//! image code.
//!
//! ## Data Flow
//!
//! ```text
//! decode ──▶ downscale ──▶ encode ──▶ upload
//! (PNG/JPEG)  (0.9 steps)   (data-URL)  (Transport)
//! ```
//!
//! 1. [`decode`]: sniff and decode file bytes or a rendered data-URL into a
//!    [`crate::model::RasterImage`], with a pixel ceiling checked up front
//! 2. [`downscale`]: shrink rasters above `800 × 400` px of area in 0.9 steps,
//!    then compose them at a fixed 800 px width
//! 3. [`encode`]: PNG data-URLs and the URL-safe transcoding used on the wire
//! 4. [`upload`]: the only stage with network I/O; no retries

pub mod decode;
pub mod downscale;
pub mod encode;
pub mod upload;
