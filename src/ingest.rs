//! End-to-end ingestion: source → decode → downscale → encode → upload.
//!
//! ```text
//!  UploadSource::File ──▶ decode_file  ─┐
//!  UploadSource::Bytes ─▶ decode_bytes ─┼─▶ compress ─▶ PreparedUpload ─▶ upload / create_image
//!  UploadSource::Rendered ─▶ reencode_rendered (natural size) ─────────┘
//! ```
//!
//! Exactly one source feeds an upload. A rendered (annotated) image is
//! re-encoded at its natural pixel size and never downscaled again; file
//! sources go through the size check and, when oversized, the iterative
//! downscaler.

use crate::client::GalleryClient;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::{
    Dimensions, EncodedImage, Gallery, GalleryImage, RasterImage, UploadResult, WorkingRaster,
};
use crate::pipeline::downscale::{self, DownscalePlan};
use crate::pipeline::upload::Transport;
use crate::pipeline::{decode, encode};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where an upload's pixels come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// A picked file on disk.
    File(PathBuf),
    /// File contents already in memory; `name` is used in error messages.
    Bytes { name: String, bytes: Vec<u8> },
    /// The image currently on screen, possibly with markup drawn over it.
    Rendered(WorkingRaster),
}

/// An encoded image ready to send, plus how it was produced.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub encoded: EncodedImage,
    /// Dimensions of the decoded source.
    pub source: Dimensions,
    /// Present when the source was oversized and went through the downscaler.
    pub plan: Option<DownscalePlan>,
}

impl PreparedUpload {
    pub fn was_downscaled(&self) -> bool {
        self.plan.is_some()
    }
}

fn compress_blocking(
    raster: RasterImage,
    config: &IngestConfig,
) -> Result<PreparedUpload, IngestError> {
    let source = raster.dimensions();

    if !downscale::is_oversized(source, config) {
        debug!("{} is within budget; encoding at native size", source);
        let data = encode::encode_source(&raster)?;
        return Ok(PreparedUpload {
            encoded: EncodedImage {
                data,
                width: source.width,
                height: source.height,
            },
            source,
            plan: None,
        });
    }

    let downscale::Downscaled { raster, plan } = downscale::downscale(&raster, config)?;
    let data = encode::encode_raster(&raster)?;
    info!(
        "Downscaled {} → {} ({} steps)",
        source,
        raster.dimensions(),
        plan.steps.len()
    );
    Ok(PreparedUpload {
        encoded: EncodedImage {
            data,
            width: raster.width(),
            height: raster.height(),
        },
        source,
        plan: Some(plan),
    })
}

/// Downscale (when oversized) and encode a decoded raster.
///
/// CPU work runs on the blocking pool.
pub async fn compress(
    raster: RasterImage,
    config: &IngestConfig,
) -> Result<PreparedUpload, IngestError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || compress_blocking(raster, &config))
        .await
        .map_err(|e| IngestError::Internal(format!("Compress task panicked: {}", e)))?
}

/// Turn any [`UploadSource`] into a transport-ready image.
pub async fn prepare(
    source: UploadSource,
    config: &IngestConfig,
) -> Result<PreparedUpload, IngestError> {
    match source {
        UploadSource::File(path) => {
            let raster = decode::decode_file(&path, config.max_decoded_pixels).await?;
            compress(raster, config).await
        }
        UploadSource::Bytes { name, bytes } => {
            let max_pixels = config.max_decoded_pixels;
            let raster =
                tokio::task::spawn_blocking(move || decode::decode_bytes(bytes, &name, max_pixels))
                    .await
                    .map_err(|e| IngestError::Internal(format!("Decode task panicked: {}", e)))??;
            compress(raster, config).await
        }
        UploadSource::Rendered(working) => {
            let encoded = encode::reencode_rendered(&working, config.max_decoded_pixels).await?;
            Ok(PreparedUpload {
                source: Dimensions::new(encoded.width, encoded.height),
                encoded,
                plan: None,
            })
        }
    }
}

/// Prepare a source and store it in `gallery_id`.
///
/// The encoded value is made URL-safe before it is sent.
pub async fn ingest<T: Transport>(
    client: &GalleryClient<T>,
    source: UploadSource,
    gallery_id: &str,
    config: &IngestConfig,
) -> Result<GalleryImage, IngestError> {
    let prepared = prepare(source, config).await?;
    let value = encode::to_url_safe(&prepared.encoded.data);
    client.create_image(&value, gallery_id).await
}

/// Prepare a source and upload it without a gallery.
pub async fn upload<T: Transport>(
    client: &GalleryClient<T>,
    source: UploadSource,
    config: &IngestConfig,
) -> Result<UploadResult, IngestError> {
    let prepared = prepare(source, config).await?;
    client.upload_image(&prepared.encoded).await
}

/// Create a gallery whose background is the (possibly downscaled) image at
/// `path`.
pub async fn create_gallery_from_file<T: Transport>(
    client: &GalleryClient<T>,
    path: &Path,
    config: &IngestConfig,
) -> Result<Gallery, IngestError> {
    let prepared = prepare(UploadSource::File(path.to_path_buf()), config).await?;
    let gallery = client.create_gallery(&prepared.encoded.data).await?;
    info!("Created gallery {} from {}", gallery.id, path.display());
    Ok(gallery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceFormat;
    use crate::pipeline::upload::testing::MockTransport;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::json;
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x % 251) as u8, (y % 241) as u8, 128])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn bytes_source(w: u32, h: u32) -> UploadSource {
        UploadSource::Bytes {
            name: "pic.png".into(),
            bytes: png_bytes(w, h),
        }
    }

    #[tokio::test]
    async fn small_image_keeps_native_dimensions_and_bytes() {
        let bytes = png_bytes(640, 480);
        let prepared = prepare(
            UploadSource::Bytes {
                name: "small.png".into(),
                bytes: bytes.clone(),
            },
            &IngestConfig::default(),
        )
        .await
        .unwrap();

        assert!(!prepared.was_downscaled());
        assert_eq!((prepared.encoded.width, prepared.encoded.height), (640, 480));
        assert_eq!(prepared.encoded.data, encode::to_data_url("image/png", &bytes));
    }

    #[tokio::test]
    async fn oversized_image_reports_final_dimensions() {
        let prepared = prepare(bytes_source(1600, 800), &IngestConfig::default())
            .await
            .unwrap();
        assert!(prepared.was_downscaled());
        assert_eq!(prepared.source, Dimensions::new(1600, 800));
        assert_eq!((prepared.encoded.width, prepared.encoded.height), (800, 400));
        assert_eq!(
            prepared.plan.unwrap().loop_dimensions(),
            Dimensions::new(849, 423)
        );

        let decoded = decode::decode_data_url(&prepared.encoded.data, u64::MAX).unwrap();
        assert_eq!(decoded.dimensions(), Dimensions::new(800, 400));
    }

    #[tokio::test]
    async fn rendered_source_is_not_downscaled() {
        let raster = RasterImage::new(
            DynamicImage::ImageRgb8(RgbImage::new(1000, 500)),
            SourceFormat::Png,
        )
        .unwrap();
        let prepared = prepare(
            UploadSource::Rendered(WorkingRaster::Decoded(raster)),
            &IngestConfig::default(),
        )
        .await
        .unwrap();
        assert!(!prepared.was_downscaled());
        assert_eq!((prepared.encoded.width, prepared.encoded.height), (1000, 500));
    }

    #[tokio::test]
    async fn rendered_data_url_respects_pixel_ceiling() {
        let config = IngestConfig::builder()
            .max_decoded_pixels(500_000)
            .build()
            .unwrap();
        let url = encode::to_data_url("image/png", &png_bytes(1000, 1000));

        let err = prepare(UploadSource::Rendered(WorkingRaster::DataUrl(url)), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn ingest_sends_url_safe_value() {
        let mock = MockTransport::new().respond(
            200,
            json!({
                "id": "img1",
                "createdAt": "2024-01-01T00:00:00Z",
                "disabled": false,
                "value": "v",
                "galleryId": "g1"
            }),
        );
        let client = GalleryClient::new(mock);
        let image = ingest(&client, bytes_source(30, 20), "g1", &IngestConfig::default())
            .await
            .unwrap();
        assert_eq!(image.id, "img1");

        let sent = client.transport().sent();
        let value = sent[0].body.as_ref().unwrap()["value"].as_str().unwrap().to_string();
        assert!(value.starts_with("data:image_png;base64,"), "got: {value}");
        assert!(encode::is_url_safe(&value));
    }

    #[tokio::test]
    async fn decode_failure_sends_nothing() {
        let client = GalleryClient::new(MockTransport::new());
        let err = upload(
            &client,
            UploadSource::Bytes {
                name: "notes.txt".into(),
                bytes: b"hello".to_vec(),
            },
            &IngestConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.is_local());
        assert!(client.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn gallery_from_file_requires_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        std::fs::write(&path, png_bytes(50, 50)).unwrap();

        let client = GalleryClient::new(MockTransport::new());
        let err = create_gallery_from_file(&client, &path, &IngestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Auth { .. }));
    }
}
