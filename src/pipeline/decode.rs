//! Decoding: file bytes, a file path, or a rendered data-URL → [`RasterImage`].
//!
//! All three entry points converge on [`decode_bytes`], so a freshly picked
//! file and a previously rendered (annotated) image are normalised the same
//! way. The format is sniffed from the magic bytes rather than trusted from a
//! file extension or a data-URL MIME type, and the header dimensions are
//! checked against the pixel ceiling before the full decode allocates.

use crate::error::IngestError;
use crate::model::{RasterImage, SourceFormat};
use crate::pipeline::encode;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Decode PNG or JPEG bytes.
///
/// `source_hint` names the input in error messages. The original bytes are
/// kept on the returned raster.
pub fn decode_bytes(
    bytes: Vec<u8>,
    source_hint: &str,
    max_pixels: u64,
) -> Result<RasterImage, IngestError> {
    let format = match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => SourceFormat::Png,
        Ok(ImageFormat::Jpeg) => SourceFormat::Jpeg,
        Ok(other) => {
            return Err(IngestError::decode(
                source_hint,
                format!("unsupported format {:?}; expected PNG or JPEG", other),
            ))
        }
        Err(e) => return Err(IngestError::decode(source_hint, e)),
    };

    let (width, height) = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| IngestError::decode(source_hint, e))?
        .into_dimensions()
        .map_err(|e| IngestError::decode(source_hint, e))?;

    let pixels = width as u64 * height as u64;
    if pixels > max_pixels {
        return Err(IngestError::decode(
            source_hint,
            format!(
                "{}x{} is {} pixels, above the limit of {}",
                width, height, pixels, max_pixels
            ),
        ));
    }

    let image_format = match format {
        SourceFormat::Png => ImageFormat::Png,
        SourceFormat::Jpeg => ImageFormat::Jpeg,
    };
    let decoded = image::load_from_memory_with_format(&bytes, image_format)
        .map_err(|e| IngestError::decode(source_hint, e))?;

    let raster = RasterImage::new(decoded, format)
        .ok_or_else(|| IngestError::decode(source_hint, "image has zero width or height"))?;

    debug!(
        "Decoded {} → {}x{} {:?}",
        source_hint,
        raster.width(),
        raster.height(),
        format
    );
    Ok(raster.with_original(bytes))
}

/// Read and decode an image file.
///
/// The read is async; the decode runs on the blocking pool.
pub async fn decode_file(path: &Path, max_pixels: u64) -> Result<RasterImage, IngestError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        let detail = match e.kind() {
            std::io::ErrorKind::NotFound => "file not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "permission denied".to_string(),
            _ => e.to_string(),
        };
        IngestError::decode_path(path, detail)
    })?;

    let hint = path.display().to_string();
    tokio::task::spawn_blocking(move || decode_bytes(bytes, &hint, max_pixels))
        .await
        .map_err(|e| IngestError::Internal(format!("Decode task panicked: {}", e)))?
}

/// Decode the source of a rendered image element (`data:image/...;base64,...`).
///
/// Both standard and URL-safe data-URLs are accepted.
pub fn decode_data_url(data_url: &str, max_pixels: u64) -> Result<RasterImage, IngestError> {
    let (mime, payload) = encode::split_data_url(data_url)
        .ok_or_else(|| IngestError::decode("data-URL", "not a base64 data-URL"))?;
    let bytes = encode::decode_payload(payload)?;
    decode_bytes(bytes, &format!("data-URL ({mime})"), max_pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 200, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([90, 90, 90])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    #[test]
    fn decodes_png_with_native_dimensions() {
        let raster = decode_bytes(png_bytes(640, 480), "test.png", u64::MAX).unwrap();
        assert_eq!((raster.width(), raster.height()), (640, 480));
        assert_eq!(raster.format(), SourceFormat::Png);
        assert!(raster.original_bytes().is_some());
    }

    #[test]
    fn decodes_jpeg() {
        let raster = decode_bytes(jpeg_bytes(32, 16), "test.jpg", u64::MAX).unwrap();
        assert_eq!(raster.format(), SourceFormat::Jpeg);
        assert_eq!(raster.dimensions().to_string(), "32x16");
    }

    #[test]
    fn rejects_garbage() {
        let err = decode_bytes(b"definitely not an image".to_vec(), "junk.bin", u64::MAX)
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }), "got: {err:?}");
    }

    #[test]
    fn rejects_gif() {
        let err =
            decode_bytes(b"GIF89a\x01\x00\x01\x00".to_vec(), "a.gif", u64::MAX).unwrap_err();
        assert!(err.to_string().contains("PNG or JPEG"), "got: {err}");
    }

    #[test]
    fn enforces_pixel_ceiling_before_decoding() {
        let err = decode_bytes(png_bytes(100, 100), "big.png", 9_999).unwrap_err();
        assert!(err.to_string().contains("10000 pixels"), "got: {err}");
    }

    #[test]
    fn decodes_data_url_in_both_alphabets() {
        let url = encode::to_data_url("image/png", &png_bytes(12, 7));
        let a = decode_data_url(&url, u64::MAX).unwrap();
        let b = decode_data_url(&encode::to_url_safe(&url), u64::MAX).unwrap();
        assert_eq!(a.dimensions(), b.dimensions());
        assert_eq!((a.width(), a.height()), (12, 7));
    }

    #[tokio::test]
    async fn decode_file_reports_missing_path() {
        let err = decode_file(Path::new("/definitely/not/here.png"), u64::MAX)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("file not found"), "got: {err}");
    }

    #[tokio::test]
    async fn decode_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, png_bytes(20, 10)).unwrap();
        let raster = decode_file(&path, u64::MAX).await.unwrap();
        assert_eq!(raster.dimensions().area(), 200);
    }
}
