//! Data types shared by the pipeline, the client and the server.
//!
//! Wire types (`Gallery`, `GalleryImage`, `AuthSession`, ...) serialise with
//! camelCase field names because that is what the gallery API has always
//! spoken.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Pipeline types ───────────────────────────────────────────────────────

/// Container format of a decoded source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Png,
    Jpeg,
}

impl SourceFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            SourceFormat::Png => "image/png",
            SourceFormat::Jpeg => "image/jpeg",
        }
    }
}

/// A decoded, in-memory bitmap with non-zero dimensions.
///
/// Owned by one upload operation and dropped when it finishes. When the
/// raster came from file bytes those bytes are kept so an image that needs
/// no downscaling can be uploaded verbatim instead of being re-encoded.
#[derive(Clone)]
pub struct RasterImage {
    pixels: DynamicImage,
    format: SourceFormat,
    original: Option<Vec<u8>>,
}

impl RasterImage {
    /// Wrap decoded pixels. Returns `None` for a zero-sized bitmap.
    pub fn new(pixels: DynamicImage, format: SourceFormat) -> Option<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return None;
        }
        Some(Self {
            pixels,
            format,
            original: None,
        })
    }

    pub(crate) fn with_original(mut self, bytes: Vec<u8>) -> Self {
        self.original = Some(bytes);
        self
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    pub fn area(&self) -> u64 {
        self.dimensions().area()
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// The bytes this raster was decoded from, if any.
    pub fn original_bytes(&self) -> Option<&[u8]> {
        self.original.as_deref()
    }
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format)
            .field("original_len", &self.original.as_ref().map(Vec::len))
            .finish()
    }
}

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The image currently shown in the markup overlay.
#[derive(Debug, Clone)]
pub enum WorkingRaster {
    /// Pixels already decoded in memory, markup included.
    Decoded(RasterImage),
    /// The source of a rendered image element (`data:image/...;base64,...`).
    DataUrl(String),
}

/// A transport-ready image: a data-URL plus the dimensions of the raster it
/// encodes.
///
/// `width` and `height` always describe the final raster that `data` holds,
/// never the source it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub data: String,
    pub width: u32,
    pub height: u32,
}

/// Server-assigned identifier of a stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub id: String,
}

// ── Gallery types ────────────────────────────────────────────────────────

/// One image inside a gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub disabled: bool,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallery_id: Option<String>,
}

/// A gallery: one owner, one background, many images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gallery {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub disabled: bool,
    /// Background image, as a data-URL.
    pub value: String,
    /// Id of the owning user.
    pub owner: String,
    #[serde(default)]
    pub images: Vec<GalleryImage>,
}

impl Gallery {
    /// Images a viewer actually gets to see.
    pub fn visible_images(&self) -> impl Iterator<Item = &GalleryImage> {
        self.images.iter().filter(|img| !img.disabled)
    }
}

/// A registered user as stored server-side.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Result of a successful sign-in or sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub id: String,
    pub email: String,
    /// Access token for `authorization: Bearer ...`.
    pub token: String,
    /// Access-token lifetime, e.g. `"10800s"`.
    pub expires: String,
    /// Refresh token.
    pub refresh: String,
}
