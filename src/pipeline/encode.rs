//! Image encoding: raster → data-URL, plus the URL-safe transcoding used on
//! the wire.
//!
//! Every image travels as a self-describing data-URL
//! (`data:image/png;base64,...`) inside a JSON body. Some transports embed
//! that string in contexts that reserve `+`, `/` and `=`, so values sent to
//! `create_image` are first passed through [`to_url_safe`]; the server
//! reverses it with [`from_url_safe`] before persisting.
//!
//! Freshly drawn rasters are always PNG: markup strokes are hard edges and
//! JPEG ringing around them is very visible.

use crate::error::IngestError;
use crate::model::{EncodedImage, RasterImage, WorkingRaster};
use crate::pipeline::decode;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use tracing::debug;

static RE_DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(?P<mime>[A-Za-z0-9.+-]+[/_][A-Za-z0-9.+-]+)(?:;[^,;]+)*;base64,").unwrap()
});

/// Render a raster as a PNG data-URL.
pub fn encode_raster(img: &RasterImage) -> Result<String, IngestError> {
    let mut buf = Vec::new();
    img.pixels()
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| IngestError::Encode {
            detail: e.to_string(),
        })?;

    debug!(
        "Encoded {}x{} raster → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(to_data_url("image/png", &buf))
}

/// Data-URL of the bytes a raster was decoded from, or a fresh PNG when the
/// raster has no original bytes.
pub fn encode_source(img: &RasterImage) -> Result<String, IngestError> {
    match img.original_bytes() {
        Some(bytes) => Ok(to_data_url(img.format().mime_type(), bytes)),
        None => encode_raster(img),
    }
}

/// Wrap raw bytes in a base64 data-URL.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Replace `+` with `-` and `/` with `_`, and strip trailing `=` padding.
///
/// Applied to the whole string, data-URL prefix included. Idempotent.
pub fn to_url_safe(s: &str) -> String {
    s.trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect()
}

/// Reverse [`to_url_safe`]: restore `+` and `/`, and re-pad the base64
/// payload to a multiple of four.
///
/// Padding is computed on the payload only, so a data-URL comes back exactly
/// as it was before [`to_url_safe`].
pub fn from_url_safe(s: &str) -> String {
    let restored: String = s
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let payload_len = match RE_DATA_URL.find(&restored) {
        Some(m) => restored.len() - m.end(),
        None => restored.len(),
    };
    let pad = (4 - payload_len % 4) % 4;
    // A remainder of 1 is never valid base64; leave it for the decoder to reject.
    if pad == 3 {
        return restored;
    }
    let mut out = restored;
    out.extend(std::iter::repeat('=').take(pad));
    out
}

/// True when `s` contains none of the characters [`to_url_safe`] removes.
pub fn is_url_safe(s: &str) -> bool {
    !s.contains(['+', '/']) && !s.ends_with('=')
}

/// Split a data-URL into its MIME type and base64 payload.
///
/// Accepts URL-safe data-URLs too (`image_png`). Returns `None` when `s` is
/// not a base64 data-URL.
pub fn split_data_url(s: &str) -> Option<(String, &str)> {
    let caps = RE_DATA_URL.captures(s)?;
    let whole = caps.get(0)?;
    let mime = caps.name("mime")?.as_str().replace('_', "/");
    Some((mime, &s[whole.end()..]))
}

/// Decode a base64 payload in either alphabet, padded or not.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, IngestError> {
    let trimmed = payload.trim().trim_end_matches('=');
    let normalised = if trimmed.contains(['+', '/']) {
        trimmed.replace('+', "-").replace('/', "_")
    } else {
        trimmed.to_string()
    };
    URL_SAFE_NO_PAD
        .decode(normalised.as_bytes())
        .map_err(|e| IngestError::decode("base64 payload", e))
}

/// Re-encode a rendered (possibly annotated) image as a PNG data-URL.
///
/// The working raster is decoded at its natural pixel size, not any display
/// size, so the re-encode never silently downscales. A data-URL source is
/// held to the same `max_pixels` ceiling as any other decode. CPU work runs
/// on the blocking pool.
pub async fn reencode_rendered(
    working: &WorkingRaster,
    max_pixels: u64,
) -> Result<EncodedImage, IngestError> {
    let working = working.clone();
    tokio::task::spawn_blocking(move || {
        let raster = match working {
            WorkingRaster::Decoded(raster) => raster,
            WorkingRaster::DataUrl(url) => decode::decode_data_url(&url, max_pixels)?,
        };
        let data = encode_raster(&raster)?;
        Ok(EncodedImage {
            data,
            width: raster.width(),
            height: raster.height(),
        })
    })
    .await
    .map_err(|e| IngestError::Internal(format!("Encode task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceFormat;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn red(w: u32, h: u32) -> RasterImage {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])));
        RasterImage::new(img, SourceFormat::Png).unwrap()
    }

    #[test]
    fn encode_small_image() {
        let url = encode_raster(&red(10, 10)).expect("encode should succeed");
        let (mime, payload) = split_data_url(&url).expect("data-URL");
        assert_eq!(mime, "image/png");
        let decoded = STANDARD.decode(payload).expect("valid base64");
        assert_eq!(&decoded[..4], b"\x89PNG");
    }

    #[test]
    fn url_safe_strips_reserved_characters() {
        let standard = STANDARD.encode([0xfb, 0xff, 0xfe, 0x3e]);
        assert!(standard.contains('+') || standard.contains('/'));
        assert!(standard.ends_with('='));

        let safe = to_url_safe(&standard);
        assert!(!safe.contains('+'));
        assert!(!safe.contains('/'));
        assert!(!safe.ends_with('='));
        assert!(is_url_safe(&safe));
    }

    #[test]
    fn url_safe_is_idempotent() {
        let url = encode_raster(&red(3, 7)).unwrap();
        let once = to_url_safe(&url);
        assert_eq!(to_url_safe(&once), once);
    }

    #[test]
    fn url_safe_round_trips_data_url_with_padding() {
        // payload "QQ==" decodes to "A"; the prefix must not skew the padding.
        let url = "data:image/png;base64,QQ==";
        let safe = to_url_safe(url);
        assert_eq!(safe, "data:image_png;base64,QQ");
        assert_eq!(from_url_safe(&safe), url);
    }

    #[test]
    fn url_safe_round_trips_real_raster() {
        let url = encode_raster(&red(5, 9)).unwrap();
        assert_eq!(from_url_safe(&to_url_safe(&url)), url);
    }

    #[test]
    fn split_accepts_url_safe_prefix() {
        let (mime, payload) = split_data_url("data:image_jpeg;base64,abc").unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(payload, "abc");
        assert!(split_data_url("not a data url").is_none());
    }

    #[test]
    fn decode_payload_accepts_both_alphabets() {
        let bytes = [0xfbu8, 0xff, 0xfe, 0x3e, 0x01];
        let standard = STANDARD.encode(bytes);
        let safe = to_url_safe(&standard);
        assert_eq!(decode_payload(&standard).unwrap(), bytes);
        assert_eq!(decode_payload(&safe).unwrap(), bytes);
        assert!(decode_payload("!!!").is_err());
    }

    #[test]
    fn encode_source_prefers_original_bytes() {
        let raster = red(2, 2).with_original(vec![1, 2, 3]);
        let url = encode_source(&raster).unwrap();
        assert_eq!(url, format!("data:image/png;base64,{}", STANDARD.encode([1, 2, 3])));
    }

    #[tokio::test]
    async fn reencode_keeps_natural_size() {
        let url = encode_raster(&red(37, 21)).unwrap();
        let encoded = reencode_rendered(&WorkingRaster::DataUrl(url), u64::MAX)
            .await
            .unwrap();
        assert_eq!((encoded.width, encoded.height), (37, 21));
        assert!(encoded.data.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn reencode_enforces_pixel_ceiling() {
        let url = encode_raster(&red(1000, 1000)).unwrap();
        let err = reencode_rendered(&WorkingRaster::DataUrl(url), 500_000)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }), "got: {err:?}");
    }
}
