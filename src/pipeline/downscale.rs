//! Iterative downscaling of oversized images.
//!
//! A single bilinear reduction from, say, 4000 px to 800 px samples only a
//! fraction of the source pixels and aliases badly. Instead the image is
//! shrunk by `resize_by` (0.9) per step until one more step would take it
//! below `target_width`, then composed once into a `target_width`-wide
//! surface that keeps the source aspect ratio.
//!
//! The dimension arithmetic is kept separate from the pixel work
//! ([`plan`] vs. [`downscale`]) so the step table can be checked exactly:
//! every step is `floor(prev * resize_by)` in `f64`, which is what makes
//! output sizes reproducible across runs and implementations.
//!
//! ```text
//! 1600×800 ─▶ 1440×720 ─▶ 1296×648 ─▶ 1166×583 ─▶ 1049×524 ─▶ 944×471 ─▶ 849×423
//!                                                         final compose ─▶ 800×400
//! ```

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::{Dimensions, RasterImage, SourceFormat};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use tracing::debug;

/// Dimension plan of one downscale run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownscalePlan {
    /// Seed step followed by every loop step, in order.
    pub steps: Vec<Dimensions>,
    /// Size of the final composed surface.
    pub final_size: Dimensions,
}

impl DownscalePlan {
    /// Dimensions after the last loop step (before final composition).
    pub fn loop_dimensions(&self) -> Dimensions {
        // `plan` always pushes the seed step.
        self.steps[self.steps.len() - 1]
    }

    /// Number of loop iterations after the seed step.
    pub fn iterations(&self) -> usize {
        self.steps.len() - 1
    }
}

/// A downscaled raster together with the plan that produced it.
#[derive(Debug, Clone)]
pub struct Downscaled {
    pub raster: RasterImage,
    pub plan: DownscalePlan,
}

/// True when the image's pixel area exceeds the configured budget.
pub fn is_oversized(dims: Dimensions, config: &IngestConfig) -> bool {
    dims.area() > config.max_file_size()
}

fn shrink(dims: Dimensions, factor: f64) -> Dimensions {
    Dimensions::new(
        ((dims.width as f64 * factor).floor() as u32).max(1),
        ((dims.height as f64 * factor).floor() as u32).max(1),
    )
}

/// Compute the step table and the final surface size for `source`.
///
/// `target_width` must be at least 1 and `resize_by` must lie in `(0, 1)`;
/// anything else is refused with [`IngestError::InvalidConfig`]. Within
/// those bounds the loop only runs while `width * resize_by > target_width`,
/// which needs `width >= 2`, and for such widths `floor(width * resize_by)`
/// is strictly smaller than `width`.
pub fn plan(
    source: Dimensions,
    target_width: u32,
    resize_by: f64,
) -> Result<DownscalePlan, IngestError> {
    if target_width == 0 {
        return Err(IngestError::InvalidConfig(
            "target_width must be at least 1".into(),
        ));
    }
    if !(resize_by > 0.0 && resize_by < 1.0) {
        return Err(IngestError::InvalidConfig(format!(
            "resize_by must be between 0 and 1 (exclusive), got {resize_by}"
        )));
    }
    let target = target_width as f64;

    let mut cur = shrink(source, resize_by);
    let mut steps = vec![cur];
    while cur.width as f64 * resize_by > target {
        cur = shrink(cur, resize_by);
        steps.push(cur);
    }

    let aspect = source.height as f64 / source.width as f64;
    let final_size = Dimensions::new(
        target_width,
        ((target * aspect).floor() as u32).max(1),
    );

    Ok(DownscalePlan { steps, final_size })
}

fn check_surface(dims: Dimensions, max_pixels: u64) -> Result<(), IngestError> {
    if dims.area() > max_pixels {
        return Err(IngestError::Resize {
            detail: format!(
                "could not resize image: {} surface exceeds {} pixels",
                dims, max_pixels
            ),
        });
    }
    Ok(())
}

/// Shrink an oversized raster step by step and compose the result at
/// `target_width`.
///
/// Each loop step reads the region `next * (1 / resize_by)` from the origin
/// of the previous surface (clamped to its bounds) and draws it into a
/// `next`-sized surface. Surfaces larger than `max_decoded_pixels` are
/// refused with [`IngestError::Resize`].
pub fn downscale(source: &RasterImage, config: &IngestConfig) -> Result<Downscaled, IngestError> {
    let plan = plan(source.dimensions(), config.target_width, config.resize_by)?;
    let inverse = 1.0 / config.resize_by;
    let max_pixels = config.max_decoded_pixels;

    for dims in plan.steps.iter().chain(std::iter::once(&plan.final_size)) {
        check_surface(*dims, max_pixels)?;
    }

    let seed = plan.steps[0];
    let mut current: RgbaImage =
        imageops::resize(source.pixels(), seed.width, seed.height, FilterType::Triangle);

    for next in &plan.steps[1..] {
        let region_w = ((next.width as f64 * inverse).round() as u32).clamp(1, current.width());
        let region_h = ((next.height as f64 * inverse).round() as u32).clamp(1, current.height());
        let region = imageops::crop_imm(&current, 0, 0, region_w, region_h);
        current = imageops::resize(&*region, next.width, next.height, FilterType::Triangle);
    }

    let last = plan.loop_dimensions();
    let composed = imageops::resize(
        &current,
        plan.final_size.width,
        plan.final_size.height,
        FilterType::Triangle,
    );

    debug!(
        "Downscaled {} in {} steps (last step {}) → {}",
        source.dimensions(),
        plan.steps.len(),
        last,
        plan.final_size
    );

    let raster = RasterImage::new(DynamicImage::ImageRgba8(composed), SourceFormat::Png)
        .ok_or_else(|| IngestError::Resize {
            detail: "could not resize image: empty surface".into(),
        })?;

    Ok(Downscaled { raster, plan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn dims(pairs: &[(u32, u32)]) -> Vec<Dimensions> {
        pairs.iter().map(|&(w, h)| Dimensions::new(w, h)).collect()
    }

    fn raster(w: u32, h: u32) -> RasterImage {
        let img = RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255]));
        RasterImage::new(DynamicImage::ImageRgba8(img), SourceFormat::Png).unwrap()
    }

    #[test]
    fn plan_1600x800_matches_reference_table() {
        let p = plan(Dimensions::new(1600, 800), 800, 0.9).unwrap();
        assert_eq!(
            p.steps,
            dims(&[
                (1440, 720),
                (1296, 648),
                (1166, 583),
                (1049, 524),
                (944, 471),
                (849, 423),
            ])
        );
        assert_eq!(p.loop_dimensions(), Dimensions::new(849, 423));
        assert_eq!(p.final_size, Dimensions::new(800, 400));
    }

    #[test]
    fn plan_4000_wide_terminates_in_fourteen_iterations() {
        let p = plan(Dimensions::new(4000, 3000), 800, 0.9).unwrap();
        assert_eq!(p.iterations(), 14);
        assert_eq!(p.steps[0], Dimensions::new(3600, 2700));
        assert_eq!(p.loop_dimensions(), Dimensions::new(819, 615));
        for pair in p.steps.windows(2) {
            assert!(pair[1].width < pair[0].width, "width must strictly decrease");
        }
        assert!(p.loop_dimensions().width as f64 * 0.9 <= 800.0);
        assert_eq!(p.final_size, Dimensions::new(800, 600));
    }

    #[test]
    fn plan_skips_loop_when_seed_is_small_enough() {
        // 900×400 is oversized by area, but 810 * 0.9 < 800.
        let p = plan(Dimensions::new(900, 400), 800, 0.9).unwrap();
        assert_eq!(p.steps, dims(&[(810, 360)]));
        assert_eq!(p.iterations(), 0);
        assert_eq!(p.final_size, Dimensions::new(800, 355));
    }

    #[test]
    fn plan_never_reaches_zero() {
        let p = plan(Dimensions::new(100_000, 3), 800, 0.9).unwrap();
        assert!(p.steps.iter().all(|d| d.width > 0 && d.height > 0));
        assert_eq!(p.final_size.height, 1);
    }

    #[test]
    fn oversize_threshold_is_strict() {
        let config = IngestConfig::default();
        assert!(!is_oversized(Dimensions::new(800, 400), &config));
        assert!(is_oversized(Dimensions::new(801, 400), &config));
    }

    #[test]
    fn downscale_produces_final_surface() {
        let out = downscale(&raster(1600, 800), &IngestConfig::default()).unwrap();
        assert_eq!(out.raster.dimensions(), Dimensions::new(800, 400));
        assert_eq!(out.plan.loop_dimensions(), Dimensions::new(849, 423));
        assert!(out.raster.original_bytes().is_none());
    }

    #[test]
    fn tall_narrow_image_is_widened_to_target() {
        // Area 500_000 > 320_000 but already narrower than the target.
        let out = downscale(&raster(500, 1000), &IngestConfig::default()).unwrap();
        assert_eq!(out.plan.steps, dims(&[(450, 900)]));
        assert_eq!(out.raster.dimensions(), Dimensions::new(800, 1600));
    }

    #[test]
    fn refuses_surfaces_above_ceiling() {
        let config = IngestConfig::builder()
            .max_decoded_pixels(500_000)
            .build()
            .unwrap();
        // Seed surface 540×900 fits, but the 800×1333 composition does not.
        let err = downscale(&raster(600, 1000), &config).unwrap_err();
        match err {
            IngestError::Resize { detail } => assert!(detail.contains("could not resize image")),
            other => panic!("expected Resize, got {other:?}"),
        }
    }

    #[test]
    fn plan_rejects_parameters_that_would_never_finish() {
        let source = Dimensions::new(1600, 800);
        assert!(matches!(
            plan(source, 0, 0.9),
            Err(IngestError::InvalidConfig(_))
        ));
        for factor in [1.0, 1.5, 0.0, -0.5, f64::NAN] {
            assert!(
                matches!(plan(source, 800, factor), Err(IngestError::InvalidConfig(_))),
                "resize_by {factor} must be refused"
            );
        }
    }

    #[test]
    fn downscale_rejects_unchecked_config() {
        let config = IngestConfig {
            resize_by: 1.0,
            ..Default::default()
        };
        let err = downscale(&raster(1600, 800), &config).unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)), "got: {err:?}");
    }
}
