//! Screenshot regression: pixel comparison and PNG baseline lifecycle.
//!
//! Comparison runs in phases and stops at the first one that decides:
//!
//! 1. byte-identical encodings are equal without decoding;
//! 2. differing dimensions are a full mismatch without a pixel loop;
//! 3. a sparse sample (every 10th pixel on both axes) that finds no
//!    difference is taken as equal;
//! 4. otherwise every pixel is compared in row bands on scoped threads and
//!    a diff image is rendered.

use image::{ImageEncoder, ImageReader, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::baseline::{artifact_path, baseline_path, write_artifact, BaselineOutcome};
use crate::config::EngineConfig;
use crate::result::{EngineError, EnsayoResult};

/// Sampling stride on both axes
pub const SAMPLE_STEP: usize = 10;

/// Number of row bands compared concurrently in a full scan
pub const DIFF_BANDS: usize = 4;

/// Mismatched pixels in the diff image
const MISMATCH: [u8; 4] = [255, 0, 0, 255];

/// Alpha of matching (dimmed) pixels in the diff image
const MATCH_ALPHA: u8 = 128;

/// How a comparison was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonStrategy {
    /// Encodings were byte-identical
    Identical,
    /// Dimensions differed
    DimensionMismatch,
    /// The sparse sample found no difference
    Sampled,
    /// Every pixel was compared
    FullScan,
}

/// Result of comparing two images
#[derive(Debug, Clone)]
pub struct ImageDiff {
    /// Fraction of differing pixels (0.0-1.0)
    pub difference: f64,
    /// Number of differing pixels (full scans only)
    pub mismatched_pixels: usize,
    /// Pixels in the baseline
    pub total_pixels: usize,
    /// PNG visualization, present when a full scan found differences
    pub diff_image: Option<Vec<u8>>,
    /// Phase that decided the result
    pub strategy: ComparisonStrategy,
}

impl ImageDiff {
    const fn decided(difference: f64, strategy: ComparisonStrategy) -> Self {
        Self {
            difference,
            mismatched_pixels: 0,
            total_pixels: 0,
            diff_image: None,
            strategy,
        }
    }

    /// Whether the difference is strictly above `threshold`
    #[must_use]
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.difference > threshold
    }

    /// Difference as a percentage
    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.difference * 100.0
    }
}

fn dimensions(bytes: &[u8], which: &str) -> EnsayoResult<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EngineError::image(format!("Failed to read {which} image: {e}")))?
        .into_dimensions()
        .map_err(|e| EngineError::image(format!("Failed to decode {which} image: {e}")))
}

fn decode(bytes: &[u8], which: &str) -> EnsayoResult<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| EngineError::image(format!("Failed to decode {which} image: {e}")))
}

/// Compare a capture against its baseline.
///
/// # Errors
///
/// Returns error if either image cannot be decoded or the diff image cannot
/// be encoded
pub fn compare_images(baseline: &[u8], current: &[u8]) -> EnsayoResult<ImageDiff> {
    if baseline == current {
        return Ok(ImageDiff::decided(0.0, ComparisonStrategy::Identical));
    }

    let (width, height) = dimensions(baseline, "baseline")?;
    if dimensions(current, "current")? != (width, height) {
        return Ok(ImageDiff::decided(1.0, ComparisonStrategy::DimensionMismatch));
    }

    let expected = decode(baseline, "baseline")?;
    let actual = decode(current, "current")?;
    let total_pixels = width as usize * height as usize;
    if total_pixels == 0 {
        return Ok(ImageDiff::decided(0.0, ComparisonStrategy::Sampled));
    }

    if sample_matches(&expected, &actual) {
        return Ok(ImageDiff {
            total_pixels,
            ..ImageDiff::decided(0.0, ComparisonStrategy::Sampled)
        });
    }

    let (mismatched_pixels, diff) = full_scan(&expected, &actual);
    let diff_image = if mismatched_pixels > 0 {
        Some(encode_png(&diff, width, height)?)
    } else {
        None
    };

    Ok(ImageDiff {
        difference: mismatched_pixels as f64 / total_pixels as f64,
        mismatched_pixels,
        total_pixels,
        diff_image,
        strategy: ComparisonStrategy::FullScan,
    })
}

fn sample_matches(expected: &RgbaImage, actual: &RgbaImage) -> bool {
    let (width, height) = expected.dimensions();
    (0..height).step_by(SAMPLE_STEP).all(|y| {
        (0..width)
            .step_by(SAMPLE_STEP)
            .all(|x| expected.get_pixel(x, y) == actual.get_pixel(x, y))
    })
}

/// Compare every pixel, returning the mismatch count and raw RGBA diff
fn full_scan(expected: &RgbaImage, actual: &RgbaImage) -> (usize, Vec<u8>) {
    let width = expected.width() as usize;
    let height = expected.height() as usize;
    let row_bytes = width * 4;
    let rows_per_band = height.div_ceil(DIFF_BANDS).max(1);
    let band_bytes = rows_per_band * row_bytes;

    let mut diff = vec![0u8; row_bytes * height];
    let mismatched = Mutex::new(0usize);
    let expected = expected.as_raw();
    let actual = actual.as_raw();

    std::thread::scope(|scope| {
        for (band, out) in diff.chunks_mut(band_bytes).enumerate() {
            let offset = band * band_bytes;
            let expected = &expected[offset..offset + out.len()];
            let actual = &actual[offset..offset + out.len()];
            let mismatched = &mismatched;

            scope.spawn(move || {
                let mut count = 0usize;
                for ((out, want), got) in out
                    .chunks_exact_mut(4)
                    .zip(expected.chunks_exact(4))
                    .zip(actual.chunks_exact(4))
                {
                    if want == got {
                        let gray = ((u16::from(want[0]) + u16::from(want[1]) + u16::from(want[2]))
                            / 3) as u8;
                        out.copy_from_slice(&[gray, gray, gray, MATCH_ALPHA]);
                    } else {
                        out.copy_from_slice(&MISMATCH);
                        count += 1;
                    }
                }
                *mismatched
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) += count;
            });
        }
    });

    let count = mismatched
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    (count, diff)
}

fn encode_png(rgba: &[u8], width: u32, height: u32) -> EnsayoResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buffer);
    encoder
        .write_image(rgba, width, height, image::ExtendedColorType::Rgba8)
        .map_err(|e| EngineError::image(format!("Failed to encode diff image: {e}")))?;
    Ok(buffer)
}

/// PNG baselines under one directory
#[derive(Debug, Clone)]
pub struct ScreenshotBaselines {
    dir: PathBuf,
    threshold: f64,
    update: bool,
}

impl ScreenshotBaselines {
    /// Create a store
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, threshold: f64, update: bool) -> Self {
        Self {
            dir: dir.into(),
            threshold: threshold.clamp(0.0, 1.0),
            update,
        }
    }

    /// Store configured from the engine config
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            &config.screenshot_dir,
            config.screenshot_threshold,
            config.update_screenshots,
        )
    }

    /// Baseline directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compare `capture` against the baseline named `filename`.
    ///
    /// Creates the baseline when missing or when updating. On a mismatch
    /// above the threshold, writes `<stem>.actual.png` and `<stem>.diff.png`
    /// beside the baseline and fails.
    pub fn check(&self, filename: &str, capture: &[u8]) -> EnsayoResult<BaselineOutcome> {
        let path = baseline_path(&self.dir, filename)?;
        std::fs::create_dir_all(path.parent().unwrap_or(&self.dir))?;

        if !path.exists() {
            std::fs::write(&path, capture)?;
            tracing::info!(path = %path.display(), "created screenshot baseline");
            return Ok(BaselineOutcome::Created(path));
        }
        if self.update {
            std::fs::write(&path, capture)?;
            tracing::info!(path = %path.display(), "updated screenshot baseline");
            return Ok(BaselineOutcome::Updated(path));
        }

        let baseline = std::fs::read(&path)?;
        let diff = compare_images(&baseline, capture)?;
        if !diff.exceeds(self.threshold) {
            return Ok(BaselineOutcome::Matched {
                path,
                difference: diff.difference,
            });
        }

        let mut artifacts = Vec::new();
        artifacts.extend(write_artifact(&artifact_path(&path, "actual"), capture));
        if let Some(image) = &diff.diff_image {
            artifacts.extend(write_artifact(&artifact_path(&path, "diff"), image));
        }

        Err(EngineError::VisualDiff {
            message: format!(
                "screenshot differs from baseline by {:.2}% (threshold: {:.2}%). \
                 Delete the old screenshot at {} to save the new one",
                diff.percentage(),
                self.threshold * 100.0,
                path.display()
            ),
            difference: Some(diff.difference),
            baseline: path,
            artifacts,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use image::Rgba;

    /// Encode a solid image, optionally with one differing pixel
    pub(crate) fn png(width: u32, height: u32, color: [u8; 4], odd: Option<(u32, u32)>) -> Vec<u8> {
        let mut img = RgbaImage::from_pixel(width, height, Rgba(color));
        if let Some((x, y)) = odd {
            img.put_pixel(x, y, Rgba([0, 0, 255, 255]));
        }
        let mut buffer = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buffer);
        encoder
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
            .unwrap();
        buffer
    }

    #[test]
    fn test_identical_bytes() {
        let a = png(4, 4, [10, 20, 30, 255], None);
        let diff = compare_images(&a, &a.clone()).unwrap();
        assert_eq!(diff.difference, 0.0);
        assert_eq!(diff.strategy, ComparisonStrategy::Identical);
        assert!(diff.diff_image.is_none());
    }

    #[test]
    fn test_dimension_mismatch_is_total() {
        let a = png(4, 4, [0, 0, 0, 255], None);
        let b = png(5, 4, [0, 0, 0, 255], None);
        let diff = compare_images(&a, &b).unwrap();
        assert_eq!(diff.difference, 1.0);
        assert_eq!(diff.strategy, ComparisonStrategy::DimensionMismatch);
        assert_eq!(diff.total_pixels, 0);
    }

    #[test]
    fn test_sample_skips_unsampled_pixel() {
        // (5, 5) is never sampled with a stride of 10
        let a = png(20, 20, [200, 200, 200, 255], None);
        let b = png(20, 20, [200, 200, 200, 255], Some((5, 5)));
        let diff = compare_images(&a, &b).unwrap();
        assert_eq!(diff.strategy, ComparisonStrategy::Sampled);
        assert_eq!(diff.difference, 0.0);
    }

    #[test]
    fn test_full_scan_counts_and_renders() {
        let a = png(20, 20, [30, 60, 90, 255], None);
        let b = png(20, 20, [30, 60, 90, 255], Some((10, 10)));
        let diff = compare_images(&a, &b).unwrap();
        assert_eq!(diff.strategy, ComparisonStrategy::FullScan);
        assert_eq!(diff.mismatched_pixels, 1);
        assert_eq!(diff.total_pixels, 400);
        assert!((diff.difference - 1.0 / 400.0).abs() < f64::EPSILON);

        let rendered = image::load_from_memory(&diff.diff_image.unwrap())
            .unwrap()
            .to_rgba8();
        assert_eq!(rendered.get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(rendered.get_pixel(0, 0), &Rgba([60, 60, 60, 128]));
    }

    #[test]
    fn test_full_scan_uneven_bands() {
        let a = png(10, 7, [0, 0, 0, 255], None);
        let b = png(10, 7, [255, 255, 255, 255], None);
        let diff = compare_images(&a, &b).unwrap();
        assert_eq!(diff.mismatched_pixels, 70);
        assert_eq!(diff.difference, 1.0);
    }

    #[test]
    fn test_undecodable_image() {
        let a = png(2, 2, [0, 0, 0, 255], None);
        assert!(compare_images(&a, b"not a png").is_err());
    }

    #[test]
    fn test_baseline_created_then_matched() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScreenshotBaselines::new(dir.path().join("shots"), 0.0, false);
        let capture = png(4, 4, [1, 2, 3, 255], None);

        let first = store.check("home.png", &capture).unwrap();
        assert!(matches!(first, BaselineOutcome::Created(_)));
        assert!(first.path().exists());

        let second = store.check("home.png", &capture).unwrap();
        assert!(matches!(second, BaselineOutcome::Matched { difference, .. } if difference == 0.0));
    }

    #[test]
    fn test_absolute_name_stays_in_baseline_dir() {
        let dir = tempfile::tempdir().unwrap();
        let shots = dir.path().join("shots");
        let store = ScreenshotBaselines::new(&shots, 0.0, false);
        let capture = png(2, 2, [9, 9, 9, 255], None);

        let outcome = store.check("/flows/home.png", &capture).unwrap();
        assert_eq!(outcome.path(), shots.join("flows/home.png"));
        assert!(outcome.path().exists());
        assert!(store.check("../escape.png", &capture).is_err());
    }

    #[test]
    fn test_mismatch_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScreenshotBaselines::new(dir.path(), 0.0, false);
        store
            .check("page.png", &png(20, 20, [0, 0, 0, 255], None))
            .unwrap();

        let err = store
            .check("page.png", &png(20, 20, [0, 0, 0, 255], Some((0, 0))))
            .unwrap_err();
        match &err {
            EngineError::VisualDiff {
                message,
                difference,
                artifacts,
                ..
            } => {
                assert!(message.starts_with("screenshot differs from baseline by 0.25%"));
                assert!(message.contains("(threshold: 0.00%)"));
                assert!(message.contains("Delete the old screenshot at"));
                assert_eq!(*difference, Some(0.0025));
                assert_eq!(artifacts.len(), 2);
            }
            other => panic!("expected visual diff, got {other:?}"),
        }
        assert!(dir.path().join("page.actual.png").exists());
        assert!(dir.path().join("page.diff.png").exists());
    }

    #[test]
    fn test_threshold_tolerates_noise() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScreenshotBaselines::new(dir.path(), 0.01, false);
        store
            .check("noise.png", &png(20, 20, [0, 0, 0, 255], None))
            .unwrap();
        let outcome = store
            .check("noise.png", &png(20, 20, [0, 0, 0, 255], Some((0, 0))))
            .unwrap();
        assert!(matches!(outcome, BaselineOutcome::Matched { .. }));
        assert!(!dir.path().join("noise.actual.png").exists());
    }

    #[test]
    fn test_update_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let old = png(4, 4, [0, 0, 0, 255], None);
        let new = png(8, 8, [9, 9, 9, 255], None);
        ScreenshotBaselines::new(dir.path(), 0.0, false)
            .check("u.png", &old)
            .unwrap();

        let outcome = ScreenshotBaselines::new(dir.path(), 0.0, true)
            .check("u.png", &new)
            .unwrap();
        assert!(matches!(outcome, BaselineOutcome::Updated(_)));
        assert_eq!(std::fs::read(dir.path().join("u.png")).unwrap(), new);
    }
}
