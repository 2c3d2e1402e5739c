//! Screenshot baseline comparison
//!
//! Evidence screenshots can optionally be checked against recorded
//! baselines. Identical files short-circuit on a SHA-256 hash; otherwise
//! pixels are compared with a small per-channel tolerance to absorb
//! anti-aliasing, and differing pixels are marked red in a diff image.

use image::{GenericImageView, Pixel, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Per-channel difference below which two pixels count as equal
const CHANNEL_TOLERANCE: i32 = 5;

/// Configuration for visual checks
#[derive(Debug, Clone)]
pub struct VisualConfig {
    /// Recorded baseline screenshots
    pub baseline_dir: PathBuf,

    /// Evidence screenshots of the current run
    pub evidence_dir: PathBuf,

    /// Diff images for failed comparisons
    pub diff_dir: PathBuf,

    /// Default threshold (0.0 - 100.0 percent of differing pixels)
    pub threshold: f64,

    /// Record missing baselines instead of failing
    pub auto_update: bool,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("verification/baselines"),
            evidence_dir: PathBuf::from("verification"),
            diff_dir: PathBuf::from("verification/diffs"),
            threshold: 0.5,
            auto_update: false,
        }
    }
}

/// Result of one baseline comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualDiff {
    /// Whether the screenshot matches its baseline within the threshold
    pub matches: bool,

    /// Percentage of pixels that differ
    pub diff_percent: f64,

    /// Number of differing pixels
    pub diff_pixels: u64,

    /// Total pixels compared
    pub total_pixels: u64,

    /// Diff image, when differences were found
    pub diff_image_path: Option<PathBuf>,
}

/// Compares evidence screenshots against per-scenario baselines
pub struct VisualChecker {
    config: VisualConfig,
}

impl VisualChecker {
    pub fn new(config: VisualConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.evidence_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;
        Ok(Self { config })
    }

    fn evidence(&self, scenario: &str, shot: &str) -> PathBuf {
        crate::driver::evidence_path(&self.config.evidence_dir, scenario, shot)
    }

    fn baseline(&self, scenario: &str, shot: &str) -> PathBuf {
        self.config.baseline_dir.join(scenario).join(format!("{}.png", shot))
    }

    /// Compare one evidence shot against its baseline
    pub fn compare(&self, scenario: &str, shot: &str, threshold: Option<f64>) -> Result<VisualDiff> {
        let threshold = threshold.unwrap_or(self.config.threshold);
        let evidence_path = self.evidence(scenario, shot);
        let baseline_path = self.baseline(scenario, shot);

        if !evidence_path.exists() {
            return Err(Error::Visual(format!(
                "evidence screenshot not found: {}",
                evidence_path.display()
            )));
        }

        if !baseline_path.exists() {
            if self.config.auto_update {
                info!("Recording baseline for {}/{}", scenario, shot);
                copy_into(&evidence_path, &baseline_path)?;
                return Ok(VisualDiff {
                    matches: true,
                    diff_percent: 0.0,
                    diff_pixels: 0,
                    total_pixels: 0,
                    diff_image_path: None,
                });
            }
            return Err(Error::BaselineNotFound(baseline_path.display().to_string()));
        }

        // Byte-identical files need no pixel walk
        if hash_file(&evidence_path)? == hash_file(&baseline_path)? {
            debug!("{}/{} matches baseline exactly", scenario, shot);
            let img = image::open(&evidence_path)?;
            let (w, h) = img.dimensions();
            return Ok(VisualDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels: u64::from(w) * u64::from(h),
                diff_image_path: None,
            });
        }

        let evidence = image::open(&evidence_path)?;
        let baseline = image::open(&baseline_path)?;

        if evidence.dimensions() != baseline.dimensions() {
            warn!(
                "{}/{}: dimensions differ, evidence {:?} vs baseline {:?}",
                scenario,
                shot,
                evidence.dimensions(),
                baseline.dimensions()
            );
            // The overlapping region is still compared
        }

        let (diff_pixels, total_pixels, diff_img) =
            diff_images(&evidence.to_rgba8(), &baseline.to_rgba8());

        let diff_percent = (diff_pixels as f64 / total_pixels as f64) * 100.0;
        let matches = diff_percent <= threshold;

        let diff_image_path = if diff_pixels > 0 {
            let path = self.config.diff_dir.join(scenario).join(format!("{}.png", shot));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            diff_img.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "{}/{}: {:.2}% pixels differ (threshold {:.2}%)",
                scenario, shot, diff_percent, threshold
            );
        }

        Ok(VisualDiff {
            matches,
            diff_percent,
            diff_pixels,
            total_pixels,
            diff_image_path,
        })
    }

    /// Overwrite the baseline with the current evidence shot
    pub fn update_baseline(&self, scenario: &str, shot: &str) -> Result<()> {
        let evidence_path = self.evidence(scenario, shot);
        if !evidence_path.exists() {
            return Err(Error::Visual(format!(
                "cannot update baseline, evidence not found: {}",
                evidence_path.display()
            )));
        }
        copy_into(&evidence_path, &self.baseline(scenario, shot))?;
        info!("Updated baseline for {}/{}", scenario, shot);
        Ok(())
    }

    /// Record every evidence shot of a scenario as its baseline
    pub fn update_scenario_baselines(&self, scenario: &str) -> Result<usize> {
        let dir = self.config.evidence_dir.join(scenario);
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut updated = 0;
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "png").unwrap_or(false) {
                if let Some(shot) = path.file_stem() {
                    self.update_baseline(scenario, &shot.to_string_lossy())?;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }
}

/// Pixel-walk two images; returns (differing, total, marked diff image)
fn diff_images(evidence: &RgbaImage, baseline: &RgbaImage) -> (u64, u64, RgbaImage) {
    let (width, height) = evidence.dimensions();
    let mut diff_img = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;
    let total_pixels = u64::from(width) * u64::from(height);

    for y in 0..height.min(baseline.height()) {
        for x in 0..width.min(baseline.width()) {
            let a = evidence.get_pixel(x, y);
            let b = baseline.get_pixel(x, y);

            if pixels_differ(a, b) {
                diff_pixels += 1;
                diff_img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
            } else {
                // Dim matching pixels so the red stands out
                let c = a.channels();
                diff_img.put_pixel(x, y, image::Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128]));
            }
        }
    }

    (diff_pixels, total_pixels, diff_img)
}

fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    a.channels()
        .iter()
        .zip(b.channels())
        .any(|(&x, &y)| (i32::from(x) - i32::from(y)).abs() > CHANNEL_TOLERANCE)
}

fn copy_into(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to)?;
    Ok(())
}

fn hash_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}
