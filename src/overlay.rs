//! Caption overlay for product photos
//!
//! Draws a translucent black band along the bottom of the photo and centers
//! the product label in it. Works on a copy: the source file is never
//! touched and the labeled image is written to a shared working directory.

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Band height as a fraction of image height
pub const BAND_HEIGHT_RATIO: f32 = 0.12;
/// Opacity of the black band
pub const BAND_OPACITY: f32 = 0.35;
/// Label pixel height per pixel of `min(width, height)`
const TEXT_SCALE_RATIO: f32 = 0.06;
const MIN_TEXT_PX: f32 = 8.0;
/// Labels wider than this share of the image are shrunk to fit
const MAX_TEXT_WIDTH_RATIO: f32 = 0.94;
const OVERLAY_SUFFIX: &str = "_overlay";

/// DejaVu Sans, shipped in `assets/` and compiled in as the last resort
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// The compiled-in label font
pub fn bundled_font() -> Result<FontVec> {
    FontVec::try_from_vec(BUNDLED_FONT.to_vec()).context("bundled label font is invalid")
}

/// Load a TrueType/OpenType font for labels
pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = fs::read(path).with_context(|| format!("failed to read font {:?}", path))?;
    FontVec::try_from_vec(bytes).with_context(|| format!("invalid font file {:?}", path))
}

/// First loadable font among `candidates`
pub fn discover_font<P: AsRef<Path>>(candidates: &[P]) -> Option<(FontVec, PathBuf)> {
    candidates.iter().find_map(|candidate| {
        let path = candidate.as_ref();
        if !path.is_file() {
            return None;
        }
        match load_font(path) {
            Ok(font) => Some((font, path.to_path_buf())),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unusable font");
                None
            }
        }
    })
}

/// `<work_dir>/<parent dir>_<stem>_overlay.<ext>`; namespacing by the parent
/// directory keeps identically named files from different stores apart.
pub fn overlay_path(source: &Path, work_dir: &Path) -> PathBuf {
    let parent = source
        .parent()
        .and_then(|p| p.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match source.extension() {
        Some(ext) => format!("{parent}_{stem}{OVERLAY_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{parent}_{stem}{OVERLAY_SUFFIX}"),
    };
    work_dir.join(file_name)
}

/// Darken the bottom band of `img` toward black at [`BAND_OPACITY`].
/// Returns the band's top row and height.
pub fn darken_band(img: &mut RgbImage) -> (u32, u32) {
    let (width, height) = img.dimensions();
    let band_height = ((height as f32) * BAND_HEIGHT_RATIO) as u32;
    let top = height - band_height;
    let keep = 1.0 - BAND_OPACITY;
    for y in top..height {
        for x in 0..width {
            let pixel = img.get_pixel_mut(x, y);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * keep).round() as u8;
            }
        }
    }
    (top, band_height)
}

pub struct OverlayRenderer {
    font: Option<FontVec>,
    placeholder: PathBuf,
}

impl OverlayRenderer {
    /// Without a font every call degrades to returning the unlabeled image
    pub fn new(font: Option<FontVec>, placeholder: impl Into<PathBuf>) -> Self {
        Self {
            font,
            placeholder: placeholder.into(),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Write a labeled copy of `image` into `work_dir` and return its path.
    ///
    /// Returns `image` unchanged when it does not exist, is the placeholder,
    /// or rendering fails for any reason.
    pub fn apply_label(&self, image: &Path, label: &str, work_dir: &Path) -> PathBuf {
        if !image.exists() || image == self.placeholder {
            return image.to_path_buf();
        }
        let output = overlay_path(image, work_dir);
        match self.render(image, label, &output) {
            Ok(()) => {
                debug!(source = %image.display(), output = %output.display(), label, "applied label");
                output
            }
            Err(e) => {
                warn!(source = %image.display(), label, error = %e, "label overlay failed, using unlabeled image");
                image.to_path_buf()
            }
        }
    }

    fn render(&self, source: &Path, label: &str, output: &Path) -> Result<()> {
        let font = self
            .font
            .as_ref()
            .context("no label font available")?;
        let mut img = image::ImageReader::open(source)?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("failed to decode {:?}", source))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        anyhow::ensure!(width > 0 && height > 0, "image has no pixels");

        let (band_top, band_height) = darken_band(&mut img);

        let label = label.trim();
        if !label.is_empty() {
            let scale = fit_scale(font, label, width, height);
            let (text_w, text_h) = text_size(scale, font, label);
            let x = (width as i32 - text_w as i32) / 2;
            let y = band_top as i32 + (band_height as i32 - text_h as i32) / 2;
            draw_text_mut(&mut img, Rgb([255, 255, 255]), x, y, scale, font, label);
        }

        if let Some(dir) = output.parent() {
            fs::create_dir_all(dir)?;
        }
        img.save(output)
            .with_context(|| format!("failed to write {:?}", output))?;
        Ok(())
    }
}

/// Text scale proportional to the shorter side, shrunk if the label would
/// overflow the image width.
fn fit_scale(font: &FontVec, label: &str, width: u32, height: u32) -> PxScale {
    let base = (width.min(height) as f32 * TEXT_SCALE_RATIO).max(MIN_TEXT_PX);
    let (text_w, _) = text_size(PxScale::from(base), font, label);
    let max_w = width as f32 * MAX_TEXT_WIDTH_RATIO;
    if text_w as f32 > max_w && text_w > 0 {
        PxScale::from((base * max_w / text_w as f32).max(MIN_TEXT_PX))
    } else {
        PxScale::from(base)
    }
}
