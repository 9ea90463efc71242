use std::str::FromStr;

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{FrameError, Result, ValidationError},
    transforms::Transform,
    video::types::{Frame, FramePixels},
};

/// Resampling filter used when a frame is scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResampleFilter {
    Nearest,
    Bilinear,
    Bicubic,
    Gaussian,
    #[default]
    Lanczos,
}

impl ResampleFilter {
    fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Target size constraints for frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub keep_aspect_ratio: bool,
    pub filter: ResampleFilter,
}

impl Default for ResizeSpec {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            keep_aspect_ratio: true,
            filter: ResampleFilter::default(),
        }
    }
}

impl ResizeSpec {
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_aspect_ratio(mut self, keep: bool) -> Self {
        self.keep_aspect_ratio = keep;
        self
    }

    pub fn with_filter(mut self, filter: ResampleFilter) -> Self {
        self.filter = filter;
        self
    }

    /// At least one dimension requested
    pub fn has_resize(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }

    pub fn check(&self) -> std::result::Result<(), ValidationError> {
        if self.width == Some(0) || self.height == Some(0) {
            return Err(ValidationError::InvalidResize {
                details: format!("target size must be positive, got {:?}x{:?}", self.width, self.height),
            });
        }
        Ok(())
    }

    /// Compute the target size for a frame of `original` dimensions
    ///
    /// With aspect ratio preserved the smaller of the requested scale factors wins,
    /// so the result always fits inside the requested box.
    pub fn target_size(&self, original: (u32, u32)) -> (u32, u32) {
        let (orig_w, orig_h) = original;

        if !self.has_resize() {
            return original;
        }

        if !self.keep_aspect_ratio {
            return (self.width.unwrap_or(orig_w), self.height.unwrap_or(orig_h));
        }

        let scale = match (self.width, self.height) {
            (Some(w), None) => w as f64 / orig_w as f64,
            (None, Some(h)) => h as f64 / orig_h as f64,
            (Some(w), Some(h)) => (w as f64 / orig_w as f64).min(h as f64 / orig_h as f64),
            (None, None) => return original,
        };

        // The requested dimension is taken verbatim; only the derived one is rounded
        let width = match (self.width, self.height) {
            (Some(w), None) => w,
            _ => (orig_w as f64 * scale).round() as u32,
        };
        let height = match (self.width, self.height) {
            (None, Some(h)) => h,
            _ => (orig_h as f64 * scale).round() as u32,
        };

        (width, height)
    }

    /// Parse `"120x120"`, `"w120"` or `"h120"`
    pub fn parse(input: &str) -> std::result::Result<Self, ValidationError> {
        let invalid = |details: String| ValidationError::InvalidResize { details };
        let normalized = input.trim().to_lowercase();

        let parse_dim = |s: &str| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| invalid(format!("'{}' is not a valid dimension in '{}'", s, input)))
        };

        let spec = if let Some((w, h)) = normalized.split_once('x') {
            Self::new(Some(parse_dim(w)?), Some(parse_dim(h)?))
        } else if let Some(w) = normalized.strip_prefix('w') {
            Self::new(Some(parse_dim(w)?), None)
        } else if let Some(h) = normalized.strip_prefix('h') {
            Self::new(None, Some(parse_dim(h)?))
        } else {
            return Err(invalid(format!(
                "unrecognized resize format '{}', expected WxH, wN or hN",
                input
            )));
        };

        spec.check()?;
        Ok(spec)
    }
}

impl FromStr for ResizeSpec {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Transform for ResizeSpec {
    fn name(&self) -> &str {
        "resize"
    }

    fn validate(&self) -> Result<()> {
        self.check()?;
        Ok(())
    }

    fn is_noop_for(&self, width: u32, height: u32) -> bool {
        self.target_size((width, height)) == (width, height)
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        let original = frame.dimensions();
        let (target_w, target_h) = self.target_size(original);

        if (target_w, target_h) == original {
            return Ok(());
        }
        if target_w == 0 || target_h == 0 {
            return Err(FrameError::ResizeFailed {
                reason: format!(
                    "{}x{} scales to an empty {}x{} frame",
                    original.0, original.1, target_w, target_h
                ),
            }
            .into());
        }

        debug!(
            "Resizing frame {} from {}x{} to {}x{}",
            frame.index(),
            original.0,
            original.1,
            target_w,
            target_h
        );

        let filter = self.filter.filter_type();
        let resized = match frame.pixels() {
            FramePixels::Rgb(img) => FramePixels::Rgb(imageops::resize(img, target_w, target_h, filter)),
            FramePixels::Rgba(img) => FramePixels::Rgba(imageops::resize(img, target_w, target_h, filter)),
        };
        frame.set_pixels(resized);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_without_dimensions() {
        let spec = ResizeSpec::default();
        assert!(!spec.has_resize());
        assert_eq!(spec.target_size((640, 480)), (640, 480));
        assert!(spec.is_noop_for(640, 480));
    }

    #[test]
    fn test_width_only_rounds_height() {
        // 480 * 100 / 640 = 75
        assert_eq!(ResizeSpec::new(Some(100), None).target_size((640, 480)), (100, 75));
        // 333 * 100 / 1000 = 33.3 -> 33, 335 -> 33.5 -> 34
        assert_eq!(ResizeSpec::new(Some(100), None).target_size((1000, 333)), (100, 33));
        assert_eq!(ResizeSpec::new(Some(100), None).target_size((1000, 335)), (100, 34));
    }

    #[test]
    fn test_both_dimensions_fit_inside() {
        let spec = ResizeSpec::new(Some(120), Some(120));
        // Landscape: width limits
        assert_eq!(spec.target_size((640, 480)), (120, 90));
        // Portrait: height limits
        assert_eq!(spec.target_size((480, 640)), (90, 120));
    }

    #[test]
    fn test_stretch_takes_dimensions_literally() {
        let spec = ResizeSpec::new(Some(100), Some(10)).with_aspect_ratio(false);
        assert_eq!(spec.target_size((640, 480)), (100, 10));

        let spec = ResizeSpec::new(None, Some(10)).with_aspect_ratio(false);
        assert_eq!(spec.target_size((640, 480)), (640, 10));
    }

    #[test]
    fn test_parse_resize_strings() {
        assert_eq!(ResizeSpec::parse("120x90").unwrap(), ResizeSpec::new(Some(120), Some(90)));
        assert_eq!(ResizeSpec::parse("W240").unwrap(), ResizeSpec::new(Some(240), None));
        assert_eq!(ResizeSpec::parse("h64").unwrap(), ResizeSpec::new(None, Some(64)));
        assert!(ResizeSpec::parse("big").is_err());
        assert!(ResizeSpec::parse("0x10").is_err());
    }

    #[test]
    fn test_apply_resizes_frame() {
        let mut frame = Frame::new_filled(3, 64, 32, [1, 2, 3]);
        ResizeSpec::new(Some(16), None)
            .with_filter(ResampleFilter::Nearest)
            .apply(&mut frame)
            .unwrap();
        assert_eq!(frame.dimensions(), (16, 8));
        assert_eq!(frame.index(), 3);
        assert_eq!(frame.as_rgb().unwrap().get_pixel(5, 5).0, [1, 2, 3]);
    }
}
