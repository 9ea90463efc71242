use image::imageops;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{FrameError, Result},
    transforms::Transform,
    video::types::{Frame, FramePixels},
};

/// Unsharp-mask parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpenParams {
    pub sigma: f32,
    pub threshold: i32,
}

impl Default for SharpenParams {
    // Mild sharpening that reads well on small panels
    fn default() -> Self {
        Self {
            sigma: 1.0,
            threshold: 3,
        }
    }
}

/// Optional pixel adjustments applied after resizing, in field order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Added to every channel (-255..=255)
    pub brightness: Option<i32>,

    /// Contrast change in percent; negative values flatten the image
    pub contrast: Option<f32>,

    pub sharpen: Option<SharpenParams>,
}

impl EnhanceConfig {
    pub fn is_empty(&self) -> bool {
        self.brightness.is_none() && self.contrast.is_none() && self.sharpen.is_none()
    }
}

/// Applies the configured adjustments, skipping any that cannot run
pub struct Enhancer {
    config: EnhanceConfig,
}

impl Enhancer {
    pub fn new(config: EnhanceConfig) -> Self {
        Self { config }
    }

    fn brighten(frame: &mut Frame, value: i32) -> Result<()> {
        if !(-255..=255).contains(&value) {
            return Err(FrameError::EnhanceFailed {
                operation: "brightness".to_string(),
                reason: format!("{} is outside -255..=255", value),
            }
            .into());
        }
        let pixels = match frame.pixels() {
            FramePixels::Rgb(img) => FramePixels::Rgb(imageops::brighten(img, value)),
            FramePixels::Rgba(img) => FramePixels::Rgba(imageops::brighten(img, value)),
        };
        frame.set_pixels(pixels);
        Ok(())
    }

    fn contrast(frame: &mut Frame, percent: f32) -> Result<()> {
        if !percent.is_finite() {
            return Err(FrameError::EnhanceFailed {
                operation: "contrast".to_string(),
                reason: format!("{} is not a finite percentage", percent),
            }
            .into());
        }
        let pixels = match frame.pixels() {
            FramePixels::Rgb(img) => FramePixels::Rgb(imageops::contrast(img, percent)),
            FramePixels::Rgba(img) => FramePixels::Rgba(imageops::contrast(img, percent)),
        };
        frame.set_pixels(pixels);
        Ok(())
    }

    fn sharpen(frame: &mut Frame, params: SharpenParams) -> Result<()> {
        if !(params.sigma.is_finite() && params.sigma > 0.0) {
            return Err(FrameError::EnhanceFailed {
                operation: "sharpen".to_string(),
                reason: format!("sigma must be positive, got {}", params.sigma),
            }
            .into());
        }
        let pixels = match frame.pixels() {
            FramePixels::Rgb(img) => FramePixels::Rgb(imageops::unsharpen(img, params.sigma, params.threshold)),
            FramePixels::Rgba(img) => FramePixels::Rgba(imageops::unsharpen(img, params.sigma, params.threshold)),
        };
        frame.set_pixels(pixels);
        Ok(())
    }
}

impl Transform for Enhancer {
    fn name(&self) -> &str {
        "enhance"
    }

    fn is_noop_for(&self, _width: u32, _height: u32) -> bool {
        self.config.is_empty()
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        let index = frame.index();
        let report = |result: Result<()>| {
            if let Err(e) = result {
                warn!("Skipping adjustment on frame {}: {}", index, e);
            }
        };

        if let Some(value) = self.config.brightness {
            report(Self::brighten(frame, value));
        }
        if let Some(percent) = self.config.contrast {
            report(Self::contrast(frame, percent));
        }
        if let Some(params) = self.config.sharpen {
            report(Self::sharpen(frame, params));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness_offsets_channels() {
        let mut frame = Frame::new_filled(0, 4, 4, [100, 100, 250]);
        let enhancer = Enhancer::new(EnhanceConfig {
            brightness: Some(10),
            ..EnhanceConfig::default()
        });
        enhancer.apply(&mut frame).unwrap();
        assert_eq!(frame.as_rgb().unwrap().get_pixel(0, 0).0, [110, 110, 255]);
    }

    #[test]
    fn test_invalid_adjustment_is_skipped() {
        let mut frame = Frame::new_filled(0, 4, 4, [50, 60, 70]);
        let enhancer = Enhancer::new(EnhanceConfig {
            brightness: Some(1000),
            sharpen: Some(SharpenParams { sigma: -1.0, threshold: 0 }),
            ..EnhanceConfig::default()
        });
        assert!(enhancer.apply(&mut frame).is_ok());
        assert_eq!(frame.as_rgb().unwrap().get_pixel(1, 1).0, [50, 60, 70]);
    }

    #[test]
    fn test_empty_config_is_noop() {
        assert!(Enhancer::new(EnhanceConfig::default()).is_noop_for(10, 10));
    }
}
