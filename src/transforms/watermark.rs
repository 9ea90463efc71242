//! Region-fill watermark eraser.
//!
//! The region is flooded with the mean color of the pixels around it, then the
//! patch is blurred and blended back so the seam does not show as a hard edge:
//!
//! 1. average the ring of `border_width` pixels around the region
//! 2. fill the region with that color
//! 3. blur a crop expanded by `border_width`, blend it over the original by
//!    `blend_alpha`, and inside the region ramp towards the blurred fill

use image::{imageops, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::Result,
    transforms::{filters, region::Rect, Transform},
    video::types::Frame,
};

/// Pixels at least this far from the region edge take the blurred fill verbatim
const FULL_WEIGHT_DISTANCE: u32 = 3;

fn default_border_width() -> u32 {
    10
}

fn default_smooth_kernel_size() -> u32 {
    3
}

fn default_blend_alpha() -> f32 {
    0.3
}

fn default_ramp_step() -> u32 {
    85
}

/// Watermark removal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Area to erase, `"X,Y,WIDTH,HEIGHT"` in the file format
    pub region: Rect,

    /// Width of the sampling ring and of the blended margin
    #[serde(default = "default_border_width")]
    pub border_width: u32,

    /// Blur kernel size; even values are bumped to the next odd one
    #[serde(default = "default_smooth_kernel_size")]
    pub smooth_kernel_size: u32,

    /// Opacity of the blurred patch over the whole blended crop (0.0-1.0)
    #[serde(default = "default_blend_alpha")]
    pub blend_alpha: f32,

    /// Mask increment per pixel of distance from the region edge
    #[serde(default = "default_ramp_step")]
    pub ramp_step: u32,
}

impl WatermarkConfig {
    pub fn new(region: Rect) -> Self {
        Self {
            region,
            border_width: default_border_width(),
            smooth_kernel_size: default_smooth_kernel_size(),
            blend_alpha: default_blend_alpha(),
            ramp_step: default_ramp_step(),
        }
    }
}

pub struct WatermarkEraser {
    config: WatermarkConfig,
}

impl WatermarkEraser {
    pub fn new(mut config: WatermarkConfig) -> Self {
        if config.smooth_kernel_size % 2 == 0 {
            config.smooth_kernel_size += 1;
        }
        config.blend_alpha = config.blend_alpha.clamp(0.0, 1.0);
        Self { config }
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    pub fn region(&self) -> Rect {
        self.config.region
    }

    /// Mean color of the ring around `region`, or of the whole image when the ring is empty
    pub fn average_color(&self, image: &RgbImage, region: &Rect) -> [u8; 3] {
        let (width, height) = image.dimensions();
        let mut sums = [0u64; 3];
        let mut count = 0u64;

        for (x, y) in region.ring_points(self.config.border_width, width, height) {
            let pixel = image.get_pixel(x, y);
            for c in 0..3 {
                sums[c] += pixel[c] as u64;
            }
            count += 1;
        }

        if count == 0 {
            debug!("Watermark ring is empty, falling back to the frame mean");
            for pixel in image.pixels() {
                for c in 0..3 {
                    sums[c] += pixel[c] as u64;
                }
            }
            count = (width as u64 * height as u64).max(1);
        }

        [
            (sums[0] / count) as u8,
            (sums[1] / count) as u8,
            (sums[2] / count) as u8,
        ]
    }

    pub fn fill_region(image: &mut RgbImage, region: &Rect, color: [u8; 3]) {
        for y in region.top()..region.bottom() {
            for x in region.left()..region.right() {
                image.put_pixel(x, y, Rgb(color));
            }
        }
    }

    fn mask_weight(&self, region: &Rect, x: u32, y: u32) -> f32 {
        let distance = region.distance_to_edge(x, y);
        if distance >= FULL_WEIGHT_DISTANCE {
            1.0
        } else {
            ((distance + 1) * self.config.ramp_step).min(255) as f32 / 255.0
        }
    }

    /// Blend the filled patch into its surroundings
    pub fn blend_seams(&self, original: &RgbImage, filled: &RgbImage, region: &Rect) -> RgbImage {
        let (width, height) = original.dimensions();
        let crop = region.expand_clipped(self.config.border_width, width, height);

        let original_crop = imageops::crop_imm(original, crop.x, crop.y, crop.width, crop.height).to_image();
        let filled_crop = imageops::crop_imm(filled, crop.x, crop.y, crop.width, crop.height).to_image();
        let blurred = filters::gaussian_blur(&filled_crop, self.config.smooth_kernel_size as f32 / 3.0);

        let alpha = self.config.blend_alpha;
        let mut result = filled.clone();

        for (lx, ly, blurred_px) in blurred.enumerate_pixels() {
            let (gx, gy) = (crop.x + lx, crop.y + ly);
            let original_px = original_crop.get_pixel(lx, ly);
            let weight = if region.contains(gx, gy) {
                self.mask_weight(region, gx, gy)
            } else {
                0.0
            };

            let mut out = [0u8; 3];
            for c in 0..3 {
                let o = original_px[c] as f32;
                let b = blurred_px[c] as f32;
                let blended = o * (1.0 - alpha) + b * alpha;
                let value = blended * (1.0 - weight) + b * weight;
                out[c] = value.round().clamp(0.0, 255.0) as u8;
            }
            result.put_pixel(gx, gy, Rgb(out));
        }

        result
    }

    /// Run all three stages on an RGB image
    pub fn erase(&self, image: &RgbImage) -> Result<RgbImage> {
        let region = self.config.region;
        region.validate_within(image.width(), image.height())?;

        let color = self.average_color(image, &region);
        debug!("Watermark fill color for region {}: {:?}", region, color);

        let mut filled = image.clone();
        Self::fill_region(&mut filled, &region, color);

        Ok(self.blend_seams(image, &filled, &region))
    }
}

impl Transform for WatermarkEraser {
    fn name(&self) -> &str {
        "watermark"
    }

    fn validate(&self) -> Result<()> {
        if self.config.region.is_empty() {
            return Err(crate::error::ValidationError::MalformedRegion {
                input: self.config.region.to_string(),
                reason: "width and height must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        frame.flatten_alpha();
        let Some(rgb) = frame.as_rgb() else {
            return Ok(());
        };
        let erased = self.erase(rgb)?;

        if let Some(target) = frame.as_rgb_mut() {
            *target = erased;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConverterError, ValidationError};

    fn eraser(region: &str) -> WatermarkEraser {
        WatermarkEraser::new(WatermarkConfig::new(Rect::parse(region).unwrap()))
    }

    #[test]
    fn test_uniform_red_frame_stays_red() {
        let eraser = eraser("10,10,50,50");
        let image = RgbImage::from_pixel(200, 200, Rgb([255, 0, 0]));

        assert_eq!(eraser.average_color(&image, &eraser.region()), [255, 0, 0]);

        let out = eraser.erase(&image).unwrap();
        assert!(out.pixels().all(|p| p.0 == [255, 0, 0]));
    }

    #[test]
    fn test_average_ignores_region_contents() {
        let eraser = eraser("20,20,10,10");
        let mut image = RgbImage::from_pixel(60, 60, Rgb([10, 200, 30]));
        // Watermark: bright white patch
        WatermarkEraser::fill_region(&mut image, &eraser.region(), [255, 255, 255]);

        assert_eq!(eraser.average_color(&image, &eraser.region()), [10, 200, 30]);
    }

    #[test]
    fn test_empty_ring_uses_frame_mean() {
        let eraser = eraser("0,0,2,2");
        let mut image = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        image.put_pixel(0, 0, Rgb([101, 7, 255]));
        // (101 + 0 + 0 + 0) / 4 = 25 (truncated)
        assert_eq!(eraser.average_color(&image, &eraser.region()), [25, 1, 63]);
    }

    #[test]
    fn test_pixels_outside_margin_untouched() {
        let eraser = eraser("30,30,20,20");
        let image = RgbImage::from_fn(100, 100, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, ((x + y) % 256) as u8]));
        let out = eraser.erase(&image).unwrap();

        let margin = eraser.region().expand_clipped(eraser.config().border_width, 100, 100);
        for (x, y, pixel) in out.enumerate_pixels() {
            if !margin.contains(x, y) {
                assert_eq!(pixel, image.get_pixel(x, y), "pixel ({}, {}) changed", x, y);
            }
        }
    }

    #[test]
    fn test_region_interior_takes_fill_color() {
        let eraser = eraser("20,20,20,20");
        let mut image = RgbImage::from_pixel(80, 80, Rgb([40, 80, 120]));
        WatermarkEraser::fill_region(&mut image, &eraser.region(), [250, 250, 250]);

        let out = eraser.erase(&image).unwrap();
        // Deep inside the region only the blurred flat fill remains
        assert_eq!(out.get_pixel(30, 30).0, [40, 80, 120]);
    }

    #[test]
    fn test_out_of_bounds_region_is_validation_error() {
        let eraser = eraser("150,150,100,100");
        let image = RgbImage::from_pixel(200, 200, Rgb([0, 0, 0]));
        let err = eraser.erase(&image).unwrap_err();
        assert!(matches!(
            err,
            ConverterError::Validation(ValidationError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_even_kernel_is_made_odd() {
        let mut config = WatermarkConfig::new(Rect::new(0, 0, 1, 1));
        config.smooth_kernel_size = 4;
        assert_eq!(WatermarkEraser::new(config).config().smooth_kernel_size, 5);
    }
}
