use image::{ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Pixel storage for a frame. Frames start out RGB and become RGBA once keyed.
#[derive(Clone, Debug)]
pub enum FramePixels {
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

/// Represents a single sampled video frame
///
/// Wraps the pixel buffer together with the index of the source frame it was
/// decoded from. A frame is owned by exactly one pipeline task.
#[derive(Clone, Debug)]
pub struct Frame {
    index: u64,
    pixels: FramePixels,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(index: u64, buffer: RgbImage) -> Self {
        Self {
            index,
            pixels: FramePixels::Rgb(buffer),
        }
    }

    /// Create a frame that already carries an alpha channel
    pub fn from_rgba(index: u64, buffer: RgbaImage) -> Self {
        Self {
            index,
            pixels: FramePixels::Rgba(buffer),
        }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(index: u64, width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| Rgb(color));
        Self::new(index, buffer)
    }

    /// Source frame index inside the video
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn width(&self) -> u32 {
        match &self.pixels {
            FramePixels::Rgb(img) => img.width(),
            FramePixels::Rgba(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.pixels {
            FramePixels::Rgb(img) => img.height(),
            FramePixels::Rgba(img) => img.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self.pixels, FramePixels::Rgba(_))
    }

    pub fn pixels(&self) -> &FramePixels {
        &self.pixels
    }

    /// Replace the pixel buffer, keeping the source index
    pub fn set_pixels(&mut self, pixels: FramePixels) {
        self.pixels = pixels;
    }

    /// Get the RGB buffer if the frame has no alpha channel
    pub fn as_rgb(&self) -> Option<&RgbImage> {
        match &self.pixels {
            FramePixels::Rgb(img) => Some(img),
            FramePixels::Rgba(_) => None,
        }
    }

    pub fn as_rgb_mut(&mut self) -> Option<&mut RgbImage> {
        match &mut self.pixels {
            FramePixels::Rgb(img) => Some(img),
            FramePixels::Rgba(_) => None,
        }
    }

    pub fn as_rgba(&self) -> Option<&RgbaImage> {
        match &self.pixels {
            FramePixels::Rgba(img) => Some(img),
            FramePixels::Rgb(_) => None,
        }
    }

    /// Color channels only; alpha is discarded
    pub fn to_rgb(&self) -> RgbImage {
        match &self.pixels {
            FramePixels::Rgb(img) => img.clone(),
            FramePixels::Rgba(img) => ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
                let p = img.get_pixel(x, y);
                Rgb([p[0], p[1], p[2]])
            }),
        }
    }

    /// RGBA view of the frame; RGB frames become fully opaque
    pub fn to_rgba(&self) -> RgbaImage {
        match &self.pixels {
            FramePixels::Rgba(img) => img.clone(),
            FramePixels::Rgb(img) => ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
                let p = img.get_pixel(x, y);
                Rgba([p[0], p[1], p[2], 255])
            }),
        }
    }

    /// Drop the alpha channel in place
    pub fn flatten_alpha(&mut self) {
        if self.has_alpha() {
            self.pixels = FramePixels::Rgb(self.to_rgb());
        }
    }

    /// Promote the frame to RGBA in place
    pub fn ensure_alpha(&mut self) {
        if !self.has_alpha() {
            self.pixels = FramePixels::Rgba(self.to_rgba());
        }
    }
}

/// Immutable video metadata produced once per file by the decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    pub duration: f64,
}

impl VideoDescriptor {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
