//! Chroma-key matting: turns a green (or blue) screen background transparent.
//!
//! The matte is the product of four signals, each in `[0, 1]`:
//!
//! - RGB distance from the key color against `threshold`
//! - an HSV hue band test on the 8-bit hue scale (0-180)
//! - a green dominance suppression factor
//! - an edge spill factor for greenish pixels near the key color
//!
//! The result is optionally softened, then feathered along its edges.

use std::collections::HashMap;

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{FrameError, Result},
    transforms::{filters, Transform},
    video::types::Frame,
};

/// Hue band in the 8-bit HSV convention treated as "green screen"
const HUE_RANGE: (u8, u8) = (35, 85);
const MIN_SATURATION: u8 = 30;
const MIN_VALUE: u8 = 30;

/// Edge spill detection
const EDGE_DISTANCE: f32 = 60.0;
const EDGE_STRENGTH: f32 = 0.7;
const EDGE_FLOOR: f32 = 0.7;

/// Green pixel share above which keying is recommended
const RECOMMEND_RATIO: f64 = 0.3;

/// Built-in keying presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChromaPreset {
    #[default]
    Green,
    Blue,
}

impl ChromaPreset {
    pub fn config(self) -> ChromaKeyConfig {
        match self {
            Self::Green => ChromaKeyConfig::green_screen(),
            Self::Blue => ChromaKeyConfig::blue_screen(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaKeyConfig {
    /// Key color when auto detection is off or finds no green screen
    pub target_color: [u8; 3],

    /// RGB distance below which a pixel counts as background
    pub threshold: f32,

    /// Blur sigma applied to the whole matte (0 disables)
    pub softness: u32,

    /// Blur sigma applied along matte edges only (0 disables)
    pub feather_radius: u32,

    /// Use the dominant frame color as the key when it is clearly green
    pub auto_detect: bool,
}

impl Default for ChromaKeyConfig {
    fn default() -> Self {
        Self::green_screen()
    }
}

impl ChromaKeyConfig {
    pub fn green_screen() -> Self {
        Self {
            target_color: [0, 255, 0],
            threshold: 60.0,
            softness: 3,
            feather_radius: 2,
            auto_detect: true,
        }
    }

    pub fn blue_screen() -> Self {
        Self {
            target_color: [0, 0, 255],
            ..Self::green_screen()
        }
    }

    /// Always true once constructed
    pub fn enabled(&self) -> bool {
        true
    }
}

/// Single-channel opacity map, same size as the frame it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl AlphaMask {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    fn blurred(&self, sigma: f32) -> Vec<u8> {
        let plane: Vec<f32> = self.data.iter().map(|&v| v as f32).collect();
        filters::blur_plane(&plane, self.width, self.height, 1, sigma)
            .into_iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect()
    }

    /// Blur the whole matte
    pub fn soften(&mut self, sigma: f32) {
        if sigma > 0.0 {
            self.data = self.blurred(sigma);
        }
    }

    /// Replace matte values with a blurred copy, but only within `radius` of a matte transition
    pub fn feather(&mut self, radius: f32) {
        if radius <= 0.0 {
            return;
        }
        let edges = filters::transitions(&self.data, self.width, self.height);
        let band = filters::dilate(&edges, self.width, self.height, radius.ceil() as u32);
        let blurred = self.blurred(radius);

        for ((value, soft), on_edge) in self.data.iter_mut().zip(blurred).zip(band) {
            if on_edge {
                *value = soft;
            }
        }
    }
}

/// Summary of what the engine would key on for a frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyAnalysis {
    pub dominant_color: Option<[u8; 3]>,
    pub is_green_screen: bool,
    pub key_color: [u8; 3],
    pub green_ratio: f64,
    pub keying_recommended: bool,
}

impl std::fmt::Display for KeyAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [r, g, b] = self.key_color;
        match self.dominant_color {
            Some([dr, dg, db]) => writeln!(f, "  Dominant color: ({}, {}, {})", dr, dg, db)?,
            None => writeln!(f, "  Dominant color: none")?,
        }
        writeln!(f, "  Green screen:   {}", if self.is_green_screen { "yes" } else { "no" })?;
        writeln!(f, "  Key color:      ({}, {}, {})", r, g, b)?;
        writeln!(f, "  Green pixels:   {:.1}%", self.green_ratio * 100.0)?;
        write!(
            f,
            "  Keying:         {}",
            if self.keying_recommended { "recommended" } else { "not recommended" }
        )
    }
}

/// OpenCV-style 8-bit HSV: hue in 0..=180, saturation and value in 0..=255
fn rgb_to_hsv8([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let saturation = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    ((hue / 2.0).round() as u8, saturation.round() as u8, max as u8)
}

fn color_distance(pixel: [u8; 3], target: [u8; 3]) -> f32 {
    let sum: f32 = (0..3)
        .map(|c| {
            let d = pixel[c] as f32 - target[c] as f32;
            d * d
        })
        .sum();
    sum.sqrt()
}

pub struct ChromaKeyEngine {
    config: ChromaKeyConfig,
}

impl ChromaKeyEngine {
    pub fn new(config: ChromaKeyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChromaKeyConfig {
        &self.config
    }

    /// Most frequent exact color; ties go to the smallest color value
    pub fn dominant_color(image: &RgbImage) -> Option<[u8; 3]> {
        let mut counts: HashMap<[u8; 3], u32> = HashMap::new();
        for pixel in image.pixels() {
            *counts.entry(pixel.0).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .max_by(|(color_a, count_a), (color_b, count_b)| count_a.cmp(count_b).then(color_b.cmp(color_a)))
            .map(|(color, _)| color)
    }

    pub fn is_green_screen_color([r, g, b]: [u8; 3]) -> bool {
        let (rf, gf, bf) = (r as f32, g as f32, b as f32);
        gf > rf * 1.5 && gf > bf * 1.5 && g > 100 && r < 100 && b < 100
    }

    /// Pick the key color for a frame, falling back to the configured one
    pub fn detect_key_color(&self, image: &RgbImage) -> [u8; 3] {
        match Self::dominant_color(image) {
            Some(color) if Self::is_green_screen_color(color) => color,
            Some(_) => self.config.target_color,
            None => {
                warn!("Dominant color analysis failed on an empty frame, using configured key color");
                self.config.target_color
            }
        }
    }

    /// Per-pixel spill flags, already dilated and scaled to attenuation strength
    fn detect_green_edges(image: &RgbImage, key: [u8; 3]) -> Vec<f32> {
        let (width, height) = image.dimensions();
        let flags: Vec<bool> = image
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                let (rf, gf, bf) = (r as f32, g as f32, b as f32);
                color_distance(p.0, key) < EDGE_DISTANCE && gf / 255.0 > 0.5 && gf > rf * 1.3 && gf > bf * 1.3
            })
            .collect();

        filters::dilate(&flags, width, height, 1)
            .into_iter()
            .map(|flag| if flag { EDGE_STRENGTH } else { 0.0 })
            .collect()
    }

    /// Build the matte for `image` against `key`, including softening
    pub fn create_alpha_mask(&self, image: &RgbImage, key: [u8; 3]) -> AlphaMask {
        let (width, height) = image.dimensions();
        let edges = Self::detect_green_edges(image, key);
        let (hue_lo, hue_hi) = HUE_RANGE;

        let data: Vec<u8> = image
            .pixels()
            .zip(edges)
            .map(|(pixel, edge)| {
                let [r, g, b] = pixel.0;

                let distance = if color_distance(pixel.0, key) > self.config.threshold { 1.0 } else { 0.0 };

                let (h, s, v) = rgb_to_hsv8(pixel.0);
                let in_band = (hue_lo..=hue_hi).contains(&h) && s >= MIN_SATURATION && v >= MIN_VALUE;
                let hue = if in_band { 0.0 } else { 1.0 };

                let dominance = ((g as f32 - (r.max(b) as f32) * 1.5) / 255.0).max(0.0);
                let suppression = 1.0 - dominance.min(1.0);

                let spill = EDGE_FLOOR.max(1.0 - edge);

                let combined = (distance * hue * suppression * spill).clamp(0.0, 1.0);
                (combined * 255.0) as u8
            })
            .collect();

        let mut mask = AlphaMask::new(width, height, data);
        mask.soften(self.config.softness as f32);
        mask
    }

    /// Key out the background of an RGB image
    pub fn remove_background(&self, image: &RgbImage, auto_detect: bool) -> Result<RgbaImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(FrameError::MatteFailed {
                reason: format!("cannot key an empty {}x{} frame", width, height),
            }
            .into());
        }

        let key = if auto_detect {
            self.detect_key_color(image)
        } else {
            self.config.target_color
        };
        debug!("Keying against color {:?}", key);

        let mut mask = self.create_alpha_mask(image, key);
        mask.feather(self.config.feather_radius as f32);

        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let Rgb([r, g, b]) = *image.get_pixel(x, y);
            Rgba([r, g, b, mask.get(x, y)])
        }))
    }

    /// Key every frame of a video; frames that fail are passed through as opaque RGBA
    pub fn process_frames(&self, frames: Vec<Frame>) -> Vec<Frame> {
        let total = frames.len();
        info!("Chroma keying {} frames", total);

        frames
            .into_iter()
            .map(|mut frame| {
                if let Err(e) = self.apply(&mut frame) {
                    warn!("Keying failed for frame {}, keeping it opaque: {}", frame.index(), e);
                    frame.ensure_alpha();
                }
                frame
            })
            .collect()
    }

    /// Preview the key decision for a frame without producing output
    pub fn analyze(&self, image: &RgbImage) -> KeyAnalysis {
        let dominant_color = Self::dominant_color(image);
        let is_green_screen = dominant_color.is_some_and(Self::is_green_screen_color);
        let key_color = self.detect_key_color(image);

        let total = image.width() as u64 * image.height() as u64;
        let green = image.pixels().filter(|p| Self::is_green_screen_color(p.0)).count() as u64;
        let green_ratio = if total == 0 { 0.0 } else { green as f64 / total as f64 };

        KeyAnalysis {
            dominant_color,
            is_green_screen,
            key_color,
            green_ratio,
            keying_recommended: green_ratio > RECOMMEND_RATIO,
        }
    }
}

impl Transform for ChromaKeyEngine {
    fn name(&self) -> &str {
        "chroma_key"
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        let rgb = frame.to_rgb();
        let keyed = self.remove_background(&rgb, self.config.auto_detect)?;
        *frame = Frame::from_rgba(frame.index(), keyed);
        Ok(())
    }
}
