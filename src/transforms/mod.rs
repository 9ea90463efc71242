//! # Frame Transforms
//!
//! Per-frame corrections applied between decoding and encoding. Every stage
//! implements the [`Transform`] trait and is wrapped in a [`FrameTransform`]
//! variant so a video's processing chain can be built once from the
//! configuration and shared read-only by every worker.
//!
//! ## Stages, in chain order
//!
//! - **Resize**: fit-inside or stretch scaling ([`ResizeSpec`])
//! - **Enhance**: optional brightness, contrast and sharpening ([`Enhancer`])
//! - **Watermark**: region fill plus seam blending ([`WatermarkEraser`])
//! - **ChromaKey**: background matting over the whole frame set ([`ChromaKeyEngine`])
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mp4_converter::config::ProcessConfig;
//! use mp4_converter::transforms::TransformChain;
//! use mp4_converter::video::types::Frame;
//!
//! let chain = TransformChain::from_config(&ProcessConfig::default());
//! let mut frame = Frame::new_filled(0, 320, 240, [0, 255, 0]);
//! chain.apply_frame(&mut frame).unwrap();
//! let frames = chain.finish(vec![frame]);
//! ```

pub mod chroma_key;
pub mod enhance;
pub mod filters;
pub mod region;
pub mod resize;
pub mod traits;
pub mod watermark;

pub use chroma_key::{AlphaMask, ChromaKeyConfig, ChromaKeyEngine, ChromaPreset, KeyAnalysis};
pub use enhance::{EnhanceConfig, Enhancer, SharpenParams};
pub use region::Rect;
pub use resize::{ResampleFilter, ResizeSpec};
pub use traits::Transform;
pub use watermark::{WatermarkConfig, WatermarkEraser};

use tracing::debug;

use crate::{config::ProcessConfig, error::Result, video::types::Frame};

/// One stage of the processing chain
pub enum FrameTransform {
    Resize(ResizeSpec),
    Enhance(Enhancer),
    Watermark(WatermarkEraser),
    ChromaKey(ChromaKeyEngine),
}

impl FrameTransform {
    fn inner(&self) -> &dyn Transform {
        match self {
            Self::Resize(t) => t,
            Self::Enhance(t) => t,
            Self::Watermark(t) => t,
            Self::ChromaKey(t) => t,
        }
    }

    pub fn name(&self) -> &str {
        self.inner().name()
    }

    pub fn apply(&self, frame: &mut Frame) -> Result<()> {
        self.inner().apply(frame)
    }

    pub fn validate(&self) -> Result<()> {
        self.inner().validate()
    }

    pub fn is_noop_for(&self, width: u32, height: u32) -> bool {
        self.inner().is_noop_for(width, height)
    }

    /// Stages that run once over the whole frame set instead of frame by frame
    pub fn is_batch_stage(&self) -> bool {
        matches!(self, Self::ChromaKey(_))
    }
}

/// Ordered list of stages for one video
#[derive(Default)]
pub struct TransformChain {
    stages: Vec<FrameTransform>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the chain for the enabled stages of `config`
    pub fn from_config(config: &ProcessConfig) -> Self {
        let mut chain = Self::new();

        if let Some(resize) = &config.resize {
            chain.push(FrameTransform::Resize(resize.clone()));
        }
        if let Some(enhance) = &config.enhance {
            chain.push(FrameTransform::Enhance(Enhancer::new(enhance.clone())));
        }
        if let Some(watermark) = &config.watermark {
            chain.push(FrameTransform::Watermark(WatermarkEraser::new(watermark.clone())));
        }
        if let Some(chroma) = &config.chroma_key {
            chain.push(FrameTransform::ChromaKey(ChromaKeyEngine::new(chroma.clone())));
        }

        chain
    }

    pub fn push(&mut self, stage: FrameTransform) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[FrameTransform] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(FrameTransform::name).collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.stages.iter().try_for_each(FrameTransform::validate)
    }

    /// Frame size after every resize stage has run on a `width` x `height` input
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        self.stages.iter().fold((width, height), |size, stage| match stage {
            FrameTransform::Resize(spec) => spec.target_size(size),
            _ => size,
        })
    }

    /// Check size-dependent parameters against the source dimensions, before any frame is decoded
    pub fn validate_for(&self, width: u32, height: u32) -> Result<()> {
        let mut size = (width, height);
        for stage in &self.stages {
            match stage {
                FrameTransform::Resize(spec) => size = spec.target_size(size),
                FrameTransform::Watermark(eraser) => eraser.region().validate_within(size.0, size.1)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Run the per-frame stages in order, stopping at the first failure
    pub fn apply_frame(&self, frame: &mut Frame) -> Result<()> {
        for stage in self.stages.iter().filter(|s| !s.is_batch_stage()) {
            let (width, height) = frame.dimensions();
            if stage.is_noop_for(width, height) {
                debug!("Skipping {} on frame {}: no-op at {}x{}", stage.name(), frame.index(), width, height);
                continue;
            }
            debug!("Applying {} to frame {}", stage.name(), frame.index());
            stage.apply(frame)?;
        }
        Ok(())
    }

    /// Run the batch stages over the processed frame set
    pub fn finish(&self, mut frames: Vec<Frame>) -> Vec<Frame> {
        for stage in self.stages.iter().filter(|s| s.is_batch_stage()) {
            if let FrameTransform::ChromaKey(engine) = stage {
                frames = engine.process_frames(frames);
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConverterError, ValidationError};

    fn config_with_all_stages() -> ProcessConfig {
        let mut config = ProcessConfig::default();
        config.resize = Some(ResizeSpec::new(Some(100), None));
        config.enhance = Some(EnhanceConfig {
            brightness: Some(5),
            ..EnhanceConfig::default()
        });
        config.watermark = Some(WatermarkConfig::new(Rect::new(5, 5, 10, 10)));
        config.chroma_key = Some(ChromaKeyConfig::green_screen());
        config
    }

    #[test]
    fn test_chain_order_follows_stage_order() {
        let chain = TransformChain::from_config(&config_with_all_stages());
        assert_eq!(chain.names(), vec!["resize", "enhance", "watermark", "chroma_key"]);
    }

    #[test]
    fn test_default_config_builds_empty_chain() {
        let chain = TransformChain::from_config(&ProcessConfig::default());
        assert!(chain.is_empty());

        let mut frame = Frame::new_filled(0, 4, 4, [1, 2, 3]);
        chain.apply_frame(&mut frame).unwrap();
        assert!(!frame.has_alpha());
    }

    #[test]
    fn test_region_is_checked_against_resized_frame() {
        let mut config = ProcessConfig::default();
        config.resize = Some(ResizeSpec::new(Some(100), None));
        config.watermark = Some(WatermarkConfig::new(Rect::new(80, 10, 50, 50)));
        let chain = TransformChain::from_config(&config);

        // Fits the 640x480 source, but not the 100x75 resized frame
        assert_eq!(chain.output_size(640, 480), (100, 75));
        let err = chain.validate_for(640, 480).unwrap_err();
        assert!(matches!(
            err,
            ConverterError::Validation(ValidationError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_full_chain_produces_keyed_frames() {
        let chain = TransformChain::from_config(&config_with_all_stages());
        let mut frame = Frame::new_filled(4, 200, 100, [0, 255, 0]);

        chain.apply_frame(&mut frame).unwrap();
        assert_eq!(frame.dimensions(), (100, 50));
        assert!(!frame.has_alpha());

        let frames = chain.finish(vec![frame]);
        assert_eq!(frames[0].index(), 4);
        assert!(frames[0].has_alpha());
    }

    #[test]
    fn test_noop_stages_leave_frame_untouched() {
        let mut config = ProcessConfig::default();
        config.resize = Some(ResizeSpec::new(Some(40), Some(30)));
        config.enhance = Some(EnhanceConfig::default());
        let chain = TransformChain::from_config(&config);
        assert_eq!(chain.names(), vec!["resize", "enhance"]);
        assert!(chain.stages().iter().all(|s| s.is_noop_for(40, 30)));
        assert!(!chain.stages()[0].is_noop_for(80, 60));

        let mut frame = Frame::new_filled(2, 40, 30, [9, 8, 7]);
        let before = frame.to_rgb();
        chain.apply_frame(&mut frame).unwrap();
        assert_eq!(frame.to_rgb(), before);

        let mut large = Frame::new_filled(3, 80, 60, [9, 8, 7]);
        chain.apply_frame(&mut large).unwrap();
        assert_eq!(large.dimensions(), (40, 30));
    }
}
