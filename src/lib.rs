//! # mp4-converter
//!
//! Turn video clips into display-ready frame sets for embedded screens.
//!
//! Every video in an input directory is sampled into frames, run through a
//! fixed chain of corrections and handed to an encoder once per video:
//!
//! 1. **Resize** - fit-inside or stretch scaling
//! 2. **Enhance** - optional brightness, contrast and sharpening
//! 3. **Watermark** - region fill with seam blending
//! 4. **Chroma key** - green or blue screen matting to RGBA
//! 5. **Encode** - RGB565 via an external converter, or PNG files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mp4_converter::{
//!     batch::BatchProcessor,
//!     config::ProcessConfig,
//!     transforms::{ChromaKeyConfig, ResizeSpec},
//! };
//! use std::path::Path;
//!
//! # fn main() -> mp4_converter::Result<()> {
//! let mut config = ProcessConfig::default();
//! config.sampling.frame_count = Some(30);
//! config.resize = Some(ResizeSpec::new(Some(240), Some(240)));
//! config.chroma_key = Some(ChromaKeyConfig::green_screen());
//!
//! let batch = BatchProcessor::new(config).process_directory(Path::new("clips/"), Path::new("out/"))?;
//! println!("{}", batch);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`transforms`] - per-frame transforms and the ordered transform chain
//! - [`video`] - decode and encode collaborators and the per-video pipeline
//! - [`batch`] - discovery, parallel dispatch and result aggregation
//! - [`config`] - TOML configuration
//!
//! ## Custom collaborators
//!
//! Decoding and encoding sit behind the [`FrameSource`](video::FrameSource) and
//! [`FrameSink`](video::FrameSink) traits:
//!
//! ```rust,no_run
//! use mp4_converter::video::{Frame, FrameSink};
//! use mp4_converter::Result;
//! use std::path::{Path, PathBuf};
//!
//! struct CountingSink;
//!
//! impl FrameSink for CountingSink {
//!     fn encode(&self, frames: &[Frame], output_dir: &Path) -> Result<Vec<PathBuf>> {
//!         println!("{} frames for {}", frames.len(), output_dir.display());
//!         Ok(Vec::new())
//!     }
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod transforms;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    batch::{BatchProcessor, BatchResult, ProcessResult},
    config::ProcessConfig,
    error::{ConverterError, ErrorKind, Result},
    transforms::{Transform, TransformChain},
};
