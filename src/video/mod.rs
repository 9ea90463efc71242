//! # Video Processing Module
//!
//! Decoding through ffprobe/ffmpeg, encoding through the external RGB565
//! converter, and the per-video pipeline that ties them to the transform chain.

pub mod decoder;
pub mod encoder;
pub mod pipeline;
pub mod types;

pub use decoder::{uniform_frame_sampling, FfmpegDecoder, FrameSampling, FrameSource};
pub use encoder::{ArrayFormat, ConverterBridge, ConverterCommand, FrameSink, OutputConfig, OutputMode};
pub use pipeline::{preview_key, VideoPipeline};
pub use types::{Frame, FramePixels, VideoDescriptor};
