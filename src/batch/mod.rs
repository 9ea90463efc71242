//! # Batch Processing
//!
//! Discovers the videos of an input directory and runs one per-video pipeline
//! per file on a bounded worker pool.

pub mod orchestrator;
pub mod result;

pub use orchestrator::{discover_videos, BatchProcessor};
pub use result::{BatchResult, ProcessResult};
