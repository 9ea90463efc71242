use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::{
    batch::result::ProcessResult,
    config::ProcessConfig,
    error::{ErrorKind, Result, ValidationError, VideoError},
    transforms::{ChromaKeyEngine, KeyAnalysis, TransformChain},
    video::{
        decoder::{is_supported_video, FrameSource},
        encoder::FrameSink,
        types::{Frame, VideoDescriptor},
    },
};

/// Check that `path` is an existing regular file with a recognized container extension
pub fn validate_input(path: &Path) -> std::result::Result<(), ValidationError> {
    let display = || path.display().to_string();

    if !path.exists() {
        return Err(ValidationError::InputNotFound { path: display() });
    }
    if !path.is_file() {
        return Err(ValidationError::NotAFile { path: display() });
    }
    if !is_supported_video(path) {
        return Err(ValidationError::UnsupportedFormat { path: display() });
    }
    Ok(())
}

/// Directory receiving the artifacts of `video`: `<output_root>/<video stem>/`
pub fn video_output_dir(output_root: &Path, video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    output_root.join(stem)
}

/// Key analysis of the first sampled frame of `input`, after the per-frame stages
///
/// Uses the configured chroma settings, or the green-screen preset when keying is off.
pub fn preview_key(
    source: &dyn FrameSource,
    config: &ProcessConfig,
    chain: &TransformChain,
    input: &Path,
) -> Result<KeyAnalysis> {
    validate_input(input)?;
    let descriptor = source.get_video_info(input)?;
    let indices = source.sample_indices(&descriptor, config.sampling())?;
    let first = indices.first().copied().ok_or(VideoError::NoUsableFrames)?;

    let mut frame = source.extract_frame(input, first)?;
    chain.apply_frame(&mut frame)?;

    let engine = ChromaKeyEngine::new(config.chroma_key.clone().unwrap_or_default());
    let analysis = engine.analyze(&frame.to_rgb());
    debug!("Key preview for {} at frame {}: {:?}", input.display(), first, analysis);
    Ok(analysis)
}

struct ProcessedVideo {
    descriptor: VideoDescriptor,
    artifacts: Vec<PathBuf>,
    frame_count: usize,
    skipped_frames: usize,
}

/// Runs decode, the transform chain and encode for one video
///
/// One pipeline is shared by every worker; all state it holds is read-only.
pub struct VideoPipeline<'a> {
    config: &'a ProcessConfig,
    chain: &'a TransformChain,
    source: &'a dyn FrameSource,
    sink: &'a dyn FrameSink,
}

impl<'a> VideoPipeline<'a> {
    pub fn new(
        config: &'a ProcessConfig,
        chain: &'a TransformChain,
        source: &'a dyn FrameSource,
        sink: &'a dyn FrameSink,
    ) -> Self {
        Self {
            config,
            chain,
            source,
            sink,
        }
    }

    /// Process one video into its output directory. Never fails: errors end up in the result.
    pub fn process_video(&self, input: &Path, output_root: &Path) -> ProcessResult {
        let start = Instant::now();
        let mut descriptor = None;

        match self.run(input, output_root, &mut descriptor) {
            Ok(processed) => {
                let elapsed = start.elapsed();
                info!(
                    "✅ {} → {} frames, {} artifacts in {:.2}s",
                    input.display(),
                    processed.frame_count,
                    processed.artifacts.len(),
                    elapsed.as_secs_f64()
                );
                ProcessResult::succeeded(
                    input.to_path_buf(),
                    processed.artifacts,
                    processed.frame_count,
                    processed.skipped_frames,
                    processed.descriptor,
                    elapsed,
                )
            }
            Err(e) => {
                warn!("❌ {} failed: {}", input.display(), e);
                ProcessResult::failed(input.to_path_buf(), &e, descriptor, start.elapsed())
            }
        }
    }

    fn run(
        &self,
        input: &Path,
        output_root: &Path,
        descriptor_slot: &mut Option<VideoDescriptor>,
    ) -> Result<ProcessedVideo> {
        validate_input(input)?;

        let descriptor = self.source.get_video_info(input)?;
        *descriptor_slot = Some(descriptor.clone());

        self.chain.validate_for(descriptor.width, descriptor.height)?;

        let indices = self.source.sample_indices(&descriptor, self.config.sampling())?;
        info!(
            "Processing {}: {} of {} frames, stages [{}]",
            input.display(),
            indices.len(),
            descriptor.frame_count,
            self.chain.names().join(", ")
        );

        let (frames, skipped_frames) = self.process_frames(input, &indices)?;
        if frames.is_empty() {
            return Err(VideoError::NoUsableFrames.into());
        }

        let frames = self.chain.finish(frames);
        let frame_count = frames.len();

        let output_dir = video_output_dir(output_root, input);
        let artifacts = self.sink.encode(&frames, &output_dir)?;

        Ok(ProcessedVideo {
            descriptor,
            artifacts,
            frame_count,
            skipped_frames,
        })
    }

    fn process_frame(&self, input: &Path, index: u64) -> Result<Frame> {
        let mut frame = self.source.extract_frame(input, index)?;
        self.chain.apply_frame(&mut frame)?;
        Ok(frame)
    }

    /// Decode and transform the sampled frames in order
    fn process_frames(&self, input: &Path, indices: &[u64]) -> Result<(Vec<Frame>, usize)> {
        let continue_on_error = self.config.batch.continue_on_error;
        let mut frames = Vec::with_capacity(indices.len());
        let mut skipped = 0;

        for &index in indices {
            match self.process_frame(input, index) {
                Ok(frame) => frames.push(frame),
                Err(e) if e.kind() == ErrorKind::Validation => return Err(e),
                Err(e) if continue_on_error => {
                    warn!("Skipping frame {} of {}: {}", index, input.display(), e);
                    skipped += 1;
                }
                Err(e) => {
                    return Err(VideoError::Aborted {
                        index,
                        reason: e.to_string(),
                    }
                    .into())
                }
            }
        }

        debug!("{}: {} frames kept, {} skipped", input.display(), frames.len(), skipped);
        Ok((frames, skipped))
    }
}
