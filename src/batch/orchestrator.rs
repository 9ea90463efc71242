use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::{
    batch::result::{BatchResult, ProcessResult},
    config::ProcessConfig,
    error::{ConverterError, Result, ValidationError},
    transforms::TransformChain,
    video::{
        decoder::{is_supported_video, FfmpegDecoder, FrameSource},
        encoder::{ConverterBridge, FrameSink},
        pipeline::VideoPipeline,
    },
};

/// Video files directly inside `input_dir`, sorted case-insensitively by file name
pub fn discover_videos(input_dir: &Path) -> Result<Vec<PathBuf>> {
    if !input_dir.exists() {
        return Err(ValidationError::InputNotFound {
            path: input_dir.display().to_string(),
        }
        .into());
    }
    if !input_dir.is_dir() {
        return Err(ValidationError::NotAFile {
            path: input_dir.display().to_string(),
        }
        .into());
    }

    let mut videos: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_supported_video(path))
        .collect();

    videos.sort_by_key(|path| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });

    debug!("Discovered {} videos in {}", videos.len(), input_dir.display());
    Ok(videos)
}

/// Runs one video pipeline per input file on a bounded worker pool
///
/// The batch follows a fixed flow:
/// 1. Discovery - collect supported video files from the input directory
/// 2. Dispatch - submit one task per video, at most `workers` running at once
/// 3. Collection - fold results in completion order into a [`BatchResult`]
///
/// Without `continue_on_error` the first failed video cancels every task that
/// has not started yet; tasks already running are allowed to finish.
pub struct BatchProcessor {
    config: ProcessConfig,
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
}

impl BatchProcessor {
    /// Batch processor backed by ffmpeg decoding and the configured converter
    pub fn new(config: ProcessConfig) -> Self {
        let sink = ConverterBridge::new(config.output.clone());
        Self::with_collaborators(config, Box::new(FfmpegDecoder::new()), Box::new(sink))
    }

    pub fn with_collaborators(config: ProcessConfig, source: Box<dyn FrameSource>, sink: Box<dyn FrameSink>) -> Self {
        Self { config, source, sink }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Discover and process every video in `input_dir`
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchResult> {
        let videos = discover_videos(input_dir)?;
        if videos.is_empty() {
            warn!("No video files found in {}", input_dir.display());
        }
        self.process_videos(&videos, output_dir)
    }

    /// Process an explicit list of videos
    pub fn process_videos(&self, videos: &[PathBuf], output_dir: &Path) -> Result<BatchResult> {
        let started_at = Local::now();
        let start = Instant::now();
        let total = videos.len();

        if videos.is_empty() {
            return Ok(BatchResult {
                started_at,
                ..BatchResult::empty(0)
            });
        }

        self.config.validate()?;
        let chain = TransformChain::from_config(&self.config);
        chain.validate()?;
        std::fs::create_dir_all(output_dir)?;

        let workers = self.config.batch.workers.clamp(1, total);
        let continue_on_error = self.config.batch.continue_on_error;

        info!("🎬 Starting batch of {} videos with {} workers", total, workers);
        info!("   Output: {}", output_dir.display());
        info!(
            "   Stages: [{}], failure policy: {}",
            chain.names().join(", "),
            if continue_on_error { "continue" } else { "stop" }
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("video-worker-{}", i))
            .build()
            .map_err(|e| ConverterError::generic(format!("Failed to start worker pool: {}", e)))?;

        let pipeline = VideoPipeline::new(&self.config, &chain, self.source.as_ref(), self.sink.as_ref());
        let cancelled = AtomicBool::new(false);
        let (tx, rx) = crossbeam_channel::unbounded::<ProcessResult>();

        let mut results: Vec<ProcessResult> = Vec::with_capacity(total);
        let mut late: Vec<ProcessResult> = Vec::new();
        let mut aborted = false;

        pool.in_place_scope_fifo(|scope| {
            for video in videos {
                let tx = tx.clone();
                let pipeline = &pipeline;
                let cancelled = &cancelled;

                scope.spawn_fifo(move |_| {
                    if cancelled.load(Ordering::SeqCst) {
                        debug!("Skipping {}: batch cancelled", video.display());
                        return;
                    }
                    let result = pipeline.process_video(video, output_dir);
                    // Set before sending so no later task on this worker starts
                    if !result.success && !continue_on_error {
                        cancelled.store(true, Ordering::SeqCst);
                    }
                    // The collector may have stopped listening; nothing to do then
                    let _ = tx.send(result);
                });
            }
            drop(tx);

            let (mut succeeded, mut failed) = (0usize, 0usize);
            for result in rx.iter() {
                if aborted {
                    info!(
                        "{} finished after the abort ({})",
                        result.video_name(),
                        if result.success { "succeeded" } else { "failed" }
                    );
                    late.push(result);
                    continue;
                }

                if result.success {
                    succeeded += 1;
                } else {
                    failed += 1;
                }
                info!(
                    "[{}/{}] {} {} (✓ {} ✗ {})",
                    succeeded + failed,
                    total,
                    if result.success { "done" } else { "FAILED" },
                    result.video_name(),
                    succeeded,
                    failed
                );

                let stop = !result.success && !continue_on_error;
                results.push(result);

                if stop {
                    cancelled.store(true, Ordering::SeqCst);
                    aborted = true;
                    error!("Stopping batch after the first failure; pending videos will not start");
                }
            }
        });

        let batch = BatchResult::from_aborted_run(total, results, late, start.elapsed(), started_at, aborted);
        info!(
            "🎉 Batch finished: {}/{} videos succeeded in {:.1}s",
            batch.successful_videos,
            batch.total_videos,
            batch.total_time.as_secs_f64()
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::pipeline::testing::{MockSink, MockSource};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn video_dir(names: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"stub").unwrap();
        }
        dir
    }

    fn processor(config: ProcessConfig, source: MockSource) -> BatchProcessor {
        BatchProcessor::with_collaborators(config, Box::new(source), Box::new(MockSink::default()))
    }

    /// Sink shared with the test so encode calls can be inspected afterwards
    struct SharedSink(Arc<MockSink>);

    impl FrameSink for SharedSink {
        fn encode(&self, frames: &[crate::video::types::Frame], output_dir: &Path) -> Result<Vec<PathBuf>> {
            self.0.encode(frames, output_dir)
        }
    }

    #[test]
    fn test_discovery_filters_and_sorts() {
        let dir = video_dir(&["b.MP4", "a.mkv", "C.mov", "readme.txt", "d.wmv.bak"]);
        std::fs::create_dir(dir.path().join("nested.mp4")).unwrap();

        let videos = discover_videos(dir.path()).unwrap();
        let names: Vec<_> = videos
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mkv", "b.MP4", "C.mov"]);
    }

    #[test]
    fn test_missing_input_directory() {
        let err = discover_videos(Path::new("/no/such/input/dir")).unwrap_err();
        assert!(matches!(
            err,
            ConverterError::Validation(ValidationError::InputNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_directory_is_empty_success() {
        let input = video_dir(&[]);
        let output = tempfile::tempdir().unwrap();

        let batch = processor(ProcessConfig::default(), MockSource::new(3))
            .process_directory(input.path(), output.path())
            .unwrap();

        assert_eq!(batch.total_videos, 0);
        assert_eq!(batch.success_rate(), 0.0);
        assert!(!batch.has_failures());
    }

    #[test]
    fn test_continue_on_error_with_one_corrupt_video() {
        let input = video_dir(&["one.mp4", "two_corrupt.mp4", "three.mp4"]);
        let output = tempfile::tempdir().unwrap();

        let mut config = ProcessConfig::default();
        config.batch.workers = 2;
        config.batch.continue_on_error = true;
        config.sampling.frame_count = Some(4);

        let batch = processor(config, MockSource::new(12))
            .process_directory(input.path(), output.path())
            .unwrap();

        assert_eq!(batch.total_videos, 3);
        assert_eq!(batch.successful_videos, 2);
        assert_eq!(batch.failed_videos, 1);
        assert!((batch.success_rate() - 0.667).abs() < 0.001);
        assert_eq!(batch.total_frames, 8);
        assert_eq!(batch.total_artifacts, 8);
        assert!(!batch.aborted);

        let failure = batch.failures().next().unwrap();
        assert_eq!(failure.video_name(), "two_corrupt.mp4");
    }

    #[test]
    fn test_stop_on_first_failure() {
        let names: Vec<String> = std::iter::once("a_corrupt.mp4".to_string())
            .chain((0..8).map(|i| format!("v{}.mp4", i)))
            .collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let input = video_dir(&refs);
        let output = tempfile::tempdir().unwrap();

        let mut config = ProcessConfig::default();
        config.batch.workers = 1;

        let batch = processor(config, MockSource::new(2))
            .process_directory(input.path(), output.path())
            .unwrap();

        // With one worker the corrupt file runs first; nothing after it is recorded
        assert!(batch.aborted);
        assert_eq!(batch.failed_videos, 1);
        assert_eq!(batch.successful_videos, 0);
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.not_started(), 8);
        assert!(batch.to_string().contains("a_corrupt.mp4"));
    }

    #[test]
    fn test_stop_on_first_failure_keeps_in_flight_results() {
        let input = video_dir(&["a_corrupt.mp4", "b_slow.mp4", "c.mp4", "d.mp4"]);
        let output = tempfile::tempdir().unwrap();

        let sink = Arc::new(MockSink::default());
        let mut config = ProcessConfig::default();
        config.batch.workers = 2;
        config.sampling.frame_count = Some(1);

        let source = MockSource::new(3).slow_probe(Duration::from_millis(300));
        let batch = BatchProcessor::with_collaborators(config, Box::new(source), Box::new(SharedSink(sink.clone())))
            .process_directory(input.path(), output.path())
            .unwrap();

        assert!(batch.aborted);
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.results[0].video_name(), "a_corrupt.mp4");

        // b_slow was already running when a_corrupt failed
        let late: Vec<_> = batch.finished_after_abort.iter().map(|r| r.video_name()).collect();
        assert_eq!(late, vec!["b_slow.mp4"]);
        assert_eq!(batch.not_started(), 2);

        // Every video that reached the encoder is reported in the summary
        let encoded: Vec<PathBuf> = sink.calls.lock().unwrap().iter().map(|(dir, _)| dir.clone()).collect();
        assert_eq!(encoded, vec![output.path().join("b_slow")]);
        assert!(batch.to_string().contains("Not started: 2"));
        assert!(batch.to_string().contains("b_slow.mp4: 1 artifacts"));
    }

    #[test]
    fn test_outputs_go_to_per_video_directories() {
        let input = video_dir(&["intro.mp4", "outro.avi"]);
        let output = tempfile::tempdir().unwrap();

        let sink = Arc::new(MockSink::default());
        let mut config = ProcessConfig::default();
        config.sampling.frame_count = Some(1);

        BatchProcessor::with_collaborators(config, Box::new(MockSource::new(5)), Box::new(SharedSink(sink.clone())))
            .process_directory(input.path(), output.path())
            .unwrap();

        let mut dirs: Vec<PathBuf> = sink.calls.lock().unwrap().iter().map(|(dir, _)| dir.clone()).collect();
        dirs.sort();
        assert_eq!(dirs, vec![output.path().join("intro"), output.path().join("outro")]);
    }

    #[test]
    fn test_invalid_config_fails_before_dispatch() {
        let input = video_dir(&["a.mp4"]);
        let output = tempfile::tempdir().unwrap();

        let mut config = ProcessConfig::default();
        config.batch.workers = 0;

        let err = processor(config, MockSource::new(1))
            .process_directory(input.path(), output.path())
            .unwrap_err();
        assert!(matches!(err, ConverterError::Config(_)));
    }
}
