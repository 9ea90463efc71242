use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::{
    error::{ConverterError, ErrorKind},
    video::types::VideoDescriptor,
};

/// Outcome of processing one video. Created exactly once per video.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub video_path: PathBuf,
    pub success: bool,
    pub artifacts: Vec<PathBuf>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub elapsed: Duration,
    /// Frames that made it through the transform chain
    pub frame_count: usize,
    /// Frames dropped under continue-on-error
    pub skipped_frames: usize,
    pub descriptor: Option<VideoDescriptor>,
}

impl ProcessResult {
    pub fn succeeded(
        video_path: PathBuf,
        artifacts: Vec<PathBuf>,
        frame_count: usize,
        skipped_frames: usize,
        descriptor: VideoDescriptor,
        elapsed: Duration,
    ) -> Self {
        Self {
            video_path,
            success: true,
            artifacts,
            error: None,
            error_kind: None,
            elapsed,
            frame_count,
            skipped_frames,
            descriptor: Some(descriptor),
        }
    }

    pub fn failed(
        video_path: PathBuf,
        error: &ConverterError,
        descriptor: Option<VideoDescriptor>,
        elapsed: Duration,
    ) -> Self {
        Self {
            video_path,
            success: false,
            artifacts: Vec::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            elapsed,
            frame_count: 0,
            skipped_frames: 0,
            descriptor,
        }
    }

    /// Display name of the input video
    pub fn video_name(&self) -> String {
        self.video_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.video_path.display().to_string())
    }
}

/// Aggregate over a batch run
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub total_videos: usize,
    pub successful_videos: usize,
    pub failed_videos: usize,
    /// Frames over successful videos only
    pub total_frames: usize,
    /// Artifacts over successful videos only
    pub total_artifacts: usize,
    /// Wall-clock time of the whole batch
    pub total_time: Duration,
    /// Sum of the per-video processing times
    pub cumulative_video_time: Duration,
    pub started_at: DateTime<Local>,
    /// The batch stopped early because of a failure
    pub aborted: bool,
    /// Per-video results in completion order
    pub results: Vec<ProcessResult>,
    /// Videos that were already running when the batch aborted; excluded from the aggregates
    pub finished_after_abort: Vec<ProcessResult>,
}

impl BatchResult {
    /// Empty successful batch
    pub fn empty(total_videos: usize) -> Self {
        Self {
            total_videos,
            successful_videos: 0,
            failed_videos: 0,
            total_frames: 0,
            total_artifacts: 0,
            total_time: Duration::ZERO,
            cumulative_video_time: Duration::ZERO,
            started_at: Local::now(),
            aborted: false,
            results: Vec::new(),
            finished_after_abort: Vec::new(),
        }
    }

    pub fn from_results(
        total_videos: usize,
        results: Vec<ProcessResult>,
        total_time: Duration,
        started_at: DateTime<Local>,
        aborted: bool,
    ) -> Self {
        Self::from_aborted_run(total_videos, results, Vec::new(), total_time, started_at, aborted)
    }

    /// Like [`from_results`](Self::from_results), also keeping results that settled after the abort
    pub fn from_aborted_run(
        total_videos: usize,
        results: Vec<ProcessResult>,
        finished_after_abort: Vec<ProcessResult>,
        total_time: Duration,
        started_at: DateTime<Local>,
        aborted: bool,
    ) -> Self {
        let mut batch = Self {
            started_at,
            total_time,
            aborted,
            finished_after_abort,
            ..Self::empty(total_videos)
        };
        for result in results {
            batch.record(result);
        }
        batch
    }

    /// Fold one video result into the aggregate
    pub fn record(&mut self, result: ProcessResult) {
        if result.success {
            self.successful_videos += 1;
            self.total_frames += result.frame_count;
            self.total_artifacts += result.artifacts.len();
        } else {
            self.failed_videos += 1;
        }
        self.cumulative_video_time += result.elapsed;
        self.results.push(result);
    }

    /// Fraction of videos that succeeded; 0.0 for an empty batch
    pub fn success_rate(&self) -> f64 {
        if self.total_videos == 0 {
            return 0.0;
        }
        self.successful_videos as f64 / self.total_videos as f64
    }

    /// Mean processing time of the videos that ran
    pub fn average_time(&self) -> Duration {
        match u32::try_from(self.results.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.cumulative_video_time / n,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed_videos > 0
    }

    /// Videos that were discovered but never ran
    pub fn not_started(&self) -> usize {
        self.total_videos
            .saturating_sub(self.results.len())
            .saturating_sub(self.finished_after_abort.len())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Results ordered by input path instead of completion order
    pub fn sorted(&self) -> Vec<&ProcessResult> {
        let mut results: Vec<&ProcessResult> = self.results.iter().collect();
        results.sort_by(|a, b| a.video_path.cmp(&b.video_path));
        results
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch started {}", self.started_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "  Videos:      {} total", self.total_videos)?;
        writeln!(f, "  Successful:  {}", self.successful_videos)?;
        writeln!(f, "  Failed:      {}", self.failed_videos)?;
        if self.aborted {
            writeln!(f, "  Not started: {} (stopped after first failure)", self.not_started())?;
            writeln!(f, "  Finished after abort: {}", self.finished_after_abort.len())?;
        }
        writeln!(f, "  Success:     {:.1}%", self.success_rate() * 100.0)?;
        writeln!(f, "  Frames:      {}", self.total_frames)?;
        writeln!(f, "  Artifacts:   {}", self.total_artifacts)?;
        writeln!(f, "  Total time:  {:.2}s", self.total_time.as_secs_f64())?;
        write!(f, "  Avg/video:   {:.2}s", self.average_time().as_secs_f64())?;

        let failures: Vec<_> = self.failures().collect();
        if !failures.is_empty() {
            writeln!(f)?;
            write!(f, "Failures:")?;
            for failure in failures {
                write!(
                    f,
                    "\n  {}: {}",
                    failure.video_name(),
                    failure.error.as_deref().unwrap_or("unknown error")
                )?;
            }
        }

        if !self.finished_after_abort.is_empty() {
            writeln!(f)?;
            write!(f, "Finished after abort (not counted):")?;
            for late in &self.finished_after_abort {
                let outcome = if late.success {
                    format!("{} artifacts", late.artifacts.len())
                } else {
                    late.error.clone().unwrap_or_else(|| "unknown error".to_string())
                };
                write!(f, "\n  {}: {}", late.video_name(), outcome)?;
            }
        }
        Ok(())
    }
}
