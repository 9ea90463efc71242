use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    error::{ConverterError, DecodeError, Result, ValidationError},
    video::types::{Frame, VideoDescriptor},
};

/// Container extensions accepted as video input (matched case-insensitively)
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "wmv"];

pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Which source frames a video contributes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameSampling {
    /// Every frame
    All,
    /// Approximately this many frames per second of video
    Rate(f64),
    /// This many frames spread evenly over the video
    Count(usize),
}

impl FrameSampling {
    /// A fixed count wins over a rate; neither means every frame
    pub fn from_options(frame_rate: Option<f64>, frame_count: Option<usize>) -> Self {
        match (frame_count, frame_rate) {
            (Some(count), _) => Self::Count(count),
            (None, Some(rate)) => Self::Rate(rate),
            (None, None) => Self::All,
        }
    }

    pub fn check(&self) -> std::result::Result<(), DecodeError> {
        match *self {
            Self::Rate(rate) if !(rate.is_finite() && rate > 0.0) => Err(DecodeError::InvalidSampling {
                details: format!("frame rate must be positive, got {}", rate),
            }),
            Self::Count(0) => Err(DecodeError::InvalidSampling {
                details: "frame count must be at least 1".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Evenly spaced, strictly increasing frame indices for `descriptor`
pub fn uniform_frame_sampling(descriptor: &VideoDescriptor, sampling: FrameSampling) -> Result<Vec<u64>> {
    sampling.check()?;
    let total = descriptor.frame_count;

    let indices = match sampling {
        FrameSampling::All => (0..total).collect(),
        FrameSampling::Rate(rate) => {
            let step = descriptor.fps / rate;
            if !(step.is_finite() && step > 1.0) {
                (0..total).collect()
            } else {
                let mut indices: Vec<u64> = Vec::new();
                for i in 0u64.. {
                    let index = (i as f64 * step).round() as u64;
                    if index >= total {
                        break;
                    }
                    if indices.last() != Some(&index) {
                        indices.push(index);
                    }
                }
                indices
            }
        }
        FrameSampling::Count(count) => {
            let count = count as u64;
            if count >= total {
                (0..total).collect()
            } else {
                (0..count)
                    .map(|i| (i as u128 * total as u128 / count as u128) as u64)
                    .collect()
            }
        }
    };

    Ok(indices)
}

/// Decode collaborator: video metadata and single-frame extraction
pub trait FrameSource: Send + Sync {
    /// Read the descriptor of a video; unreadable input is a validation error
    fn get_video_info(&self, path: &Path) -> Result<VideoDescriptor>;

    /// Decode the frame at `index` as RGB
    fn extract_frame(&self, path: &Path, index: u64) -> Result<Frame>;

    fn sample_indices(&self, descriptor: &VideoDescriptor, sampling: FrameSampling) -> Result<Vec<u64>> {
        uniform_frame_sampling(descriptor, sampling)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rational such as `"30000/1001"`; `0/0` yields `None`
fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (value.trim().parse::<f64>().ok()?, 1.0),
    };
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Frame decoding through the `ffprobe` and `ffmpeg` command line tools
pub struct FfmpegDecoder {
    ffmpeg: String,
    ffprobe: String,
    metadata_cache: Mutex<HashMap<PathBuf, VideoDescriptor>>,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self::with_tools("ffmpeg", "ffprobe")
    }

    pub fn with_tools(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            metadata_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Verify that both tools can be started
    pub fn check_available(&self) -> Result<()> {
        for tool in [&self.ffmpeg, &self.ffprobe] {
            let output = self.run(tool, &["-version"])?;
            if !output.status.success() {
                return Err(DecodeError::ToolMissing { tool: tool.clone() }.into());
            }
        }
        info!("Using external {} / {} for decoding", self.ffmpeg, self.ffprobe);
        Ok(())
    }

    fn run(&self, tool: &str, args: &[&str]) -> Result<Output> {
        Command::new(tool).args(args).output().map_err(|e| -> ConverterError {
            if e.kind() == IoErrorKind::NotFound {
                DecodeError::ToolMissing { tool: tool.to_string() }.into()
            } else {
                e.into()
            }
        })
    }

    fn cached(&self, path: &Path) -> Option<VideoDescriptor> {
        self.metadata_cache.lock().ok()?.get(path).cloned()
    }

    fn probe(&self, path: &Path) -> Result<VideoDescriptor> {
        let path_str = path.display().to_string();
        let output = self.run(
            &self.ffprobe,
            &[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_streams",
                "-show_format",
                "-of",
                "json",
                &path_str,
            ],
        )?;

        if !output.status.success() {
            return Err(ValidationError::CorruptVideo {
                path: path_str,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let json = String::from_utf8_lossy(&output.stdout);
        Ok(Self::parse_probe_output(&json, path)?)
    }

    /// Build a descriptor from ffprobe's JSON output
    fn parse_probe_output(json: &str, path: &Path) -> std::result::Result<VideoDescriptor, ValidationError> {
        let corrupt = |reason: String| ValidationError::CorruptVideo {
            path: path.display().to_string(),
            reason,
        };

        let probe: ProbeOutput =
            serde_json::from_str(json).map_err(|e| corrupt(format!("unreadable probe output: {}", e)))?;
        let stream = probe
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| corrupt("no video stream".to_string()))?;

        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(corrupt("video stream has no dimensions".to_string())),
        };

        let fps = stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_rational)
            .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational))
            .ok_or_else(|| corrupt("video stream has no frame rate".to_string()))?;

        let duration = stream
            .duration
            .as_deref()
            .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
            .and_then(|d| d.trim().parse::<f64>().ok())
            .unwrap_or(0.0);

        let frame_count = stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.trim().parse::<u64>().ok())
            .unwrap_or_else(|| (duration * fps).round().max(0.0) as u64);

        Ok(VideoDescriptor {
            width,
            height,
            fps,
            frame_count,
            duration,
        })
    }
}

impl FrameSource for FfmpegDecoder {
    fn get_video_info(&self, path: &Path) -> Result<VideoDescriptor> {
        if let Some(descriptor) = self.cached(path) {
            return Ok(descriptor);
        }

        let descriptor = self.probe(path)?;
        info!(
            "Video metadata for {}: {}x{} @ {:.2}fps, {} frames, {:.1}s",
            path.display(),
            descriptor.width,
            descriptor.height,
            descriptor.fps,
            descriptor.frame_count,
            descriptor.duration
        );

        match self.metadata_cache.lock() {
            Ok(mut cache) => {
                cache.insert(path.to_path_buf(), descriptor.clone());
            }
            Err(_) => warn!("Metadata cache unavailable, {} will be probed again", path.display()),
        }
        Ok(descriptor)
    }

    fn extract_frame(&self, path: &Path, index: u64) -> Result<Frame> {
        let descriptor = self.get_video_info(path)?;
        if index >= descriptor.frame_count {
            return Err(DecodeError::FrameOutOfRange {
                index,
                total: descriptor.frame_count,
            }
            .into());
        }

        let timestamp = format!("{:.6}", index as f64 / descriptor.fps);
        let path_str = path.display().to_string();
        debug!("Extracting frame {} at {}s from {}", index, timestamp, path_str);

        let output = self.run(
            &self.ffmpeg,
            &[
                "-v", "error", "-ss", &timestamp, "-i", &path_str, "-frames:v", "1", "-f", "image2pipe", "-vcodec",
                "png", "pipe:1",
            ],
        )?;

        let failed = |reason: String| DecodeError::ExtractFailed { index, reason };
        if !output.status.success() {
            return Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()).into());
        }
        if output.stdout.is_empty() {
            return Err(failed("decoder produced no image data".to_string()).into());
        }

        let image = image::load_from_memory(&output.stdout).map_err(|e| failed(e.to_string()))?;
        Ok(Frame::new(index, image.to_rgb8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(fps: f64, frame_count: u64) -> VideoDescriptor {
        VideoDescriptor {
            width: 320,
            height: 240,
            fps,
            frame_count,
            duration: frame_count as f64 / fps,
        }
    }

    #[test]
    fn test_supported_extensions_case_insensitive() {
        assert!(is_supported_video(Path::new("clip.MP4")));
        assert!(is_supported_video(Path::new("dir/clip.mkv")));
        assert!(!is_supported_video(Path::new("notes.txt")));
        assert!(!is_supported_video(Path::new("noext")));
    }

    #[test]
    fn test_sampling_precedence() {
        assert_eq!(FrameSampling::from_options(Some(5.0), Some(10)), FrameSampling::Count(10));
        assert_eq!(FrameSampling::from_options(Some(5.0), None), FrameSampling::Rate(5.0));
        assert_eq!(FrameSampling::from_options(None, None), FrameSampling::All);
    }

    #[test]
    fn test_rate_sampling() {
        // 30 fps video sampled at 10 fps: every third frame
        let indices = uniform_frame_sampling(&descriptor(30.0, 10), FrameSampling::Rate(10.0)).unwrap();
        assert_eq!(indices, vec![0, 3, 6, 9]);

        // Asking for more than the source rate yields every frame
        let indices = uniform_frame_sampling(&descriptor(24.0, 5), FrameSampling::Rate(60.0)).unwrap();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_count_sampling_is_uniform() {
        let indices = uniform_frame_sampling(&descriptor(30.0, 100), FrameSampling::Count(4)).unwrap();
        assert_eq!(indices, vec![0, 25, 50, 75]);

        let indices = uniform_frame_sampling(&descriptor(30.0, 3), FrameSampling::Count(10)).unwrap();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_invalid_sampling_is_rejected() {
        let err = uniform_frame_sampling(&descriptor(30.0, 10), FrameSampling::Count(0)).unwrap_err();
        assert!(matches!(err, ConverterError::Decode(DecodeError::InvalidSampling { .. })));
        assert!(FrameSampling::Rate(-1.0).check().is_err());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "streams": [{
                "width": 1280, "height": 720,
                "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001",
                "nb_frames": "300", "duration": "10.010000"
            }],
            "format": { "duration": "10.010000" }
        }"#;
        let d = FfmpegDecoder::parse_probe_output(json, Path::new("a.mp4")).unwrap();
        assert_eq!(d.dimensions(), (1280, 720));
        assert!((d.fps - 29.97).abs() < 0.01);
        assert_eq!(d.frame_count, 300);
    }

    #[test]
    fn test_parse_probe_output_estimates_frame_count() {
        let json = r#"{
            "streams": [{ "width": 64, "height": 48, "avg_frame_rate": "0/0", "r_frame_rate": "25/1" }],
            "format": { "duration": "2.0" }
        }"#;
        let d = FfmpegDecoder::parse_probe_output(json, Path::new("a.mkv")).unwrap();
        assert_eq!(d.fps, 25.0);
        assert_eq!(d.frame_count, 50);
    }

    #[test]
    fn test_missing_stream_is_corrupt() {
        let err = FfmpegDecoder::parse_probe_output(r#"{"streams": []}"#, Path::new("x.mp4")).unwrap_err();
        assert!(matches!(err, ValidationError::CorruptVideo { .. }));
        assert!(FfmpegDecoder::parse_probe_output("not json", Path::new("x.mp4")).is_err());
    }

    #[test]
    fn test_extract_checks_range_before_decoding() {
        let decoder = FfmpegDecoder::with_tools("ffmpeg-not-installed", "ffprobe-not-installed");
        decoder
            .metadata_cache
            .lock()
            .unwrap()
            .insert(PathBuf::from("cached.mp4"), descriptor(30.0, 10));

        let err = decoder.extract_frame(Path::new("cached.mp4"), 10).unwrap_err();
        assert!(matches!(
            err,
            ConverterError::Decode(DecodeError::FrameOutOfRange { index: 10, total: 10 })
        ));
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let decoder = FfmpegDecoder::with_tools("ffmpeg-not-installed", "ffprobe-not-installed");
        let err = decoder.get_video_info(Path::new("clip.mp4")).unwrap_err();
        assert!(matches!(err, ConverterError::Decode(DecodeError::ToolMissing { .. })));
    }
}
