use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{ConfigError, Result},
    transforms::{ChromaKeyConfig, EnhanceConfig, ResizeSpec, WatermarkConfig},
    video::{decoder::FrameSampling, encoder::OutputConfig},
};

/// Complete processing configuration, shared read-only by every video task
///
/// Optional stages are enabled by the presence of their section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Which frames to take from each video
    pub sampling: SamplingConfig,

    pub resize: Option<ResizeSpec>,

    pub enhance: Option<EnhanceConfig>,

    pub watermark: Option<WatermarkConfig>,

    pub chroma_key: Option<ChromaKeyConfig>,

    /// Encoding and converter settings
    pub output: OutputConfig,

    /// Worker pool and failure policy
    pub batch: BatchConfig,
}

impl ProcessConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: ProcessConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.sampling.validate()?;
        if let Some(resize) = &self.resize {
            resize.check()?;
        }
        if let Some(watermark) = &self.watermark {
            validate_watermark(watermark)?;
        }
        if let Some(chroma) = &self.chroma_key {
            validate_chroma_key(chroma)?;
        }
        validate_output(&self.output)?;
        self.batch.validate()?;
        Ok(())
    }

    pub fn sampling(&self) -> FrameSampling {
        self.sampling.sampling()
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Frame selection; `frame_count` takes precedence over `frame_rate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Frames extracted per second of video
    pub frame_rate: Option<f64>,

    /// Total frames extracted, spread evenly over the video
    pub frame_count: Option<usize>,
}

impl SamplingConfig {
    pub fn sampling(&self) -> FrameSampling {
        FrameSampling::from_options(self.frame_rate, self.frame_count)
    }

    fn validate(&self) -> Result<()> {
        if let Some(rate) = self.frame_rate {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(invalid("sampling.frame_rate", rate).into());
            }
        }
        if self.frame_count == Some(0) {
            return Err(invalid("sampling.frame_count", 0).into());
        }
        Ok(())
    }
}

fn validate_watermark(config: &WatermarkConfig) -> Result<()> {
    if config.region.is_empty() {
        return Err(invalid("watermark.region", config.region).into());
    }
    if !(0.0..=1.0).contains(&config.blend_alpha) {
        return Err(invalid("watermark.blend_alpha", config.blend_alpha).into());
    }
    if config.smooth_kernel_size == 0 {
        return Err(invalid("watermark.smooth_kernel_size", 0).into());
    }
    if config.ramp_step == 0 {
        return Err(invalid("watermark.ramp_step", 0).into());
    }
    Ok(())
}

fn validate_chroma_key(config: &ChromaKeyConfig) -> Result<()> {
    if !(config.threshold.is_finite() && config.threshold >= 0.0) {
        return Err(invalid("chroma_key.threshold", config.threshold).into());
    }
    Ok(())
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

fn validate_output(config: &OutputConfig) -> Result<()> {
    if config.timeout_secs == 0 {
        return Err(invalid("output.timeout_secs", 0).into());
    }
    if config.converter.program.trim().is_empty() {
        return Err(invalid("output.converter.program", "\"\"").into());
    }
    if let Some(name) = &config.array_name {
        if !is_c_identifier(name) {
            return Err(invalid("output.array_name", name).into());
        }
    }
    if config.max_width == Some(0) {
        return Err(invalid("output.max_width", 0).into());
    }
    if config.max_height == Some(0) {
        return Err(invalid("output.max_height", 0).into());
    }
    Ok(())
}

fn default_workers() -> usize {
    4
}

/// Batch scheduling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of videos processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Record failures and keep going instead of stopping the batch
    pub continue_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            continue_on_error: false,
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid("batch.workers", self.workers).into());
        }

        let cpus = num_cpus::get();
        if self.workers > cpus {
            warn!("{} workers requested but only {} CPUs detected", self.workers, cpus);
        }
        Ok(())
    }
}
