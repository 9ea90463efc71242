use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{EncodeError, Result},
    video::types::Frame,
};

/// Extensions the external converter emits
const ARTIFACT_EXTENSIONS: [&str; 3] = ["bin", "c", "h"];

/// How processed frames leave the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Hand the frames to the external RGB565 converter
    #[default]
    Rgb565,
    /// Write RGBA PNG files directly
    Png,
}

/// Artifact layout produced by the RGB565 converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ArrayFormat {
    #[default]
    Binary,
    #[value(name = "c_array")]
    CArray,
}

/// External converter invocation: `<program> <args...> <input_dir> <output_dir> [options]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Default for ConverterCommand {
    fn default() -> Self {
        Self {
            program: "uv".to_string(),
            args: vec!["run".to_string(), "converter".to_string(), "convert".to_string()],
            working_dir: None,
        }
    }
}

impl ConverterCommand {
    /// Parse a whitespace separated command line such as `"uv run converter convert"`
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            working_dir: None,
        })
    }
}

fn default_timeout_secs() -> u64 {
    300
}

/// Encoding settings, the `[output]` section of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub format: ArrayFormat,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// C array identifier, only used with the `c_array` format
    pub array_name: Option<String>,
    /// Keep the intermediate frame directory for debugging
    pub keep_temp_files: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub converter: ConverterCommand,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::default(),
            format: ArrayFormat::default(),
            max_width: None,
            max_height: None,
            array_name: None,
            keep_temp_files: false,
            timeout_secs: default_timeout_secs(),
            converter: ConverterCommand::default(),
        }
    }
}

impl OutputConfig {
    /// Option flags appended after the input and output directories
    pub fn converter_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(width) = self.max_width {
            args.extend(["--max-width".to_string(), width.to_string()]);
        }
        if let Some(height) = self.max_height {
            args.extend(["--max-height".to_string(), height.to_string()]);
        }
        if self.format == ArrayFormat::CArray {
            args.extend(["--format".to_string(), "c_array".to_string()]);
            if let Some(name) = &self.array_name {
                args.extend(["--array-name".to_string(), name.clone()]);
            }
        }

        args
    }
}

/// Encode collaborator, called once per video with its full frame set
pub trait FrameSink: Send + Sync {
    /// Encode `frames` into `output_dir` and return the produced artifact paths
    fn encode(&self, frames: &[Frame], output_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Writes frames as PNG files or bridges them to the external RGB565 converter
pub struct ConverterBridge {
    config: OutputConfig,
}

impl ConverterBridge {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Save frames as `1.png .. N.png`; RGBA when `keep_alpha`, otherwise RGB
    fn write_numbered_pngs(frames: &[Frame], dir: &Path, keep_alpha: bool) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut paths = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            let path = dir.join(format!("{}.png", i + 1));
            let saved = if keep_alpha {
                frame.to_rgba().save(&path)
            } else {
                frame.to_rgb().save(&path)
            };
            saved.map_err(|e| EncodeError::SaveFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            paths.push(path);
        }

        debug!("Wrote {} frames to {}", paths.len(), dir.display());
        Ok(paths)
    }

    fn run_converter(&self, input_dir: &Path, output_dir: &Path) -> Result<Output> {
        let converter = &self.config.converter;
        let seconds = self.config.timeout_secs;

        let mut cmd = tokio::process::Command::new(&converter.program);
        cmd.args(&converter.args)
            .arg(input_dir)
            .arg(output_dir)
            .args(self.config.converter_args())
            .kill_on_drop(true);
        if let Some(dir) = &converter.working_dir {
            cmd.current_dir(dir);
        }

        info!(
            "Running converter: {} {} {} {}",
            converter.program,
            converter.args.join(" "),
            input_dir.display(),
            output_dir.display()
        );

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let outcome = runtime.block_on(async { tokio::time::timeout(Duration::from_secs(seconds), cmd.output()).await });

        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(EncodeError::SpawnFailed {
                reason: format!("{}: {}", converter.program, e),
            }
            .into()),
            Err(_) => Err(EncodeError::Timeout { seconds }.into()),
        }
    }

    /// Non-hidden converter outputs in `dir`, sorted by name
    fn collect_artifacts(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut artifacts: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| {
                let hidden = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('.'))
                    .unwrap_or(true);
                let known = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| ARTIFACT_EXTENSIONS.contains(&e))
                    .unwrap_or(false);
                !hidden && known
            })
            .collect();
        artifacts.sort();
        Ok(artifacts)
    }

    /// Move staged converter outputs into `output_dir`, replacing same-named files
    fn publish_artifacts(staged: Vec<PathBuf>, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut published = Vec::with_capacity(staged.len());
        for path in staged {
            let Some(name) = path.file_name() else {
                continue;
            };
            let target = output_dir.join(name);
            std::fs::rename(&path, &target)?;
            published.push(target);
        }
        Ok(published)
    }

    fn encode_rgb565(&self, frames: &[Frame], output_dir: &Path) -> Result<Vec<PathBuf>> {
        let temp_dir = tempfile::Builder::new().prefix("mp4converter_").tempdir()?;
        Self::write_numbered_pngs(frames, temp_dir.path(), false)?;
        std::fs::create_dir_all(output_dir)?;

        // Staged next to the final outputs so publishing is a rename; the dot keeps it out of artifact scans
        let staging = tempfile::Builder::new().prefix(".staging_").tempdir_in(output_dir)?;
        let result = self.run_converter(temp_dir.path(), staging.path());

        if self.config.keep_temp_files {
            let kept = temp_dir.keep();
            info!("Keeping intermediate frames in {}", kept.display());
        }

        let output = result?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let diagnostics = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                "no diagnostics".to_string()
            };
            return Err(EncodeError::ToolFailed {
                status: output.status.to_string(),
                diagnostics,
            }
            .into());
        }

        let staged = Self::collect_artifacts(staging.path())?;
        if staged.is_empty() {
            warn!("Converter succeeded but left no artifacts in {}", output_dir.display());
            return Err(EncodeError::NoArtifacts {
                dir: output_dir.display().to_string(),
            }
            .into());
        }

        let artifacts = Self::publish_artifacts(staged, output_dir)?;
        if artifacts.len() != frames.len() {
            warn!(
                "Converter produced {} artifacts for {} frames in {}",
                artifacts.len(),
                frames.len(),
                output_dir.display()
            );
        }

        info!("Converter produced {} artifacts in {}", artifacts.len(), output_dir.display());
        Ok(artifacts)
    }
}

impl FrameSink for ConverterBridge {
    fn encode(&self, frames: &[Frame], output_dir: &Path) -> Result<Vec<PathBuf>> {
        if frames.is_empty() {
            return Err(EncodeError::NoFrames.into());
        }

        match self.config.mode {
            OutputMode::Png => Self::write_numbered_pngs(frames, output_dir, true),
            OutputMode::Rgb565 => self.encode_rgb565(frames, output_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConverterError;

    fn frames(count: u64) -> Vec<Frame> {
        (0..count).map(|i| Frame::new_filled(i * 3, 8, 6, [10, 20, 30])).collect()
    }

    #[test]
    fn test_converter_args() {
        let mut config = OutputConfig::default();
        assert!(config.converter_args().is_empty());

        config.max_width = Some(240);
        config.format = ArrayFormat::CArray;
        config.array_name = Some("intro".to_string());
        assert_eq!(
            config.converter_args(),
            vec!["--max-width", "240", "--format", "c_array", "--array-name", "intro"]
        );

        // Array name is only meaningful for C arrays
        config.format = ArrayFormat::Binary;
        assert_eq!(config.converter_args(), vec!["--max-width", "240"]);
    }

    #[test]
    fn test_parse_converter_command() {
        let cmd = ConverterCommand::parse("python3 -m converter").unwrap();
        assert_eq!(cmd.program, "python3");
        assert_eq!(cmd.args, vec!["-m", "converter"]);
        assert!(ConverterCommand::parse("   ").is_none());
    }

    #[test]
    fn test_png_mode_writes_numbered_rgba_files() {
        let out = tempfile::tempdir().unwrap();
        let bridge = ConverterBridge::new(OutputConfig {
            mode: OutputMode::Png,
            ..OutputConfig::default()
        });

        let artifacts = bridge.encode(&frames(3), out.path()).unwrap();
        assert_eq!(artifacts.len(), 3);
        assert_eq!(artifacts[0], out.path().join("1.png"));
        assert_eq!(artifacts[2], out.path().join("3.png"));

        let first = image::open(&artifacts[0]).unwrap();
        assert_eq!(first.color(), image::ColorType::Rgba8);
    }

    #[test]
    fn test_empty_frame_set_is_rejected() {
        let out = tempfile::tempdir().unwrap();
        let err = ConverterBridge::new(OutputConfig::default()).encode(&[], out.path()).unwrap_err();
        assert!(matches!(err, ConverterError::Encode(EncodeError::NoFrames)));
    }

    #[cfg(unix)]
    fn shell_bridge(script: &str, timeout_secs: u64) -> ConverterBridge {
        ConverterBridge::new(OutputConfig {
            converter: ConverterCommand {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string(), "converter".to_string()],
                working_dir: None,
            },
            timeout_secs,
            ..OutputConfig::default()
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_rgb565_collects_visible_artifacts() {
        let out = tempfile::tempdir().unwrap();
        // $1 is the frame directory, $2 the output directory
        let bridge = shell_bridge(
            r#"test -f "$1/2.png" && touch "$2/frames.bin" "$2/frames.h" "$2/.partial.bin" "$2/notes.txt""#,
            30,
        );

        let artifacts = bridge.encode(&frames(2), out.path()).unwrap();
        let names: Vec<_> = artifacts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["frames.bin", "frames.h"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_rgb565_ignores_files_from_earlier_runs() {
        let out = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(out.path().join(format!("old_{}.bin", i)), b"stale").unwrap();
        }
        std::fs::write(out.path().join("1.bin"), b"stale").unwrap();
        let bridge = shell_bridge(r#"printf new > "$2/1.bin"; touch "$2/2.bin""#, 30);

        let artifacts = bridge.encode(&frames(2), out.path()).unwrap();
        assert_eq!(artifacts, vec![out.path().join("1.bin"), out.path().join("2.bin")]);
        assert_eq!(std::fs::read(out.path().join("1.bin")).unwrap(), b"new");

        // Stale files stay on disk but are not reported, and no staging directory is left over
        assert!(out.path().join("old_0.bin").exists());
        let leftovers: Vec<_> = std::fs::read_dir(out.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_keep_temp_files_leaves_frame_directory() {
        let out = tempfile::tempdir().unwrap();
        let mut bridge = shell_bridge(r#"printf '%s' "$1" > "$2/frames.bin""#, 30);
        bridge.config.keep_temp_files = true;

        let artifacts = bridge.encode(&frames(2), out.path()).unwrap();
        let frame_dir = PathBuf::from(std::fs::read_to_string(&artifacts[0]).unwrap());
        assert!(frame_dir.join("1.png").exists());
        assert!(frame_dir.join("2.png").exists());
        std::fs::remove_dir_all(frame_dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_rgb565_reports_tool_failure() {
        let out = tempfile::tempdir().unwrap();
        let bridge = shell_bridge("echo 'bad input' >&2; exit 3", 30);

        match bridge.encode(&frames(1), out.path()).unwrap_err() {
            ConverterError::Encode(EncodeError::ToolFailed { diagnostics, .. }) => {
                assert_eq!(diagnostics, "bad input");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_rgb565_without_artifacts_fails() {
        let out = tempfile::tempdir().unwrap();
        let err = shell_bridge("exit 0", 30).encode(&frames(1), out.path()).unwrap_err();
        assert!(matches!(err, ConverterError::Encode(EncodeError::NoArtifacts { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_rgb565_timeout() {
        let out = tempfile::tempdir().unwrap();
        let err = shell_bridge("sleep 10", 1).encode(&frames(1), out.path()).unwrap_err();
        assert!(matches!(err, ConverterError::Encode(EncodeError::Timeout { seconds: 1 })));
    }

    #[test]
    fn test_missing_converter_is_spawn_failure() {
        let out = tempfile::tempdir().unwrap();
        let bridge = ConverterBridge::new(OutputConfig {
            converter: ConverterCommand {
                program: "converter-that-does-not-exist".to_string(),
                args: Vec::new(),
                working_dir: None,
            },
            ..OutputConfig::default()
        });
        let err = bridge.encode(&frames(1), out.path()).unwrap_err();
        assert!(matches!(err, ConverterError::Encode(EncodeError::SpawnFailed { .. })));
    }
}
