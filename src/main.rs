use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mp4_converter::{
    batch::{discover_videos, BatchProcessor},
    config::ProcessConfig,
    transforms::{ChromaKeyConfig, ChromaPreset, Rect, ResampleFilter, ResizeSpec, TransformChain, WatermarkConfig},
    video::{preview_key, ArrayFormat, ConverterBridge, ConverterCommand, FfmpegDecoder, OutputMode},
};

#[derive(Parser)]
#[command(
    name = "mp4-converter",
    version,
    about = "Convert video clips into display-ready frame sets for embedded screens",
    long_about = "mp4-converter samples frames from every video in a directory, optionally resizes them, erases a watermark region and keys out a green or blue screen, then hands each video's frames to an RGB565 converter or writes them as PNG files."
)]
struct Cli {
    /// Directory containing the source videos (mp4, avi, mov, mkv, wmv)
    input_dir: PathBuf,

    /// Output directory; each video gets its own sub-directory
    output_dir: PathBuf,

    /// Frames to extract per second of video
    #[arg(long)]
    frame_rate: Option<f64>,

    /// Total frames to extract per video (takes precedence over --frame-rate)
    #[arg(long)]
    frame_count: Option<usize>,

    /// Resize frames: WxH, wN or hN (e.g. 240x240, w120)
    #[arg(long)]
    resize: Option<String>,

    /// Take resize dimensions literally instead of fitting inside them
    #[arg(long)]
    stretch: bool,

    /// Resampling filter used when resizing
    #[arg(long, value_enum)]
    filter: Option<ResampleFilter>,

    /// Watermark region to erase: X,Y,WIDTH,HEIGHT
    #[arg(long)]
    watermark: Option<String>,

    /// Key out a green screen background
    #[arg(long)]
    chroma_key: bool,

    /// Keying preset (implies --chroma-key)
    #[arg(long, value_enum)]
    chroma_preset: Option<ChromaPreset>,

    /// Output mode
    #[arg(long, value_enum)]
    output_format: Option<OutputMode>,

    /// Converter artifact format (rgb565 mode)
    #[arg(long, value_enum)]
    format: Option<ArrayFormat>,

    /// Maximum output width passed to the converter
    #[arg(long)]
    max_width: Option<u32>,

    /// Maximum output height passed to the converter
    #[arg(long)]
    max_height: Option<u32>,

    /// C array name (c_array format)
    #[arg(long)]
    array_name: Option<String>,

    /// Number of videos processed in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// Keep going when a frame or video fails
    #[arg(long)]
    continue_on_error: bool,

    /// Keep intermediate frame directories for debugging
    #[arg(long)]
    keep_temp: bool,

    /// Converter command line, e.g. "uv run converter convert"
    #[arg(long)]
    converter: Option<String>,

    /// Converter timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a key analysis of each video's first sampled frame instead of converting
    #[arg(long)]
    analyze: bool,

    /// Write the effective configuration to this file and continue
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Print the key analysis of every video in the input directory
fn analyze_videos(cli: &Cli, config: &ProcessConfig, decoder: &FfmpegDecoder) -> ExitCode {
    let videos = match discover_videos(&cli.input_dir) {
        Ok(videos) => videos,
        Err(e) => {
            error!("{}", e.user_message());
            return ExitCode::FAILURE;
        }
    };

    let chain = TransformChain::from_config(config);
    let mut failed = false;
    for video in &videos {
        match preview_key(decoder, config, &chain, video) {
            Ok(analysis) => println!("{}\n{}", video.display(), analysis),
            Err(e) => {
                error!("{}: {}", video.display(), e.user_message());
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Merge command line flags over the file (or default) configuration
fn build_config(cli: &Cli) -> Result<ProcessConfig> {
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            ProcessConfig::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            ProcessConfig::default()
        }
    };

    if cli.frame_rate.is_some() {
        config.sampling.frame_rate = cli.frame_rate;
    }
    if cli.frame_count.is_some() {
        config.sampling.frame_count = cli.frame_count;
    }

    if let Some(resize) = &cli.resize {
        let spec = ResizeSpec::parse(resize).with_context(|| format!("invalid --resize '{}'", resize))?;
        let filter = config.resize.as_ref().map(|r| r.filter).unwrap_or_default();
        config.resize = Some(spec.with_filter(filter));
    }
    if let Some(resize) = config.resize.as_mut() {
        if cli.stretch {
            resize.keep_aspect_ratio = false;
        }
        if let Some(filter) = cli.filter {
            resize.filter = filter;
        }
    }

    if let Some(region) = &cli.watermark {
        let region = Rect::parse(region).with_context(|| format!("invalid --watermark '{}'", region))?;
        config.watermark = match config.watermark.take() {
            Some(existing) => Some(WatermarkConfig { region, ..existing }),
            None => Some(WatermarkConfig::new(region)),
        };
    }

    match cli.chroma_preset {
        Some(preset) => config.chroma_key = Some(preset.config()),
        None if cli.chroma_key && config.chroma_key.is_none() => {
            config.chroma_key = Some(ChromaKeyConfig::default());
        }
        None => {}
    }

    let output = &mut config.output;
    if let Some(mode) = cli.output_format {
        output.mode = mode;
    }
    if let Some(format) = cli.format {
        output.format = format;
    }
    if cli.max_width.is_some() {
        output.max_width = cli.max_width;
    }
    if cli.max_height.is_some() {
        output.max_height = cli.max_height;
    }
    if cli.array_name.is_some() {
        output.array_name = cli.array_name.clone();
    }
    if cli.keep_temp {
        output.keep_temp_files = true;
    }
    if let Some(command_line) = &cli.converter {
        let command = ConverterCommand::parse(command_line).context("--converter must not be empty")?;
        output.converter = ConverterCommand {
            working_dir: output.converter.working_dir.take(),
            ..command
        };
    }
    if let Some(timeout) = cli.timeout {
        output.timeout_secs = timeout;
    }

    if let Some(workers) = cli.workers {
        config.batch.workers = workers;
    }
    if cli.continue_on_error {
        config.batch.continue_on_error = true;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!("Starting mp4-converter v{}", env!("CARGO_PKG_VERSION"));
    info!("Input: {:?}", cli.input_dir);
    info!("Output: {:?}", cli.output_dir);

    let config = build_config(&cli)?;
    if let Some(path) = &cli.save_config {
        config.save_to_file(path)?;
        info!("Effective configuration written to {:?}", path);
    }

    let decoder = FfmpegDecoder::new();
    if let Err(e) = decoder.check_available() {
        error!("{}", e.user_message());
        return Ok(ExitCode::FAILURE);
    }

    if cli.analyze {
        return Ok(analyze_videos(&cli, &config, &decoder));
    }

    let continue_on_error = config.batch.continue_on_error;
    let sink = ConverterBridge::new(config.output.clone());
    let processor = BatchProcessor::with_collaborators(config, Box::new(decoder), Box::new(sink));

    let batch = match processor.process_directory(&cli.input_dir, &cli.output_dir) {
        Ok(batch) => batch,
        Err(e) => {
            error!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("{}", batch);

    if batch.has_failures() && !continue_on_error {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
