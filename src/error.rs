use thiserror::Error;

/// Main error type for the converter library
#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Frame processing error: {0}")]
    Frame(#[from] FrameError),

    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Input and parameter validation errors. Always fatal for the affected unit.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Input file not found: {path}")]
    InputNotFound { path: String },

    #[error("Input is not a regular file: {path}")]
    NotAFile { path: String },

    #[error("Unsupported video format: {path}")]
    UnsupportedFormat { path: String },

    #[error("Unreadable or corrupt video '{path}': {reason}")]
    CorruptVideo { path: String, reason: String },

    #[error("Malformed region '{input}': {reason}")]
    MalformedRegion { input: String, reason: String },

    #[error("Region {region} exceeds frame bounds {width}x{height}")]
    RegionOutOfBounds { region: String, width: u32, height: u32 },

    #[error("Invalid resize spec: {details}")]
    InvalidResize { details: String },
}

/// Errors raised by the decode collaborator
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Decoder tool unavailable: {tool}")]
    ToolMissing { tool: String },

    #[error("Frame index {index} out of range (video has {total} frames)")]
    FrameOutOfRange { index: u64, total: u64 },

    #[error("Failed to extract frame {index}: {reason}")]
    ExtractFailed { index: u64, reason: String },

    #[error("Invalid sampling parameters: {details}")]
    InvalidSampling { details: String },
}

/// Per-frame transform failures. Skippable when continue-on-error is set.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Resize failed: {reason}")]
    ResizeFailed { reason: String },

    #[error("Matte generation failed: {reason}")]
    MatteFailed { reason: String },

    #[error("Enhancement '{operation}' failed: {reason}")]
    EnhanceFailed { operation: String, reason: String },
}

/// Whole-video failures recorded in the video's result
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("No frames were processed successfully")]
    NoUsableFrames,

    #[error("Video aborted at frame {index}: {reason}")]
    Aborted { index: u64, reason: String },
}

/// Errors raised by the encode collaborator
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Nothing to encode")]
    NoFrames,

    #[error("Failed to write frame {path}: {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("Converter could not be started: {reason}")]
    SpawnFailed { reason: String },

    #[error("Converter exited with {status}: {diagnostics}")]
    ToolFailed { status: String, diagnostics: String },

    #[error("Converter timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Converter finished but produced no artifacts in {dir}")]
    NoArtifacts { dir: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Coarse classification used by the pipeline to decide what is skippable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Frame,
    Video,
    Config,
    Io,
}

/// Convenience type alias for Results using ConverterError
pub type Result<T> = std::result::Result<T, ConverterError>;

impl ConverterError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Decode(DecodeError::InvalidSampling { .. } | DecodeError::ToolMissing { .. }) => {
                ErrorKind::Validation
            }
            Self::Decode(_) | Self::Frame(_) => ErrorKind::Frame,
            Self::Video(_) | Self::Encode(_) | Self::Generic(_) => ErrorKind::Video,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            // IO errors might be temporary
            Self::Io(_) => true,
            Self::Encode(EncodeError::Timeout { .. }) => true,
            Self::Decode(DecodeError::ExtractFailed { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::InputNotFound { path }) => {
                format!("Could not find video file '{}'. Please check the path.", path)
            }
            Self::Validation(ValidationError::CorruptVideo { path, .. }) => {
                format!("Could not read video file '{}'. It may be corrupt or use an unsupported codec.", path)
            }
            Self::Validation(ValidationError::MalformedRegion { input, .. }) => {
                format!("Watermark region '{}' is malformed. Expected X,Y,WIDTH,HEIGHT, e.g. 10,10,50,50.", input)
            }
            Self::Decode(DecodeError::ToolMissing { tool }) => {
                format!("'{}' was not found on PATH. Please install FFmpeg.", tool)
            }
            Self::Encode(EncodeError::Timeout { seconds }) => {
                format!("The frame converter did not finish within {} seconds.", seconds)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
