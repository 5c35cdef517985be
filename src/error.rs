use std::path::PathBuf;

use crate::convert::assemble::AssembleError;
use crate::convert::resize::ResizeError;

/// Error raised while converting a video into a DICOM series.
///
/// Every error that happens while handling a specific frame carries that
/// frame's zero-based index.
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Input(#[from] SourceError),

    #[error("Invalid frame rate {frame_rate} reported for {path:?}")]
    InvalidFrameRate { path: PathBuf, frame_rate: f64 },

    #[error("JPEG quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),

    #[error("Target width must be between 1 and 65535, got {0}")]
    InvalidWidth(u32),

    #[error("Frame {frame}: failed to read from video source")]
    Source {
        frame: u64,
        #[source]
        source: SourceError,
    },

    #[error("Frame {frame}: {source}")]
    Resize {
        frame: u64,
        #[source]
        source: ResizeError,
    },

    #[error("Frame {frame}: JPEG compression failed")]
    Codec {
        frame: u64,
        #[source]
        source: image::ImageError,
    },

    #[error("Frame {frame}: JPEG compression produced no data")]
    EmptyPayload { frame: u64 },

    #[error("Failed to create output folder: {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to clean output folder: {path:?}")]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame {frame}: {source}")]
    Assemble {
        frame: u64,
        #[source]
        source: AssembleError,
    },

    #[error("Frame {frame}: failed to write {path:?}")]
    Write {
        frame: u64,
        path: PathBuf,
        #[source]
        source: dicom::object::WriteError,
    },
}

impl ConvertError {
    /// Index of the frame being processed when the error happened, if any.
    pub fn frame(&self) -> Option<u64> {
        match self {
            Self::Source { frame, .. }
            | Self::Resize { frame, .. }
            | Self::Codec { frame, .. }
            | Self::EmptyPayload { frame }
            | Self::Assemble { frame, .. }
            | Self::Write { frame, .. } => Some(*frame),
            _ => None,
        }
    }
}

/// Error raised by a frame source.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Input video does not exist: {0:?}")]
    NotFound(PathBuf),

    #[error("Input path is not a file: {0:?}")]
    NotAFile(PathBuf),

    #[error("Failed to execute {program}. Is ffmpeg installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffprobe failed on {path:?}: {stderr}")]
    Probe { path: PathBuf, stderr: String },

    #[error("Could not parse ffprobe output for {path:?}")]
    ProbeOutput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No video stream found in {0:?}")]
    NoVideoStream(PathBuf),

    #[error("Video stream in {path:?} has invalid dimensions {width}x{height}")]
    InvalidDimensions {
        path: PathBuf,
        width: u32,
        height: u32,
    },

    #[error("Decoder output ended mid-frame ({received} of {expected} bytes)")]
    Truncated { received: usize, expected: usize },

    #[error("Failed to read decoded frame")]
    Read(#[from] std::io::Error),

    #[error("ffmpeg decoding failed: {0}")]
    Decode(String),
}
