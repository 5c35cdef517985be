//! Video to DICOM series conversion.
//!
//! [`SeriesWriter`] pulls frames from a [`FrameSource`] one at a time and runs
//! each through resize, compression and assembly before persisting it as
//! `<out_dir>/frame_<index>.dcm`. Only the frame being processed is held in
//! memory.

pub mod assemble;
pub mod encode;
pub mod resize;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbImage;

use crate::error::ConvertError;
use crate::series::{SeriesDescriptor, SeriesOverrides, frame_interval_ms};
use crate::source::{FfmpegConfig, FfmpegSource, FrameSource};
use crate::uid::new_uid;
use crate::utils::{clean_output, default_out_dir, frame_file_name, video_base_name};

use assemble::{FrameInstance, Implementation, assemble};
use encode::{Codec, DEFAULT_QUALITY, Quality};
use resize::MAX_DIMENSION;

/// Parameters of one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertRequest {
    pub video_path: PathBuf,
    /// Defaults to the video's base name with dots replaced by underscores.
    pub out_dir: Option<PathBuf>,
    /// JPEG quality, 1..=100.
    pub quality: u8,
    /// Target frame width; height follows the aspect ratio.
    pub width: Option<u32>,
    pub overrides: SeriesOverrides,
    /// Remove a non-empty output folder before writing.
    pub clean: bool,
    pub ffmpeg: FfmpegConfig,
}

impl ConvertRequest {
    pub fn new(video_path: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            out_dir: None,
            quality: DEFAULT_QUALITY,
            width: None,
            overrides: SeriesOverrides::default(),
            clean: false,
            ffmpeg: FfmpegConfig::default(),
        }
    }

    /// Output folder for this run, resolved once.
    pub fn resolved_out_dir(&self) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| default_out_dir(&self.video_path))
    }
}

/// Shared flag for aborting a run between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress report for one persisted instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameWritten {
    pub frame_index: u64,
    pub instance_number: u32,
    pub path: PathBuf,
    pub rows: u16,
    pub columns: u16,
    /// Frame count announced by the source, if known.
    pub frame_count: Option<u64>,
}

/// Per-frame processing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOptions {
    pub codec: Codec,
    pub quality: Quality,
    pub width: Option<u32>,
}

/// Result of a completed or cancelled run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertSummary {
    pub video_path: PathBuf,
    pub out_dir: PathBuf,
    pub frames_written: u64,
    pub frame_rate: f64,
    pub series_instance_uid: String,
    pub cancelled: bool,
}

impl fmt::Display for ConvertSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            write!(
                f,
                "Conversion cancelled after {} frame(s) from {:?}; partial series left in {:?}",
                self.frames_written, self.video_path, self.out_dir
            )
        } else {
            write!(
                f,
                "Converted {} frame(s) from {:?} into {:?}",
                self.frames_written, self.video_path, self.out_dir
            )
        }
    }
}

/// Success flag and status line for callers that only display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOutcome {
    pub success: bool,
    pub status: String,
}

impl From<Result<ConvertSummary, ConvertError>> for ConvertOutcome {
    fn from(result: Result<ConvertSummary, ConvertError>) -> Self {
        match result {
            Ok(summary) => Self {
                success: !summary.cancelled,
                status: summary.to_string(),
            },
            Err(e) => Self {
                success: false,
                status: error_chain(&e),
            },
        }
    }
}

/// Writes the instances of one series into an output folder.
#[derive(Debug, Clone)]
pub struct SeriesWriter {
    series: SeriesDescriptor,
    implementation: Implementation,
    out_dir: PathBuf,
    options: FrameOptions,
}

impl SeriesWriter {
    pub fn new(
        series: SeriesDescriptor,
        out_dir: impl Into<PathBuf>,
        options: FrameOptions,
    ) -> Self {
        Self {
            series,
            implementation: Implementation::generate(),
            out_dir: out_dir.into(),
            options,
        }
    }

    pub fn series(&self) -> &SeriesDescriptor {
        &self.series
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Create the output folder (and parents), optionally removing stale
    /// `frame_<index>.dcm` files first. Other entries are left untouched.
    pub fn prepare_output(&self, clean: bool) -> Result<(), ConvertError> {
        if clean {
            let removed = clean_output(&self.out_dir).map_err(|source| ConvertError::Clean {
                path: self.out_dir.clone(),
                source,
            })?;
            if removed > 0 {
                tracing::info!(
                    out_dir = %self.out_dir.display(),
                    removed,
                    "removed stale frame files"
                );
            }
        }
        fs::create_dir_all(&self.out_dir).map_err(|source| ConvertError::CreateDir {
            path: self.out_dir.clone(),
            source,
        })
    }

    /// Process and persist the frame fetched at zero-based `frame_index`.
    pub fn write_frame(
        &self,
        frame_index: u64,
        frame: RgbImage,
    ) -> Result<FrameWritten, ConvertError> {
        let frame = resize::resize(frame, self.options.width).map_err(|source| {
            ConvertError::Resize {
                frame: frame_index,
                source,
            }
        })?;
        let (columns, rows) = frame.dimensions();

        let payload = self
            .options
            .codec
            .encode(&frame, self.options.quality)
            .map_err(|source| ConvertError::Codec {
                frame: frame_index,
                source,
            })?;
        drop(frame);
        if payload.is_empty() {
            return Err(ConvertError::EmptyPayload { frame: frame_index });
        }

        let instance = FrameInstance::new(new_uid(), frame_index, rows, columns, payload)
            .map_err(|source| ConvertError::Assemble {
                frame: frame_index,
                source,
            })?;
        let (instance_number, rows, columns) =
            (instance.instance_number, instance.rows, instance.columns);
        let obj = assemble(&self.series, instance, &self.implementation).map_err(|source| {
            ConvertError::Assemble {
                frame: frame_index,
                source,
            }
        })?;

        let path = self.out_dir.join(frame_file_name(frame_index));
        obj.write_to_file(&path)
            .map_err(|source| ConvertError::Write {
                frame: frame_index,
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            frame = frame_index,
            path = %path.display(),
            rows,
            columns,
            "wrote instance"
        );

        Ok(FrameWritten {
            frame_index,
            instance_number,
            path,
            rows,
            columns,
            frame_count: None,
        })
    }

    /// Drain `source`, writing one instance per frame in fetch order.
    ///
    /// Cancellation is checked before each fetch. The source is released
    /// exactly once, whether the run finishes, fails or is cancelled.
    /// Returns the number of frames written and whether the run was cancelled.
    pub fn write_all<S, F>(
        &self,
        source: &mut S,
        cancel: &CancelToken,
        mut on_frame: F,
    ) -> Result<(u64, bool), ConvertError>
    where
        S: FrameSource + ?Sized,
        F: FnMut(&FrameWritten),
    {
        let frame_count = source.frame_count();
        let mut frame_index = 0;

        let result = loop {
            if cancel.is_cancelled() {
                tracing::warn!(frames_written = frame_index, "conversion cancelled");
                break Ok((frame_index, true));
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok((frame_index, false)),
                Err(source) => {
                    break Err(ConvertError::Source {
                        frame: frame_index,
                        source,
                    });
                }
            };

            match self.write_frame(frame_index, frame) {
                Ok(mut written) => {
                    written.frame_count = frame_count;
                    on_frame(&written);
                }
                Err(e) => break Err(e),
            }
            frame_index += 1;
        };

        source.release();
        result
    }
}

/// Convert the video described by `request` using ffmpeg for decoding.
pub fn convert<F>(
    request: &ConvertRequest,
    cancel: &CancelToken,
    on_frame: F,
) -> Result<ConvertSummary, ConvertError>
where
    F: FnMut(&FrameWritten),
{
    let options = frame_options(request)?;
    let mut source = FfmpegSource::open(&request.video_path, &request.ffmpeg)?;
    convert_with_options(&mut source, request, options, cancel, on_frame)
}

/// Convert frames from an already opened `source`, described by `request`.
pub fn convert_source<S, F>(
    source: &mut S,
    request: &ConvertRequest,
    cancel: &CancelToken,
    on_frame: F,
) -> Result<ConvertSummary, ConvertError>
where
    S: FrameSource + ?Sized,
    F: FnMut(&FrameWritten),
{
    let options = match frame_options(request) {
        Ok(options) => options,
        Err(e) => {
            source.release();
            return Err(e);
        }
    };
    convert_with_options(source, request, options, cancel, on_frame)
}

/// Single-call entry point returning a success flag and a status line.
pub fn run<F>(request: &ConvertRequest, cancel: &CancelToken, on_frame: F) -> ConvertOutcome
where
    F: FnMut(&FrameWritten),
{
    let result = convert(request, cancel, on_frame);
    if let Err(e) = &result {
        tracing::error!(error = %error_chain(e), "conversion failed");
    }
    ConvertOutcome::from(result)
}

fn frame_options(request: &ConvertRequest) -> Result<FrameOptions, ConvertError> {
    let quality =
        Quality::new(request.quality).ok_or(ConvertError::InvalidQuality(request.quality))?;
    if let Some(width) = request.width
        && !(1..=MAX_DIMENSION).contains(&width)
    {
        return Err(ConvertError::InvalidWidth(width));
    }
    Ok(FrameOptions {
        codec: Codec::JpegBaseline,
        quality,
        width: request.width,
    })
}

fn convert_with_options<S, F>(
    source: &mut S,
    request: &ConvertRequest,
    options: FrameOptions,
    cancel: &CancelToken,
    on_frame: F,
) -> Result<ConvertSummary, ConvertError>
where
    S: FrameSource + ?Sized,
    F: FnMut(&FrameWritten),
{
    let frame_rate = source.frame_rate();
    let Some(interval) = frame_interval_ms(frame_rate) else {
        source.release();
        return Err(ConvertError::InvalidFrameRate {
            path: request.video_path.clone(),
            frame_rate,
        });
    };

    let out_dir = request.resolved_out_dir();
    let base_name = video_base_name(&request.video_path);
    let overrides = SeriesOverrides {
        study_description: request
            .overrides
            .study_description
            .clone()
            .or_else(|| Some(base_name.clone())),
        series_description: request
            .overrides
            .series_description
            .clone()
            .or_else(|| Some(base_name.clone())),
        ..request.overrides.clone()
    };

    tracing::info!(
        video = %request.video_path.display(),
        frame_rate,
        frame_count = ?source.frame_count(),
        out_dir = %out_dir.display(),
        "starting conversion"
    );

    let writer = SeriesWriter::new(SeriesDescriptor::new(interval, &overrides), out_dir, options);
    if let Err(e) = writer.prepare_output(request.clean) {
        source.release();
        return Err(e);
    }

    let (frames_written, cancelled) = writer.write_all(source, cancel, on_frame)?;

    let summary = ConvertSummary {
        video_path: request.video_path.clone(),
        out_dir: writer.out_dir().to_path_buf(),
        frames_written,
        frame_rate,
        series_instance_uid: writer.series().series_instance_uid.clone(),
        cancelled,
    };
    tracing::info!(
        frames = frames_written,
        cancelled,
        out_dir = %summary.out_dir.display(),
        "conversion completed"
    );
    Ok(summary)
}

/// Render an error and its sources as one line.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
