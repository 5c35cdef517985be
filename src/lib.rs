//! # video2dicom
//!
//! Converts a video file into a series of single-frame DICOM Secondary Capture
//! instances, one `frame_<index>.dcm` file per decoded frame, all sharing one
//! patient, study and series.
//!
//! Each frame is optionally resized to a target width, compressed as baseline
//! JPEG and stored as a single encapsulated fragment under the JPEG Baseline
//! transfer syntax.
//!
//! ```no_run
//! use video2dicom::{CancelToken, ConvertRequest, convert};
//!
//! let mut request = ConvertRequest::new("clip.mp4");
//! request.width = Some(320);
//! let summary = convert(&request, &CancelToken::new(), |_| {}).unwrap();
//! println!("{summary}");
//! ```

pub mod convert;
pub mod error;
pub mod series;
pub mod source;
pub mod uid;
pub mod utils;
pub mod verify;

pub use convert::{
    CancelToken, ConvertOutcome, ConvertRequest, ConvertSummary, FrameWritten, SeriesWriter,
    convert, convert_source, run,
};
pub use error::{ConvertError, SourceError};
pub use series::{SeriesDescriptor, SeriesOverrides};
pub use source::{FfmpegConfig, FfmpegSource, FrameSource, MemorySource};
