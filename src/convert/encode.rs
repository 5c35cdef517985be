//! Frame compression and pixel data encapsulation.
//!
//! The compressor and the transfer syntax declared for its output are chosen
//! together through [`Codec`], so the two cannot disagree.

use dicom::core::value::PixelFragmentSequence;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageError, RgbImage};

/// JPEG Baseline (Process 1) transfer syntax.
pub const JPEG_BASELINE_8BIT: &str = "1.2.840.10008.1.2.4.50";

/// Default JPEG quality.
pub const DEFAULT_QUALITY: u8 = 80;

/// Photometric interpretation of baseline JPEG streams.
pub const PHOTOMETRIC_YBR_FULL_422: &str = "YBR_FULL_422";

/// Compression quality in the range 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    /// Returns `None` when `value` lies outside 1..=100.
    pub fn new(value: u8) -> Option<Self> {
        (1..=100).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(DEFAULT_QUALITY)
    }
}

/// Pixel data compression scheme together with its transfer syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// Lossy 8-bit baseline JPEG.
    #[default]
    JpegBaseline,
}

impl Codec {
    /// Transfer syntax UID declaring this codec's output.
    pub fn transfer_syntax_uid(self) -> &'static str {
        match self {
            Self::JpegBaseline => JPEG_BASELINE_8BIT,
        }
    }

    /// Photometric interpretation of the decoded stream.
    pub fn photometric_interpretation(self) -> &'static str {
        match self {
            Self::JpegBaseline => PHOTOMETRIC_YBR_FULL_422,
        }
    }

    /// Compress `frame` and wrap it as encapsulated pixel data.
    pub fn encode(self, frame: &RgbImage, quality: Quality) -> Result<FramePayload, ImageError> {
        let compressed = match self {
            Self::JpegBaseline => compress_jpeg(frame, quality)?,
        };
        Ok(FramePayload::from_compressed(self, compressed))
    }
}

/// One frame's compressed pixel data, held as a single encapsulated fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePayload {
    codec: Codec,
    fragment: Vec<u8>,
}

impl FramePayload {
    /// Wrap one compressed stream. Odd-length streams are padded with a zero
    /// byte since fragment items must have even length.
    pub fn from_compressed(codec: Codec, mut compressed: Vec<u8>) -> Self {
        if compressed.len() % 2 != 0 {
            compressed.push(0);
        }
        Self {
            codec,
            fragment: compressed,
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn fragment(&self) -> &[u8] {
        &self.fragment
    }

    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }

    /// Encapsulated pixel data: an empty basic offset table followed by one fragment.
    pub fn into_fragment_sequence(self) -> PixelFragmentSequence<Vec<u8>> {
        PixelFragmentSequence::new_fragments(vec![self.fragment])
    }
}

fn compress_jpeg(frame: &RgbImage, quality: Quality) -> Result<Vec<u8>, ImageError> {
    let mut compressed = Vec::new();
    JpegEncoder::new_with_quality(&mut compressed, quality.get()).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(compressed)
}
