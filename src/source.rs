//! Video frame sources.
//!
//! The converter only needs a pull-based stream of fixed-size RGB rasters. The
//! production source shells out to `ffprobe` for stream properties and to
//! `ffmpeg` for decoding, reading raw `rgb24` frames from its stdout one at a
//! time so that no more than a single frame is held in memory.

use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use serde::Deserialize;

use crate::error::SourceError;

/// A pull-based stream of decoded video frames.
pub trait FrameSource {
    /// Frames per second of the source.
    fn frame_rate(&self) -> f64;

    /// Number of frames the container claims to hold. Informational only.
    fn frame_count(&self) -> Option<u64>;

    /// Decode the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError>;

    /// Release the underlying decoder. Calling this more than once is a no-op.
    fn release(&mut self);
}

/// Locations of the external ffmpeg tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub frame_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Frame source backed by an `ffmpeg` child process.
pub struct FfmpegSource {
    properties: VideoProperties,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
}

impl FfmpegSource {
    /// Probe `path` and start decoding it.
    pub fn open(path: &Path, config: &FfmpegConfig) -> Result<Self, SourceError> {
        validate_input_file(path)?;
        let properties = probe(path, &config.ffprobe)?;

        let mut child = Command::new(&config.ffmpeg)
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args([
                "-map",
                "0:v:0",
                "-fps_mode",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: config.ffmpeg.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        tracing::debug!(
            path = %path.display(),
            width = properties.width,
            height = properties.height,
            "started ffmpeg decoder"
        );

        Ok(Self {
            properties,
            child: Some(child),
            stdout,
            stderr,
        })
    }

    pub fn properties(&self) -> &VideoProperties {
        &self.properties
    }

    fn frame_len(&self) -> usize {
        self.properties.width as usize * self.properties.height as usize * 3
    }

    /// Wait for the decoder after its output ended and report a failed exit.
    fn finish(&mut self) -> Result<(), SourceError> {
        self.stdout = None;
        let status = match self.child.take() {
            Some(mut child) => Some(child.wait()?),
            None => None,
        };
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        match status {
            Some(status) if !status.success() => {
                Err(SourceError::Decode(stderr.trim().to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn frame_rate(&self) -> f64 {
        self.properties.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        self.properties.frame_count
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let expected = self.frame_len();
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buffer = vec![0u8; expected];
        let received = fill_buffer(stdout, &mut buffer)?;
        if received == 0 {
            self.finish()?;
            return Ok(None);
        }
        if received < expected {
            return Err(SourceError::Truncated { received, expected });
        }

        RgbImage::from_raw(self.properties.width, self.properties.height, buffer)
            .map(Some)
            .ok_or(SourceError::Truncated { received, expected })
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read until `buffer` is full or the reader is exhausted.
fn fill_buffer(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Validate that the input video exists and is a regular file.
pub fn validate_input_file(path: &Path) -> Result<(), SourceError> {
    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(SourceError::NotAFile(path.to_path_buf()));
    }
    Ok(())
}

/// Read the first video stream's properties with ffprobe.
pub fn probe(path: &Path, ffprobe: &Path) -> Result<VideoProperties, SourceError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|source| SourceError::Spawn {
            program: ffprobe.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(SourceError::Probe {
            path: path.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_probe_output(path, &output.stdout)
}

fn parse_probe_output(path: &Path, json: &[u8]) -> Result<VideoProperties, SourceError> {
    let parsed: ProbeOutput =
        serde_json::from_slice(json).map_err(|source| SourceError::ProbeOutput {
            path: path.to_path_buf(),
            source,
        })?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::NoVideoStream(path.to_path_buf()))?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(SourceError::InvalidDimensions {
            path: path.to_path_buf(),
            width,
            height,
        });
    }

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational))
        .unwrap_or(0.0);

    Ok(VideoProperties {
        width,
        height,
        frame_rate,
        frame_count: stream.nb_frames.and_then(|n| n.trim().parse().ok()),
    })
}

/// Parse an ffprobe rational such as `30000/1001`. Zero denominators yield `None`.
fn parse_rational(value: &str) -> Option<f64> {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// In-memory frame source with a fixed frame rate.
#[derive(Debug, Clone)]
pub struct MemorySource {
    frames: VecDeque<RgbImage>,
    frame_rate: f64,
    frame_count: u64,
    released: bool,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, frame_rate: f64) -> Self {
        let frame_count = frames.len() as u64;
        Self {
            frames: frames.into(),
            frame_rate,
            frame_count,
            released: false,
        }
    }

    /// Whether [`FrameSource::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl FrameSource for MemorySource {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frame_count)
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        if self.released {
            return Ok(None);
        }
        Ok(self.frames.pop_front())
    }

    fn release(&mut self) {
        self.released = true;
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Frame Rate Parsing Tests
    // =========================================================================

    mod rational_parsing {
        use super::*;

        #[test]
        fn parses_integer_rates() {
            assert_eq!(parse_rational("30/1"), Some(30.0));
            assert_eq!(parse_rational("25"), Some(25.0));
        }

        #[test]
        fn parses_ntsc_rate() {
            let rate = parse_rational("30000/1001").unwrap();
            assert!((rate - 29.97).abs() < 0.01);
        }

        #[test]
        fn rejects_zero_and_garbage() {
            assert_eq!(parse_rational("0/0"), None);
            assert_eq!(parse_rational("0/1"), None);
            assert_eq!(parse_rational("abc"), None);
            assert_eq!(parse_rational(""), None);
        }
    }

    // =========================================================================
    // ffprobe Output Tests
    // =========================================================================

    mod probe_output {
        use super::*;

        #[test]
        fn parses_typical_stream() {
            let json = br#"{
                "programs": [],
                "streams": [
                    {
                        "width": 640,
                        "height": 480,
                        "r_frame_rate": "30/1",
                        "avg_frame_rate": "30/1",
                        "nb_frames": "3"
                    }
                ]
            }"#;
            let props = parse_probe_output(Path::new("clip.mp4"), json).unwrap();

            assert_eq!(props.width, 640);
            assert_eq!(props.height, 480);
            assert_eq!(props.frame_rate, 30.0);
            assert_eq!(props.frame_count, Some(3));
        }

        #[test]
        fn falls_back_to_real_frame_rate() {
            let json = br#"{"streams": [{"width": 8, "height": 8, "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}]}"#;
            let props = parse_probe_output(Path::new("clip.mkv"), json).unwrap();

            assert_eq!(props.frame_rate, 25.0);
            assert_eq!(props.frame_count, None);
        }

        #[test]
        fn missing_stream_is_an_error() {
            let json = br#"{"streams": []}"#;
            let result = parse_probe_output(Path::new("audio.wav"), json);
            assert!(matches!(result, Err(SourceError::NoVideoStream(_))));
        }

        #[test]
        fn zero_dimensions_are_an_error() {
            let json = br#"{"streams": [{"width": 0, "height": 480, "avg_frame_rate": "30/1"}]}"#;
            let result = parse_probe_output(Path::new("clip.mp4"), json);
            assert!(matches!(result, Err(SourceError::InvalidDimensions { .. })));
        }

        #[test]
        fn malformed_json_is_an_error() {
            let result = parse_probe_output(Path::new("clip.mp4"), b"not json");
            assert!(matches!(result, Err(SourceError::ProbeOutput { .. })));
        }
    }

    // =========================================================================
    // Buffer Filling Tests
    // =========================================================================

    mod buffer_filling {
        use super::*;

        #[test]
        fn fills_exact_frame() {
            let data = vec![7u8; 12];
            let mut buffer = vec![0u8; 12];
            let n = fill_buffer(&mut data.as_slice(), &mut buffer).unwrap();
            assert_eq!(n, 12);
            assert_eq!(buffer, data);
        }

        #[test]
        fn reports_short_read() {
            let data = vec![1u8; 5];
            let mut buffer = vec![0u8; 12];
            assert_eq!(fill_buffer(&mut data.as_slice(), &mut buffer).unwrap(), 5);
        }

        #[test]
        fn empty_reader_yields_zero() {
            let mut empty: &[u8] = &[];
            let mut buffer = vec![0u8; 12];
            assert_eq!(fill_buffer(&mut empty, &mut buffer).unwrap(), 0);
        }
    }

    // =========================================================================
    // Memory Source Tests
    // =========================================================================

    mod memory_source {
        use super::*;

        #[test]
        fn yields_frames_in_order_then_ends() {
            let frames = (0..3u8)
                .map(|i| RgbImage::from_pixel(2, 2, image::Rgb([i, i, i])))
                .collect();
            let mut source = MemorySource::new(frames, 30.0);

            assert_eq!(source.frame_count(), Some(3));
            for i in 0..3u8 {
                let frame = source.next_frame().unwrap().unwrap();
                assert_eq!(frame.get_pixel(0, 0).0, [i, i, i]);
            }
            assert!(source.next_frame().unwrap().is_none());
        }

        #[test]
        fn release_ends_stream() {
            let frames = vec![RgbImage::new(2, 2); 2];
            let mut source = MemorySource::new(frames, 30.0);

            source.release();
            source.release();
            assert!(source.is_released());
            assert!(source.next_frame().unwrap().is_none());
        }
    }

    // =========================================================================
    // Input Validation Tests
    // =========================================================================

    mod input_validation {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn nonexistent_file_fails() {
            let result = validate_input_file(Path::new("/nonexistent/video.mp4"));
            assert!(matches!(result, Err(SourceError::NotFound(_))));
        }

        #[test]
        fn directory_fails() {
            let temp_dir = TempDir::new().unwrap();
            let result = validate_input_file(temp_dir.path());
            assert!(matches!(result, Err(SourceError::NotAFile(_))));
        }

        #[test]
        fn regular_file_succeeds() {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("clip.mp4");
            std::fs::write(&path, b"data").unwrap();
            assert!(validate_input_file(&path).is_ok());
        }
    }
}
