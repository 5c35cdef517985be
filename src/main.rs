//! # video2dicom
//!
//! A command-line tool to convert a video file into a DICOM series of
//! single-frame Secondary Capture images.
//!
//! ## Usage
//!
//! ```bash
//! video2dicom convert <video> [--out <dir>] [--quality 80] [--width 640]
//! video2dicom verify --in <dir>
//! ```
//!
//! Without `--out`, frames are written to a folder named after the video
//! (`clip.mp4` becomes `clip_mp4/frame_0.dcm`, `clip_mp4/frame_1.dcm`, ...).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use video2dicom::convert::encode::DEFAULT_QUALITY;
use video2dicom::convert::resize::MAX_DIMENSION;
use video2dicom::{CancelToken, ConvertRequest, FfmpegConfig, SeriesOverrides, convert, verify};

#[derive(Parser, Debug)]
#[command(name = "video2dicom")]
#[command(about = "Convert a video into a DICOM series of secondary capture images")]
struct CliArgs {
    /// Log debug output for every written frame
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a DICOM series from a video
    Convert {
        #[command(flatten)]
        args: ConvertArgs,
    },
    /// Check that a folder of converted frames forms one consistent series
    Verify {
        /// Folder containing frame_<index>.dcm files
        #[arg(long = "in", short = 'i')]
        input: PathBuf,

        /// Also decode pixel data and compare it against Rows/Columns
        #[arg(long)]
        decode: bool,
    },
}

/// CLI arguments for the `convert` subcommand.
#[derive(Args, Debug)]
struct ConvertArgs {
    /// Path to the video file
    video_path: PathBuf,

    /// The directory where the DICOM files will be created
    #[arg(long, short = 'o')]
    out: Option<PathBuf>,

    /// JPEG quality (1-100)
    #[arg(long, short = 'q', default_value_t = DEFAULT_QUALITY,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Width of the frames (1-65535); height keeps the aspect ratio. Omit for the source width
    #[arg(long, short = 'w',
          value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DIMENSION)))]
    width: Option<u32>,

    /// DICOM PatientID (generated when omitted)
    #[arg(long)]
    patient_id: Option<String>,

    /// DICOM PatientName
    #[arg(long)]
    patient_name: Option<String>,

    /// DICOM StudyDescription (defaults to the video file name)
    #[arg(long)]
    study_description: Option<String>,

    /// DICOM SeriesDescription (defaults to the video file name)
    #[arg(long)]
    series_description: Option<String>,

    /// Remove existing frame_<index>.dcm files from the output directory before writing
    #[arg(long, short = 'f')]
    force: bool,

    /// ffmpeg executable used to decode the video
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe executable used to read the video's frame rate
    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,
}

impl From<ConvertArgs> for ConvertRequest {
    fn from(args: ConvertArgs) -> Self {
        Self {
            video_path: args.video_path,
            out_dir: args.out,
            quality: args.quality,
            width: args.width,
            overrides: SeriesOverrides {
                patient_id: args.patient_id,
                patient_name: args.patient_name,
                study_description: args.study_description,
                series_description: args.series_description,
            },
            clean: args.force,
            ffmpeg: FfmpegConfig {
                ffmpeg: args.ffmpeg,
                ffprobe: args.ffprobe,
            },
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .unwrap_or_else(|e| eprintln!("Could not set up global logger: {e}"));
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let request = ConvertRequest::from(args);
    println!(
        "Starting conversion of {:?} into {:?}",
        request.video_path,
        request.resolved_out_dir()
    );

    let summary = convert(&request, &CancelToken::new(), |written| {
        let name = written
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match written.frame_count {
            Some(total) => println!(
                "✓ Wrote {name} ({}/{total}, {}x{})",
                written.instance_number, written.columns, written.rows
            ),
            None => println!("✓ Wrote {name} ({}x{})", written.columns, written.rows),
        }
    })
    .with_context(|| format!("Failed to convert {:?}", request.video_path))?;

    println!("\n{summary}");
    println!("  SeriesInstanceUID: {}", summary.series_instance_uid);
    Ok(())
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    match args.command {
        Commands::Convert { args } => run_convert(args),
        Commands::Verify { input, decode } => {
            if !verify::run(&input, decode)? {
                anyhow::bail!("Series in {input:?} is not consistent");
            }
            Ok(())
        }
    }
}
