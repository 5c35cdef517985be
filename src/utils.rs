//! Utility functions for output paths, folder cleanup, and sanitization.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Folder name used when a video path has no usable file name.
const FALLBACK_OUTPUT_NAME: &str = "output";

/// Base name of a video path, as used for default descriptions.
pub fn video_base_name(video_path: &Path) -> String {
    video_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Default output folder for a video: its base name with dots replaced by
/// underscores, e.g. `clip.mp4` becomes `clip_mp4`.
pub fn default_out_dir(video_path: &Path) -> PathBuf {
    let name = sanitize_filename(&video_base_name(video_path).replace('.', "_"));
    if name.is_empty() {
        PathBuf::from(FALLBACK_OUTPUT_NAME)
    } else {
        PathBuf::from(name)
    }
}

/// File name of the instance written for the zero-based `frame_index`.
pub fn frame_file_name(frame_index: u64) -> String {
    format!("frame_{frame_index}.dcm")
}

/// Frame index encoded in a `frame_<index>.dcm` file name.
pub fn parse_frame_index(file_name: &str) -> Option<u64> {
    let digits = file_name.strip_prefix("frame_")?.strip_suffix(".dcm")?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Sanitize a string for use as a filename/folder name.
/// Replaces invalid characters with underscores.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_ascii_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Remove the `frame_<index>.dcm` files directly inside an output folder.
/// Any other entry is left in place. Returns the number of files removed.
pub fn clean_output(path: &Path) -> io::Result<usize> {
    if !path.is_dir() || is_folder_empty(path)? {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let is_frame = entry
            .file_name()
            .to_str()
            .and_then(parse_frame_index)
            .is_some();
        if is_frame && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Check if a folder is empty.
pub fn is_folder_empty(path: &Path) -> io::Result<bool> {
    let mut entries = fs::read_dir(path)?;
    Ok(entries.next().is_none())
}

// =============================================================================
// Unit Tests for utils module
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // =========================================================================
    // default_out_dir Tests
    // =========================================================================

    mod default_out_dir_tests {
        use super::*;

        #[test]
        fn replaces_extension_dot() {
            assert_eq!(default_out_dir(Path::new("clip.mp4")), PathBuf::from("clip_mp4"));
        }

        #[test]
        fn uses_only_the_base_name() {
            assert_eq!(
                default_out_dir(Path::new("/videos/2024/clip.mp4")),
                PathBuf::from("clip_mp4")
            );
        }

        #[test]
        fn replaces_every_dot() {
            assert_eq!(
                default_out_dir(Path::new("scan.v2.final.avi")),
                PathBuf::from("scan_v2_final_avi")
            );
        }

        #[test]
        fn name_without_extension_is_kept() {
            assert_eq!(default_out_dir(Path::new("recording")), PathBuf::from("recording"));
        }

        #[test]
        fn replaces_invalid_characters() {
            assert_eq!(default_out_dir(Path::new("a:b.mov")), PathBuf::from("a_b_mov"));
        }

        #[test]
        fn empty_name_falls_back() {
            assert_eq!(default_out_dir(Path::new("/")), PathBuf::from("output"));
        }
    }

    // =========================================================================
    // video_base_name Tests
    // =========================================================================

    mod video_base_name_tests {
        use super::*;

        #[test]
        fn strips_directories() {
            assert_eq!(video_base_name(Path::new("/data/in/clip.mp4")), "clip.mp4");
        }

        #[test]
        fn keeps_extension() {
            assert_eq!(video_base_name(Path::new("clip.mp4")), "clip.mp4");
        }
    }

    // =========================================================================
    // frame_file_name Tests
    // =========================================================================

    mod frame_file_name_tests {
        use super::*;

        #[test]
        fn zero_based_unpadded_names() {
            let test_cases = [(0, "frame_0.dcm"), (1, "frame_1.dcm"), (1234, "frame_1234.dcm")];

            for (index, expected) in test_cases {
                assert_eq!(frame_file_name(index), expected);
            }
        }
    }

    // =========================================================================
    // parse_frame_index Tests
    // =========================================================================

    mod parse_frame_index_tests {
        use super::*;

        #[test]
        fn parses_frame_indices() {
            assert_eq!(parse_frame_index("frame_0.dcm"), Some(0));
            assert_eq!(parse_frame_index("frame_12.dcm"), Some(12));
            assert_eq!(parse_frame_index(&frame_file_name(1234)), Some(1234));
        }

        #[test]
        fn ignores_other_files() {
            for name in [
                "frame_.dcm",
                "frame_1.jpg",
                "frame_+1.dcm",
                "image_1.dcm",
                "frame_x.dcm",
                "notes.txt",
            ] {
                assert_eq!(parse_frame_index(name), None, "{name}");
            }
        }
    }

    // =========================================================================
    // sanitize_filename Tests
    // =========================================================================

    mod sanitize_filename_tests {
        use super::*;

        #[test]
        fn replaces_forward_slash() {
            assert_eq!(sanitize_filename("a/b"), "a_b");
        }

        #[test]
        fn replaces_backslash() {
            assert_eq!(sanitize_filename("a\\b"), "a_b");
        }

        #[test]
        fn replaces_reserved_characters() {
            assert_eq!(sanitize_filename("a*b?c\"d<e>f|g"), "a_b_c_d_e_f_g");
        }

        #[test]
        fn replaces_control_characters() {
            assert_eq!(sanitize_filename("a\tb\nc"), "a_b_c");
        }

        #[test]
        fn trims_whitespace() {
            assert_eq!(sanitize_filename("  name  "), "name");
        }

        #[test]
        fn keeps_unicode() {
            assert_eq!(sanitize_filename("vidéo_1"), "vidéo_1");
        }
    }

    // =========================================================================
    // clean_output Tests
    // =========================================================================

    mod clean_output_tests {
        use super::*;

        #[test]
        fn missing_folder_is_noop() {
            let temp_dir = TempDir::new().unwrap();
            let missing = temp_dir.path().join("missing");
            assert_eq!(clean_output(&missing).unwrap(), 0);
        }

        #[test]
        fn empty_folder_is_left_alone() {
            let temp_dir = TempDir::new().unwrap();
            assert_eq!(clean_output(temp_dir.path()).unwrap(), 0);
            assert!(temp_dir.path().exists());
        }

        #[test]
        fn frame_files_are_removed() {
            let temp_dir = TempDir::new().unwrap();
            let out = temp_dir.path().join("out");
            fs::create_dir(&out).unwrap();
            fs::write(out.join("frame_0.dcm"), b"stale").unwrap();
            fs::write(out.join("frame_9.dcm"), b"stale").unwrap();

            assert_eq!(clean_output(&out).unwrap(), 2);
            assert!(out.exists());
            assert!(is_folder_empty(&out).unwrap());
        }

        #[test]
        fn other_entries_survive() {
            let temp_dir = TempDir::new().unwrap();
            let out = temp_dir.path();
            fs::create_dir(out.join("frame_2.dcm")).unwrap();
            fs::create_dir(out.join("videos")).unwrap();
            fs::write(out.join("videos/clip.mp4"), b"video").unwrap();
            fs::write(out.join("frame_1.dcm.bak"), b"backup").unwrap();
            fs::write(out.join("notes.txt"), b"notes").unwrap();
            fs::write(out.join("frame_1.dcm"), b"stale").unwrap();

            assert_eq!(clean_output(out).unwrap(), 1);
            assert!(!out.join("frame_1.dcm").exists());
            assert!(out.join("frame_2.dcm").is_dir());
            assert!(out.join("videos/clip.mp4").exists());
            assert!(out.join("frame_1.dcm.bak").exists());
            assert!(out.join("notes.txt").exists());
        }

        #[test]
        fn file_in_place_of_folder_is_left_alone() {
            let temp_dir = TempDir::new().unwrap();
            let out = temp_dir.path().join("out");
            fs::write(&out, b"not a folder").unwrap();

            assert_eq!(clean_output(&out).unwrap(), 0);
            assert!(out.is_file());
        }
    }

    // =========================================================================
    // is_folder_empty Tests
    // =========================================================================

    mod is_folder_empty_tests {
        use super::*;

        #[test]
        fn new_folder_is_empty() {
            let temp_dir = TempDir::new().unwrap();
            assert!(is_folder_empty(temp_dir.path()).unwrap());
        }

        #[test]
        fn folder_with_file_is_not_empty() {
            let temp_dir = TempDir::new().unwrap();
            fs::write(temp_dir.path().join("file.txt"), "content").unwrap();
            assert!(!is_folder_empty(temp_dir.path()).unwrap());
        }

        #[test]
        fn missing_folder_is_an_error() {
            assert!(is_folder_empty(Path::new("/nonexistent/folder")).is_err());
        }
    }
}
