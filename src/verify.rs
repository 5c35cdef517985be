//! Consistency checks for a written series.
//!
//! Scans the `frame_<index>.dcm` files of an output folder and reports every
//! place where they fail to form one well-formed secondary-capture series.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, open_file};
use dicom_pixeldata::PixelDecoder;

use crate::convert::assemble::SECONDARY_CAPTURE_IMAGE_STORAGE;
use crate::convert::encode::Codec;
use crate::uid::is_valid_uid;
use crate::utils::parse_frame_index;

/// Attributes that must be identical across every instance of a series.
pub const SHARED_TAGS: [(Tag, &str); 21] = [
    (tags::PATIENT_NAME, "PatientName"),
    (tags::PATIENT_ID, "PatientID"),
    (tags::PATIENT_BIRTH_DATE, "PatientBirthDate"),
    (tags::PATIENT_SEX, "PatientSex"),
    (tags::STUDY_INSTANCE_UID, "StudyInstanceUID"),
    (tags::STUDY_DATE, "StudyDate"),
    (tags::STUDY_TIME, "StudyTime"),
    (tags::REFERRING_PHYSICIAN_NAME, "ReferringPhysicianName"),
    (tags::ACCESSION_NUMBER, "AccessionNumber"),
    (tags::MODALITY, "Modality"),
    (tags::STUDY_ID, "StudyID"),
    (tags::STUDY_DESCRIPTION, "StudyDescription"),
    (tags::SERIES_INSTANCE_UID, "SeriesInstanceUID"),
    (tags::FRAME_TIME, "FrameTime"),
    (tags::SERIES_DATE, "SeriesDate"),
    (tags::SERIES_TIME, "SeriesTime"),
    (tags::SERIES_NUMBER, "SeriesNumber"),
    (tags::SERIES_DESCRIPTION, "SeriesDescription"),
    (tags::LATERALITY, "Laterality"),
    (tags::PATIENT_ORIENTATION, "PatientOrientation"),
    (tags::CONVERSION_TYPE, "ConversionType"),
];

/// Error that prevents a folder from being checked at all.
#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error("Input folder does not exist: {0:?}")]
    NotFound(PathBuf),

    #[error("Input path is not a directory: {0:?}")]
    NotADirectory(PathBuf),

    #[error("Failed to read input folder: {path:?}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open DICOM file: {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: dicom::object::ReadError,
    },
}

/// Outcome of checking a series folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesReport {
    /// Number of `frame_<index>.dcm` files found.
    pub files: usize,
    /// Instance numbers in file index order.
    pub instance_numbers: Vec<i64>,
    pub series_instance_uid: Option<String>,
    /// Human-readable description of every failed check.
    pub problems: Vec<String>,
}

impl SeriesReport {
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check every instance in `dir`. With `decode`, pixel data is decompressed
/// and its dimensions compared against Rows/Columns.
pub fn verify_series(dir: &Path, decode: bool) -> Result<SeriesReport, VerifyError> {
    let files = frame_files(dir)?;
    let mut report = SeriesReport {
        files: files.len(),
        ..SeriesReport::default()
    };

    let mut reference: Option<(PathBuf, Vec<String>)> = None;
    let mut sop_instance_uids = HashSet::new();

    for (index, path) in &files {
        let obj = open_file(path).map_err(|source| VerifyError::Open {
            path: path.clone(),
            source,
        })?;
        let name = format!("frame_{index}.dcm");

        match obj
            .element(tags::INSTANCE_NUMBER)
            .ok()
            .and_then(|e| e.to_int::<i64>().ok())
        {
            Some(number) => report.instance_numbers.push(number),
            None => report.problems.push(format!("{name}: missing InstanceNumber")),
        }

        let shared: Vec<String> = SHARED_TAGS
            .iter()
            .map(|(tag, _)| element_str(&obj, *tag).unwrap_or_default())
            .collect();
        match &reference {
            None => {
                report.series_instance_uid = element_str(&obj, tags::SERIES_INSTANCE_UID);
                reference = Some((path.clone(), shared));
            }
            Some((_, expected)) => {
                for ((_, keyword), (value, expected)) in
                    SHARED_TAGS.iter().zip(shared.iter().zip(expected))
                {
                    if value != expected {
                        report.problems.push(format!(
                            "{name}: {keyword} differs from frame_0 ({value:?} != {expected:?})"
                        ));
                    }
                }
            }
        }

        check_instance(&obj, &name, &mut sop_instance_uids, &mut report.problems);
        if decode {
            check_decoded(&obj, &name, &mut report.problems);
        }
    }

    let expected: Vec<i64> = (1..=report.instance_numbers.len() as i64).collect();
    if report.instance_numbers != expected {
        report.problems.push(format!(
            "instance numbers are not 1..={} in file order: {:?}",
            expected.len(),
            report.instance_numbers
        ));
    }

    let indices: Vec<u64> = files.keys().copied().collect();
    let contiguous: Vec<u64> = (0..files.len() as u64).collect();
    if indices != contiguous {
        report
            .problems
            .push(format!("frame file indices are not contiguous: {indices:?}"));
    }

    Ok(report)
}

/// Print a report for `dir` and return whether the series is consistent.
pub fn run(dir: &Path, decode: bool) -> Result<bool, VerifyError> {
    let report = verify_series(dir, decode)?;

    if report.files == 0 {
        println!("No frame_*.dcm files found in {dir:?}");
        return Ok(false);
    }

    println!("Checked {} instance(s) in {:?}", report.files, dir);
    if let Some(uid) = &report.series_instance_uid {
        println!("  SeriesInstanceUID: {uid}");
    }

    if report.is_consistent() {
        println!("✓ Series is consistent");
    } else {
        println!("✗ Found {} problem(s):", report.problems.len());
        for problem in &report.problems {
            println!("  - {problem}");
        }
    }
    Ok(report.is_consistent())
}

/// `frame_<index>.dcm` files in `dir`, keyed by index.
fn frame_files(dir: &Path) -> Result<BTreeMap<u64, PathBuf>, VerifyError> {
    if !dir.exists() {
        return Err(VerifyError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(VerifyError::NotADirectory(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| VerifyError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    Ok(entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let index = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_frame_index)?;
            Some((index, path))
        })
        .collect())
}

fn check_instance(
    obj: &DefaultDicomObject,
    name: &str,
    sop_instance_uids: &mut HashSet<String>,
    problems: &mut Vec<String>,
) {
    let meta = obj.meta();
    let sop_instance_uid = element_str(obj, tags::SOP_INSTANCE_UID).unwrap_or_default();
    let media_uid = meta.media_storage_sop_instance_uid.trim_end_matches('\0');

    if sop_instance_uid.is_empty() {
        problems.push(format!("{name}: missing SOPInstanceUID"));
    } else if !is_valid_uid(&sop_instance_uid) {
        problems.push(format!("{name}: malformed SOPInstanceUID {sop_instance_uid}"));
    } else if !sop_instance_uids.insert(sop_instance_uid.clone()) {
        problems.push(format!("{name}: duplicate SOPInstanceUID {sop_instance_uid}"));
    }
    if media_uid != sop_instance_uid {
        problems.push(format!(
            "{name}: MediaStorageSOPInstanceUID {media_uid} does not match SOPInstanceUID {sop_instance_uid}"
        ));
    }

    let transfer_syntax = meta.transfer_syntax.trim_end_matches('\0');
    if transfer_syntax != Codec::JpegBaseline.transfer_syntax_uid() {
        problems.push(format!(
            "{name}: unexpected transfer syntax {transfer_syntax}"
        ));
    }
    if meta.media_storage_sop_class_uid.trim_end_matches('\0') != SECONDARY_CAPTURE_IMAGE_STORAGE
        || element_str(obj, tags::SOP_CLASS_UID).as_deref() != Some(SECONDARY_CAPTURE_IMAGE_STORAGE)
    {
        problems.push(format!("{name}: not a Secondary Capture Image Storage instance"));
    }

    let fragments = obj
        .element(tags::PIXEL_DATA)
        .ok()
        .and_then(|e| e.value().fragments().map(<[_]>::len));
    match fragments {
        Some(1) => {}
        Some(n) => problems.push(format!("{name}: PixelData has {n} fragments, expected 1")),
        None => problems.push(format!("{name}: PixelData is missing or not encapsulated")),
    }
}

fn check_decoded(obj: &DefaultDicomObject, name: &str, problems: &mut Vec<String>) {
    let rows = obj
        .element(tags::ROWS)
        .ok()
        .and_then(|e| e.to_int::<u32>().ok());
    let columns = obj
        .element(tags::COLUMNS)
        .ok()
        .and_then(|e| e.to_int::<u32>().ok());

    match obj.decode_pixel_data() {
        Ok(decoded) => {
            if Some(decoded.rows()) != rows || Some(decoded.columns()) != columns {
                problems.push(format!(
                    "{name}: decoded {}x{} does not match Columns/Rows {columns:?}x{rows:?}",
                    decoded.columns(),
                    decoded.rows()
                ));
            }
        }
        Err(e) => problems.push(format!("{name}: failed to decode pixel data: {e}")),
    }
}

/// String value of an element with DICOM padding removed.
fn element_str(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Folder Validation Tests
    // =========================================================================

    mod folders {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn missing_folder_fails() {
            let result = verify_series(Path::new("/nonexistent/series"), false);
            assert!(matches!(result, Err(VerifyError::NotFound(_))));
        }

        #[test]
        fn file_instead_of_folder_fails() {
            let temp_dir = TempDir::new().unwrap();
            let file = temp_dir.path().join("frame_0.dcm");
            fs::write(&file, b"x").unwrap();
            let result = verify_series(&file, false);
            assert!(matches!(result, Err(VerifyError::NotADirectory(_))));
        }

        #[test]
        fn empty_folder_has_no_files() {
            let temp_dir = TempDir::new().unwrap();
            let report = verify_series(temp_dir.path(), false).unwrap();
            assert_eq!(report.files, 0);
            assert!(report.is_consistent());
        }

        #[test]
        fn unreadable_dicom_fails() {
            let temp_dir = TempDir::new().unwrap();
            fs::write(temp_dir.path().join("frame_0.dcm"), b"not dicom").unwrap();
            let result = verify_series(temp_dir.path(), false);
            assert!(matches!(result, Err(VerifyError::Open { .. })));
        }
    }
}
