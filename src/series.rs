//! Patient, study and series attributes shared by every instance of a run.

use chrono::{Local, NaiveDateTime};

use crate::uid::{new_token, new_uid};

/// Default patient name when none is supplied.
pub const DEFAULT_PATIENT_NAME: &str = "Unknown";

/// Modality for converted video: "other".
pub const MODALITY_OTHER: &str = "OT";

/// Conversion type for secondary capture of digitized video.
pub const CONVERSION_TYPE_DIGITIZED_VIDEO: &str = "DV";

/// Every run produces exactly one series, numbered 1.
pub const SERIES_NUMBER: &str = "1";

const DICOM_DATE_FORMAT: &str = "%Y%m%d";
const DICOM_TIME_FORMAT: &str = "%H%M%S%.6f";

/// Caller-supplied values that take precedence over generated defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesOverrides {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub study_description: Option<String>,
    pub series_description: Option<String>,
}

/// The fixed attribute set written into every instance of one conversion run.
///
/// Built once before the first frame and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDescriptor {
    // patient
    pub patient_name: String,
    pub patient_id: String,
    pub patient_birth_date: String,
    pub patient_sex: String,

    // study
    pub study_instance_uid: String,
    pub study_date: String,
    pub study_time: String,
    pub referring_physician_name: String,
    pub accession_number: String,
    pub modality: String,
    pub study_id: String,
    pub study_description: String,

    // series
    pub series_instance_uid: String,
    pub frame_time_ms: u32,
    pub series_date: String,
    pub series_time: String,
    pub series_number: String,
    pub series_description: String,

    pub laterality: String,
    pub patient_orientation: String,
    pub conversion_type: String,
}

impl SeriesDescriptor {
    /// Build the descriptor for a run starting now.
    pub fn new(frame_interval_ms: f64, overrides: &SeriesOverrides) -> Self {
        Self::at(Local::now().naive_local(), frame_interval_ms, overrides)
    }

    /// Build the descriptor for a run starting at `now`.
    pub fn at(now: NaiveDateTime, frame_interval_ms: f64, overrides: &SeriesOverrides) -> Self {
        let date = now.format(DICOM_DATE_FORMAT).to_string();
        let time = now.format(DICOM_TIME_FORMAT).to_string();

        let study_instance_uid = new_uid();
        let mut series_instance_uid = new_uid();
        while series_instance_uid == study_instance_uid {
            series_instance_uid = new_uid();
        }

        Self {
            patient_name: overrides
                .patient_name
                .clone()
                .unwrap_or_else(|| DEFAULT_PATIENT_NAME.to_string()),
            patient_id: overrides.patient_id.clone().unwrap_or_else(new_token),
            patient_birth_date: date.clone(),
            patient_sex: String::new(),

            study_instance_uid,
            study_date: date.clone(),
            study_time: time.clone(),
            referring_physician_name: String::new(),
            accession_number: new_token(),
            modality: MODALITY_OTHER.to_string(),
            study_id: new_token(),
            study_description: overrides.study_description.clone().unwrap_or_default(),

            series_instance_uid,
            frame_time_ms: frame_time_ms(frame_interval_ms),
            series_date: date,
            series_time: time,
            series_number: SERIES_NUMBER.to_string(),
            series_description: overrides.series_description.clone().unwrap_or_default(),

            laterality: String::new(),
            patient_orientation: String::new(),
            conversion_type: CONVERSION_TYPE_DIGITIZED_VIDEO.to_string(),
        }
    }
}

/// Frame interval in milliseconds for a source frame rate.
///
/// Returns `None` when the rate is zero, negative or not finite.
pub fn frame_interval_ms(frame_rate: f64) -> Option<f64> {
    (frame_rate.is_finite() && frame_rate > 0.0).then(|| 1000.0 / frame_rate)
}

fn frame_time_ms(frame_interval_ms: f64) -> u32 {
    let rounded = frame_interval_ms.round();
    if rounded.is_finite() && rounded > 0.0 {
        rounded.min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}
