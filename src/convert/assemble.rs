//! Assembly of complete secondary-capture instances.
//!
//! Every attribute is mapped explicitly from [`SeriesDescriptor`] and
//! [`FrameInstance`] onto its DICOM tag; nothing is copied by name.

use dicom::core::value::Value;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dicom_value;
use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, FileMetaTableBuilder, InMemDicomObject};

use crate::convert::encode::FramePayload;
use crate::series::SeriesDescriptor;
use crate::uid::new_uid;

/// Secondary Capture Image Storage SOP class.
pub const SECONDARY_CAPTURE_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.7";

/// Value written to ImplementationVersionName.
pub const IMPLEMENTATION_VERSION_NAME: &str = "VIDEO2DICOM_01";

const SPECIFIC_CHARACTER_SET: &str = "ISO_IR 100";
const SAMPLES_PER_PIXEL: u16 = 3;
const PLANAR_CONFIGURATION: u16 = 0;
const BITS_ALLOCATED: u16 = 8;
const BITS_STORED: u16 = 8;
const HIGH_BIT: u16 = 7;
const PIXEL_REPRESENTATION_UNSIGNED: u16 = 0;

/// Largest value an Integer String may hold.
const MAX_INSTANCE_NUMBER: u64 = i32::MAX as u64;

type Element = DataElement<InMemDicomObject>;

/// Error raised while assembling an instance.
#[derive(thiserror::Error, Debug)]
pub enum AssembleError {
    #[error("frame dimensions {columns}x{rows} exceed the DICOM limit of 65535")]
    DimensionsTooLarge { rows: u32, columns: u32 },

    #[error("instance number {0} exceeds the DICOM limit")]
    TooManyFrames(u64),

    #[error("failed to build DICOM file meta information")]
    Meta(#[from] dicom::object::meta::Error),
}

/// Identification of the software writing the files, shared by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    pub class_uid: String,
    pub version_name: String,
}

impl Implementation {
    /// A fresh implementation class UID for one run.
    pub fn generate() -> Self {
        Self {
            class_uid: new_uid(),
            version_name: IMPLEMENTATION_VERSION_NAME.to_string(),
        }
    }
}

/// Per-frame attributes of one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInstance {
    pub sop_instance_uid: String,
    pub instance_number: u32,
    pub rows: u16,
    pub columns: u16,
    pub payload: FramePayload,
}

impl FrameInstance {
    /// Describe the frame fetched at zero-based `frame_index`.
    pub fn new(
        sop_instance_uid: String,
        frame_index: u64,
        rows: u32,
        columns: u32,
        payload: FramePayload,
    ) -> Result<Self, AssembleError> {
        let instance_number = frame_index + 1;
        if instance_number > MAX_INSTANCE_NUMBER {
            return Err(AssembleError::TooManyFrames(instance_number));
        }
        let (Ok(rows_u16), Ok(columns_u16)) = (u16::try_from(rows), u16::try_from(columns)) else {
            return Err(AssembleError::DimensionsTooLarge { rows, columns });
        };

        Ok(Self {
            sop_instance_uid,
            instance_number: instance_number as u32,
            rows: rows_u16,
            columns: columns_u16,
            payload,
        })
    }
}

/// Merge series and frame attributes into a complete file object.
pub fn assemble(
    series: &SeriesDescriptor,
    instance: FrameInstance,
    implementation: &Implementation,
) -> Result<DefaultDicomObject, AssembleError> {
    let codec = instance.payload.codec();

    let meta = FileMetaTableBuilder::new()
        .media_storage_sop_class_uid(SECONDARY_CAPTURE_IMAGE_STORAGE)
        .media_storage_sop_instance_uid(instance.sop_instance_uid.as_str())
        .transfer_syntax(codec.transfer_syntax_uid())
        .implementation_class_uid(implementation.class_uid.as_str())
        .implementation_version_name(implementation.version_name.as_str())
        .build()?;

    let mut obj = InMemDicomObject::from_element_iter(series_elements(series));

    obj.put(text(tags::SPECIFIC_CHARACTER_SET, VR::CS, SPECIFIC_CHARACTER_SET));
    obj.put(text(tags::SOP_CLASS_UID, VR::UI, SECONDARY_CAPTURE_IMAGE_STORAGE));
    obj.put(text(tags::SOP_INSTANCE_UID, VR::UI, &instance.sop_instance_uid));
    obj.put(text(
        tags::INSTANCE_NUMBER,
        VR::IS,
        &instance.instance_number.to_string(),
    ));

    obj.put(unsigned(tags::SAMPLES_PER_PIXEL, SAMPLES_PER_PIXEL));
    obj.put(text(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        codec.photometric_interpretation(),
    ));
    obj.put(unsigned(tags::PLANAR_CONFIGURATION, PLANAR_CONFIGURATION));
    obj.put(unsigned(tags::ROWS, instance.rows));
    obj.put(unsigned(tags::COLUMNS, instance.columns));
    obj.put(unsigned(tags::BITS_ALLOCATED, BITS_ALLOCATED));
    obj.put(unsigned(tags::BITS_STORED, BITS_STORED));
    obj.put(unsigned(tags::HIGH_BIT, HIGH_BIT));
    obj.put(unsigned(
        tags::PIXEL_REPRESENTATION,
        PIXEL_REPRESENTATION_UNSIGNED,
    ));
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OB,
        Value::PixelSequence(instance.payload.into_fragment_sequence()),
    ));

    Ok(obj.with_exact_meta(meta))
}

/// Patient, study and series attributes, one element per descriptor field.
fn series_elements(series: &SeriesDescriptor) -> Vec<Element> {
    vec![
        // patient
        text(tags::PATIENT_NAME, VR::PN, &series.patient_name),
        text(tags::PATIENT_ID, VR::LO, &series.patient_id),
        text(tags::PATIENT_BIRTH_DATE, VR::DA, &series.patient_birth_date),
        text(tags::PATIENT_SEX, VR::CS, &series.patient_sex),
        // study
        text(tags::STUDY_INSTANCE_UID, VR::UI, &series.study_instance_uid),
        text(tags::STUDY_DATE, VR::DA, &series.study_date),
        text(tags::STUDY_TIME, VR::TM, &series.study_time),
        text(
            tags::REFERRING_PHYSICIAN_NAME,
            VR::PN,
            &series.referring_physician_name,
        ),
        text(tags::ACCESSION_NUMBER, VR::SH, &series.accession_number),
        text(tags::MODALITY, VR::CS, &series.modality),
        text(tags::STUDY_ID, VR::SH, &series.study_id),
        text(tags::STUDY_DESCRIPTION, VR::LO, &series.study_description),
        // series
        text(tags::SERIES_INSTANCE_UID, VR::UI, &series.series_instance_uid),
        text(tags::FRAME_TIME, VR::DS, &series.frame_time_ms.to_string()),
        text(tags::SERIES_DATE, VR::DA, &series.series_date),
        text(tags::SERIES_TIME, VR::TM, &series.series_time),
        text(tags::SERIES_NUMBER, VR::IS, &series.series_number),
        text(tags::SERIES_DESCRIPTION, VR::LO, &series.series_description),
        // equipment and orientation
        text(tags::LATERALITY, VR::CS, &series.laterality),
        text(tags::PATIENT_ORIENTATION, VR::CS, &series.patient_orientation),
        text(tags::CONVERSION_TYPE, VR::CS, &series.conversion_type),
    ]
}

fn text(tag: Tag, vr: VR, value: &str) -> Element {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

fn unsigned(tag: Tag, value: u16) -> Element {
    DataElement::new(tag, VR::US, dicom_value!(U16, [value]))
}
