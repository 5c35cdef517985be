//! Unique identifier generation.
//!
//! UIDs are derived from random (version 4) UUIDs under the `2.25` root, the
//! UUID-based UID form defined by DICOM PS3.5 Annex B.2. Tokens used for
//! patient, accession and study identifiers are cut from the same source.

use uuid::Uuid;

/// Root for UUID-derived UIDs.
const UUID_UID_ROOT: &str = "2.25";

/// Maximum length of a DICOM UID.
pub const MAX_UID_LENGTH: usize = 64;

/// Length of generated alphanumeric tokens.
pub const TOKEN_LENGTH: usize = 10;

/// Generate a new globally unique DICOM UID.
pub fn new_uid() -> String {
    format!("{UUID_UID_ROOT}.{}", Uuid::new_v4().as_u128())
}

/// Generate a new 10-character alphanumeric token.
pub fn new_token() -> String {
    Uuid::new_v4()
        .to_string()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(TOKEN_LENGTH)
        .collect()
}

/// Check that a string is a well-formed DICOM UID: dotted numeric components,
/// no leading zeros, at most 64 characters.
pub fn is_valid_uid(uid: &str) -> bool {
    if uid.is_empty() || uid.len() > MAX_UID_LENGTH {
        return false;
    }
    uid.split('.').all(|component| {
        !component.is_empty()
            && component.chars().all(|c| c.is_ascii_digit())
            && (component == "0" || !component.starts_with('0'))
    })
}
