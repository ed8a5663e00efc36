//! Bucket-name and object-key well-formedness rules.
//!
//! The `*_violation` functions return the first rule a value breaks, which
//! ends up in `StorageError` messages; the `is_valid_*` predicates wrap them.

use super::metadata_store::METADATA_FILE_SUFFIX;

pub const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Validate bucket name format.
///
/// Enforces S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain `..`, `--`, `.-` or `-.`
/// - cannot look like an IPv4 address
/// - cannot contain path separators
pub fn bucket_name_violation(name: &str) -> Option<&'static str> {
    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Some("must be between 3 and 63 characters");
    }

    if name.contains(['/', '\\', ':']) {
        return Some("must not contain path separators");
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Some("allowed characters are lowercase letters, digits, dots, and hyphens");
    }

    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return Some("must start and end with a lowercase letter or digit");
    }

    if ["..", "--", ".-", "-."]
        .iter()
        .any(|pair| name.contains(pair))
    {
        return Some("cannot contain adjacent dots or hyphens");
    }

    if is_ipv4_like(name) {
        return Some("must not be formatted like an IP address");
    }

    None
}

pub fn is_valid_bucket_name(name: &str) -> bool {
    bucket_name_violation(name).is_none()
}

/// Validate an object key.
///
/// Keys map one-to-one onto paths below the bucket directory, so besides
/// the length limit they must not contain anything that would escape the
/// bucket, alias another key, or collide with a metadata sidecar path.
pub fn object_key_violation(key: &str) -> Option<&'static str> {
    if key.is_empty() {
        return Some("must not be empty");
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return Some("must be at most 1024 bytes");
    }
    if key.contains(['\\', ':']) {
        return Some("must not contain `\\` or `:`");
    }
    if key.chars().any(char::is_control) {
        return Some("must not contain control characters");
    }

    let segments: Vec<&str> = key.split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Some("must not start or end with `/` or contain `//`");
    }
    if segments.iter().any(|segment| matches!(*segment, "." | "..")) {
        return Some("must not contain `.` or `..` segments");
    }
    let directories = &segments[..segments.len() - 1];
    if directories
        .iter()
        .any(|segment| segment.ends_with(METADATA_FILE_SUFFIX))
    {
        return Some("directory segments must not end with the metadata suffix");
    }

    None
}

pub fn is_valid_object_key(key: &str) -> bool {
    object_key_violation(key).is_none()
}

/// Check if a string is shaped like dotted-decimal IPv4 (`digits.digits.digits.digits`).
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}
