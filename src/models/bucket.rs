//! Represents a logical bucket — a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A storage bucket as reported by `create_bucket` and `list_buckets`.
///
/// Buckets are plain directories on disk and no creation time is persisted,
/// so `creation_date` is the time of the call that produced this value.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    /// Bucket name (conforms to the DNS-style naming rules).
    pub name: String,

    /// Synthesized at call time; not the real creation time.
    pub creation_date: DateTime<Utc>,
}

impl BucketInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creation_date: Utc::now(),
        }
    }
}
