//! Represents user-defined and system metadata associated with objects.
//!
//! One record is stored per object as a JSON sidecar:
//!
//! ```json
//! {
//!   "author": "jane",
//!   "systemMetadata": {
//!     "contentType": "image/png",
//!     "size": 1024,
//!     "lastModified": "2025-01-01T00:00:00Z",
//!     "etag": "9e107d9d372bb6826bd81d3542a419d6"
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content type used when the caller supplies none, and for synthesized records.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Name of the reserved top-level field holding [`SystemMetadata`].
pub const SYSTEM_METADATA_FIELD: &str = "systemMetadata";

/// Caller-supplied metadata fields, stored at the top level of the sidecar.
pub type UserMetadata = Map<String, Value>;

/// The reserved, engine-managed part of an object's metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetadata {
    /// Content type (MIME type).
    pub content_type: String,

    /// Size in bytes.
    pub size: u64,

    /// When the object was last written.
    pub last_modified: DateTime<Utc>,

    /// Lowercase hex MD5 of the content. Empty when unknown.
    pub etag: String,
}

/// Full metadata record of an object: system block plus caller fields.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObjectMetadata {
    #[serde(rename = "systemMetadata")]
    pub system: SystemMetadata,

    #[serde(flatten)]
    pub user: UserMetadata,
}

impl ObjectMetadata {
    /// Build a record from caller fields, dropping any attempt to shadow the
    /// reserved `systemMetadata` field.
    pub fn new(system: SystemMetadata, mut user: UserMetadata) -> Self {
        user.remove(SYSTEM_METADATA_FIELD);
        Self { system, user }
    }

    /// Record synthesized from raw file attributes when no sidecar exists.
    pub fn synthesized(size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            system: SystemMetadata {
                content_type: DEFAULT_CONTENT_TYPE.to_string(),
                size,
                last_modified,
                etag: String::new(),
            },
            user: UserMetadata::new(),
        }
    }

    /// Whether the etag was never computed (synthesized record).
    pub fn etag_unknown(&self) -> bool {
        self.system.etag.is_empty()
    }
}
