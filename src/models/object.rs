//! Represents an object (blob) stored in a bucket, and the values passed
//! in and out of the object operations.

use super::metadata::{ObjectMetadata, UserMetadata};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, io};

/// An incrementally produced byte stream.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// An opened object body and the length of the file it reads from.
///
/// `size` comes from the opened file itself, so it matches the bytes the
/// stream yields even when the recorded metadata is stale.
pub struct ObjectStream {
    pub size: u64,
    pub stream: ByteStream,
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectStream({} bytes)", self.size)
    }
}

/// Content handed to `put_object`.
///
/// A buffered body is written in one operation; a streamed body is written
/// chunk by chunk as the producer yields it.
pub enum ObjectBody {
    Buffered(Bytes),
    Streamed(ByteStream),
}

impl ObjectBody {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self::Streamed(stream.boxed())
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Self::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

impl From<Bytes> for ObjectBody {
    fn from(bytes: Bytes) -> Self {
        Self::Buffered(bytes)
    }
}

impl From<Vec<u8>> for ObjectBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffered(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for ObjectBody {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Buffered(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for ObjectBody {
    fn from(text: &'static str) -> Self {
        Self::Buffered(Bytes::from_static(text.as_bytes()))
    }
}

/// Optional attributes for `put_object`.
#[derive(Clone, Debug, Default)]
pub struct PutObjectOptions {
    /// MIME type; `application/octet-stream` when absent.
    pub content_type: Option<String>,

    /// Caller fields stored at the top level of the sidecar.
    pub metadata: UserMetadata,
}

impl PutObjectOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }
}

/// Outcome of a successful `put_object` or `copy_object`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PutObjectResult {
    pub etag: String,
    pub key: String,
    pub bucket: String,
    pub size: u64,
}

/// Fully materialized object returned by `get_object`.
#[derive(Clone, Debug)]
pub struct GetObjectResult {
    pub body: Bytes,
    pub metadata: ObjectMetadata,
}

/// One entry of `list_objects`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    /// Object key, relative to the bucket root, `/`-separated.
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    /// Empty when the object has no sidecar.
    pub etag: String,
}
