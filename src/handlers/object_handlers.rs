//! HTTP handlers for object operations.
//! Streams object bodies in both directions and delegates storage concerns
//! to `StorageService`.

use crate::{
    errors::AppError,
    models::{
        metadata::{ObjectMetadata, UserMetadata},
        object::{ObjectBody, ObjectSummary, PutObjectOptions, PutObjectResult},
    },
    services::storage_service::StorageService,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;

/// Prefix of headers carrying caller metadata fields.
pub const USER_METADATA_HEADER_PREFIX: &str = "x-amz-meta-";

/// When present on a PUT, the object is copied from `/{bucket}/{key}`.
pub const COPY_SOURCE_HEADER: &str = "x-amz-copy-source";

/// Query params accepted when listing objects.
#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListObjectsResponse {
    pub bucket: String,
    pub prefix: Option<String>,
    pub objects: Vec<ObjectSummary>,
}

/// Upload an object to `/{bucket}/{*key}`, or copy one when the
/// `x-amz-copy-source` header is set.
pub async fn upload_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    if let Some(source) = headers.get(COPY_SOURCE_HEADER) {
        let (src_bucket, src_key) = source
            .to_str()
            .ok()
            .and_then(parse_copy_source)
            .ok_or_else(|| AppError::bad_request("copy source must look like /{bucket}/{key}"))?;
        let result = service
            .copy_object(src_bucket, src_key, &bucket, &key)
            .await?;
        return Ok(put_response(result));
    }

    let options = PutObjectOptions {
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
        metadata: user_metadata_from_headers(&headers),
    };

    let stream = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));

    let result = service
        .put_object(&bucket, &key, ObjectBody::from_stream(stream), options)
        .await?;

    Ok(put_response(result))
}

/// Download an object `/{bucket}/{*key}` as a streaming response.
pub async fn get_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, opened) = service.get_object_stream(&bucket, &key).await?;

    let mut response = Response::new(Body::from_stream(opened.stream));
    *response.status_mut() = StatusCode::OK;
    // length of the file being streamed; the sidecar may lag behind it
    set_object_headers(response.headers_mut(), &meta, opened.size);

    Ok(response)
}

/// HEAD `/{bucket}/{*key}` — same headers as GET but no body.
pub async fn head_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let meta = service.get_object_metadata(&bucket, &key).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta, meta.system.size);

    Ok(response)
}

/// DELETE `/{bucket}/{*key}`
pub async fn delete_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    service.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/{bucket}` — list objects, supports `?prefix=`
pub async fn list_objects(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<Json<ListObjectsResponse>, AppError> {
    let objects = service.list_objects(&bucket, q.prefix.as_deref()).await?;
    Ok(Json(ListObjectsResponse {
        bucket,
        prefix: q.prefix,
        objects,
    }))
}

fn put_response(result: PutObjectResult) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", result.etag)) {
        headers.insert(header::ETAG, value);
    }
    (StatusCode::OK, headers, Json(result)).into_response()
}

/// Accepts `/{bucket}/{key}` or `{bucket}/{key}`.
fn parse_copy_source(source: &str) -> Option<(&str, &str)> {
    let (bucket, key) = source.trim_start_matches('/').split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some((bucket, key))
}

fn user_metadata_from_headers(headers: &HeaderMap) -> UserMetadata {
    let mut fields = UserMetadata::new();
    for (name, value) in headers {
        let Some(field) = name.as_str().strip_prefix(USER_METADATA_HEADER_PREFIX) else {
            continue;
        };
        if let Ok(value) = value.to_str() {
            fields.insert(field.to_string(), Value::String(value.to_string()));
        }
    }
    fields
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMetadata, content_length: u64) {
    let system = &meta.system;
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&system.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));

    if !meta.etag_unknown() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", system.etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&system.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    for (field, value) in &meta.user {
        let rendered = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let name = HeaderName::from_bytes(
            format!("{}{}", USER_METADATA_HEADER_PREFIX, field.to_ascii_lowercase()).as_bytes(),
        );
        if let (Ok(name), Ok(value)) = (name, HeaderValue::from_str(&rendered)) {
            headers.insert(name, value);
        }
    }
}
