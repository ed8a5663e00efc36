//! HTTP handlers for bucket operations.

use crate::{
    errors::AppError, models::bucket::BucketInfo, services::storage_service::StorageService,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ListBucketsResponse {
    pub buckets: Vec<BucketInfo>,
}

/// GET `/` — list buckets.
pub async fn list_buckets(
    State(service): State<StorageService>,
) -> Result<Json<ListBucketsResponse>, AppError> {
    let buckets = service.list_buckets().await?;
    Ok(Json(ListBucketsResponse { buckets }))
}

/// PUT `/{bucket}` — create bucket. Repeating it is not an error.
pub async fn create_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
) -> Result<Json<BucketInfo>, AppError> {
    let info = service.create_bucket(&bucket).await?;
    Ok(Json(info))
}

/// DELETE `/{bucket}` — delete an empty bucket.
pub async fn delete_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
) -> Result<StatusCode, AppError> {
    service.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}
