//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks storage I/O

use crate::services::storage_service::StorageService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

const PROBE_CONTENT: &[u8] = b"readyz";

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that performs a write/read/delete round trip against
/// the storage backend, using a dot-prefixed (reserved) file at its root.
///
/// HTTP 200 when the check passes, HTTP 503 otherwise.
pub async fn readyz(State(service): State<StorageService>) -> impl IntoResponse {
    let backend = service.backend();
    let probe_path = format!(".readyz-{}", Uuid::new_v4());

    let storage_check = match backend.write(&probe_path, Bytes::from_static(PROBE_CONTENT)).await {
        Ok(()) => match backend.read(&probe_path).await {
            Ok(bytes) => {
                let matches = bytes == PROBE_CONTENT;
                let removal = backend.delete(&probe_path).await;
                match (matches, removal) {
                    (true, Ok(())) => (true, None::<String>),
                    (true, Err(e)) => (true, Some(format!("could not remove probe file: {}", e))),
                    (false, _) => (false, Some("probe content mismatch".to_string())),
                }
            }
            Err(e) => {
                let _ = backend.delete(&probe_path).await;
                (false, Some(format!("could not read probe file: {}", e)))
            }
        },
        Err(e) => (false, Some(format!("could not write probe file: {}", e))),
    };

    let overall_ok = storage_check.0;
    let mut checks = HashMap::new();
    checks.insert(
        "storage",
        CheckStatus {
            ok: storage_check.0,
            error: storage_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
