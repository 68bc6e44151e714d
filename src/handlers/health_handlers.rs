//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks scratch disk I/O and the frame extractor

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

use crate::state::AppState;

/// `GET /healthz`
///
/// Liveness probe. Never performs I/O.
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
/// Readiness probe that:
/// 1. Writes, reads back and deletes a file under the scratch root.
/// 2. Probes the frame extractor.
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let scratch_root = state.thumbnails.scratch_root();
    let disk_check = match fs::create_dir_all(scratch_root).await {
        Ok(()) => {
            let tmp_path = scratch_root.join(format!(".readyz-{}", Uuid::new_v4()));
            match fs::write(&tmp_path, b"readyz").await {
                Ok(()) => {
                    let read_back = fs::read(&tmp_path).await;
                    let _ = fs::remove_file(&tmp_path).await;
                    match read_back {
                        Ok(bytes) if bytes == b"readyz" => (true, None::<String>),
                        Ok(_) => (false, Some("file content mismatch".to_string())),
                        Err(e) => (false, Some(format!("could not read tmp file: {}", e))),
                    }
                }
                Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
            }
        }
        Err(e) => (false, Some(format!("could not create scratch root: {}", e))),
    };

    let extractor_check = match state.thumbnails.extractor().probe().await {
        Ok(()) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };

    let overall_ok = disk_check.0 && extractor_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "scratch",
        CheckStatus {
            ok: disk_check.0,
            error: disk_check.1,
        },
    );
    checks.insert(
        "extractor",
        CheckStatus {
            ok: extractor_check.0,
            error: extractor_check.1,
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
