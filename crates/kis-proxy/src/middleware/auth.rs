//! 접근 키 확인 미들웨어.
//!
//! `x-api-key` 또는 `x-client-token` 헤더가 설정된 키와 같아야 합니다.
//! CORS preflight(`OPTIONS`)는 확인하지 않습니다.

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::error::ApiErrorResponse;
use crate::state::AppState;

/// 접근 키 헤더 이름.
pub const ACCESS_KEY_HEADERS: &[&str] = &["x-api-key", "x-client-token"];

pub async fn require_access_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let authorized = ACCESS_KEY_HEADERS.iter().any(|name| {
        request
            .headers()
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| state.verify_access_key(v.trim()))
    });

    if authorized {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Rejected request without valid access key");

    (
        StatusCode::UNAUTHORIZED,
        Json(ApiErrorResponse::new("UNAUTHORIZED", "Missing or invalid access key")),
    )
        .into_response()
}
