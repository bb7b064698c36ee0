//! 헬스 체크 엔드포인트.

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 서비스 이름.
pub const SERVICE_NAME: &str = "KIS proxy (readonly)";

/// `/` 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub ok: bool,
    pub service: String,
    pub version: String,
    /// 서버 업타임(초)
    pub uptime_secs: i64,
}

/// GET /
pub async fn service_info(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        ok: true,
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /health
///
/// 로드밸런서용 liveness 체크. 업스트림은 호출하지 않습니다.
pub async fn health_check() -> impl IntoResponse {
    "ok"
}
