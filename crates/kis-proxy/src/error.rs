//! API 에러 응답 타입.
//!
//! 모든 엔드포인트가 같은 형식의 에러 본문을 반환합니다.
//!
//! ```json
//! {
//!   "code": "UPSTREAM_TIMEOUT",
//!   "message": "KIS request timed out",
//!   "timestamp": 1738300800
//! }
//! ```

use axum::http::StatusCode;
use axum::Json;
use kis_connector::UpstreamError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// API 에러 응답.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "INVALID_SYMBOL", "TOKEN_ISSUE_FAILED")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 시각 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// 핸들러 에러 타입.
pub type ApiError = (StatusCode, Json<ApiErrorResponse>);

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, ApiError>;

/// 상태 코드와 에러 본문을 묶습니다.
pub fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (status, Json(ApiErrorResponse::new(code, message)))
}

/// 400 Bad Request.
pub fn bad_request(code: &str, message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, code, message)
}

/// 업스트림 에러를 HTTP 응답으로 변환.
///
/// | 에러 | 상태 | 코드 |
/// |------|------|------|
/// | `TokenIssuance` | 502 | `TOKEN_ISSUE_FAILED` |
/// | `Timeout` | 504 | `UPSTREAM_TIMEOUT` |
/// | `Http` | 502 | `UPSTREAM_HTTP_ERROR` |
/// | 그 외 | 502 | `UPSTREAM_ERROR` |
pub fn upstream_error(err: UpstreamError) -> ApiError {
    let (status, body) = match &err {
        UpstreamError::TokenIssuance { status, body } => (
            StatusCode::BAD_GATEWAY,
            ApiErrorResponse::with_details(
                "TOKEN_ISSUE_FAILED",
                "KIS token issuance failed",
                json!({ "upstream_status": status, "body": body }),
            ),
        ),
        UpstreamError::Timeout(_) => (
            StatusCode::GATEWAY_TIMEOUT,
            ApiErrorResponse::new("UPSTREAM_TIMEOUT", "KIS request timed out"),
        ),
        UpstreamError::Http { status, body } => (
            StatusCode::BAD_GATEWAY,
            ApiErrorResponse::with_details(
                "UPSTREAM_HTTP_ERROR",
                format!("KIS responded with HTTP {}", status),
                json!({ "upstream_status": status, "body": body }),
            ),
        ),
        other => (
            StatusCode::BAD_GATEWAY,
            ApiErrorResponse::new("UPSTREAM_ERROR", other.to_string()),
        ),
    };

    tracing::warn!(code = %body.code, error = %err, "Upstream call failed");

    (status, Json(body))
}
