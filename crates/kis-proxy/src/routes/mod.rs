//! HTTP 라우터.
//!
//! # 엔드포인트
//!
//! | 경로 | 설명 |
//! |------|------|
//! | `GET /` | 서비스 정보 |
//! | `GET /health` | liveness |
//! | `GET /api/token` | 토큰 미리보기 |
//! | `GET /api/price` | 현재가 패스스루 |
//! | `GET /api/quote` | 현재가 요약 |
//! | `GET /api/investor` | 일별 투자자매매동향 패스스루 |
//! | `GET /api/flow` | 외국인/기관 순매수 요약 |
//! | `GET /api/balance` | 잔고 패스스루 |
//! | `GET /api/series` | 필드 시계열 |
//! | `GET /api/realtime-key` | 실시간 접속 키 |
//! | `ANY /api/order` | 403 (주문 비활성) |
//!
//! `/api` 아래 경로는 모두 접근 키가 필요합니다.
//! `/api/series`는 `series_timeout`, 나머지 경로는 `request_timeout`이 적용됩니다.

pub mod account;
pub mod health;
pub mod market;
pub mod order;
pub mod series;
pub mod token;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use kis_connector::UpstreamResponse;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ProxyConfig;
use crate::error::ApiErrorResponse;
use crate::middleware::{rate_limit_middleware, require_access_key, security_headers, RateLimitState};
use crate::state::AppState;

/// 접근 키가 필요한 `/api` 라우터.
pub fn api_router(state: Arc<AppState>, config: &ProxyConfig) -> Router<Arc<AppState>> {
    Router::new()
        .route("/token", get(token::token_status))
        .route("/price", get(market::get_price))
        .route("/quote", get(market::get_quote))
        .route("/investor", get(market::get_investor))
        .route("/flow", get(market::get_flow))
        .route("/balance", get(account::get_balance))
        .route("/realtime-key", get(account::get_realtime_key))
        .route("/order", any(order::orders_disabled))
        .route("/order/{*rest}", any(order::orders_disabled))
        .route_layer(request_timeout(config.request_timeout))
        .route(
            "/series",
            get(series::get_series).layer(request_timeout(config.series_timeout)),
        )
        .route_layer(middleware::from_fn_with_state(state, require_access_key))
}

/// 전체 애플리케이션 라우터 생성.
///
/// `rate_limit`이 `None`이면 요청 제한 없이 동작합니다.
pub fn create_app(
    state: Arc<AppState>,
    config: &ProxyConfig,
    rate_limit: Option<RateLimitState>,
) -> Router {
    let router = Router::new()
        .route("/", get(health::service_info))
        .route("/health", get(health::health_check))
        .route_layer(request_timeout(config.request_timeout))
        .nest("/api", api_router(Arc::clone(&state), config))
        .fallback(not_found)
        .with_state(state);

    let router = match rate_limit {
        Some(rate_limit) => router.layer(middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        )),
        None => {
            info!("Rate limiting disabled");
            router
        }
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
        .layer(middleware::from_fn(security_headers))
}

/// 시간 초과 시 408을 반환하는 타임아웃 레이어.
fn request_timeout(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// CORS 레이어.
///
/// 허용 origin 목록이 비어 있으면 모든 origin을 허용합니다.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    let allow_origin = if parsed.is_empty() {
        if !origins.is_empty() {
            warn!("CORS_ORIGINS contains no valid origins, allowing any");
        }
        AllowOrigin::any()
    } else {
        info!("CORS configured with {} allowed origins", parsed.len());
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

/// 업스트림 상태 코드와 본문을 그대로 전달.
///
/// 본문이 JSON이면 `application/json`, 아니면 `text/plain`으로 응답합니다.
pub(crate) fn passthrough(resp: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = if resp.json().is_some() {
        "application/json; charset=utf-8"
    } else {
        "text/plain; charset=utf-8"
    };

    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
        resp.body,
    )
        .into_response()
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiErrorResponse::new("NOT_FOUND", "Route not found")),
    )
}
