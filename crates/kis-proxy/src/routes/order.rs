//! 주문 엔드포인트 (비활성).

use axum::{http::StatusCode, Json};

use crate::error::{ApiErrorResponse, ApiResult};

/// ANY /api/order
///
/// 읽기 전용 프록시이므로 모든 메서드에 403을 반환합니다.
pub async fn orders_disabled() -> ApiResult<()> {
    tracing::warn!("Order request rejected");
    Err((
        StatusCode::FORBIDDEN,
        Json(ApiErrorResponse::new(
            "ORDERS_DISABLED",
            "Order placement is disabled on this read-only proxy",
        )),
    ))
}
