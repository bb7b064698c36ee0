//! 토큰 상태 확인.

use axum::{extract::State, Json};
use kis_connector::preview;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{upstream_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TokenStatus {
    pub ok: bool,
    /// 토큰 앞부분만 노출
    pub access_token_preview: String,
    pub expires_at: Option<String>,
}

/// GET /api/token
///
/// 캐시된 토큰을 쓰거나 새로 발급한 뒤 미리보기만 반환합니다.
pub async fn token_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<TokenStatus>> {
    let tokens = state.client.tokens();
    let token = tokens.get_token().await.map_err(upstream_error)?;
    let expires_at = tokens
        .cached()
        .await
        .map(|cached| cached.expires_at.to_rfc3339());

    Ok(Json(TokenStatus {
        ok: true,
        access_token_preview: preview(&token),
        expires_at,
    }))
}
