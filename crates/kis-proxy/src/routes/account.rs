//! 계좌 조회와 실시간 접속 키.

use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};
use kis_connector::{BalanceQuery, UpstreamError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::passthrough;
use crate::error::{bad_request, upstream_error, ApiResult};
use crate::state::AppState;

/// `/api/balance` 쿼리 파라미터. 비어 있는 항목은 기본값을 씁니다.
#[derive(Debug, Default, Deserialize)]
pub struct BalanceParams {
    pub cano: Option<String>,
    pub prdt: Option<String>,
    pub afhr: Option<String>,
    pub inqr: Option<String>,
    pub unpr: Option<String>,
    pub fund: Option<String>,
    pub auto: Option<String>,
    pub prcs: Option<String>,
    pub fk: Option<String>,
    pub nk: Option<String>,
}

impl BalanceParams {
    fn into_query(self) -> BalanceQuery {
        let defaults = BalanceQuery::default();
        let or = |value: Option<String>, default: String| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        BalanceQuery {
            cano: self.cano.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
            product_code: self.prdt.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
            afhr_flpr_yn: or(self.afhr, defaults.afhr_flpr_yn),
            ofl_yn: defaults.ofl_yn,
            inqr_dvsn: or(self.inqr, defaults.inqr_dvsn),
            unpr_dvsn: or(self.unpr, defaults.unpr_dvsn),
            fund_sttl_icld_yn: or(self.fund, defaults.fund_sttl_icld_yn),
            fncg_amt_auto_rdpt_yn: or(self.auto, defaults.fncg_amt_auto_rdpt_yn),
            prcs_dvsn: or(self.prcs, defaults.prcs_dvsn),
            ctx_area_fk100: self.fk.unwrap_or_default(),
            ctx_area_nk100: self.nk.unwrap_or_default(),
        }
    }
}

/// GET /api/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BalanceParams>,
) -> ApiResult<Response> {
    let query = params.into_query();

    match state.client.get_balance(&query).await {
        Ok(resp) => Ok(passthrough(resp)),
        Err(UpstreamError::Config(message)) => Err(bad_request("ACCOUNT_REQUIRED", message)),
        Err(e) => Err(upstream_error(e)),
    }
}

/// GET /api/realtime-key
pub async fn get_realtime_key(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let approval_key = state.client.approval_key().await.map_err(upstream_error)?;

    Ok(Json(json!({
        "ok": true,
        "data": { "approval_key": approval_key },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_params_defaults() {
        let query = BalanceParams::default().into_query();
        assert_eq!(query, BalanceQuery::default());
    }

    #[test]
    fn test_balance_params_overrides() {
        let params = BalanceParams {
            cano: Some(" 87654321 ".into()),
            prcs: Some("01".into()),
            inqr: Some("".into()),
            fk: Some("NEXT".into()),
            ..Default::default()
        };
        let query = params.into_query();

        assert_eq!(query.cano.as_deref(), Some("87654321"));
        assert_eq!(query.product_code, None);
        assert_eq!(query.prcs_dvsn, "01");
        assert_eq!(query.inqr_dvsn, "02");
        assert_eq!(query.ctx_area_fk100, "NEXT");
    }
}
