//! 시세/수급 조회 엔드포인트.
//!
//! - `GET /api/price`: 현재가 원문 패스스루
//! - `GET /api/quote`: 현재가 요약
//! - `GET /api/investor`: 일별 투자자매매동향 원문 패스스루
//! - `GET /api/flow`: 외국인/기관 순매수 요약

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use kis_connector::quote::{guard_size, is_upstream_failure};
use kis_connector::series::dates::{format_ymd, today_kst};
use kis_connector::{FlowSummary, QuoteSummary};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::passthrough;
use crate::error::{api_error, bad_request, upstream_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    #[serde(default)]
    pub code: String,
    /// 시장 분류 코드 (기본 "J")
    pub mkt: Option<String>,
}

/// GET /api/price
pub async fn get_price(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PriceQuery>,
) -> ApiResult<Response> {
    let market = query.mkt.as_deref().filter(|m| !m.is_empty()).unwrap_or("J");
    let resp = state
        .client
        .get_price(query.code.trim(), market)
        .await
        .map_err(upstream_error)?;
    Ok(passthrough(resp))
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    #[serde(default)]
    pub symbol: String,
    pub full: Option<String>,
    /// 쉼표 구분 필드 목록
    pub fields: Option<String>,
}

/// GET /api/quote
pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuoteQuery>,
) -> ApiResult<Response> {
    let symbol = query.symbol.trim();
    validate_symbol(symbol)?;

    let resp = state
        .client
        .get_price(symbol, "J")
        .await
        .map_err(upstream_error)?;

    let payload = resp.json().unwrap_or_else(|| json!({}));
    if !resp.is_success() || is_upstream_failure(&payload) {
        tracing::warn!(symbol = %symbol, status = resp.status, "Quote lookup failed");
        return Err(api_error(
            StatusCode::BAD_GATEWAY,
            "QUOTE_FAILED",
            format!("Quote lookup failed for {}", symbol),
        ));
    }

    let output = payload.get("output").cloned().unwrap_or_else(|| json!({}));

    let body = if query.full.as_deref() == Some("1") {
        let data = if output.get("stck_shrn_iscd").is_some() {
            output
        } else {
            payload
        };
        json!({ "ok": true, "data": data })
    } else {
        let summary = QuoteSummary::from_output(&output, Utc::now());
        let data = match query.fields.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            Some(fields) => {
                let keys: Vec<&str> = fields
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .collect();
                summary.pick(&keys)
            }
            None => summary.to_map(),
        };
        guard_size(&summary, data)
    };

    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct InvestorQuery {
    #[serde(default)]
    pub code: String,
    /// 조회 기준일 (YYYYMMDD, 기본 오늘)
    pub date: Option<String>,
}

/// GET /api/investor
pub async fn get_investor(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InvestorQuery>,
) -> ApiResult<Response> {
    let date = query
        .date
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format_ymd(today_kst()));

    let resp = state
        .client
        .get_investor_daily(query.code.trim(), &date)
        .await
        .map_err(upstream_error)?;
    Ok(passthrough(resp))
}

#[derive(Debug, Deserialize)]
pub struct FlowQuery {
    #[serde(default)]
    pub symbol: String,
    /// YYYY-MM-DD
    #[serde(default)]
    pub date: String,
}

/// GET /api/flow
pub async fn get_flow(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FlowQuery>,
) -> ApiResult<Json<Value>> {
    let symbol = query.symbol.trim();
    validate_symbol(symbol)?;

    let date = query.date.trim();
    let ymd = parse_dashed_date(date)
        .ok_or_else(|| bad_request("INVALID_DATE", "date must be YYYY-MM-DD"))?;

    let resp = state
        .client
        .get_investor(symbol)
        .await
        .map_err(upstream_error)?;

    let summary = resp
        .json()
        .filter(|payload| resp.is_success() && !is_upstream_failure(payload))
        .and_then(|payload| FlowSummary::from_payload(&payload, Some(ymd.as_str()), state.series.schema()));

    let Some(summary) = summary else {
        tracing::warn!(symbol = %symbol, date = %date, status = resp.status, "No investor flow data");
        return Err(api_error(
            StatusCode::BAD_GATEWAY,
            "NO_FLOW_DATA",
            format!("No investor flow data for {} on {}", symbol, date),
        ));
    };

    Ok(Json(json!({
        "ok": true,
        "symbol": symbol,
        "date": date,
        "foreign": summary.foreign,
        "institution": summary.institution,
        "asOf": summary.as_of,
    })))
}

/// 6자리 숫자 종목코드 확인.
fn validate_symbol(symbol: &str) -> ApiResult<()> {
    if symbol.len() == 6 && symbol.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(bad_request(
            "INVALID_SYMBOL",
            "symbol must be a 6-digit KRX code, e.g. 005930",
        ))
    }
}

/// `YYYY-MM-DD` 형식의 실제 날짜를 YYYYMMDD로 변환.
fn parse_dashed_date(s: &str) -> Option<String> {
    if s.len() != 10 {
        return None;
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(format_ymd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_symbol() {
        assert!(validate_symbol("005930").is_ok());
        assert!(validate_symbol("5930").is_err());
        assert!(validate_symbol("00593A").is_err());

        let (status, Json(body)) = validate_symbol("").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "INVALID_SYMBOL");
    }

    #[test]
    fn test_parse_dashed_date() {
        assert_eq!(parse_dashed_date("2025-09-05").as_deref(), Some("20250905"));
        assert_eq!(parse_dashed_date("2025-02-30"), None);
        assert_eq!(parse_dashed_date("20250905"), None);
        assert_eq!(parse_dashed_date("2025-9-5"), None);
    }
}
