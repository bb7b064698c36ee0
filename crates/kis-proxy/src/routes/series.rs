//! 투자자 매매동향 필드 시계열 엔드포인트.
//!
//! `GET /api/series?code=005930&field=fb&days=5&date=20250905&mode=per-date&raw=1`

use axum::{
    extract::{Query, State},
    Json,
};
use kis_connector::series::dates::{parse_ymd, DEFAULT_DAYS, MAX_DAYS};
use kis_connector::{FetchStrategy, NonNumericPolicy, SeriesOptions, SeriesPoint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{bad_request, upstream_error, ApiResult};
use crate::state::AppState;

/// 기본 조회 필드 (외국인 순매수 수량).
pub const DEFAULT_FIELD: &str = "fb";

#[derive(Debug, Default, Deserialize)]
pub struct SeriesParams {
    pub code: Option<String>,
    pub field: Option<String>,
    /// 숫자가 아니거나 1 미만이면 기본값
    pub days: Option<String>,
    /// 기준일 (YYYYMMDD 또는 YYYY-MM-DD)
    pub date: Option<String>,
    pub mode: Option<String>,
    pub raw: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub code: String,
    /// 별칭을 해석한 실제 필드명
    pub field: String,
    pub series: Vec<SeriesPoint>,
}

/// GET /api/series
pub async fn get_series(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SeriesParams>,
) -> ApiResult<Json<SeriesResponse>> {
    let code = normalize_code(params.code.as_deref().unwrap_or_default())
        .ok_or_else(|| bad_request("CODE_REQUIRED", "code is required"))?;

    let field = params
        .field
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_FIELD);

    let days = parse_days(params.days.as_deref());

    let anchor = match params.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => Some(
            parse_ymd(date)
                .ok_or_else(|| bad_request("INVALID_DATE", "date must be YYYYMMDD or YYYY-MM-DD"))?,
        ),
        None => None,
    };

    let strategy = match params.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(mode) => FetchStrategy::parse(mode).ok_or_else(|| {
            bad_request("INVALID_MODE", "mode must be per-date or single-call")
        })?,
        None => FetchStrategy::default(),
    };

    let non_numeric = if params.raw.as_deref() == Some("1") {
        NonNumericPolicy::KeepRaw
    } else {
        NonNumericPolicy::Null
    };

    let options = SeriesOptions {
        anchor,
        strategy,
        non_numeric,
        concurrency: state.series_concurrency,
    };

    let series = state
        .series
        .fetch_series(&code, field, days, &options)
        .await
        .map_err(upstream_error)?;

    Ok(Json(SeriesResponse {
        field: state.series.schema().resolve_field(field),
        code,
        series,
    }))
}

/// 숫자만 남기고 6자리로 왼쪽 0 채움. 비었거나 `000000`이면 `None`.
fn normalize_code(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let code = format!("{:0>6}", digits);
    if digits.is_empty() || code.bytes().all(|b| b == b'0') {
        None
    } else {
        Some(code)
    }
}

/// 일수 파싱 (잘못된 값은 기본 5일, 최대 60일).
fn parse_days(raw: Option<&str>) -> usize {
    raw.and_then(|d| d.trim().parse::<i64>().ok())
        .filter(|d| *d >= 1)
        .map(|d| usize::try_from(d).unwrap_or(MAX_DAYS).min(MAX_DAYS))
        .unwrap_or(DEFAULT_DAYS)
}
