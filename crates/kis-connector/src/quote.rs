//! 현재가 응답 요약.
//!
//! `inquire-price` 응답의 `output`에서 자주 쓰는 필드만 골라 가벼운 형태로 만듭니다.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// 요약 응답 최대 크기 (바이트). 초과 시 핵심 필드만 남깁니다.
pub const MAX_QUOTE_BYTES: usize = 20_000;

/// `fields` 파라미터가 비어 있을 때 쓰는 기본 필드.
pub const DEFAULT_PICK: &[&str] = &["code", "price", "changeRate"];

/// 크기 초과 시 남기는 필드.
pub const ULTRA_SLIM: &[&str] = &["code", "price", "changeRate", "volume"];

/// 시세 요약.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummary {
    /// 종목코드 (stck_shrn_iscd)
    pub code: Option<String>,
    /// 현재가 (stck_prpr)
    pub price: f64,
    /// 전일대비 (prdy_vrss)
    pub change: f64,
    /// 등락률 % (prdy_ctrt)
    pub change_rate: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// 누적거래량 (acml_vol)
    pub volume: f64,
    /// 누적거래대금 (acml_tr_pbmn)
    pub amount: f64,
    /// 외국인 소진율 (hts_frgn_ehrt)
    pub foreigner_rate: f64,
    /// 대표 시장명 (rprs_mrkt_kor_name)
    pub market: Option<String>,
    pub timestamp: String,
}

impl QuoteSummary {
    /// 현재가 `output` 객체에서 요약 생성.
    pub fn from_output(output: &Value, now: DateTime<Utc>) -> Self {
        let text = |key: &str| output.get(key).and_then(Value::as_str).map(str::to_string);
        let num = |key: &str| lenient_number(output.get(key));

        Self {
            code: text("stck_shrn_iscd"),
            price: num("stck_prpr"),
            change: num("prdy_vrss"),
            change_rate: num("prdy_ctrt"),
            open: num("stck_oprc"),
            high: num("stck_hgpr"),
            low: num("stck_lwpr"),
            volume: num("acml_vol"),
            amount: num("acml_tr_pbmn"),
            foreigner_rate: num("hts_frgn_ehrt"),
            market: text("rprs_mrkt_kor_name"),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// JSON 객체로 변환.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// 요청 필드만 남긴 객체. `fields`가 비어 있으면 기본 필드.
    pub fn pick(&self, fields: &[&str]) -> Map<String, Value> {
        let keys = if fields.is_empty() { DEFAULT_PICK } else { fields };
        pick(&self.to_map(), keys)
    }
}

/// 응답 본문이 `MAX_QUOTE_BYTES`를 넘으면 핵심 필드만 남깁니다.
///
/// 반환값은 `{ok, data, truncated?}` 형태의 응답 본문입니다.
pub fn guard_size(summary: &QuoteSummary, data: Map<String, Value>) -> Value {
    let body = json!({ "ok": true, "data": data });
    let size = serde_json::to_vec(&body).map(|b| b.len()).unwrap_or(usize::MAX);

    if size <= MAX_QUOTE_BYTES {
        return body;
    }

    json!({
        "ok": true,
        "data": pick(&summary.to_map(), ULTRA_SLIM),
        "truncated": true,
    })
}

/// 주어진 키만 남긴 객체 (없는 키는 무시).
pub fn pick(source: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|k| source.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect()
}

/// 숫자 비슷한 값을 숫자로. null, 빈 문자열, 해석 불가 값은 0.
pub fn lenient_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.replace(',', "").trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// 업스트림 실패 여부 (`rt_cd == "1"`).
pub fn is_upstream_failure(payload: &Value) -> bool {
    payload.get("rt_cd").and_then(Value::as_str) == Some("1")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_output() -> Value {
        json!({
            "stck_shrn_iscd": "005930",
            "stck_prpr": "71,000",
            "prdy_vrss": "-500",
            "prdy_ctrt": "-0.70",
            "stck_oprc": "71500",
            "stck_hgpr": "72000",
            "stck_lwpr": "70800",
            "acml_vol": "12345678",
            "acml_tr_pbmn": "",
            "hts_frgn_ehrt": "55.12",
            "rprs_mrkt_kor_name": "KOSPI200"
        })
    }

    #[test]
    fn test_summary_from_output() {
        let summary = QuoteSummary::from_output(&sample_output(), Utc::now());

        assert_eq!(summary.code.as_deref(), Some("005930"));
        assert_eq!(summary.price, 71000.0);
        assert_eq!(summary.change, -500.0);
        assert_eq!(summary.change_rate, -0.7);
        assert_eq!(summary.amount, 0.0);
        assert_eq!(summary.market.as_deref(), Some("KOSPI200"));
    }

    #[test]
    fn test_pick_fields() {
        let summary = QuoteSummary::from_output(&sample_output(), Utc::now());

        let picked = summary.pick(&["code", "volume", "unknown"]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked["volume"], json!(12345678.0));

        let defaults = summary.pick(&[]);
        let keys: Vec<&str> = defaults.keys().map(String::as_str).collect();
        assert!(keys.contains(&"changeRate"));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_guard_size_passes_small_payload() {
        let summary = QuoteSummary::from_output(&sample_output(), Utc::now());
        let body = guard_size(&summary, summary.to_map());
        assert!(body.get("truncated").is_none());
        assert_eq!(body["data"]["code"], "005930");
    }

    #[test]
    fn test_guard_size_collapses_large_payload() {
        let mut output = sample_output();
        output["rprs_mrkt_kor_name"] = json!("x".repeat(MAX_QUOTE_BYTES));
        let summary = QuoteSummary::from_output(&output, Utc::now());

        let body = guard_size(&summary, summary.to_map());
        assert_eq!(body["truncated"], true);
        assert_eq!(body["data"].as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_upstream_failure_flag() {
        assert!(is_upstream_failure(&json!({"rt_cd": "1"})));
        assert!(!is_upstream_failure(&json!({"rt_cd": "0"})));
    }
}
