//! 업스트림 응답 스키마 (필드 별칭, 컨테이너 우선순위, 휴장일 판정).

use serde_json::Value;
use std::collections::BTreeMap;

/// 투자자 매매동향 필드 별칭.
pub const FIELD_ALIASES: &[(&str, &str)] = &[
    ("fb", "frgn_shnu_vol"),
    ("fs", "frgn_seln_vol"),
    ("fnb", "frgn_ntby_tr_pbmn"),
    ("ob", "orgn_shnu_vol"),
    ("os", "orgn_seln_vol"),
    ("onb", "orgn_ntby_tr_pbmn"),
];

/// 행 배열을 담는 컨테이너 키 (우선순위 순).
pub const CONTAINER_KEYS: &[&str] = &["output2", "output", "output1", "data", "result"];

/// 영업일자 필드.
pub const REPORT_DATE_KEY: &str = "stck_bsop_date";

/// 응답 헤더 필드 (데이터로 보지 않음).
pub const HEADER_KEYS: &[&str] = &["rt_cd", "msg_cd", "msg1"];

/// 휴장일(데이터 없음) 판정 함수.
pub type EmptyDayPredicate = fn(&Value, &SeriesSchema) -> bool;

/// 시계열 수집기가 사용하는 응답 스키마.
#[derive(Debug, Clone)]
pub struct SeriesSchema {
    /// 별칭 → 정식 필드명 (별칭은 소문자)
    pub aliases: BTreeMap<String, String>,
    /// 컨테이너 키 우선순위
    pub containers: Vec<String>,
    /// 정렬 기준 영업일자 필드
    pub report_date_key: String,
    pub is_empty_day: EmptyDayPredicate,
}

impl Default for SeriesSchema {
    fn default() -> Self {
        Self::investor_daily()
    }
}

impl SeriesSchema {
    /// 종목별 투자자매매동향 (일별) 스키마.
    pub fn investor_daily() -> Self {
        Self {
            aliases: FIELD_ALIASES
                .iter()
                .map(|(alias, field)| (alias.to_string(), field.to_string()))
                .collect(),
            containers: CONTAINER_KEYS.iter().map(|s| s.to_string()).collect(),
            report_date_key: REPORT_DATE_KEY.to_string(),
            is_empty_day: default_empty_day,
        }
    }

    /// 별칭을 정식 필드명으로 변환. 별칭이 아니면 공백만 제거한 원문.
    pub fn resolve_field(&self, field: &str) -> String {
        let trimmed = field.trim();
        self.aliases
            .get(&trimmed.to_lowercase())
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }

    /// 응답이 데이터 없는 날인지 판정.
    pub fn is_empty(&self, payload: &Value) -> bool {
        (self.is_empty_day)(payload, self)
    }

    /// 우선순위가 가장 높은 비어 있지 않은 컨테이너의 행 목록.
    ///
    /// 컨테이너 키는 대소문자를 구분하지 않습니다.
    /// 단일 객체 컨테이너는 행 하나로 취급하며, 값이 모두 비어 있는 행은 제외합니다.
    pub fn rows<'a>(&self, payload: &'a Value) -> Vec<&'a Value> {
        let Some(obj) = payload.as_object() else {
            return Vec::new();
        };

        for key in &self.containers {
            let container = obj
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v);
            let rows: Vec<&Value> = match container {
                Some(Value::Array(items)) => items.iter().filter(|r| row_has_value(r)).collect(),
                Some(row @ Value::Object(_)) if row_has_value(row) => vec![row],
                _ => continue,
            };
            if !rows.is_empty() {
                return rows;
            }
        }

        Vec::new()
    }

    /// 행의 영업일자 (`YYYYMMDD`).
    pub fn report_date<'a>(&self, row: &'a Value) -> Option<&'a str> {
        row.as_object()?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&self.report_date_key))
            .and_then(|(_, v)| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// 기본 휴장일 판정.
///
/// 다음 중 하나면 데이터 없음:
/// - JSON 객체가 아님
/// - `rt_cd`가 있고 `"0"`이 아님
/// - 헤더(`rt_cd`, `msg_cd`, `msg1`) 밖에 비어 있지 않은 값이 하나도 없음
///
/// 컨테이너 구조는 보지 않습니다. 값이 있지만 필드가 없으면 추출 단계에서 걸러집니다.
pub fn default_empty_day(payload: &Value, _schema: &SeriesSchema) -> bool {
    let Some(obj) = payload.as_object() else {
        return true;
    };

    if let Some(rt_cd) = obj.get("rt_cd") {
        let ok = match rt_cd {
            Value::String(s) => s.trim() == "0",
            Value::Number(n) => n.as_i64() == Some(0),
            _ => false,
        };
        if !ok {
            return true;
        }
    }

    !obj
        .iter()
        .filter(|(k, _)| !HEADER_KEYS.iter().any(|h| k.eq_ignore_ascii_case(h)))
        .any(|(_, v)| has_value(v))
}

fn row_has_value(row: &Value) -> bool {
    row.as_object()
        .is_some_and(|fields| fields.values().any(has_value))
}

/// 트리 어딘가에 null/공백이 아닌 스칼라가 있는지.
fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(has_value),
        Value::Object(fields) => fields.values().any(has_value),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
