//! 투자자 매매동향 필드 시계열.
//!
//! 종목코드, 필드(별칭 허용), 일수를 받아 날짜별 값을 수집합니다.
//! 휴장일이나 빈 응답이면 하루씩 거슬러 올라가며 다시 조회합니다 (최대 7회).

pub mod dates;
pub mod extract;
pub mod fetcher;
pub mod schema;

pub use fetcher::{SeriesFetcher, MAX_STEP_BACKS};
pub use schema::SeriesSchema;

use crate::UpstreamError;
use serde::{Deserialize, Serialize};

/// 수집 전략.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// 요청 날짜마다 한 번씩 호출
    #[default]
    PerDate,
    /// 기준일 한 번 호출 후 응답 행을 영업일자 내림차순으로 잘라 사용
    SingleCall,
}

impl FetchStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "per-date" | "per_date" | "perdate" => Some(FetchStrategy::PerDate),
            "single-call" | "single_call" | "single" => Some(FetchStrategy::SingleCall),
            _ => None,
        }
    }
}

/// 숫자가 아닌 값 처리 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonNumericPolicy {
    /// `value`를 null로
    #[default]
    Null,
    /// `value`는 null, 원문은 `raw`에 보존
    KeepRaw,
}

/// 시계열 수집 옵션.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesOptions {
    /// 기준일 (없으면 서울 기준 오늘)
    pub anchor: Option<chrono::NaiveDate>,
    pub strategy: FetchStrategy,
    pub non_numeric: NonNumericPolicy,
    /// 날짜별 동시 조회 수 (`PerDate` 전용)
    pub concurrency: usize,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            anchor: None,
            strategy: FetchStrategy::default(),
            non_numeric: NonNumericPolicy::default(),
            concurrency: 1,
        }
    }
}

/// 날짜별 시계열 값.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// 요청 날짜 (YYYYMMDD)
    pub date: String,
    /// 마지막으로 관측한 업스트림 HTTP 상태 (관측 없으면 0)
    pub status: u16,
    pub value: Option<f64>,
    /// 값을 얻은 실제 영업일
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<String>,
    /// 숫자가 아닌 원문 (`NonNumericPolicy::KeepRaw`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl SeriesPoint {
    /// 값이 없는 포인트.
    pub fn missing(date: impl Into<String>, status: u16) -> Self {
        Self {
            date: date.into(),
            status,
            value: None,
            as_of: None,
            raw: None,
        }
    }

    /// 숫자 값을 요구. 없으면 `UpstreamError::FieldNotFound`.
    pub fn require(&self, field: &str) -> Result<f64, UpstreamError> {
        self.value.ok_or_else(|| UpstreamError::FieldNotFound {
            field: field.to_string(),
            date: self.date.clone(),
        })
    }
}
