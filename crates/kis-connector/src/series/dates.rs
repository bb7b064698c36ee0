//! 시계열 요청 날짜 계산 (Asia/Seoul 기준 달력일).

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Asia::Seoul;

/// 요청 가능한 최대 일수.
pub const MAX_DAYS: usize = 60;
/// 일수를 지정하지 않은 경우 기본값.
pub const DEFAULT_DAYS: usize = 5;

/// 서울 기준 오늘 날짜.
pub fn today_kst() -> NaiveDate {
    Utc::now().with_timezone(&Seoul).date_naive()
}

/// 요청 일수를 `[1, MAX_DAYS]`로 제한.
pub fn clamp_days(days: usize) -> usize {
    days.clamp(1, MAX_DAYS)
}

/// `anchor`부터 하루씩 거슬러 올라가는 `days`개의 날짜 (최신순).
pub fn requested_dates(anchor: NaiveDate, days: usize) -> Vec<NaiveDate> {
    (0..days).map(|i| anchor - Duration::days(i as i64)).collect()
}

/// `YYYYMMDD` 형식 문자열.
pub fn format_ymd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// `YYYYMMDD` 또는 `YYYY-MM-DD` 파싱. 실제 존재하지 않는 날짜는 `None`.
pub fn parse_ymd(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .ok()
}
