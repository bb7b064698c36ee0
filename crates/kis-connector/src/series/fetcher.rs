//! 필드 시계열 수집기.

use super::dates::{clamp_days, format_ymd, requested_dates, today_kst};
use super::extract::{extract_field, normalize, Normalized};
use super::schema::SeriesSchema;
use super::{FetchStrategy, NonNumericPolicy, SeriesOptions, SeriesPoint};
use crate::client::KisClient;
use crate::UpstreamError;
use chrono::{Duration, NaiveDate};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

/// 요청 날짜당 최대 역방향 탐색 횟수 (첫 시도 제외).
pub const MAX_STEP_BACKS: u32 = 7;

/// 한 번의 업스트림 시도 결과.
struct Attempt {
    /// 관측한 HTTP 상태 (전송 실패 시 `None`)
    status: Option<u16>,
    /// 데이터가 있는 응답 본문
    payload: Option<Value>,
}

impl Attempt {
    fn no_data(status: Option<u16>) -> Self {
        Self {
            status,
            payload: None,
        }
    }
}

/// 투자자 매매동향 필드 시계열 수집기.
#[derive(Clone)]
pub struct SeriesFetcher {
    client: KisClient,
    schema: SeriesSchema,
}

impl SeriesFetcher {
    /// 기본 스키마(종목별 투자자매매동향 일별)로 생성.
    pub fn new(client: KisClient) -> Self {
        Self::with_schema(client, SeriesSchema::default())
    }

    pub fn with_schema(client: KisClient, schema: SeriesSchema) -> Self {
        Self { client, schema }
    }

    pub fn schema(&self) -> &SeriesSchema {
        &self.schema
    }

    /// 필드 시계열 조회.
    ///
    /// 결과는 항상 `days`(1~60으로 제한)개이며 최신 날짜가 먼저 옵니다.
    /// 날짜별 업스트림 실패는 `value: None`으로 기록될 뿐 전체 조회를 중단하지 않습니다.
    ///
    /// # Errors
    /// 토큰 발급 실패와 설정 오류만 에러로 전파됩니다.
    pub async fn fetch_series(
        &self,
        code: &str,
        field: &str,
        days: usize,
        options: &SeriesOptions,
    ) -> Result<Vec<SeriesPoint>, UpstreamError> {
        let days = clamp_days(days);
        let field = self.schema.resolve_field(field);
        let anchor = options.anchor.unwrap_or_else(today_kst);

        info!(
            code = %code,
            field = %field,
            days,
            anchor = %format_ymd(anchor),
            strategy = ?options.strategy,
            "Fetching field series"
        );

        let series = match options.strategy {
            FetchStrategy::PerDate => {
                let dates = requested_dates(anchor, days);
                stream::iter(dates)
                    .map(|date| self.fetch_point(code, &field, date, options.non_numeric))
                    .buffered(options.concurrency.max(1))
                    .try_collect::<Vec<_>>()
                    .await?
            }
            FetchStrategy::SingleCall => {
                self.fetch_single_call(code, &field, anchor, days, options.non_numeric)
                    .await?
            }
        };

        let found = series.iter().filter(|p| p.value.is_some()).count();
        info!(code = %code, field = %field, found, total = series.len(), "Field series complete");

        Ok(series)
    }

    /// 요청 날짜 하나에 대해 역방향 탐색.
    async fn fetch_point(
        &self,
        code: &str,
        field: &str,
        date: NaiveDate,
        policy: NonNumericPolicy,
    ) -> Result<SeriesPoint, UpstreamError> {
        let requested = format_ymd(date);
        let mut last_status = 0u16;

        for step in 0..=MAX_STEP_BACKS {
            let attempt_date = format_ymd(date - Duration::days(i64::from(step)));
            let attempt = self.attempt(code, &attempt_date).await?;
            if let Some(status) = attempt.status {
                last_status = status;
            }

            let Some(payload) = attempt.payload else {
                continue;
            };

            let value = extract_field(&payload, &self.schema.containers, field)
                .map(|v| normalize(&v))
                .unwrap_or(Normalized::Blank);

            if value.is_present() {
                let (value, raw) = apply_policy(value, policy);
                debug!(code = %code, date = %requested, as_of = %attempt_date, attempt = step + 1, ?value, "Field found");
                return Ok(SeriesPoint {
                    date: requested,
                    status: last_status,
                    value,
                    as_of: Some(attempt_date),
                    raw,
                });
            }

            debug!(code = %code, date = %attempt_date, field = %field, "Field missing or blank");
        }

        warn!(
            code = %code,
            date = %requested,
            attempts = MAX_STEP_BACKS + 1,
            status = last_status,
            "No data found within back-scan window"
        );

        Ok(SeriesPoint::missing(requested, last_status))
    }

    /// 기준일 한 번 조회 후 행을 잘라 사용.
    ///
    /// 각 점의 `date`는 요청 날짜가 아니라 행의 영업일자입니다.
    /// 행이 부족하면 마지막 행 전날부터 하루씩 거슬러 `status: 0`인 빈 점으로 채웁니다.
    async fn fetch_single_call(
        &self,
        code: &str,
        field: &str,
        anchor: NaiveDate,
        days: usize,
        policy: NonNumericPolicy,
    ) -> Result<Vec<SeriesPoint>, UpstreamError> {
        let mut last_status = 0u16;
        let mut payload = None;

        for step in 0..=MAX_STEP_BACKS {
            let attempt_date = format_ymd(anchor - Duration::days(i64::from(step)));
            let attempt = self.attempt(code, &attempt_date).await?;
            if let Some(status) = attempt.status {
                last_status = status;
            }
            if attempt.payload.is_some() {
                payload = attempt.payload;
                break;
            }
        }

        // 컨테이너가 없는 응답은 본문 전체를 한 행으로 취급
        let mut rows = match payload.as_ref() {
            Some(p) => {
                let rows = self.schema.rows(p);
                if rows.is_empty() {
                    vec![p]
                } else {
                    rows
                }
            }
            None => Vec::new(),
        };

        // 영업일자 내림차순, 날짜 없는 행은 뒤로
        rows.sort_by(|a, b| self.schema.report_date(b).cmp(&self.schema.report_date(a)));

        let requested = requested_dates(anchor, days);
        let mut series: Vec<SeriesPoint> = rows
            .iter()
            .take(days)
            .enumerate()
            .map(|(i, row)| {
                let row_date = self
                    .schema
                    .report_date(row)
                    .map(str::to_string)
                    .unwrap_or_else(|| format_ymd(requested[i]));
                let value = extract_field(*row, &[], field)
                    .map(|v| normalize(&v))
                    .unwrap_or(Normalized::Blank);
                let (value, raw) = apply_policy(value, policy);
                SeriesPoint {
                    as_of: Some(row_date.clone()),
                    date: row_date,
                    status: last_status,
                    value,
                    raw,
                }
            })
            .collect();

        if series.len() < days {
            debug!(
                code = %code,
                rows = series.len(),
                days,
                "Padding single-call series with empty points"
            );
        }

        let mut next = series
            .last()
            .and_then(|p| super::dates::parse_ymd(&p.date))
            .map(|d| d - Duration::days(1))
            .unwrap_or(anchor);
        while series.len() < days {
            series.push(SeriesPoint::missing(format_ymd(next), 0));
            next -= Duration::days(1);
        }

        Ok(series)
    }

    /// 업스트림 1회 호출 후 데이터 유무 판정.
    async fn attempt(&self, code: &str, date: &str) -> Result<Attempt, UpstreamError> {
        let response = match self.client.get_investor_daily(code, date).await {
            Ok(response) => response,
            Err(e) if e.is_token_error() || matches!(e, UpstreamError::Config(_)) => {
                return Err(e)
            }
            Err(e) => {
                warn!(code = %code, date = %date, error = %e, "Investor request failed");
                return Ok(Attempt::no_data(None));
            }
        };

        let status = Some(response.status);

        if !response.is_success() {
            debug!(code = %code, date = %date, status = response.status, "Non-2xx investor response");
            return Ok(Attempt::no_data(status));
        }

        let Some(payload) = response.json() else {
            debug!(code = %code, date = %date, "Investor response is not JSON");
            return Ok(Attempt::no_data(status));
        };

        if self.schema.is_empty(&payload) {
            debug!(code = %code, date = %date, "Empty trading day");
            return Ok(Attempt::no_data(status));
        }

        Ok(Attempt {
            status,
            payload: Some(payload),
        })
    }
}

fn apply_policy(value: Normalized, policy: NonNumericPolicy) -> (Option<f64>, Option<String>) {
    match (value, policy) {
        (Normalized::Number(n), _) => (Some(n), None),
        (Normalized::NonNumeric(raw), NonNumericPolicy::KeepRaw) => (None, Some(raw)),
        (Normalized::NonNumeric(_), NonNumericPolicy::Null) | (Normalized::Blank, _) => {
            (None, None)
        }
    }
}
