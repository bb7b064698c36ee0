//! 업스트림(KIS) 호출 에러 타입.

use thiserror::Error;

/// 에러 본문에 포함할 최대 문자 수.
pub const MAX_ERROR_BODY_CHARS: usize = 512;

/// KIS 업스트림 관련 에러.
///
/// 토큰 갱신 중 대기하던 모든 호출자가 같은 에러를 받을 수 있도록 `Clone`을 구현합니다.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// 토큰 발급 실패 (자격증명 거부 또는 토큰 필드 누락)
    #[error("Token issuance failed ({status}): {body}")]
    TokenIssuance { status: u16, body: String },

    /// 요청 타임아웃
    #[error("Upstream timeout: {0}")]
    Timeout(String),

    /// 데이터 엔드포인트의 non-2xx 응답
    #[error("Upstream HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// 모든 스캔 시도에서 필드를 찾지 못함
    #[error("Field '{field}' not found for {date}")]
    FieldNotFound { field: String, date: String },

    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UpstreamError {
    /// 토큰 발급 에러인지 확인.
    pub fn is_token_error(&self) -> bool {
        matches!(self, UpstreamError::TokenIssuance { .. })
    }

    /// 타임아웃 에러인지 확인.
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout(_))
    }

    /// 관측된 업스트림 HTTP 상태 코드 (있는 경우).
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::TokenIssuance { status, .. } | UpstreamError::Http { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else if err.is_decode() {
            UpstreamError::Parse(err.to_string())
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::Parse(err.to_string())
    }
}

/// 문자열을 문자 경계에서 잘라냅니다.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…(truncated)", &s[..idx]),
        None => s.to_string(),
    }
}

/// 업스트림 본문에서 민감 정보를 가리고 길이를 제한합니다.
///
/// 앱키, 앱시크릿, `Bearer` 토큰을 마스킹한 뒤 `max_chars`로 자릅니다.
pub fn sanitize_body(body: &str, secrets: &[&str], max_chars: usize) -> String {
    let mut masked = body.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        masked = masked.replace(secret, "***");
    }
    truncate_chars(&mask_bearer(&masked), max_chars)
}

fn mask_bearer(s: &str) -> String {
    const MARKER: &str = "Bearer ";
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find(MARKER) {
        let (head, tail) = rest.split_at(pos + MARKER.len());
        out.push_str(head);
        out.push_str("***TOKEN***");
        let token_len = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || "-._~+/=".contains(c)))
            .unwrap_or(tail.len());
        rest = &tail[token_len..];
    }
    out.push_str(rest);
    out
}
