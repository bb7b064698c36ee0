//! KIS 국내 주식 REST API 클라이언트 (읽기 전용).
//!
//! # 지원 기능
//!
//! - 임의 GET 호출 패스스루 (`kis_get`)
//! - 현재가 조회
//! - 투자자별 매매동향 (일별 / 당일)
//! - 잔고 조회
//! - 실시간 접속 키

use crate::auth::TokenCache;
use crate::config::KisConfig;
use crate::error::{sanitize_body, MAX_ERROR_BODY_CHARS};
use crate::UpstreamError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// 디버그 로그에 남길 업스트림 본문 최대 길이.
const DEBUG_BODY_CHARS: usize = 4000;

/// 업스트림 응답 (상태 코드 + 원문 본문).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 본문을 JSON으로 파싱 (JSON이 아니면 `None`).
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// 2xx가 아니면 `UpstreamError::Http`로 변환.
    pub fn error_for_status(self, secrets: &[&str]) -> Result<Self, UpstreamError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(UpstreamError::Http {
                status: self.status,
                body: sanitize_body(&self.body, secrets, MAX_ERROR_BODY_CHARS),
            })
        }
    }
}

/// 잔고 조회 파라미터.
///
/// 계좌 필드가 비어 있으면 설정의 기본 계좌를 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceQuery {
    pub cano: Option<String>,
    pub product_code: Option<String>,
    /// 시간외단일가 여부
    pub afhr_flpr_yn: String,
    pub ofl_yn: String,
    /// 조회구분 (01: 대출일별, 02: 종목별)
    pub inqr_dvsn: String,
    pub unpr_dvsn: String,
    pub fund_sttl_icld_yn: String,
    pub fncg_amt_auto_rdpt_yn: String,
    /// 처리구분 (00: 전일매매포함, 01: 전일매매미포함)
    pub prcs_dvsn: String,
    /// 연속조회 키
    pub ctx_area_fk100: String,
    pub ctx_area_nk100: String,
}

impl Default for BalanceQuery {
    fn default() -> Self {
        Self {
            cano: None,
            product_code: None,
            afhr_flpr_yn: "N".to_string(),
            ofl_yn: String::new(),
            inqr_dvsn: "02".to_string(),
            unpr_dvsn: "01".to_string(),
            fund_sttl_icld_yn: "N".to_string(),
            fncg_amt_auto_rdpt_yn: "N".to_string(),
            prcs_dvsn: "00".to_string(),
            ctx_area_fk100: String::new(),
            ctx_area_nk100: String::new(),
        }
    }
}

/// KIS REST API 클라이언트.
///
/// 복제 비용이 낮으며, 복제본은 같은 토큰 캐시와 HTTP 커넥션 풀을 공유합니다.
#[derive(Clone)]
pub struct KisClient {
    config: Arc<KisConfig>,
    tokens: TokenCache,
    client: Client,
}

impl KisClient {
    /// 새로운 클라이언트 생성 (소유권 이전).
    pub fn new(config: KisConfig) -> Result<Self, UpstreamError> {
        Self::with_shared_config(Arc::new(config))
    }

    /// 공유된 설정으로 클라이언트 생성.
    ///
    /// 모든 업스트림 호출(토큰 발급 포함)에 `config.timeout_secs`가 적용됩니다.
    pub fn with_shared_config(config: Arc<KisConfig>) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| UpstreamError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let tokens = TokenCache::new(Arc::clone(&config), client.clone());

        Ok(Self {
            config,
            tokens,
            client,
        })
    }

    pub fn config(&self) -> &KisConfig {
        &self.config
    }

    /// 토큰 캐시 참조.
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// 데이터 호출용 공통 헤더 생성.
    async fn build_headers(&self, tr_id: &str) -> Result<HeaderMap, UpstreamError> {
        let token = self.tokens.get_token().await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        headers.insert(
            HeaderName::from_static("appkey"),
            header_value(&self.config.app_key)?,
        );
        headers.insert(
            HeaderName::from_static("appsecret"),
            header_value(self.config.app_secret())?,
        );
        headers.insert(HeaderName::from_static("tr_id"), header_value(tr_id)?);
        headers.insert(
            HeaderName::from_static("custtype"),
            header_value(&self.config.custtype)?,
        );

        Ok(headers)
    }

    /// 업스트림 GET 호출.
    ///
    /// non-2xx 응답도 에러가 아닌 `UpstreamResponse`로 돌려줍니다.
    /// 토큰 발급 실패와 전송 실패(타임아웃 포함)만 에러입니다.
    pub async fn kis_get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        tr_id: &str,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.config.url(path);
        let headers = self.build_headers(tr_id).await?;

        debug!(url = %url, tr_id = %tr_id, "KIS GET");

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                let err = UpstreamError::from(e);
                warn!(url = %url, error = %err, "KIS request failed");
                err
            })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!(
            url = %url,
            status,
            body = %sanitize_body(&body, &self.config.secrets(), DEBUG_BODY_CHARS),
            "KIS response"
        );

        Ok(UpstreamResponse { status, body })
    }

    /// 주식현재가 시세 조회.
    ///
    /// # 인자
    /// * `stock_code` - 종목코드 (예: "005930" 삼성전자)
    /// * `market` - 시장 분류 코드 (기본 "J")
    pub async fn get_price(
        &self,
        stock_code: &str,
        market: &str,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.kis_get(
            &self.config.paths.price,
            &[("FID_COND_MRKT_DIV_CODE", market), ("FID_INPUT_ISCD", stock_code)],
            &self.config.tr_ids.price,
        )
        .await
    }

    /// 종목별 투자자매매동향 (일별) 조회.
    ///
    /// # 인자
    /// * `stock_code` - 종목코드
    /// * `date` - 조회 기준일 (YYYYMMDD)
    pub async fn get_investor_daily(
        &self,
        stock_code: &str,
        date: &str,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.kis_get(
            &self.config.paths.investor,
            &[
                ("FID_COND_MRKT_DIV_CODE", "J"),
                ("FID_INPUT_ISCD", stock_code),
                ("FID_INPUT_DATE_1", date),
                ("FID_ORG_ADJ_PRC", ""),
                ("FID_ETC_CLS_CODE", ""),
            ],
            &self.config.tr_ids.investor,
        )
        .await
    }

    /// 주식현재가 투자자 조회 (최근 30영업일 외국인/기관/개인 순매수).
    pub async fn get_investor(&self, stock_code: &str) -> Result<UpstreamResponse, UpstreamError> {
        self.kis_get(
            &self.config.paths.flow,
            &[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", stock_code)],
            &self.config.tr_ids.flow,
        )
        .await
    }

    /// 잔고 조회.
    ///
    /// # Errors
    /// 계좌번호가 요청과 설정 어디에도 없으면 `UpstreamError::Config`.
    pub async fn get_balance(&self, query: &BalanceQuery) -> Result<UpstreamResponse, UpstreamError> {
        let default_account = self.config.account.as_ref();

        let cano = query
            .cano
            .as_deref()
            .or_else(|| default_account.map(|a| a.cano.as_str()))
            .ok_or_else(|| UpstreamError::Config("Missing account number (KIS_CANO)".into()))?;
        let product_code = query
            .product_code
            .as_deref()
            .or_else(|| default_account.map(|a| a.product_code.as_str()))
            .unwrap_or("01");

        self.kis_get(
            &self.config.paths.balance,
            &[
                ("CANO", cano),
                ("ACNT_PRDT_CD", product_code),
                ("AFHR_FLPR_YN", query.afhr_flpr_yn.as_str()),
                ("OFL_YN", query.ofl_yn.as_str()),
                ("INQR_DVSN", query.inqr_dvsn.as_str()),
                ("UNPR_DVSN", query.unpr_dvsn.as_str()),
                ("FUND_STTL_ICLD_YN", query.fund_sttl_icld_yn.as_str()),
                ("FNCG_AMT_AUTO_RDPT_YN", query.fncg_amt_auto_rdpt_yn.as_str()),
                ("PRCS_DVSN", query.prcs_dvsn.as_str()),
                ("CTX_AREA_FK100", query.ctx_area_fk100.as_str()),
                ("CTX_AREA_NK100", query.ctx_area_nk100.as_str()),
            ],
            &self.config.tr_ids.balance,
        )
        .await
    }

    /// 실시간 접속 키.
    pub async fn approval_key(&self) -> Result<String, UpstreamError> {
        self.tokens.approval_key().await
    }
}

fn header_value(value: &str) -> Result<HeaderValue, UpstreamError> {
    HeaderValue::from_str(value)
        .map_err(|e| UpstreamError::Config(format!("Invalid header value: {}", e)))
}
