//! 라우터 통합 테스트 (mockito 업스트림 + tower oneshot).

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use kis_connector::{KisClient, KisConfig};
use kis_proxy::middleware::{RateLimitConfig, RateLimitState};
use kis_proxy::{create_app, AppState, ProxyConfig};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const ACCESS_KEY: &str = "proxy-test-key";
const PRICE_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-price";
const INVESTOR_PATH: &str = "/uapi/domestic-stock/v1/quotations/investor-trade-by-stock-daily";
const FLOW_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-investor";
const BALANCE_PATH: &str = "/uapi/domestic-stock/v1/trading/inquire-balance";

fn app_for(server: &ServerGuard, account: bool) -> Router {
    let mut config = KisConfig::new("router-key", "router-secret").with_base_url(server.url());
    if account {
        config = config.with_account("12345678", "01");
    }
    let state = Arc::new(AppState::from_client(
        KisClient::new(config).unwrap(),
        ACCESS_KEY,
    ));
    create_app(state, &ProxyConfig::new(ACCESS_KEY), None)
}

async fn mock_token(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/oauth2/tokenP")
        .with_status(200)
        .with_body(r#"{"access_token":"router-token-1234567890"}"#)
        .create_async()
        .await
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", ACCESS_KEY)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public_and_has_security_headers() {
    let server = mockito::Server::new_async().await;
    let app = app_for(&server, false);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["referrer-policy"], "no-referrer");
}

#[tokio::test]
async fn api_requires_access_key() {
    let server = mockito::Server::new_async().await;
    let app = app_for(&server, false);

    let missing = app
        .clone()
        .oneshot(Request::builder().uri("/api/token").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(missing).await["code"], "UNAUTHORIZED");

    let wrong = app
        .oneshot(
            Request::builder()
                .uri("/api/token")
                .header("x-client-token", "nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn client_token_header_is_accepted() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let app = app_for(&server, false);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/token")
                .header("x-client-token", ACCESS_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["access_token_preview"], "router-tok...");
    assert!(body["expires_at"].is_string());
}

#[tokio::test]
async fn orders_are_always_forbidden() {
    let server = mockito::Server::new_async().await;
    let app = app_for(&server, false);

    for method in [Method::GET, Method::POST, Method::DELETE] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/api/order")
                    .header("x-api-key", ACCESS_KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "ORDERS_DISABLED");
    }
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let server = mockito::Server::new_async().await;
    let app = app_for(&server, false);

    let response = app.oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn preflight_skips_access_key() {
    let server = mockito::Server::new_async().await;
    let app = app_for(&server, false);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/series")
                .header("origin", "https://app.example.com")
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn token_failure_maps_to_bad_gateway() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/oauth2/tokenP")
        .with_status(403)
        .with_body(r#"{"error_code":"EGW00103","error_description":"유효하지 않은 AppKey입니다."}"#)
        .create_async()
        .await;
    let app = app_for(&server, false);

    let response = app.oneshot(get("/api/series?code=005930")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["code"], "TOKEN_ISSUE_FAILED");
    assert_eq!(body["details"]["upstream_status"], 403);
}

#[tokio::test]
async fn series_validates_parameters() {
    let server = mockito::Server::new_async().await;
    let app = app_for(&server, false);

    let cases = [
        ("/api/series", "CODE_REQUIRED"),
        ("/api/series?code=000000", "CODE_REQUIRED"),
        ("/api/series?code=005930&date=2025-13-40", "INVALID_DATE"),
        ("/api/series?code=005930&mode=bulk", "INVALID_MODE"),
    ];

    for (uri, code) in cases {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json_body(response).await["code"], code, "{}", uri);
    }
}

#[tokio::test]
async fn series_returns_resolved_field_and_points() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let _data = server
        .mock("GET", INVESTOR_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("FID_INPUT_ISCD".into(), "005930".into()),
            Matcher::UrlEncoded("FID_INPUT_DATE_1".into(), "20250905".into()),
        ]))
        .with_status(200)
        .with_body(
            json!({
                "rt_cd": "0",
                "output2": [{"stck_bsop_date": "20250905", "frgn_shnu_vol": "1,234"}]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let app = app_for(&server, false);

    let response = app
        .oneshot(get("/api/series?code=5930&field=FB&days=1&date=2025-09-05"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["code"], "005930");
    assert_eq!(body["field"], "frgn_shnu_vol");
    assert_eq!(body["series"].as_array().unwrap().len(), 1);
    assert_eq!(body["series"][0]["date"], "20250905");
    assert_eq!(body["series"][0]["value"], 1234.0);
}

/// 본문을 `delay`만큼 늦게 보내는 업스트림 mock.
async fn mock_slow(server: &mut ServerGuard, path: &str, body: String, delay: Duration) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_chunked_body(move |w| {
            std::thread::sleep(delay);
            w.write_all(body.as_bytes())
        })
        .create_async()
        .await
}

fn app_with_timeouts(server: &ServerGuard, request: Duration, series: Duration) -> Router {
    let config = KisConfig::new("router-key", "router-secret").with_base_url(server.url());
    let state = Arc::new(AppState::from_client(
        KisClient::new(config).unwrap(),
        ACCESS_KEY,
    ));
    let mut proxy = ProxyConfig::new(ACCESS_KEY);
    proxy.request_timeout = request;
    proxy.series_timeout = series;
    create_app(state, &proxy, None)
}

#[tokio::test]
async fn series_has_its_own_timeout() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let delay = Duration::from_millis(1500);
    let _price = mock_slow(&mut server, PRICE_PATH, r#"{"rt_cd":"0"}"#.into(), delay).await;
    let _investor = mock_slow(
        &mut server,
        INVESTOR_PATH,
        json!({
            "rt_cd": "0",
            "output2": [{"stck_bsop_date": "20250905", "frgn_shnu_vol": "12"}]
        })
        .to_string(),
        delay,
    )
    .await;

    let app = app_with_timeouts(&server, Duration::from_millis(300), Duration::from_secs(30));

    let price = app
        .clone()
        .oneshot(get("/api/price?code=005930"))
        .await
        .unwrap();
    assert_eq!(price.status(), StatusCode::REQUEST_TIMEOUT);

    let series = app
        .oneshot(get("/api/series?code=005930&field=fb&days=1&date=2025-09-05"))
        .await
        .unwrap();
    assert_eq!(series.status(), StatusCode::OK);
    let body = json_body(series).await;
    assert_eq!(body["series"][0]["value"], 12.0);

    let strict = app_with_timeouts(&server, Duration::from_secs(30), Duration::from_millis(300));
    let cut = strict
        .oneshot(get("/api/series?code=005930&field=fb&days=1&date=2025-09-05"))
        .await
        .unwrap();
    assert_eq!(cut.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn price_is_passed_through() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let _price = server
        .mock("GET", PRICE_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("FID_COND_MRKT_DIV_CODE".into(), "J".into()),
            Matcher::UrlEncoded("FID_INPUT_ISCD".into(), "005930".into()),
        ]))
        .with_status(500)
        .with_body(r#"{"rt_cd":"1","msg1":"시스템 오류"}"#)
        .create_async()
        .await;
    let app = app_for(&server, false);

    let response = app.oneshot(get("/api/price?code=005930")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["msg1"], "시스템 오류");
}

#[tokio::test]
async fn quote_returns_slim_fields() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let _price = server
        .mock("GET", PRICE_PATH)
        .match_query(Matcher::UrlEncoded("FID_INPUT_ISCD".into(), "005930".into()))
        .with_status(200)
        .with_body(
            json!({
                "rt_cd": "0",
                "output": {
                    "stck_shrn_iscd": "005930",
                    "stck_prpr": "71,000",
                    "prdy_ctrt": "-0.70",
                    "acml_vol": "12345"
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let app = app_for(&server, false);

    let response = app
        .oneshot(get("/api/quote?symbol=005930&fields=code,price"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "no-store");
    let body = json_body(response).await;
    assert_eq!(body, json!({"ok": true, "data": {"code": "005930", "price": 71000.0}}));
}

#[tokio::test]
async fn quote_rejects_bad_symbol_and_upstream_failure() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let _price = server
        .mock("GET", PRICE_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"rt_cd":"1","msg1":"종목코드 오류"}"#)
        .create_async()
        .await;
    let app = app_for(&server, false);

    let bad = app.clone().oneshot(get("/api/quote?symbol=59")).await.unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(bad).await["code"], "INVALID_SYMBOL");

    let failed = app.oneshot(get("/api/quote?symbol=999999")).await.unwrap();
    assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(failed).await["code"], "QUOTE_FAILED");
}

#[tokio::test]
async fn flow_summarizes_matching_row() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let _flow = server
        .mock("GET", FLOW_PATH)
        .match_query(Matcher::UrlEncoded("FID_INPUT_ISCD".into(), "005930".into()))
        .with_status(200)
        .with_body(
            json!({
                "rt_cd": "0",
                "output": [
                    {"stck_bsop_date": "20250909", "frgn_ntby_qty": "100", "orgn_ntby_qty": "5"},
                    {"stck_bsop_date": "20250908", "frgn_ntby_qty": "-42", "orgn_ntby_qty": "7",
                     "frgn_ntby_tr_pbmn": "-3000", "orgn_ntby_tr_pbmn": "900"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let app = app_for(&server, false);

    let response = app
        .clone()
        .oneshot(get("/api/flow?symbol=005930&date=2025-09-08"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["foreign"]["netBuyVolume"], -42.0);
    assert_eq!(body["foreign"]["netBuyValue"], -3000.0);
    assert_eq!(body["institution"]["netBuyVolume"], 7.0);
    assert_eq!(body["asOf"], "20250908");

    let bad_date = app
        .oneshot(get("/api/flow?symbol=005930&date=20250908"))
        .await
        .unwrap();
    assert_eq!(bad_date.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(bad_date).await["code"], "INVALID_DATE");
}

#[tokio::test]
async fn balance_requires_an_account() {
    let server = mockito::Server::new_async().await;
    let app = app_for(&server, false);

    let response = app.oneshot(get("/api/balance")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "ACCOUNT_REQUIRED");
}

#[tokio::test]
async fn balance_uses_configured_account() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server).await;
    let balance = server
        .mock("GET", BALANCE_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("CANO".into(), "12345678".into()),
            Matcher::UrlEncoded("ACNT_PRDT_CD".into(), "01".into()),
            Matcher::UrlEncoded("PRCS_DVSN".into(), "01".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"rt_cd":"0","output1":[],"output2":[]}"#)
        .expect(1)
        .create_async()
        .await;
    let app = app_for(&server, true);

    let response = app.oneshot(get("/api/balance?prcs=01")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    balance.assert_async().await;
}

#[tokio::test]
async fn realtime_key_wraps_approval_key() {
    let mut server = mockito::Server::new_async().await;
    let _approval = server
        .mock("POST", "/oauth2/Approval")
        .match_body(Matcher::PartialJson(json!({"grant_type": "client_credentials"})))
        .with_status(200)
        .with_body(r#"{"approval_key":"ws-approval-key"}"#)
        .create_async()
        .await;
    let app = app_for(&server, false);

    let response = app.oneshot(get("/api/realtime-key")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"ok": true, "data": {"approval_key": "ws-approval-key"}})
    );
}

#[tokio::test]
async fn rate_limit_returns_429_with_retry_after() {
    let server = mockito::Server::new_async().await;
    let state = Arc::new(AppState::from_client(
        KisClient::new(KisConfig::new("k", "s").with_base_url(server.url())).unwrap(),
        ACCESS_KEY,
    ));
    let rate_limit = RateLimitState::new(RateLimitConfig {
        requests_per_minute: 60,
        burst_size: 0,
        cleanup_interval: Duration::from_secs(60),
    });
    let app = create_app(state, &ProxyConfig::new(ACCESS_KEY), Some(rate_limit));

    let request = || {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-for", "203.0.113.5")
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("retry-after"));
    assert_eq!(json_body(second).await["code"], "RATE_LIMITED");
}
