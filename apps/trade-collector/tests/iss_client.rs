//! ISS Client Integration Tests
//!
//! Drives the HTTP adapter against a mock ISS server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trade_collector::{
    FetchScope, IssClient, IssClientConfig, PageRequest, SourceError, TradeSide, TradeSourcePort,
};

fn client_for(server: &MockServer, timeout: Duration) -> IssClient {
    IssClient::new(IssClientConfig {
        base_url: format!("{}/iss", server.uri()),
        timeout,
        ..IssClientConfig::default()
    })
    .unwrap()
}

fn request(scope: FetchScope, offset: usize) -> PageRequest {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    PageRequest {
        scope,
        from: day.and_hms_opt(10, 0, 0),
        till: day.and_hms_opt(10, 5, 0),
        limit: 5000,
        offset,
    }
}

fn trades_body() -> serde_json::Value {
    json!({
        "trades": {
            "columns": ["TRADENO", "TRADEDATE", "TRADETIME", "BOARDID", "SECID", "PRICE",
                        "QUANTITY", "VALUE", "BUYSELL", "SYSTIME"],
            "data": [
                [101, "2024-03-01", "10:00:05", "TQBR", "SBER", 285.5, 10, 2855.0, "B", "2024-03-01 10:00:05"],
                [102, "2024-03-01", "10:01:00", "TQBR", "SBER", 285.6, 1, null, "S", "2024-03-01 10:01:00"],
                [null, "2024-03-01", "10:02:00", "TQBR", "SBER", 285.7, 1, null, "S", null]
            ]
        }
    })
}

#[tokio::test]
async fn fetches_instrument_page_with_window_and_offset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/iss/engines/stock/markets/shares/securities/SBER/trades.json"))
        .and(query_param("iss.meta", "off"))
        .and(query_param("start", "5000"))
        .and(query_param("limit", "5000"))
        .and(query_param("from", "2024-03-01 10:00:00"))
        .and(query_param("till", "2024-03-01 10:05:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trades_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let page = client
        .fetch_trades(&request(FetchScope::Instrument("SBER".to_string()), 5000))
        .await
        .unwrap();

    assert_eq!(page.records.len(), 2);
    assert_eq!(page.skipped, 1);
    assert_eq!(page.row_count(), 3);

    let first = &page.records[0];
    assert_eq!(first.key(), "SBER:101");
    assert_eq!(first.side, TradeSide::Buy);
    assert_eq!(first.value, Decimal::new(2855, 0));

    // VALUE null falls back to price * quantity.
    assert_eq!(page.records[1].value, Decimal::new(2856, 1));
}

#[tokio::test]
async fn all_scope_uses_market_trades_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/iss/engines/stock/markets/shares/trades.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "trades": {"columns": ["TRADENO"], "data": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let page = client
        .fetch_trades(&request(FetchScope::All, 0))
        .await
        .unwrap();

    assert!(page.records.is_empty());
    assert_eq!(page.row_count(), 0);
}

#[tokio::test]
async fn missing_trades_table_is_an_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let page = client
        .fetch_trades(&request(FetchScope::All, 0))
        .await
        .unwrap();

    assert_eq!(page.row_count(), 0);
}

#[tokio::test]
async fn server_error_maps_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let err = client
        .fetch_trades(&request(FetchScope::All, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::Status { status: 503 }));
}

#[tokio::test]
async fn invalid_json_maps_to_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let err = client
        .fetch_trades(&request(FetchScope::All, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::Decode { .. }));
}

#[tokio::test]
async fn slow_response_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(trades_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(100));
    let err = client
        .fetch_trades(&request(FetchScope::All, 0))
        .await
        .unwrap_err();

    assert_eq!(err, SourceError::Timeout);
}

#[tokio::test]
async fn fetches_securities() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/iss/engines/stock/markets/shares/securities.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "securities": {
                "columns": ["SECID", "BOARDID", "SHORTNAME", "SECNAME", "PREVPRICE",
                            "LOTSIZE", "FACEVALUE", "STATUS", "MARKETPRICE", "CURRENCYID"],
                "data": [
                    ["SBER", "TQBR", "Сбербанк", "Сбербанк России ПАО ао", 285.3, 10, 3, "A", 285.1, "SUR"],
                    ["GAZP", "TQBR", "ГАЗПРОМ ао", null, 160.1, 10, 5, "A", null, "SUR"]
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let securities = client.fetch_securities().await.unwrap();

    assert_eq!(securities.len(), 2);
    assert_eq!(securities[0].security_id, "SBER");
    assert_eq!(securities[0].lot_size, Some(10));
    assert_eq!(securities[1].security_name, None);
    assert_eq!(securities[1].currency_id.as_deref(), Some("SUR"));
}
