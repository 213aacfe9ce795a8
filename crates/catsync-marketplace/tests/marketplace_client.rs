//! Integration tests for `MarketplaceClient` request handling, cursor scans,
//! and supply discovery.
//!
//! Uses `wiremock` to stand up a local HTTP server for each test so no real
//! network traffic is made.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use catsync_marketplace::{
    ClientConfig, Credentials, MarketplaceClient, MarketplaceError, Method, RetryPolicy,
    ScanOptions, Termination,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const LIST_PATH: &str = "/content/v2/get/cards/list";

fn test_client(base_url: &str) -> MarketplaceClient {
    client_with(base_url, Credentials::token("secret-token"))
}

fn client_with(base_url: &str, credentials: Credentials) -> MarketplaceClient {
    MarketplaceClient::new(ClientConfig {
        base_url: base_url.to_owned(),
        timeout_secs: 5,
        retry: RetryPolicy::from_millis(5, 1, 4),
        credentials,
    })
    .expect("failed to build test MarketplaceClient")
}

fn card(nm_id: i64, barcode: &str) -> Value {
    json!({
        "nmID": nm_id,
        "vendorCode": format!("VC-{nm_id}"),
        "subjectName": "Shoes",
        "sizes": [{"skus": [barcode]}]
    })
}

/// Replays a fixed list of responses, repeating the last one.
struct Sequence {
    calls: AtomicUsize,
    responses: Vec<ResponseTemplate>,
}

impl Sequence {
    fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            responses,
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses[n.min(self.responses.len() - 1)].clone()
    }
}

/// Returns one card and echoes back whatever cursor the request carried.
struct EchoCursor;

impl Respond for EchoCursor {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().unwrap_or(Value::Null);
        let cursor = body.get("cursor").cloned().unwrap_or_else(|| json!({}));
        let mut echoed = json!({});
        if let Some(updated_at) = cursor.get("updatedAt") {
            echoed["updatedAt"] = updated_at.clone();
        }
        if let Some(nm_id) = cursor.get("nmID") {
            echoed["nmID"] = nm_id.clone();
        }
        ResponseTemplate::new(200).set_body_json(json!({
            "cards": [card(1, "111")],
            "cursor": echoed
        }))
    }
}

// ---------------------------------------------------------------------------
// request
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_sends_raw_token_and_json_content_type() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ping"))
        .and(header("Authorization", "secret-token"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({"hello": "world"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let body = client
        .request("/ping", Method::POST, Some(&json!({"hello": "world"})))
        .await
        .expect("request should succeed");

    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn request_exhausts_five_attempts_on_persistent_429() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(5)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client
        .request(LIST_PATH, Method::POST, Some(&json!({})))
        .await;

    match result {
        Err(MarketplaceError::ExhaustedRetries { attempts, last }) => {
            assert_eq!(attempts, 5);
            assert!(
                matches!(*last, MarketplaceError::Transient { status: 429, .. }),
                "expected last error to be a 429, got: {last:?}"
            );
        }
        other => panic!("expected ExhaustedRetries, got: {other:?}"),
    }
}

#[tokio::test]
async fn request_recovers_after_transient_5xx() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(Sequence::new(vec![
            ResponseTemplate::new(502),
            ResponseTemplate::new(503),
            ResponseTemplate::new(200).set_body_json(json!({"ok": 1})),
        ]))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let body = client
        .request("/flaky", Method::GET, None)
        .await
        .expect("third attempt should succeed");
    assert_eq!(body, json!({"ok": 1}));
}

#[tokio::test]
async fn request_fails_fast_on_permanent_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("malformed filter"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client
        .request(LIST_PATH, Method::POST, Some(&json!({})))
        .await;

    assert!(
        matches!(
            result,
            Err(MarketplaceError::Remote { status: 400, ref body }) if body == "malformed filter"
        ),
        "expected Remote(400), got: {result:?}"
    );
}

#[tokio::test]
async fn request_without_token_never_reaches_the_network() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_with(&server.uri(), Credentials::new(None, Some("\n".into())));
    let result = client
        .request(LIST_PATH, Method::POST, Some(&json!({})))
        .await;

    assert!(
        matches!(result, Err(MarketplaceError::Config(ref msg)) if msg == "no token"),
        "expected Config(no token), got: {result:?}"
    );
}

#[tokio::test]
async fn request_returns_null_for_empty_success_body() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/noop"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let body = client.request("/noop", Method::PATCH, None).await.unwrap();
    assert_eq!(body, Value::Null);
}

// ---------------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scan_stops_after_one_call_when_cursor_is_echoed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(EchoCursor)
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let mut delivered = Vec::new();
    let stats = client
        .scan(LIST_PATH, &ScanOptions::full(100, 500), |entries| {
            delivered.extend(entries);
            ControlFlow::Continue(())
        })
        .await
        .expect("a non-advancing cursor is a successful end of scan");

    assert_eq!(stats.pages, 1);
    assert_eq!(stats.termination, Termination::MissingCursor);
    assert_eq!(delivered.len(), 1, "terminal page entries must be delivered");
}

#[tokio::test]
async fn scan_stops_at_first_repeated_cursor() {
    let server = MockServer::start().await;

    let page = |nm_id: i64, updated_at: &str, cursor_id: i64| {
        ResponseTemplate::new(200).set_body_json(json!({
            "cards": [card(nm_id, &nm_id.to_string())],
            "cursor": {"updatedAt": updated_at, "nmID": cursor_id}
        }))
    };

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(Sequence::new(vec![
            page(1, "t1", 1),
            page(2, "t1", 1),
            page(3, "t2", 2),
            page(4, "t2", 2),
        ]))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let mut seen = Vec::new();
    let stats = client
        .scan(LIST_PATH, &ScanOptions::full(100, 500), |entries| {
            seen.extend(entries.into_iter().map(|e| e.numeric_id));
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

    assert_eq!(stats.pages, 2);
    assert_eq!(stats.termination, Termination::Stuck);
    assert_eq!(seen, vec![1, 2]);
}

#[tokio::test]
async fn scan_follows_cursor_until_empty_page() {
    let server = MockServer::start().await;

    // Second request must carry the cursor returned by the first page.
    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .and(body_json(json!({
            "filter": {"withPhoto": -1, "textSearch": "111"},
            "cursor": {"limit": 2, "updatedAt": "t1", "nmID": 10}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cards": [],
            "cursor": {"updatedAt": "t1", "nmID": 10}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .and(body_json(json!({
            "filter": {"withPhoto": -1, "textSearch": "111"},
            "cursor": {"limit": 2}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cards": [card(10, "111"), card(11, "111")],
            "cursor": {"updatedAt": "t1", "nmID": 10}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let mut total = 0usize;
    let stats = client
        .scan(LIST_PATH, &ScanOptions::filtered("111", 2, 10), |entries| {
            total += entries.len();
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

    assert_eq!(stats.pages, 2);
    assert_eq!(stats.entries, 2);
    assert_eq!(total, 2);
    assert_eq!(stats.termination, Termination::Empty);
}

#[tokio::test]
async fn scan_continues_past_page_of_unusable_cards() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(Sequence::new(vec![
            ResponseTemplate::new(200).set_body_json(json!({
                "cards": [{"nmID": 0, "vendorCode": "zero"}, {"vendorCode": "no-id"}],
                "cursor": {"updatedAt": "t1", "nmID": 1}
            })),
            ResponseTemplate::new(200).set_body_json(json!({
                "cards": [card(42, "111")],
                "cursor": {"updatedAt": "t2", "nmID": 42}
            })),
            ResponseTemplate::new(200).set_body_json(json!({
                "cards": [],
                "cursor": {"updatedAt": "t2", "nmID": 42}
            })),
        ]))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let mut seen = Vec::new();
    let stats = client
        .scan(LIST_PATH, &ScanOptions::full(100, 10), |entries| {
            seen.extend(entries.into_iter().map(|e| e.numeric_id));
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

    assert_eq!(seen, vec![42]);
    assert_eq!(stats.pages, 3);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.termination, Termination::Empty);
}

#[tokio::test]
async fn scan_respects_page_budget() {
    let server = MockServer::start().await;

    let responses: Vec<ResponseTemplate> = (1..=10)
        .map(|i| {
            ResponseTemplate::new(200).set_body_json(json!({
                "cards": [card(i, "x")],
                "cursor": {"updatedAt": format!("t{i}"), "nmID": i}
            }))
        })
        .collect();

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(Sequence::new(responses))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let stats = client
        .scan(LIST_PATH, &ScanOptions::full(1, 3), |_| ControlFlow::Continue(()))
        .await
        .unwrap();

    assert_eq!(stats.pages, 3);
    assert_eq!(stats.termination, Termination::PageBudget);
    assert_eq!(stats.last_cursor.numeric_id, Some(3));
}

#[tokio::test]
async fn scan_stops_when_consumer_is_satisfied() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(Sequence::new(vec![
            ResponseTemplate::new(200).set_body_json(json!({
                "cards": [card(1, "111")],
                "cursor": {"updatedAt": "t1", "nmID": 1}
            })),
            ResponseTemplate::new(200).set_body_json(json!({
                "cards": [card(2, "222")],
                "cursor": {"updatedAt": "t2", "nmID": 2}
            })),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let stats = client
        .scan(LIST_PATH, &ScanOptions::full(1, 50), |_| ControlFlow::Break(()))
        .await
        .unwrap();

    assert_eq!(stats.termination, Termination::Satisfied);
}

#[tokio::test]
async fn scan_with_expired_deadline_makes_no_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let options = ScanOptions::full(100, 500).with_deadline(Some(Instant::now()));
    let stats = client
        .scan(LIST_PATH, &options, |_| ControlFlow::Continue(()))
        .await
        .unwrap();

    assert_eq!(stats.pages, 0);
    assert_eq!(stats.termination, Termination::Deadline);
}

#[tokio::test]
async fn scan_propagates_permanent_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client
        .scan(LIST_PATH, &ScanOptions::full(100, 5), |_| ControlFlow::Continue(()))
        .await;

    assert!(matches!(result, Err(MarketplaceError::Remote { status: 401, .. })));
}

// ---------------------------------------------------------------------------
// supplies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scan_supplies_fetches_items_per_supply_with_pacing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "supplies": [{"supplyID": "WB-1"}, {"supplyID": "WB-2"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/WB-1/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"nmID": 5, "vendorCode": "A", "barcode": "555"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/WB-2/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"nmID": 6, "vendorCode": "B", "barcodes": ["666"]}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let mut entries = Vec::new();
    let started = Instant::now();
    let stats = client
        .scan_supplies(100, Duration::from_millis(200), |items| {
            entries.extend(items);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(stats.supplies, 2);
    assert_eq!(stats.fetched, 2);
    assert_eq!(stats.entries, 2);
    assert_eq!(entries[0].identifiers, vec!["555"]);
    assert_eq!(entries[1].identifiers, vec!["666"]);
}
