use super::*;
use serde_json::json;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap as AxumHeaders, Method, StatusCode as AxumStatus, header};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::any;

fn segs(path: &str) -> Vec<String> {
    path::segments(path).unwrap()
}

fn config(url: &str) -> StoreConfig {
    StoreConfig {
        api_key: None,
        auth_domain: None,
        database_url: url.to_string(),
        project_id: Some("demo".into()),
        storage_bucket: None,
        messaging_sender_id: None,
        app_id: None,
        auth_token: None,
        connect_timeout_secs: 2,
    }
}

// =========================================================================
// resource_url
// =========================================================================

#[test]
fn resource_url_appends_json_suffix() {
    let base = Url::parse("https://demo.firebaseio.com").unwrap();
    assert_eq!(resource_url(&base, &segs("games/bgmi")).as_str(), "https://demo.firebaseio.com/games/bgmi.json");
    assert_eq!(resource_url(&base, &[]).as_str(), "https://demo.firebaseio.com/.json");
}

#[test]
fn resource_url_keeps_base_path_and_encodes() {
    let base = Url::parse("http://127.0.0.1:9000/ns/").unwrap();
    assert_eq!(resource_url(&base, &segs("games/halo 2")).as_str(), "http://127.0.0.1:9000/ns/games/halo%202.json");
}

#[test]
fn auth_token_is_sent_as_query() {
    let mut cfg = config("https://demo.firebaseio.com");
    cfg.auth_token = Some("secret".into());
    let store = FirebaseStore::new(&cfg).unwrap();
    assert_eq!(store.url("games").unwrap().as_str(), "https://demo.firebaseio.com/games.json?auth=secret");
}

#[test]
fn new_rejects_unparseable_url() {
    assert!(matches!(FirebaseStore::new(&config("not a url")), Err(StoreError::Unavailable(_))));
}

// =========================================================================
// SseParser
// =========================================================================

#[test]
fn parser_handles_events_split_across_chunks() {
    let mut parser = SseParser::default();
    assert!(parser.feed(b"event: put\nda").is_empty());
    let events = parser.feed(b"ta: {\"path\":\"/\",\"data\":1}\n\nevent: keep-alive\ndata: null\n\n");
    assert_eq!(
        events,
        vec![
            SseEvent { event: "put".into(), data: r#"{"path":"/","data":1}"#.into() },
            SseEvent { event: "keep-alive".into(), data: "null".into() },
        ]
    );
}

#[test]
fn parser_accepts_crlf_and_comments() {
    let mut parser = SseParser::default();
    let events = parser.feed(b": hello\r\nevent: cancel\r\ndata: permission denied\r\n\r\n");
    assert_eq!(events, vec![SseEvent { event: "cancel".into(), data: "permission denied".into() }]);
}

#[test]
fn parser_keeps_multibyte_names_split_across_chunks() {
    let raw = "event: put\ndata: {\"path\":\"/-Nc\",\"data\":{\"name\":\"CAF\u{c9}\",\"votes\":0}}\n\n";
    let bytes = raw.as_bytes();
    // Split between the two bytes of 'É' (0xC3 0x89).
    let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

    let mut parser = SseParser::default();
    assert!(parser.feed(&bytes[..split]).is_empty());
    let events = parser.feed(&bytes[split..]);
    assert_eq!(events.len(), 1);

    let mut mirror = Value::Null;
    assert_eq!(apply_event(&mut mirror, &events[0]).unwrap(), StreamUpdate::Changed);
    assert_eq!(mirror["-Nc"]["name"], "CAF\u{c9}");
}

#[test]
fn parser_joins_crlf_split_across_chunks() {
    let mut parser = SseParser::default();
    assert!(parser.feed(b"event: keep-alive\r\ndata: null\r").is_empty());
    let events = parser.feed(b"\n\r\n");
    assert_eq!(events, vec![SseEvent { event: "keep-alive".into(), data: "null".into() }]);
}

#[test]
fn parser_joins_multi_line_data() {
    let mut parser = SseParser::default();
    let events = parser.feed(b"data: a\ndata: b\n\n");
    assert_eq!(events, vec![SseEvent { event: "message".into(), data: "a\nb".into() }]);
}

// =========================================================================
// apply_event
// =========================================================================

fn event(name: &str, data: Value) -> SseEvent {
    SseEvent { event: name.into(), data: data.to_string() }
}

#[test]
fn put_at_root_replaces_mirror() {
    let mut mirror = json!({"old": 1});
    let update = apply_event(&mut mirror, &event("put", json!({"path": "/", "data": {"bgmi": {"votes": 0}}}))).unwrap();
    assert_eq!(update, StreamUpdate::Changed);
    assert_eq!(mirror, json!({"bgmi": {"votes": 0}}));
}

#[test]
fn put_nested_and_null_deletes() {
    let mut mirror = json!({"a": {"votes": 1}, "b": {"votes": 2}});
    apply_event(&mut mirror, &event("put", json!({"path": "/a/votes", "data": 7}))).unwrap();
    assert_eq!(mirror, json!({"a": {"votes": 7}, "b": {"votes": 2}}));

    apply_event(&mut mirror, &event("put", json!({"path": "/b", "data": null}))).unwrap();
    assert_eq!(mirror, json!({"a": {"votes": 7}}));
}

#[test]
fn put_null_at_root_empties_mirror() {
    let mut mirror = json!({"a": 1});
    apply_event(&mut mirror, &event("put", json!({"path": "/", "data": null}))).unwrap();
    assert_eq!(mirror, Value::Null);
}

#[test]
fn patch_merges_children() {
    let mut mirror = json!({"a": {"votes": 1, "name": "A"}, "b": {"votes": 2}});
    apply_event(&mut mirror, &event("patch", json!({"path": "/", "data": {"a/votes": 0, "b/votes": 3}}))).unwrap();
    assert_eq!(mirror, json!({"a": {"votes": 0, "name": "A"}, "b": {"votes": 3}}));
}

#[test]
fn keep_alive_is_ignored_and_cancel_closes() {
    let mut mirror = json!({"a": 1});
    assert_eq!(apply_event(&mut mirror, &event("keep-alive", Value::Null)).unwrap(), StreamUpdate::Unchanged);
    assert!(matches!(apply_event(&mut mirror, &event("cancel", Value::Null)).unwrap(), StreamUpdate::Closed(_)));
    assert!(matches!(apply_event(&mut mirror, &event("auth_revoked", Value::Null)).unwrap(), StreamUpdate::Closed(_)));
    assert_eq!(mirror, json!({"a": 1}));
}

#[test]
fn malformed_payload_is_decode_error() {
    let mut mirror = Value::Null;
    let bad = SseEvent { event: "put".into(), data: "{oops".into() };
    assert!(matches!(apply_event(&mut mirror, &bad), Err(StoreError::Decode(_))));
    let not_object = event("patch", json!({"path": "/", "data": 5}));
    assert!(matches!(apply_event(&mut mirror, &not_object), Err(StoreError::Decode(_))));
}

// =========================================================================
// Mock database server
// =========================================================================

#[derive(Default)]
struct MockState {
    root: Value,
    version: u64,
    pushed: u64,
    /// Write applied just before the next conditional PUT, to force a 412.
    competitor: Option<(String, Value)>,
    /// Raw event stream body served to subscribers.
    stream_body: String,
}

type Shared = Arc<Mutex<MockState>>;

fn strip_suffix(raw: &str) -> Vec<String> {
    let trimmed = raw.strip_suffix(".json").unwrap_or(raw);
    segs(trimmed)
}

async fn handle(
    State(mock): State<Shared>,
    method: Method,
    Path(raw): Path<String>,
    headers: AxumHeaders,
    body: Bytes,
) -> AxumResponse {
    let at = strip_suffix(&raw);
    if at.first().is_some_and(|s| s == "locked") {
        return (AxumStatus::UNAUTHORIZED, axum::Json(json!({"error": "Permission denied"}))).into_response();
    }
    let mut state = mock.lock().unwrap();

    if method == Method::GET {
        if headers.get(header::ACCEPT).is_some_and(|v| v == EVENT_STREAM) {
            return ([(header::CONTENT_TYPE, EVENT_STREAM)], state.stream_body.clone()).into_response();
        }
        let value = path::get(&state.root, &at).cloned().unwrap_or(Value::Null);
        return ([(header::ETAG, state.version.to_string())], axum::Json(value)).into_response();
    }

    let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    if method == Method::POST {
        state.pushed += 1;
        let key = format!("-Nmock{:04}", state.pushed);
        let mut child = at.clone();
        child.push(key.clone());
        path::set(&mut state.root, &child, Some(value));
        state.version += 1;
        return axum::Json(json!({"name": key})).into_response();
    }

    if method == Method::PUT {
        if let Some(expected) = headers.get(header::IF_MATCH) {
            if let Some((competing_path, competing_value)) = state.competitor.take() {
                path::set(&mut state.root, &segs(&competing_path), Some(competing_value));
                state.version += 1;
            }
            if expected.to_str().unwrap_or_default() != state.version.to_string() {
                let current = path::get(&state.root, &at).cloned().unwrap_or(Value::Null);
                return (AxumStatus::PRECONDITION_FAILED, [(header::ETAG, state.version.to_string())], axum::Json(current))
                    .into_response();
            }
        }
        path::set(&mut state.root, &at, Some(value.clone()));
        state.version += 1;
        return axum::Json(value).into_response();
    }

    AxumStatus::METHOD_NOT_ALLOWED.into_response()
}

async fn spawn_mock(state: MockState) -> (Shared, FirebaseStore) {
    let shared: Shared = Arc::new(Mutex::new(state));
    let app = Router::new().route("/{*path}", any(handle)).with_state(shared.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let store = FirebaseStore::new(&config(&format!("http://{addr}"))).unwrap();
    (shared, store)
}

#[tokio::test]
async fn write_puts_value() {
    let (mock, store) = spawn_mock(MockState::default()).await;
    store.write("games/bgmi", json!({"name": "BGMI", "votes": 0, "fixed": true})).await.unwrap();
    let root = mock.lock().unwrap().root.clone();
    assert_eq!(root, json!({"games": {"bgmi": {"name": "BGMI", "votes": 0, "fixed": true}}}));
}

#[tokio::test]
async fn create_child_returns_server_key() {
    let (mock, store) = spawn_mock(MockState::default()).await;
    let key = store.create_child("games", json!({"name": "HALO", "votes": 0, "fixed": false})).await.unwrap();
    assert_eq!(key, "-Nmock0001");
    let root = mock.lock().unwrap().root.clone();
    assert_eq!(path::get(&root, &segs("games/-Nmock0001/name")), Some(&json!("HALO")));
}

#[tokio::test]
async fn transact_commits_with_etag() {
    let state = MockState { root: json!({"counter": 1}), ..MockState::default() };
    let (mock, store) = spawn_mock(state).await;

    let outcome = store
        .transact("counter", &|current| current.and_then(|v| v.as_u64()).map(|n| json!(n + 1)))
        .await
        .unwrap();
    assert_eq!(outcome, TransactionOutcome { snapshot: Some(json!(2)), attempts: 1 });
    assert_eq!(mock.lock().unwrap().root, json!({"counter": 2}));
}

#[tokio::test]
async fn transact_retries_after_precondition_failed() {
    let state = MockState {
        root: json!({"counter": 1}),
        competitor: Some(("counter".into(), json!(10))),
        ..MockState::default()
    };
    let (mock, store) = spawn_mock(state).await;

    let outcome = store
        .transact("counter", &|current| current.and_then(|v| v.as_u64()).map(|n| json!(n + 1)))
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.snapshot, Some(json!(11)));
    assert_eq!(mock.lock().unwrap().root, json!({"counter": 11}));
}

#[tokio::test]
async fn subscribe_streams_full_snapshots() {
    let stream_body = [
        "event: put\ndata: {\"path\":\"/\",\"data\":{\"bgmi\":{\"name\":\"BGMI\",\"votes\":0,\"fixed\":true}}}\n\n",
        "event: keep-alive\ndata: null\n\n",
        "event: put\ndata: {\"path\":\"/bgmi/votes\",\"data\":3}\n\n",
    ]
    .concat();
    let (_mock, store) = spawn_mock(MockState { stream_body, ..MockState::default() }).await;

    let mut sub = store.subscribe("games").await.unwrap();
    assert_eq!(sub.recv().await, Some(Some(json!({"bgmi": {"name": "BGMI", "votes": 0, "fixed": true}}))));
    assert_eq!(sub.recv().await, Some(Some(json!({"bgmi": {"name": "BGMI", "votes": 3, "fixed": true}}))));
    assert_eq!(sub.recv().await, None);
}

#[tokio::test]
async fn api_errors_surface_status_and_body() {
    let (_mock, store) = spawn_mock(MockState::default()).await;
    let err = store.write("locked/x", json!(1)).await.unwrap_err();
    match err {
        StoreError::Api { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Permission denied"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
