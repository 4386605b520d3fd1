//! Hosted realtime database over REST and server-sent events.
//!
//! DESIGN
//! ======
//! Every operation maps onto one REST verb against `{base}/{path}.json`:
//!
//! | Operation      | Wire                                                        |
//! |----------------|-------------------------------------------------------------|
//! | `write`        | `PUT` with the value as body                                |
//! | `create_child` | `POST`; the generated key comes back as `{"name": key}`     |
//! | `subscribe`    | `GET` with `Accept: text/event-stream`                      |
//! | `transact`     | `GET` with `X-Firebase-ETag`, then `PUT` with `if-match`    |
//!
//! The event stream sends `put`/`patch` deltas. A background task applies
//! them to a local mirror and forwards the full value after each one, so
//! consumers only ever see whole snapshots. Parsing and delta application are
//! pure functions for testability.
//!
//! No request timeout is set: a pending write stays pending. Only connection
//! establishment is bounded.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, ETAG, HeaderMap, IF_MATCH};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::path;
use super::{MAX_TRANSACTION_RETRIES, RealtimeStore, Snapshot, StoreError, Subscription, TransactionOutcome, TransformFn};
use crate::config::StoreConfig;

const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";
const EVENT_STREAM: &str = "text/event-stream";

// =============================================================================
// CLIENT
// =============================================================================

pub struct FirebaseStore {
    http: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl FirebaseStore {
    /// Build a store client for the configured database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the URL is unusable or the HTTP
    /// client cannot be built.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.database_url)
            .map_err(|e| StoreError::Unavailable(format!("bad database URL {}: {e}", config.database_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Unavailable(format!("bad database URL {}", config.database_url)));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| StoreError::Unavailable(format!("http client build failed: {e}")))?;

        info!(database_url = %base_url, project_id = ?config.project_id, "realtime store client ready");
        Ok(Self { http, base_url, auth_token: config.auth_token.clone() })
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        let segs = path::segments(path)?;
        let mut url = resource_url(&self.base_url, &segs);
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    async fn read_with_etag(&self, url: &Url) -> Result<(Snapshot, String), StoreError> {
        let response = self
            .http
            .get(url.clone())
            .header(ETAG_REQUEST_HEADER, "true")
            .send()
            .await
            .map_err(request_error)?;
        let response = ensure_success(response).await?;
        let etag = etag_of(response.headers())?;
        let value = decode_snapshot(response).await?;
        Ok((value, etag))
    }
}

/// `{base}/{seg}/.../{last}.json`, with segments percent-encoded.
#[must_use]
pub fn resource_url(base: &Url, segs: &[String]) -> Url {
    let mut url = base.clone();
    if let Ok(mut parts) = url.path_segments_mut() {
        parts.pop_if_empty();
        match segs.split_last() {
            Some((last, parents)) => {
                parts.extend(parents);
                parts.push(&format!("{last}.json"));
            }
            None => {
                parts.push(".json");
            }
        }
    }
    url
}

fn request_error(err: reqwest::Error) -> StoreError {
    if err.is_connect() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Request(err.to_string())
    }
}

async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Api { status: status.as_u16(), body })
}

fn etag_of(headers: &HeaderMap) -> Result<String, StoreError> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Decode("response carried no ETag".into()))
}

async fn decode_snapshot(response: Response) -> Result<Snapshot, StoreError> {
    let value: Value = response.json().await.map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(path::normalize(value))
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

#[async_trait::async_trait]
impl RealtimeStore for FirebaseStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let url = self.url(path)?;
        let response = self.http.put(url).json(&value).send().await.map_err(request_error)?;
        ensure_success(response).await?;
        debug!(%path, "write committed");
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let url = self.url(path)?;
        let response = self
            .http
            .get(url)
            .header(ACCEPT, EVENT_STREAM)
            .send()
            .await
            .map_err(request_error)?;
        let response = ensure_success(response).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let path = path.to_string();
        let handle = tokio::spawn(async move {
            pump_events(response, tx, &path).await;
        });
        Ok(Subscription::new(rx, move || handle.abort()))
    }

    async fn create_child(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let url = self.url(path)?;
        let response = self.http.post(url).json(&value).send().await.map_err(request_error)?;
        let response = ensure_success(response).await?;
        let pushed: PushResponse = response.json().await.map_err(|e| StoreError::Decode(e.to_string()))?;
        debug!(%path, key = %pushed.name, "child created");
        Ok(pushed.name)
    }

    async fn transact(&self, path: &str, transform: &TransformFn<'_>) -> Result<TransactionOutcome, StoreError> {
        let url = self.url(path)?;
        let (mut current, mut etag) = self.read_with_etag(&url).await?;

        for attempt in 1..=MAX_TRANSACTION_RETRIES {
            let next = transform(current.clone()).and_then(path::normalize);
            let body = next.clone().unwrap_or(Value::Null);

            let response = self
                .http
                .put(url.clone())
                .header(IF_MATCH, etag.as_str())
                .json(&body)
                .send()
                .await
                .map_err(request_error)?;

            if response.status() == StatusCode::PRECONDITION_FAILED {
                // The rejection carries the winning value and its ETag.
                etag = etag_of(response.headers())?;
                current = decode_snapshot(response).await?;
                debug!(attempt, %path, "transaction base moved; retrying");
                continue;
            }

            ensure_success(response).await?;
            return Ok(TransactionOutcome { snapshot: next, attempts: attempt });
        }

        warn!(%path, attempts = MAX_TRANSACTION_RETRIES, "transaction gave up");
        Err(StoreError::MaxRetries { attempts: MAX_TRANSACTION_RETRIES })
    }
}

async fn pump_events(response: Response, tx: mpsc::UnboundedSender<Snapshot>, path: &str) {
    let mut stream = response.bytes_stream();
    let mut parser = SseParser::default();
    let mut mirror = Value::Null;

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, %path, "event stream failed");
                return;
            }
        };

        for event in parser.feed(&bytes) {
            match apply_event(&mut mirror, &event) {
                Ok(StreamUpdate::Changed) => {
                    let snapshot = if mirror.is_null() { None } else { Some(mirror.clone()) };
                    if tx.send(snapshot).is_err() {
                        return;
                    }
                }
                Ok(StreamUpdate::Unchanged) => {}
                Ok(StreamUpdate::Closed(reason)) => {
                    warn!(%path, %reason, "event stream closed by server");
                    return;
                }
                Err(e) => warn!(error = %e, %path, event = %event.event, "skipping malformed event"),
            }
        }
    }
    debug!(%path, "event stream ended");
}

// =============================================================================
// EVENT STREAM PARSING
// =============================================================================

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser. Chunks may split events anywhere.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feed raw bytes; returns every event completed by this chunk.
    ///
    /// Bytes are buffered undecoded until a blank line ends the event, so a
    /// UTF-8 sequence split across chunks is decoded whole.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.contains(&b'\r') {
            self.buffer = strip_crlf(&self.buffer);
        }

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }
}

/// Turn `\r\n` into `\n`. A trailing `\r` is kept until its pair arrives.
fn strip_crlf(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();
    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }
    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseEvent { event: event.unwrap_or_else(|| "message".into()), data: data.join("\n") })
}

/// Effect of one event on the local mirror.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamUpdate {
    Changed,
    Unchanged,
    Closed(String),
}

#[derive(Deserialize)]
struct EventPayload {
    path: String,
    data: Value,
}

/// Apply a `put`/`patch` event to `mirror`.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if the event payload is not the expected shape.
pub fn apply_event(mirror: &mut Value, event: &SseEvent) -> Result<StreamUpdate, StoreError> {
    match event.event.as_str() {
        "put" => {
            let payload = parse_payload(&event.data)?;
            let segs = path::segments(&payload.path)?;
            path::set(mirror, &segs, Some(payload.data));
            Ok(StreamUpdate::Changed)
        }
        "patch" => {
            let payload = parse_payload(&event.data)?;
            let base = path::segments(&payload.path)?;
            let Value::Object(children) = payload.data else {
                return Err(StoreError::Decode("patch data is not an object".into()));
            };
            for (key, value) in children {
                let mut segs = base.clone();
                segs.extend(path::segments(&key)?);
                path::set(mirror, &segs, Some(value));
            }
            Ok(StreamUpdate::Changed)
        }
        "cancel" | "auth_revoked" => Ok(StreamUpdate::Closed(format!("{}: {}", event.event, event.data))),
        _ => Ok(StreamUpdate::Unchanged),
    }
}

fn parse_payload(data: &str) -> Result<EventPayload, StoreError> {
    serde_json::from_str(data).map_err(|e| StoreError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "firebase_test.rs"]
mod tests;
