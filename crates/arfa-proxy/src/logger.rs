//! Session logging of intercepted traffic.
//!
//! [`SessionLogger`] receives decrypted request/response pairs, runs them
//! through the provider classifier, stamps entries with the active session, and
//! forwards everything to a [`LogSink`].

use std::io::Read;
use std::sync::Arc;

use arfa_core::{ClassifiedLogEntry, LogEntryType, LogProvider, ParserRegistry};
use chrono::Utc;
use flate2::read::GzDecoder;
use hyper::header::{CONTENT_ENCODING, CONTENT_TYPE};
use hyper::{HeaderMap, Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::redact::redact_headers;
use crate::session::{MetricsState, SessionIdentity, SessionMetrics, SessionState};

/// Category of all raw proxy events.
pub const PROXY_CATEGORY: &str = "proxy";

/// Unclassified record of one intercepted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// `api_request` or `api_response`.
    pub event_type: String,
    pub category: String,
    /// Short summary, e.g. `POST api.anthropic.com`.
    pub content: String,
    /// Method/url or status, redacted headers, body, session identity and
    /// session counters.
    pub metadata: Map<String, Value>,
}

/// Destination for logged traffic.
pub trait LogSink: Send + Sync {
    /// Records a raw request or response.
    fn log_event(&self, event: RawEvent);

    /// Records a classified entry.
    fn log_classified(&self, entry: ClassifiedLogEntry);
}

/// Sink writing to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log_event(&self, event: RawEvent) {
        tracing::debug!(
            event_type = %event.event_type,
            category = %event.category,
            "{}",
            event.content
        );
    }

    fn log_classified(&self, entry: ClassifiedLogEntry) {
        tracing::info!(
            session_id = %entry.session_id,
            entry_type = %entry.entry_type,
            provider = %entry.provider,
            tool = %entry.tool_name,
            tokens_input = entry.tokens_input,
            tokens_output = entry.tokens_output,
            "Classified entry"
        );
    }
}

/// Classifies intercepted traffic and forwards it to a [`LogSink`].
#[derive(Clone)]
pub struct SessionLogger {
    sink: Arc<dyn LogSink>,
    session: SessionState,
    metrics: MetricsState,
    parsers: ParserRegistry,
}

impl std::fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLogger")
            .field("session", &self.session)
            .field("metrics", &self.metrics)
            .field("parsers", &self.parsers)
            .finish()
    }
}

impl SessionLogger {
    /// Creates a logger with the built-in provider parsers.
    pub fn new(sink: Arc<dyn LogSink>, session: SessionState) -> Self {
        Self::with_parsers(sink, session, ParserRegistry::with_defaults())
    }

    /// Creates a logger with a custom parser registry.
    pub fn with_parsers(
        sink: Arc<dyn LogSink>,
        session: SessionState,
        parsers: ParserRegistry,
    ) -> Self {
        Self {
            sink,
            session,
            metrics: MetricsState::default(),
            parsers,
        }
    }

    /// Returns the session state entries are stamped from.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Returns the request and byte counters of the current session.
    pub fn metrics(&self) -> SessionMetrics {
        self.metrics.get(&self.session.get().session_id)
    }

    /// Logs an intercepted request.
    pub fn log_request(
        &self,
        host: &str,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &[u8],
    ) {
        let identity = self.session.get();
        let metrics = self
            .metrics
            .record_request(&identity.session_id, body.len());

        if !body.is_empty() {
            if let Some(parser) = self.parsers.for_host(host) {
                match parser.parse_request(body) {
                    Ok(entries) => self.emit(&identity, entries),
                    Err(e) => tracing::debug!("Unclassified request to {}: {}", host, e),
                }
            }
        }

        let mut metadata = Map::new();
        metadata.insert("method".into(), json!(method.as_str()));
        metadata.insert("url".into(), json!(uri.to_string()));
        self.finish_event(
            &identity,
            &metrics,
            "api_request",
            format!("{} {}", method, host),
            metadata,
            headers,
            body,
        );
    }

    /// Logs an intercepted response to a request sent to `host`.
    ///
    /// Gzip bodies are decompressed for logging; the caller relays the
    /// original bytes.
    pub fn log_response(&self, host: &str, status: StatusCode, headers: &HeaderMap, body: &[u8]) {
        let identity = self.session.get();
        let metrics = self
            .metrics
            .record_response(&identity.session_id, body.len());
        let body = decode_body(headers, body);

        if !body.is_empty() {
            if let Some(parser) = self.parsers.for_host(host) {
                let parsed = if is_event_stream(headers) {
                    parser.parse_event_stream(&body)
                } else {
                    parser.parse_response(&body)
                };
                match parsed {
                    Ok(entries) => self.emit(&identity, entries),
                    Err(e) => tracing::debug!("Unclassified response from {}: {}", host, e),
                }
            }
        }

        let mut metadata = Map::new();
        metadata.insert("status".into(), json!(status.as_u16()));
        self.finish_event(
            &identity,
            &metrics,
            "api_response",
            format!("{} {}", status.as_u16(), host),
            metadata,
            headers,
            &body,
        );
    }

    /// Emits a `session_start` entry for the current session.
    pub fn start_session(&self) {
        let identity = self.session.get();
        self.emit_marker(&identity, LogEntryType::SessionStart);
    }

    /// Emits a `session_end` entry for `identity`.
    pub fn end_session(&self, identity: &SessionIdentity) {
        if !identity.session_id.is_empty() {
            let metrics = self.metrics.get(&identity.session_id);
            tracing::info!(
                session_id = %metrics.session_id,
                requests = metrics.request_count,
                bytes_sent = metrics.bytes_sent,
                bytes_received = metrics.bytes_received,
                "Session ended"
            );
        }
        self.emit_marker(identity, LogEntryType::SessionEnd);
    }

    fn emit_marker(&self, identity: &SessionIdentity, entry_type: LogEntryType) {
        if identity.session_id.is_empty() {
            return;
        }
        let entry = ClassifiedLogEntry::new(entry_type, LogProvider::Unknown);
        self.emit(identity, vec![entry]);
    }

    fn emit(&self, identity: &SessionIdentity, entries: Vec<ClassifiedLogEntry>) {
        let now = Utc::now();
        for mut entry in entries {
            entry.id = Uuid::new_v4().to_string();
            entry.timestamp = Some(now);
            entry.session_id = identity.session_id.clone();
            entry.client_name = identity.client_name.clone();
            entry.client_version = identity.client_version.clone();
            self.sink.log_classified(entry);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_event(
        &self,
        identity: &SessionIdentity,
        metrics: &SessionMetrics,
        event_type: &str,
        content: String,
        mut metadata: Map<String, Value>,
        headers: &HeaderMap,
        body: &[u8],
    ) {
        metadata.insert("headers".into(), json!(redact_headers(headers)));
        metadata.insert(
            "body".into(),
            json!(String::from_utf8_lossy(body).into_owned()),
        );
        if !identity.session_id.is_empty() {
            metadata.insert("session_id".into(), json!(identity.session_id));
        }
        if !identity.client_name.is_empty() {
            metadata.insert("client_name".into(), json!(identity.client_name));
        }
        if !identity.client_version.is_empty() {
            metadata.insert("client_version".into(), json!(identity.client_version));
        }
        metadata.insert("request_count".into(), json!(metrics.request_count));
        metadata.insert("bytes_sent".into(), json!(metrics.bytes_sent));
        metadata.insert("bytes_received".into(), json!(metrics.bytes_received));

        self.sink.log_event(RawEvent {
            event_type: event_type.to_string(),
            category: PROXY_CATEGORY.to_string(),
            content,
            metadata,
        });
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"))
}

/// Returns the body to log, decompressing gzip. Undecodable gzip logs nothing.
fn decode_body(headers: &HeaderMap, body: &[u8]) -> Vec<u8> {
    let gzip = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    if !gzip {
        return body.to_vec();
    }

    let mut decoded = Vec::new();
    match GzDecoder::new(body).read_to_end(&mut decoded) {
        Ok(_) => decoded,
        Err(e) => {
            tracing::warn!("Failed to decompress gzip response body: {}", e);
            Vec::new()
        }
    }
}
