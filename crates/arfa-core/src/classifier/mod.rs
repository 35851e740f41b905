//! Provider wire-protocol classification.
//!
//! Each provider schema is one [`LogParser`] implementation. Parsers are pure:
//! they take raw body bytes and return classified entries without touching any
//! shared state, so they can be called from any request handler concurrently.
//!
//! ## Adding a provider
//!
//! Implement [`LogParser`] for the provider's schema and register it in
//! [`ParserRegistry::with_defaults`] together with the hosts it serves.

mod anthropic;
mod stream;

use std::sync::Arc;

pub use anthropic::AnthropicParser;
pub use stream::{parse_sse_events, SseEvent};

use crate::entry::{ClassifiedLogEntry, LogProvider};
use crate::error::{ParseError, Result};

/// Parser for one provider's request/response schema.
pub trait LogParser: Send + Sync {
    /// Returns the provider this parser handles.
    fn provider(&self) -> LogProvider;

    /// Parses an API request body into classified entries.
    fn parse_request(&self, body: &[u8]) -> Result<Vec<ClassifiedLogEntry>>;

    /// Parses a complete (non-streaming) API response body.
    fn parse_response(&self, body: &[u8]) -> Result<Vec<ClassifiedLogEntry>>;

    /// Parses a `text/event-stream` response body.
    fn parse_event_stream(&self, _body: &[u8]) -> Result<Vec<ClassifiedLogEntry>> {
        Err(ParseError::Unsupported("event streams"))
    }

    /// Returns true if this parser handles traffic for `host`.
    fn handles_host(&self, host: &str) -> bool;
}

/// Registry mapping hosts to provider parsers.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn LogParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field(
                "providers",
                &self.parsers.iter().map(|p| p.provider()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ParserRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Creates a registry with all built-in provider parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AnthropicParser::new()));
        registry
    }

    /// Registers a parser. Earlier registrations win on overlapping hosts.
    pub fn register(&mut self, parser: Arc<dyn LogParser>) {
        self.parsers.push(parser);
    }

    /// Returns the parser responsible for `host`, if any.
    ///
    /// A `:port` suffix on the host is ignored.
    pub fn for_host(&self, host: &str) -> Option<Arc<dyn LogParser>> {
        let host = host.split(':').next().unwrap_or(host);
        self.parsers.iter().find(|p| p.handles_host(host)).cloned()
    }

    /// Number of registered parsers.
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// Returns true if no parser is registered.
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}
