//! Arfa Proxy - MITM proxy that logs LLM API traffic.
//!
//! This crate provides a local HTTPS proxy that terminates TLS for a short list
//! of provider API hosts, classifies the decrypted traffic with `arfa-core`,
//! and hands the results to a [`LogSink`]. Traffic is never modified.
//!
//! ## Features
//!
//! - Generates a root CA certificate on first run and reuses it afterwards
//! - Creates per-host certificates on the fly
//! - Intercepts only provider API hosts (opaque tunnel for everything else)
//! - Redacts credentials in logged headers
//! - Stamps entries with the active session identity
//! - Counts requests and body bytes per session
//!
//! ## Architecture
//!
//! ```text
//! Client CONNECT → Proxy → Host allow-listed?
//!                              │
//!               ┌──────────────┴──────────────┐
//!               │ No                          │ Yes
//!               ▼                             ▼
//!          Opaque tunnel              TLS termination
//!                                             │
//!                                             ▼
//!                                  SessionLogger ─→ classify ─→ LogSink
//!                                             │
//!                                             ▼
//!                                  Relay unchanged bytes
//! ```

mod ca;
mod domains;
mod error;
mod handler;
mod logger;
pub mod ports;
mod proxy;
mod redact;
mod session;

pub use ca::{CaManager, CaManagerError};
pub use domains::{is_intercepted_host, INTERCEPT_HOSTS};
pub use error::{ProxyError, Result};
pub use handler::ProxyHandler;
pub use logger::{LogSink, RawEvent, SessionLogger, TracingSink, PROXY_CATEGORY};
pub use proxy::{ProxyConfig, ProxyServer, DEFAULT_SHUTDOWN_TIMEOUT};
pub use redact::{redact_headers, REDACTED};
pub use session::{MetricsState, SessionIdentity, SessionMetrics, SessionState};
