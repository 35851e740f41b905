//! Arfa Core - classification, aggregation, and formatting of LLM API traffic.
//!
//! This crate is pure: it takes captured request/response bodies and turns them
//! into typed [`ClassifiedLogEntry`] values, reduces sessions into
//! [`SessionSummary`] values, and renders both for humans. Capture itself lives
//! in `arfa-proxy`.
//!
//! ## Modules
//!
//! - [`classifier`] - per-provider wire schema parsers behind [`LogParser`]
//! - [`entry`] - the shared entry and summary types
//! - [`summary`] - session aggregation and cost estimation
//! - [`formatter`] - text rendering of entries and session reports

pub mod classifier;
pub mod entry;
pub mod error;
pub mod formatter;
pub mod summary;

pub use classifier::{AnthropicParser, LogParser, ParserRegistry};
pub use entry::{ClassifiedLogEntry, LogEntryType, LogProvider, SessionSummary};
pub use error::{ParseError, Result};
pub use formatter::{truncate, Formatter};
pub use summary::{estimate_cost, group_by_session, summarize};
