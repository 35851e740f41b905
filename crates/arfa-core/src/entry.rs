//! Classified log entries and session summaries.
//!
//! A [`ClassifiedLogEntry`] is the canonical unit of agent activity produced by
//! the protocol classifiers. A [`SessionSummary`] is a pure reduction over the
//! entries of one session and is never stored on its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Semantic kind of a classified entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    /// Input typed by the user.
    UserPrompt,
    /// Text produced by the model.
    AiText,
    /// The model invoking a tool.
    ToolCall,
    /// The agent returning a tool's output to the model.
    ToolResult,
    /// Provider-side error envelope.
    Error,
    /// A session began.
    SessionStart,
    /// A session ended.
    SessionEnd,
}

impl LogEntryType {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserPrompt => "user_prompt",
            Self::AiText => "ai_text",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Error => "error",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
        }
    }
}

impl std::fmt::Display for LogEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// LLM provider an entry was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogProvider {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Google,
    #[default]
    Unknown,
}

impl LogProvider {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Unknown => "unknown",
        }
    }

    /// Whether token usage reported by this provider is cumulative per response.
    ///
    /// Cumulative counts are aggregated with `max`, incremental ones with `sum`.
    pub fn reports_cumulative_usage(&self) -> bool {
        match self {
            Self::Anthropic | Self::OpenAi | Self::Google | Self::Unknown => true,
        }
    }
}

impl std::fmt::Display for LogProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// One semantically labeled unit of agent activity.
///
/// Only the fields relevant to `entry_type` are populated; the rest stay empty
/// and are omitted from the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedLogEntry {
    // Identity
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    // Classification
    pub entry_type: LogEntryType,
    #[serde(default)]
    pub provider: LogProvider,

    // Content
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tool_input: Map<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,

    // Metrics
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tokens_input: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tokens_output: u64,
}

impl ClassifiedLogEntry {
    /// Creates an empty entry of the given type.
    pub fn new(entry_type: LogEntryType, provider: LogProvider) -> Self {
        Self {
            id: String::new(),
            session_id: String::new(),
            client_name: String::new(),
            client_version: String::new(),
            timestamp: None,
            entry_type,
            provider,
            content: String::new(),
            tool_name: String::new(),
            tool_id: String::new(),
            tool_input: Map::new(),
            tool_output: String::new(),
            error_code: String::new(),
            error_message: String::new(),
            model: String::new(),
            tokens_input: 0,
            tokens_output: 0,
        }
    }

    /// Sets the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the text content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Sets the cumulative token usage.
    pub fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = input;
        self.tokens_output = output;
        self
    }

    /// Sets the session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Sets the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Aggregate statistics for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub provider: LogProvider,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub tool_calls: u64,
    /// Tool name to number of calls.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools_by_name: BTreeMap<String, u64>,
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between the first and last timestamped entry.
    pub duration_ms: i64,
    /// Estimated cost in USD.
    pub cost_estimate: f64,
}
