//! Anthropic Messages API classifier.
//!
//! Requests carry an ordered list of role-tagged messages whose `content` is
//! either a plain string or a list of typed blocks. Responses carry an ordered
//! list of typed content blocks plus cumulative `usage`, or an error envelope.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::{Map, Value};

use super::stream::parse_sse_events;
use super::LogParser;
use crate::entry::{ClassifiedLogEntry, LogEntryType, LogProvider};
use crate::error::{ParseError, Result};

/// Hosts served by the Anthropic API.
const ANTHROPIC_HOSTS: &[&str] = &["api.anthropic.com"];

#[derive(Debug, Deserialize)]
struct MessagesRequest {
    #[serde(default)]
    model: String,
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RequestMessage {
    role: String,
    #[serde(default)]
    content: MessageContent,
}

/// Message content: a plain string or a list of typed blocks.
///
/// Blocks are kept as raw values so a single malformed block can be skipped
/// without losing the rest of the message.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    PlainText(String),
    Blocks(Vec<Value>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::PlainText(String::new())
    }
}

impl MessageContent {
    fn blocks(&self) -> Vec<RequestBlock> {
        match self {
            Self::PlainText(_) => Vec::new(),
            Self::Blocks(raw) => raw.iter().filter_map(parse_block).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultContent>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolResultContent {
    PlainText(String),
    Blocks(Vec<Value>),
}

impl ToolResultContent {
    /// Flattens the result to text, joining text blocks with newlines.
    fn into_text(self) -> String {
        match self {
            Self::PlainText(text) => text,
            Self::Blocks(raw) => raw
                .iter()
                .filter_map(parse_block)
                .filter_map(|block| match block {
                    RequestBlock::Text { text } if !text.is_empty() => Some(text),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    usage: Usage,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

fn parse_block<T: for<'de> Deserialize<'de>>(raw: &Value) -> Option<T> {
    match T::deserialize(raw) {
        Ok(block) => Some(block),
        Err(e) => {
            tracing::trace!("Skipping malformed content block: {}", e);
            None
        }
    }
}

/// Normalizes tool input to a JSON object.
///
/// Input that is not an object, or a string that does not hold a JSON object,
/// becomes an empty map.
fn tool_input(input: Value) -> Map<String, Value> {
    match input {
        Value::Object(map) => map,
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        _ => Map::new(),
    }
}

/// Parser for the Anthropic Messages API.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicParser;

impl AnthropicParser {
    /// Creates a new parser.
    pub fn new() -> Self {
        Self
    }

    fn entry(&self, entry_type: LogEntryType) -> ClassifiedLogEntry {
        ClassifiedLogEntry::new(entry_type, LogProvider::Anthropic)
    }

    fn error_entry(&self, error: Option<Value>) -> ClassifiedLogEntry {
        let error: ApiError = error
            .and_then(|raw| ApiError::deserialize(&raw).ok())
            .unwrap_or_default();

        let mut entry = self.entry(LogEntryType::Error);
        entry.error_code = error.kind;
        entry.error_message = error.message;
        entry
    }

    /// Emits entries for response content blocks in their original order.
    fn content_entries(
        &self,
        model: &str,
        usage: Usage,
        blocks: impl IntoIterator<Item = ResponseBlock>,
    ) -> Vec<ClassifiedLogEntry> {
        blocks
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(
                    self.entry(LogEntryType::AiText)
                        .with_model(model)
                        .with_content(text)
                        .with_usage(usage.input_tokens, usage.output_tokens),
                ),
                ResponseBlock::ToolUse { id, name, input } => {
                    let mut entry = self
                        .entry(LogEntryType::ToolCall)
                        .with_model(model)
                        .with_usage(usage.input_tokens, usage.output_tokens);
                    entry.tool_name = name;
                    entry.tool_id = id;
                    entry.tool_input = tool_input(input);
                    Some(entry)
                }
                ResponseBlock::Other => None,
            })
            .collect()
    }

    /// Resolves a tool name from the assistant `tool_use` blocks of the history.
    fn tool_names(messages: &[RequestMessage]) -> HashMap<String, String> {
        messages
            .iter()
            .filter(|msg| msg.role == "assistant")
            .flat_map(|msg| msg.content.blocks())
            .filter_map(|block| match block {
                RequestBlock::ToolUse { id, name } => Some((id, name)),
                _ => None,
            })
            .collect()
    }
}

impl LogParser for AnthropicParser {
    fn provider(&self) -> LogProvider {
        LogProvider::Anthropic
    }

    /// Classifies the newest user turn of a conversation request.
    ///
    /// Tool results in the newest user message take priority over its text.
    /// Earlier history is never emitted.
    fn parse_request(&self, body: &[u8]) -> Result<Vec<ClassifiedLogEntry>> {
        let request: MessagesRequest = serde_json::from_slice(body)?;
        let messages: Vec<RequestMessage> =
            request.messages.iter().filter_map(parse_block).collect();

        for (idx, message) in messages.iter().enumerate().rev() {
            if message.role != "user" {
                continue;
            }

            match &message.content {
                MessageContent::PlainText(text) if !text.is_empty() => {
                    return Ok(vec![self
                        .entry(LogEntryType::UserPrompt)
                        .with_model(&request.model)
                        .with_content(text.as_str())]);
                }
                MessageContent::PlainText(_) => continue,
                MessageContent::Blocks(_) => {}
            }

            let blocks = message.content.blocks();
            let has_tool_results = blocks
                .iter()
                .any(|block| matches!(block, RequestBlock::ToolResult { .. }));

            if has_tool_results {
                let names = Self::tool_names(&messages[..idx]);
                let entries = blocks
                    .into_iter()
                    .filter_map(|block| match block {
                        RequestBlock::ToolResult {
                            tool_use_id,
                            content,
                        } => {
                            let mut entry =
                                self.entry(LogEntryType::ToolResult).with_model(&request.model);
                            entry.tool_name = names.get(&tool_use_id).cloned().unwrap_or_default();
                            entry.tool_id = tool_use_id;
                            entry.tool_output =
                                content.map(ToolResultContent::into_text).unwrap_or_default();
                            Some(entry)
                        }
                        _ => None,
                    })
                    .collect();
                return Ok(entries);
            }

            let prompt = blocks.into_iter().find_map(|block| match block {
                RequestBlock::Text { text } if !text.is_empty() => Some(text),
                _ => None,
            });
            if let Some(text) = prompt {
                return Ok(vec![self
                    .entry(LogEntryType::UserPrompt)
                    .with_model(&request.model)
                    .with_content(text)]);
            }
        }

        Ok(Vec::new())
    }

    fn parse_response(&self, body: &[u8]) -> Result<Vec<ClassifiedLogEntry>> {
        let response: MessagesResponse = serde_json::from_slice(body)?;

        if response.kind == "error" {
            return Ok(vec![self.error_entry(response.error)]);
        }

        let blocks = response.content.iter().filter_map(parse_block);
        Ok(self.content_entries(&response.model, response.usage, blocks))
    }

    /// Reassembles a streamed Messages API response and classifies it.
    fn parse_event_stream(&self, body: &[u8]) -> Result<Vec<ClassifiedLogEntry>> {
        let events = parse_sse_events(body);
        if events.is_empty() {
            return Err(ParseError::Unsupported("empty event stream"));
        }

        let mut model = String::new();
        let mut usage = Usage::default();
        let mut blocks: BTreeMap<u64, ResponseBlock> = BTreeMap::new();
        let mut partial_inputs: HashMap<u64, String> = HashMap::new();

        for event in events {
            let data: Value = match serde_json::from_str(&event.data) {
                Ok(data) => data,
                Err(e) => {
                    tracing::trace!("Skipping malformed stream event: {}", e);
                    continue;
                }
            };
            let index = data.get("index").and_then(Value::as_u64).unwrap_or(0);

            match data.get("type").and_then(Value::as_str).unwrap_or_default() {
                "error" => {
                    return Ok(vec![self.error_entry(data.get("error").cloned())]);
                }
                "message_start" => {
                    if let Some(message) = data.get("message") {
                        if let Some(m) = message.get("model").and_then(Value::as_str) {
                            model = m.to_string();
                        }
                        if let Some(u) = message.get("usage").and_then(parse_block::<Usage>) {
                            usage = u;
                        }
                    }
                }
                "content_block_start" => {
                    if let Some(block) = data.get("content_block").and_then(parse_block) {
                        blocks.insert(index, block);
                    }
                }
                "content_block_delta" => {
                    let Some(delta) = data.get("delta") else {
                        continue;
                    };
                    match delta.get("type").and_then(Value::as_str) {
                        Some("text_delta") => {
                            let chunk = delta.get("text").and_then(Value::as_str).unwrap_or("");
                            if let Some(ResponseBlock::Text { text }) = blocks.get_mut(&index) {
                                text.push_str(chunk);
                            }
                        }
                        Some("input_json_delta") => {
                            let chunk = delta
                                .get("partial_json")
                                .and_then(Value::as_str)
                                .unwrap_or("");
                            partial_inputs.entry(index).or_default().push_str(chunk);
                        }
                        _ => {}
                    }
                }
                "message_delta" => {
                    if let Some(delta_usage) = data.get("usage") {
                        if let Some(n) = delta_usage.get("output_tokens").and_then(Value::as_u64) {
                            usage.output_tokens = n;
                        }
                        if let Some(n) = delta_usage.get("input_tokens").and_then(Value::as_u64) {
                            usage.input_tokens = n;
                        }
                    }
                }
                _ => {}
            }
        }

        for (index, raw) in partial_inputs {
            if let Some(ResponseBlock::ToolUse { input, .. }) = blocks.get_mut(&index) {
                if !raw.is_empty() {
                    *input = Value::String(raw);
                }
            }
        }

        Ok(self.content_entries(&model, usage, blocks.into_values()))
    }

    fn handles_host(&self, host: &str) -> bool {
        ANTHROPIC_HOSTS.contains(&host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> AnthropicParser {
        AnthropicParser::new()
    }

    // ==================== Request Tests ====================

    #[test]
    fn request_simple_user_message() {
        let body = br#"{"model":"claude-sonnet-4","messages":[{"role":"user","content":"Fix bug"}]}"#;

        let entries = parser().parse_request(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, LogEntryType::UserPrompt);
        assert_eq!(entries[0].content, "Fix bug");
        assert_eq!(entries[0].model, "claude-sonnet-4");
        assert_eq!(entries[0].provider, LogProvider::Anthropic);
    }

    #[test]
    fn request_only_newest_user_message() {
        let body = br#"{
            "model": "claude-sonnet-4-20250514",
            "max_tokens": 8096,
            "messages": [
                {"role": "user", "content": "Fix the bug in auth.go"},
                {"role": "assistant", "content": "I'll help fix that bug."},
                {"role": "user", "content": "Thanks, now add tests"}
            ]
        }"#;

        let entries = parser().parse_request(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "Thanks, now add tests");
    }

    #[test]
    fn request_first_text_block() {
        let body = br#"{
            "model": "claude-sonnet-4-20250514",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "..."}},
                    {"type": "text", "text": "What is in this image?"},
                    {"type": "text", "text": "Be brief."}
                ]
            }]
        }"#;

        let entries = parser().parse_request(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, LogEntryType::UserPrompt);
        assert_eq!(entries[0].content, "What is in this image?");
    }

    #[test]
    fn request_tool_result() {
        let body = br#"{
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "t1", "content": "ok"}
                ]}
            ]
        }"#;

        let entries = parser().parse_request(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, LogEntryType::ToolResult);
        assert_eq!(entries[0].tool_id, "t1");
        assert_eq!(entries[0].tool_output, "ok");
    }

    #[test]
    fn request_tool_result_wins_over_text_and_resolves_name() {
        let body = br#"{
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "user", "content": "Read auth.go"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "tool_1", "name": "Read", "input": {"file_path": "/app/auth.go"}},
                    {"type": "tool_use", "id": "tool_2", "name": "Grep", "input": {"pattern": "Login"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "tool_1", "content": "package auth"},
                    {"type": "text", "text": "also check this"},
                    {"type": "tool_result", "tool_use_id": "tool_2", "content": [
                        {"type": "text", "text": "auth.go:3"},
                        {"type": "text", "text": "auth.go:9"}
                    ]}
                ]}
            ]
        }"#;

        let entries = parser().parse_request(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .all(|e| e.entry_type == LogEntryType::ToolResult));
        assert_eq!(entries[0].tool_name, "Read");
        assert_eq!(entries[0].tool_output, "package auth");
        assert_eq!(entries[1].tool_name, "Grep");
        assert_eq!(entries[1].tool_output, "auth.go:3\nauth.go:9");
    }

    #[test]
    fn request_skips_malformed_message() {
        let body = br#"{
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "user", "content": "earlier prompt"},
                {"content": "no role"},
                {"role": "user", "content": 42}
            ]
        }"#;

        let entries = parser().parse_request(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "earlier prompt");
    }

    #[test]
    fn request_skips_malformed_block() {
        let body = br#"{
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": 7},
                    {"type": "tool_result", "tool_use_id": "t2", "content": "fine"}
                ]}
            ]
        }"#;

        let entries = parser().parse_request(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tool_id, "t2");
    }

    #[test]
    fn request_image_only_message_falls_back_to_older_prompt() {
        let body = br#"{
            "messages": [
                {"role": "user", "content": "describe the screenshot"},
                {"role": "user", "content": [{"type": "image", "source": {}}]}
            ]
        }"#;

        let entries = parser().parse_request(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "describe the screenshot");
    }

    #[test]
    fn request_empty_messages() {
        let body = br#"{"model":"claude-sonnet-4","max_tokens":8096,"messages":[]}"#;
        assert!(parser().parse_request(body).unwrap().is_empty());
    }

    #[test]
    fn request_invalid_json() {
        let err = parser().parse_request(b"not valid json").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    // ==================== Response Tests ====================

    #[test]
    fn response_text_and_tool_use_in_order() {
        let body = br#"{
            "type": "message",
            "model": "claude-sonnet-4",
            "content": [
                {"type": "text", "text": "hi"},
                {"type": "tool_use", "id": "x", "name": "Read", "input": {"file_path": "/a"}}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;

        let entries = parser().parse_response(body).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].entry_type, LogEntryType::AiText);
        assert_eq!(entries[0].content, "hi");
        assert_eq!(entries[0].tokens_input, 10);
        assert_eq!(entries[0].tokens_output, 5);

        assert_eq!(entries[1].entry_type, LogEntryType::ToolCall);
        assert_eq!(entries[1].tool_name, "Read");
        assert_eq!(entries[1].tool_id, "x");
        assert_eq!(entries[1].tool_input["file_path"], "/a");
    }

    #[test]
    fn response_multiple_tool_calls() {
        let body = br#"{
            "type": "message",
            "content": [
                {"type": "text", "text": "I'll search for the files."},
                {"type": "tool_use", "id": "tool_1", "name": "Glob", "input": {"pattern": "**/*.go"}},
                {"type": "tool_use", "id": "tool_2", "name": "Grep", "input": {"pattern": "func Login"}}
            ],
            "model": "claude-sonnet-4-20250514",
            "usage": {"input_tokens": 100, "output_tokens": 80}
        }"#;

        let entries = parser().parse_response(body).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.tool_name.as_str()).collect();
        assert_eq!(names, vec!["", "Glob", "Grep"]);
    }

    #[test]
    fn response_malformed_tool_input_is_empty() {
        let body = br#"{
            "type": "message",
            "content": [
                {"type": "tool_use", "id": "a", "name": "Bash", "input": "{not json"},
                {"type": "tool_use", "id": "b", "name": "Bash", "input": [1, 2]}
            ],
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }"#;

        let entries = parser().parse_response(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].tool_input.is_empty());
        assert!(entries[1].tool_input.is_empty());
    }

    #[test]
    fn response_ignores_thinking_blocks() {
        let body = br#"{
            "type": "message",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "done"}
            ]
        }"#;

        let entries = parser().parse_response(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "done");
    }

    #[test]
    fn response_error_envelope() {
        let body = br#"{
            "type": "error",
            "error": {"type": "rate_limit_error", "message": "You have exceeded your rate limit."},
            "content": [{"type": "text", "text": "should not appear"}]
        }"#;

        let entries = parser().parse_response(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, LogEntryType::Error);
        assert_eq!(entries[0].error_code, "rate_limit_error");
        assert_eq!(entries[0].error_message, "You have exceeded your rate limit.");
    }

    #[test]
    fn response_empty_content() {
        let body = br#"{"type":"message","content":[],"usage":{"input_tokens":10,"output_tokens":0}}"#;
        assert!(parser().parse_response(body).unwrap().is_empty());
    }

    #[test]
    fn response_invalid_json() {
        assert!(parser().parse_response(b"not valid json").is_err());
    }

    // ==================== Event Stream Tests ====================

    const STREAM: &str = "event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"model\":\"claude-sonnet-4\",\"content\":[],\"usage\":{\"input_tokens\":25,\"output_tokens\":1}}}\n\
\n\
event: content_block_start\n\
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\
\n\
event: ping\n\
data: {\"type\":\"ping\"}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Let me \"}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"look.\"}}\n\
\n\
event: content_block_start\n\
data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"Read\",\"input\":{}}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"file_path\\\": \"}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"/a\\\"}\"}}\n\
\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":42}}\n\
\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";

    #[test]
    fn event_stream_reassembles_message() {
        let entries = parser().parse_event_stream(STREAM.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].entry_type, LogEntryType::AiText);
        assert_eq!(entries[0].content, "Let me look.");
        assert_eq!(entries[0].model, "claude-sonnet-4");
        assert_eq!(entries[0].tokens_input, 25);
        assert_eq!(entries[0].tokens_output, 42);

        assert_eq!(entries[1].entry_type, LogEntryType::ToolCall);
        assert_eq!(entries[1].tool_id, "toolu_1");
        assert_eq!(entries[1].tool_input["file_path"], "/a");
    }

    #[test]
    fn event_stream_error() {
        let body = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
        let entries = parser().parse_event_stream(body.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, LogEntryType::Error);
        assert_eq!(entries[0].error_code, "overloaded_error");
    }

    #[test]
    fn event_stream_empty_is_unsupported() {
        let err = parser().parse_event_stream(b"").unwrap_err();
        assert!(matches!(err, ParseError::Unsupported(_)));
    }

    #[test]
    fn handles_only_anthropic_api() {
        assert!(parser().handles_host("api.anthropic.com"));
        assert!(!parser().handles_host("claude.ai"));
        assert!(!parser().handles_host("evil-api.anthropic.com.example"));
    }
}
