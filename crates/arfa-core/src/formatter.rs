//! Human-readable rendering of classified entries.
//!
//! Rendering is deterministic: the same entries always produce the same text.
//! Label style (emoji or bracketed text) has no effect on content.

use std::fmt::Write;

use serde_json::Value;

use crate::entry::{ClassifiedLogEntry, LogEntryType};
use crate::summary::summarize;

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Inner width of the session report box.
const BOX_WIDTH: usize = 75;

/// Truncates `s` to at most `max_len` characters.
///
/// Truncated text ends with [`ELLIPSIS`], which is never cut itself: limits too
/// small to hold it truncate without a marker. Truncating an already truncated
/// string to the same limit returns it unchanged.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }

    let marker_len = ELLIPSIS.chars().count();
    if max_len <= marker_len {
        return s.chars().take(max_len).collect();
    }

    let mut out: String = s.chars().take(max_len - marker_len).collect();
    out.push_str(ELLIPSIS);
    out
}

fn border(left: char, right: char) -> String {
    format!("{}{}{}\n", left, "─".repeat(BOX_WIDTH + 2), right)
}

fn boxed_line(out: &mut String, text: &str) {
    let _ = writeln!(out, "│ {:<width$} │", truncate(text, BOX_WIDTH), width = BOX_WIDTH);
}

fn format_duration(ms: i64) -> String {
    let secs = ms / 1000;
    match secs {
        s if s >= 3600 => format!("{}h {}m {}s", s / 3600, (s % 3600) / 60, s % 60),
        s if s >= 60 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{}s", s),
    }
}

/// Formats classified entries for display.
#[derive(Debug, Clone)]
pub struct Formatter {
    /// Prefix entry labels with emoji (disable for non-unicode terminals).
    pub use_emoji: bool,
    /// Prefix entries with their `HH:MM:SS` timestamp when one is present.
    pub show_timestamp: bool,
    /// Truncate content longer than this many characters (0 = no limit).
    pub max_content_length: usize,
    /// List tool call arguments below the tool call.
    pub indent_tool_input: bool,
}

impl Default for Formatter {
    fn default() -> Self {
        Self {
            use_emoji: true,
            show_timestamp: true,
            max_content_length: 500,
            indent_tool_input: true,
        }
    }
}

impl Formatter {
    /// Creates a formatter with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables emoji labels.
    pub fn with_emoji(mut self, use_emoji: bool) -> Self {
        self.use_emoji = use_emoji;
        self
    }

    /// Enables or disables timestamps.
    pub fn with_timestamps(mut self, show_timestamp: bool) -> Self {
        self.show_timestamp = show_timestamp;
        self
    }

    /// Sets the content length limit (0 = no limit).
    pub fn with_max_content_length(mut self, max_content_length: usize) -> Self {
        self.max_content_length = max_content_length;
        self
    }

    /// Enables or disables the tool argument listing.
    pub fn with_tool_input(mut self, indent_tool_input: bool) -> Self {
        self.indent_tool_input = indent_tool_input;
        self
    }

    fn truncate(&self, s: &str) -> String {
        if self.max_content_length == 0 {
            s.to_string()
        } else {
            truncate(s, self.max_content_length)
        }
    }

    /// Returns the display label for an entry type.
    pub fn label(&self, entry_type: LogEntryType) -> &'static str {
        if self.use_emoji {
            match entry_type {
                LogEntryType::UserPrompt => "💬 USER_PROMPT",
                LogEntryType::AiText => "🤖 AI_TEXT",
                LogEntryType::ToolCall => "🔧 TOOL_CALL",
                LogEntryType::ToolResult => "📤 TOOL_RESULT",
                LogEntryType::Error => "❌ ERROR",
                LogEntryType::SessionStart => "▶️ SESSION_START",
                LogEntryType::SessionEnd => "⏹️ SESSION_END",
            }
        } else {
            match entry_type {
                LogEntryType::UserPrompt => "[USER_PROMPT]",
                LogEntryType::AiText => "[AI_TEXT]",
                LogEntryType::ToolCall => "[TOOL_CALL]",
                LogEntryType::ToolResult => "[TOOL_RESULT]",
                LogEntryType::Error => "[ERROR]",
                LogEntryType::SessionStart => "[SESSION_START]",
                LogEntryType::SessionEnd => "[SESSION_END]",
            }
        }
    }

    /// Formats a single entry. The result always ends with a newline.
    pub fn format(&self, entry: &ClassifiedLogEntry) -> String {
        let mut out = String::new();

        if self.show_timestamp {
            if let Some(ts) = entry.timestamp {
                let _ = write!(out, "[{}] ", ts.format("%H:%M:%S"));
            }
        }
        out.push_str(self.label(entry.entry_type));
        if !entry.tool_name.is_empty() {
            let _ = write!(out, ": {}", entry.tool_name);
        }
        out.push('\n');

        match entry.entry_type {
            LogEntryType::UserPrompt | LogEntryType::AiText => {
                let _ = writeln!(out, "{}", self.truncate(&entry.content));
            }
            LogEntryType::ToolCall => {
                if self.indent_tool_input {
                    for (key, value) in &entry.tool_input {
                        let value = match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        let _ = writeln!(out, "  {}: {}", key, self.truncate(&value));
                    }
                }
            }
            LogEntryType::ToolResult => {
                if entry.tool_output.is_empty() {
                    out.push_str("(empty result)\n");
                } else {
                    let _ = writeln!(out, "{}", self.truncate(&entry.tool_output));
                }
            }
            LogEntryType::Error => {
                if !entry.error_code.is_empty() {
                    let _ = write!(out, "[{}] ", entry.error_code);
                }
                let _ = writeln!(out, "{}", entry.error_message);
            }
            LogEntryType::SessionStart => {
                let _ = writeln!(out, "Session started: {}", entry.session_id);
            }
            LogEntryType::SessionEnd => {
                let _ = writeln!(out, "Session ended: {}", entry.session_id);
            }
        }

        out
    }

    /// Renders a boxed session report: header, entries in order, summary footer.
    ///
    /// The header takes model and provider from the session summary, so leading
    /// session markers do not hide them.
    pub fn format_session(&self, session_id: &str, entries: &[ClassifiedLogEntry]) -> String {
        let summary = summarize(session_id, entries);

        let mut out = border('┌', '┐');
        boxed_line(&mut out, &format!("SESSION: {}", session_id));
        if !summary.model.is_empty() {
            boxed_line(&mut out, &format!("MODEL: {}", summary.model));
        }
        if !entries.is_empty() {
            boxed_line(&mut out, &format!("PROVIDER: {}", summary.provider));
        }
        out.push_str(&border('├', '┤'));
        boxed_line(&mut out, "");

        for entry in entries {
            for line in self.format(entry).lines().filter(|l| !l.is_empty()) {
                boxed_line(&mut out, line);
            }
            boxed_line(&mut out, "");
        }

        out.push_str(&border('├', '┤'));
        boxed_line(&mut out, "SESSION SUMMARY");
        boxed_line(
            &mut out,
            &format!(
                "Tokens: {} input / {} output",
                summary.tokens_input, summary.tokens_output
            ),
        );
        boxed_line(&mut out, &format!("Tool Calls: {}", summary.tool_calls));
        for (name, count) in &summary.tools_by_name {
            boxed_line(&mut out, &format!("  {}: {}", name, count));
        }
        if summary.errors > 0 {
            boxed_line(&mut out, &format!("Errors: {}", summary.errors));
        }
        if summary.duration_ms > 0 {
            boxed_line(
                &mut out,
                &format!("Duration: {}", format_duration(summary.duration_ms)),
            );
        }
        if summary.cost_estimate > 0.0 {
            boxed_line(
                &mut out,
                &format!("Cost Estimate: ${:.4}", summary.cost_estimate),
            );
        }
        out.push_str(&border('└', '┘'));

        out
    }
}
