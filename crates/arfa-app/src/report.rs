//! Session reports from JSON Lines logs.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use arfa_core::{group_by_session, summarize, ClassifiedLogEntry, Formatter, SessionSummary};

/// Reads classified entries from a JSON Lines file.
///
/// Blank lines are ignored. Lines that are not valid entries are skipped with a
/// warning.
pub fn read_entries(path: &Path) -> anyhow::Result<Vec<ClassifiedLogEntry>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!("Skipping line {} of {}: {}", index + 1, path.display(), e),
        }
    }

    Ok(entries)
}

/// What to print for a log file.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Only report this session.
    pub session: Option<String>,
    /// Print summaries as JSON instead of boxed reports.
    pub json: bool,
}

/// Renders reports for every session in `entries`, in session id order.
pub fn render(
    entries: Vec<ClassifiedLogEntry>,
    formatter: &Formatter,
    options: &ReportOptions,
) -> anyhow::Result<String> {
    let sessions: Vec<_> = group_by_session(entries)
        .into_iter()
        .filter(|(id, _)| options.session.as_ref().map_or(true, |wanted| wanted == id))
        .collect();

    if options.json {
        let summaries: Vec<SessionSummary> = sessions
            .iter()
            .map(|(id, entries)| summarize(id, entries))
            .collect();
        return Ok(serde_json::to_string_pretty(&summaries)?);
    }

    Ok(sessions
        .iter()
        .map(|(id, entries)| formatter.format_session(id, entries))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use arfa_core::{LogEntryType, LogProvider};
    use tempfile::TempDir;

    use super::*;

    fn text(session: &str, content: &str) -> ClassifiedLogEntry {
        ClassifiedLogEntry::new(LogEntryType::AiText, LogProvider::Anthropic)
            .with_session(session)
            .with_model("claude-sonnet-4")
            .with_content(content)
            .with_usage(1000, 100)
    }

    #[test]
    fn read_skips_blank_and_bad_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.jsonl");
        let good = serde_json::to_string(&text("s", "hello")).unwrap();
        fs::write(&path, format!("{}\n\nnot json\n{}\n", good, good)).unwrap();

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "hello");
    }

    #[test]
    fn read_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_entries(&temp_dir.path().join("missing.jsonl")).is_err());
    }

    #[test]
    fn render_one_box_per_session() {
        let entries = vec![text("b", "second"), text("a", "first")];
        let out = render(entries, &Formatter::new(), &ReportOptions::default()).unwrap();

        assert_eq!(out.matches("SESSION SUMMARY").count(), 2);
        assert!(out.find("SESSION: a").unwrap() < out.find("SESSION: b").unwrap());
    }

    #[test]
    fn render_filters_session() {
        let entries = vec![text("a", "first"), text("b", "second")];
        let options = ReportOptions {
            session: Some("b".into()),
            json: false,
        };
        let out = render(entries, &Formatter::new(), &options).unwrap();

        assert!(out.contains("second"));
        assert!(!out.contains("first"));
    }

    #[test]
    fn render_json_summaries() {
        let entries = vec![text("a", "x"), text("a", "y"), text("b", "z")];
        let options = ReportOptions {
            session: None,
            json: true,
        };
        let out = render(entries, &Formatter::new(), &options).unwrap();

        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let summaries = value.as_array().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0]["session_id"], "a");
        assert_eq!(summaries[0]["tokens_input"], 1000);
        assert_eq!(summaries[0]["model"], "claude-sonnet-4");
    }
}
