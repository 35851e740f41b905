//! Server-Sent Events framing.

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// The `data:` lines joined with `\n`.
    pub data: String,
}

fn dispatch(events: &mut Vec<SseEvent>, event: &mut Option<String>, data: &mut Vec<&str>) {
    if !data.is_empty() {
        let joined = data.join("\n");
        if joined != "[DONE]" {
            events.push(SseEvent {
                event: event.take(),
                data: joined,
            });
        }
    }
    *event = None;
    data.clear();
}

/// Splits an SSE body into events.
///
/// Events are separated by blank lines. Comment lines (`:`) and unknown fields
/// are ignored, as are events without data and the `[DONE]` sentinel.
pub fn parse_sse_events(body: &[u8]) -> Vec<SseEvent> {
    let text = String::from_utf8_lossy(body);
    let mut events = Vec::new();
    let mut event: Option<String> = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.is_empty() {
            dispatch(&mut events, &mut event, &mut data);
            continue;
        }
        if line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }
    dispatch(&mut events, &mut event, &mut data);

    events
}
