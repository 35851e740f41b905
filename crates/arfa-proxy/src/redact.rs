//! Header redaction for logged traffic.
//!
//! Only the logged copy of a message is redacted; relayed headers are never
//! modified.

use std::collections::BTreeMap;

use hyper::HeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Replacement for sensitive header values.
pub const REDACTED: &str = "[REDACTED]";

static SENSITIVE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(auth|api-key|token|cookie|x-api-key)").expect("valid header pattern")
});

/// Returns true if a header with this name carries credentials.
pub fn is_sensitive(name: &str) -> bool {
    SENSITIVE_HEADER.is_match(name)
}

/// Flattens headers into a name-ordered map of first values, redacting
/// credentials.
pub fn redact_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            let value = headers.get(name)?;
            let shown = if is_sensitive(name.as_str()) {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            Some((name.as_str().to_string(), shown))
        })
        .collect()
}
