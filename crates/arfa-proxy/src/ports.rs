//! Listening port selection.
//!
//! A port is checked by binding `127.0.0.1` and releasing it immediately, so
//! another process may take it before the proxy rebinds. Callers see that as a
//! startup failure and may retry.

use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

use crate::error::{ProxyError, Result};

/// Lowest port the proxy listens on.
pub const MIN_PORT: u16 = 8082;

/// Highest port the proxy listens on.
pub const MAX_PORT: u16 = 8091;

/// Default port range, allowing ten concurrent proxies.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = MIN_PORT..=MAX_PORT;

/// Returns the first port in `range` that can be bound on localhost.
pub fn allocate(range: RangeInclusive<u16>) -> Result<u16> {
    let (min, max) = (*range.start(), *range.end());

    for port in range {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => {
                drop(listener);
                tracing::debug!(port, "Allocated proxy port");
                return Ok(port);
            }
            Err(e) => tracing::trace!(port, error = %e, "Port unavailable"),
        }
    }

    Err(ProxyError::NoPortAvailable { min, max })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held_port() -> (TcpListener, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn allocates_within_range() {
        let (listener, port) = held_port();
        drop(listener);

        assert_eq!(allocate(port..=port).unwrap(), port);
    }

    #[test]
    fn skips_taken_ports() {
        let (_held, port) = held_port();

        let result = allocate(port..=port);
        assert!(matches!(
            result,
            Err(ProxyError::NoPortAvailable { min, max }) if min == port && max == port
        ));
    }

    /// Finds `len` consecutive ports that are currently free.
    fn free_range(len: u16) -> RangeInclusive<u16> {
        'search: for _ in 0..50 {
            let (listener, start) = held_port();
            drop(listener);
            let Some(end) = start.checked_add(len - 1) else {
                continue;
            };
            for port in start..=end {
                if TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_err() {
                    continue 'search;
                }
            }
            return start..=end;
        }
        panic!("no free range of {} ports", len);
    }

    #[test]
    fn range_exhausted_after_ten_instances() {
        let range = free_range(10);
        let (min, max) = (*range.start(), *range.end());

        let mut held = Vec::new();
        for _ in 0..10 {
            let port = allocate(range.clone()).unwrap();
            assert!(range.contains(&port));
            held.push(TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap());
        }

        let result = allocate(range);
        assert!(matches!(
            result,
            Err(ProxyError::NoPortAvailable { min: lo, max: hi }) if lo == min && hi == max
        ));
    }

    #[test]
    fn empty_range_has_no_port() {
        #[allow(clippy::reversed_empty_ranges)]
        let result = allocate(MAX_PORT..=MIN_PORT);
        assert!(matches!(result, Err(ProxyError::NoPortAvailable { .. })));
    }

    #[test]
    fn default_range_constants() {
        assert_eq!(DEFAULT_PORT_RANGE.clone().count(), 10);
    }
}
