//! HTTP handler for intercepted connections.
//!
//! Bodies are read in full, handed to the [`SessionLogger`], and relayed
//! byte-for-byte. Nothing is ever blocked or rewritten.

use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hudsucker::{
    hyper::{Request, Response},
    Body, HttpContext, HttpHandler, RequestOrResponse,
};
use hyper::body::Bytes;
use hyper::header::CONTENT_LENGTH;
use hyper::HeaderMap;

use crate::domains::{is_listed_host, strip_port};
use crate::error::{ProxyError, Result};
use crate::logger::SessionLogger;

fn bytes_to_body(bytes: Bytes) -> Body {
    Body::from(Full::new(bytes))
}

async fn read_body(body: Body) -> Result<Bytes> {
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| ProxyError::Relay(e.to_string()))
}

/// Body relayed when the original could not be read.
///
/// The stale `Content-Length` is dropped so the forwarded message stays
/// well-formed.
fn unreadable_body(headers: &mut HeaderMap) -> Body {
    headers.remove(CONTENT_LENGTH);
    Body::empty()
}

/// Request seen on this exchange, kept until its response arrives.
#[derive(Debug, Clone)]
struct PendingRequest {
    host: String,
    path: String,
}

/// Proxy handler logging traffic to allow-listed hosts.
///
/// hudsucker clones the handler for every exchange, so `pending` pairs a
/// response with the request that produced it.
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    logger: SessionLogger,
    intercept_hosts: Arc<Vec<String>>,
    pending: Option<PendingRequest>,
}

impl ProxyHandler {
    /// Creates a handler intercepting `intercept_hosts`.
    pub fn new(logger: SessionLogger, intercept_hosts: Vec<String>) -> Self {
        Self {
            logger,
            intercept_hosts: Arc::new(intercept_hosts),
            pending: None,
        }
    }

    /// Returns true if TLS to `host` should be terminated and logged.
    pub fn intercepts(&self, host: &str) -> bool {
        is_listed_host(self.intercept_hosts.as_slice(), host)
    }

    /// Extracts host from request URI or Host header.
    fn extract_host(req: &Request<Body>) -> Option<String> {
        if let Some(host) = req.uri().host() {
            return Some(host.to_string());
        }

        req.headers()
            .get(hyper::header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(|s| strip_port(s).to_string())
    }

    async fn process_request(&mut self, req: Request<Body>) -> Request<Body> {
        let host = match Self::extract_host(&req) {
            Some(h) if self.intercepts(&h) => h,
            _ => return req,
        };

        let (mut parts, body) = req.into_parts();
        let bytes = match read_body(body).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to read request body for {}: {}", host, e);
                let body = unreadable_body(&mut parts.headers);
                return Request::from_parts(parts, body);
            }
        };

        tracing::debug!("Intercepted {} {}{}", parts.method, host, parts.uri.path());
        self.logger
            .log_request(&host, &parts.method, &parts.uri, &parts.headers, &bytes);
        self.pending = Some(PendingRequest {
            host,
            path: parts.uri.path().to_string(),
        });

        Request::from_parts(parts, bytes_to_body(bytes))
    }

    async fn process_response(&mut self, res: Response<Body>) -> Response<Body> {
        let Some(request) = self.pending.take() else {
            return res;
        };

        let (mut parts, body) = res.into_parts();
        let bytes = match read_body(body).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    "Failed to read response body for {}{}: {}",
                    request.host,
                    request.path,
                    e
                );
                let body = unreadable_body(&mut parts.headers);
                return Response::from_parts(parts, body);
            }
        };

        tracing::debug!(
            "Response {} from {}{}",
            parts.status,
            request.host,
            request.path
        );
        self.logger
            .log_response(&request.host, parts.status, &parts.headers, &bytes);

        Response::from_parts(parts, bytes_to_body(bytes))
    }
}

impl HttpHandler for ProxyHandler {
    async fn handle_request(
        &mut self,
        _ctx: &HttpContext,
        req: Request<Body>,
    ) -> RequestOrResponse {
        RequestOrResponse::Request(self.process_request(req).await)
    }

    async fn handle_response(&mut self, _ctx: &HttpContext, res: Response<Body>) -> Response<Body> {
        self.process_response(res).await
    }

    async fn should_intercept(&mut self, _ctx: &HttpContext, req: &Request<Body>) -> bool {
        let intercept = req.uri().host().is_some_and(|host| self.intercepts(host));
        if !intercept {
            tracing::trace!("Tunneling {}", req.uri());
        }
        intercept
    }
}
