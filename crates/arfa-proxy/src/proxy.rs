//! Interception proxy server.
//!
//! Owns the proxy lifecycle: CA setup, port selection, the hudsucker listener,
//! and graceful shutdown.

use std::net::{Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hudsucker::rustls::crypto::aws_lc_rs::default_provider;
use hudsucker::Proxy;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::ca::CaManager;
use crate::domains::INTERCEPT_HOSTS;
use crate::error::{ProxyError, Result};
use crate::handler::ProxyHandler;
use crate::logger::{LogSink, SessionLogger};
use crate::ports::{self, DEFAULT_PORT_RANGE};
use crate::session::{SessionIdentity, SessionMetrics, SessionState};

/// Default grace period for in-flight connections on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a freshly spawned listener must survive to count as started.
const STARTUP_CHECK_DELAY: Duration = Duration::from_millis(50);

/// Proxy server configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// The CA manager for certificate generation.
    pub ca_manager: CaManager,
    /// Ports tried in ascending order.
    pub port_range: RangeInclusive<u16>,
    /// Grace period before in-flight connections are aborted.
    pub shutdown_timeout: Duration,
    /// Hosts whose TLS is terminated and logged.
    pub intercept_hosts: Vec<String>,
    /// Session active when the server starts.
    pub session: SessionIdentity,
}

impl ProxyConfig {
    /// Creates a configuration using `~/.arfa/certs` and the default port range.
    pub fn new() -> Result<Self> {
        let ca_manager = CaManager::with_default_dir()?;
        Ok(Self::from_ca_manager(ca_manager))
    }

    /// Creates a configuration around an existing CA manager.
    pub fn from_ca_manager(ca_manager: CaManager) -> Self {
        Self {
            ca_manager,
            port_range: DEFAULT_PORT_RANGE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            intercept_hosts: INTERCEPT_HOSTS.iter().map(|h| h.to_string()).collect(),
            session: SessionIdentity::default(),
        }
    }

    /// Sets the CA manager.
    pub fn with_ca_manager(mut self, ca_manager: CaManager) -> Self {
        self.ca_manager = ca_manager;
        self
    }

    /// Sets the port range.
    pub fn with_port_range(mut self, port_range: RangeInclusive<u16>) -> Self {
        self.port_range = port_range;
        self
    }

    /// Sets the shutdown grace period.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Replaces the intercepted hosts.
    pub fn with_intercept_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intercept_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the initial session.
    pub fn with_session(mut self, session: SessionIdentity) -> Self {
        self.session = session;
        self
    }
}

struct RunningProxy {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

/// Interception proxy for LLM API traffic.
pub struct ProxyServer {
    config: ProxyConfig,
    logger: SessionLogger,
    running: Option<RunningProxy>,
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("config", &self.config)
            .field("addr", &self.addr())
            .finish()
    }
}

impl ProxyServer {
    /// Creates a stopped server logging to `sink`.
    pub fn new(config: ProxyConfig, sink: Arc<dyn LogSink>) -> Self {
        let session = SessionState::new(config.session.clone());
        let logger = SessionLogger::new(sink, session);

        Self {
            config,
            logger,
            running: None,
        }
    }

    /// Starts listening on the first free port in the configured range.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ProxyError::AlreadyRunning);
        }

        let authority = self.config.ca_manager.ensure_ca()?;
        let port = ports::allocate(self.config.port_range.clone())?;
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        let handler = ProxyHandler::new(self.logger.clone(), self.config.intercept_hosts.clone());
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        let proxy = Proxy::builder()
            .with_addr(addr)
            .with_ca(authority)
            .with_rustls_connector(default_provider())
            .with_http_handler(handler)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .build()
            .map_err(|e| ProxyError::Proxy(e.to_string()))?;

        let handle = tokio::spawn(async move {
            proxy
                .start()
                .await
                .map_err(|e| ProxyError::Proxy(e.to_string()))
        });

        // Bind failures surface right away.
        tokio::time::sleep(STARTUP_CHECK_DELAY).await;
        if handle.is_finished() {
            return match handle.await {
                Ok(Err(e)) => Err(e),
                Ok(Ok(())) => Err(ProxyError::Proxy("listener exited during startup".into())),
                Err(e) => Err(ProxyError::Proxy(e.to_string())),
            };
        }

        tracing::info!("Proxy listening on {}", addr);
        tracing::info!("CA certificate: {:?}", self.ca_cert_path());

        self.running = Some(RunningProxy {
            addr,
            shutdown_tx,
            handle,
        });
        self.logger.start_session();

        Ok(())
    }

    /// Stops the proxy, giving in-flight connections up to `timeout`.
    ///
    /// Stopping a stopped server does nothing.
    pub async fn stop(&mut self, timeout: Duration) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        let _ = running.shutdown_tx.send(());
        let mut handle = running.handle;

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => tracing::info!("Proxy on {} stopped", running.addr),
            Ok(Ok(Err(e))) => tracing::warn!("Proxy on {} exited with error: {}", running.addr, e),
            Ok(Err(e)) => tracing::warn!("Proxy task failed: {}", e),
            Err(_) => {
                tracing::warn!("Graceful shutdown timed out after {:?}, aborting", timeout);
                handle.abort();
            }
        }

        self.logger.end_session(&self.logger.session().get());
        Ok(())
    }

    /// Stops the proxy using the configured grace period.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stop(self.config.shutdown_timeout).await
    }

    /// Switches the session stamped onto subsequent entries.
    ///
    /// While running, the previous session is ended and the new one started.
    /// A stopped server only records the identity; `start` emits its marker.
    pub fn set_session(
        &self,
        session_id: impl Into<String>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
    ) {
        let previous = self.logger.session().set(SessionIdentity::new(
            session_id,
            client_name,
            client_version,
        ));
        if self.is_running() {
            self.logger.end_session(&previous);
            self.logger.start_session();
        }
    }

    /// Returns the active session.
    pub fn session(&self) -> Arc<SessionIdentity> {
        self.logger.session().get()
    }

    /// Returns request and byte counters for the active session.
    pub fn metrics(&self) -> SessionMetrics {
        self.logger.metrics()
    }

    /// Returns true while the listener task is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Returns the listening address while running.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.addr)
    }

    /// Returns the listening port while running.
    pub fn port(&self) -> Option<u16> {
        self.addr().map(|addr| addr.port())
    }

    /// Returns the URL to configure as the client's HTTPS proxy.
    pub fn proxy_url(&self) -> Option<String> {
        self.addr().map(|addr| format!("http://{}", addr))
    }

    /// Returns the CA certificate path for trust-store installation.
    pub fn ca_cert_path(&self) -> PathBuf {
        self.config.ca_manager.cert_path()
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown_tx.send(());
            running.handle.abort();
        }
    }
}
