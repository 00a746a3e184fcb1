//! The OS-level listener and its accept loop.
//!
//! One accept operation is outstanding at a time. An accepted connection
//! is handed to a spawned connection task (hyper, graceful-watched) and
//! the loop immediately re-arms, so accepting connection N+1 overlaps
//! processing connection N by design. A shutdown signal ends the loop
//! silently; any other accept failure is logged and terminates the loop
//! with no automatic restart.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use resthost_http::HostService;
use resthost_model::{HostError, HostResult};

/// Lifecycle state of the listener. Transitions are strictly forward
/// within one start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerState {
    /// Not running.
    #[default]
    Stopped,
    /// Bind in progress.
    Starting,
    /// Accept loop running.
    Listening,
    /// Shutdown in progress.
    Stopping,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Parsed form of a `scheme://host:port/base/` url base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBase {
    /// Address the socket binds to, `host:port` form.
    pub bind_addr: String,
    /// Path prefix served under, `""` or `"/prefix"` form.
    pub base_path: String,
}

/// Parse a url base such as `http://0.0.0.0:8080/api/`.
///
/// Only the `http` scheme is accepted; TLS termination is out of scope
/// for this host.
pub fn parse_url_base(url_base: &str) -> HostResult<UrlBase> {
    let uri: http::Uri = url_base
        .parse()
        .map_err(|e| HostError::listener(format!("invalid url base {url_base:?}: {e}")))?;

    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => {
            return Err(HostError::listener(format!(
                "unsupported scheme {other:?} in url base {url_base:?}"
            )));
        }
        None => {
            return Err(HostError::listener(format!(
                "url base {url_base:?} is missing a scheme"
            )));
        }
    }

    let host = uri
        .host()
        .ok_or_else(|| HostError::listener(format!("url base {url_base:?} is missing a host")))?;
    let port = uri.port_u16().unwrap_or(80);

    let trimmed = uri.path().trim_matches('/');
    let base_path = if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    };

    Ok(UrlBase {
        bind_addr: format!("{host}:{port}"),
        base_path,
    })
}

struct ListenerShared {
    state: Mutex<ListenerState>,
    local_addr: Mutex<Option<SocketAddr>>,
}

/// The bound socket and its accept loop.
pub struct HttpListener {
    shared: Arc<ListenerShared>,
    drain_timeout: Duration,
    op_lock: tokio::sync::Mutex<()>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    accept_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for HttpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpListener")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

impl HttpListener {
    /// Create a stopped listener. `drain_timeout` bounds how long `stop`
    /// waits for in-flight connections.
    #[must_use]
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(ListenerShared {
                state: Mutex::new(ListenerState::Stopped),
                local_addr: Mutex::new(None),
            }),
            drain_timeout,
            op_lock: tokio::sync::Mutex::new(()),
            shutdown_tx: Mutex::new(None),
            accept_task: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        *self.shared.state.lock()
    }

    /// Address the socket is bound to, while started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.lock()
    }

    /// Bind `bind_addr` and run the accept loop, serving `service`.
    ///
    /// Idempotent: when already listening the running instance is left in
    /// place and its address returned.
    pub async fn start(
        &self,
        bind_addr: &str,
        service: HostService,
    ) -> HostResult<SocketAddr> {
        let _guard = self.op_lock.lock().await;

        {
            let mut state = self.shared.state.lock();
            if *state == ListenerState::Listening {
                // Already running; leave it in place.
                return self
                    .local_addr()
                    .ok_or_else(|| HostError::listener("listening without a bound address"));
            }
            *state = ListenerState::Starting;
        }

        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.shared.state.lock() = ListenerState::Stopped;
                return Err(HostError::listener(format!(
                    "failed to bind {bind_addr}: {e}"
                )));
            }
        };
        let addr = listener
            .local_addr()
            .map_err(|e| HostError::listener(format!("no local address: {e}")))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock() = Some(shutdown_tx);
        *self.shared.local_addr.lock() = Some(addr);
        *self.shared.state.lock() = ListenerState::Listening;

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(accept_loop(shared, listener, service, shutdown_rx));
        *self.accept_task.lock().await = Some(task);

        tracing::info!(%addr, "listener started");
        Ok(addr)
    }

    /// Stop accepting and drain live connections. Idempotent.
    pub async fn stop(&self) {
        let _guard = self.op_lock.lock().await;

        {
            let mut state = self.shared.state.lock();
            if *state != ListenerState::Listening {
                return;
            }
            *state = ListenerState::Stopping;
        }

        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(true);
        }

        // The accept task drains watched connections before it exits.
        if let Some(task) = self.accept_task.lock().await.take() {
            if tokio::time::timeout(self.drain_timeout, task).await.is_err() {
                tracing::warn!("listener drain timed out; abandoning connection tasks");
            }
        }

        *self.shared.local_addr.lock() = None;
        *self.shared.state.lock() = ListenerState::Stopped;
        tracing::info!("listener stopped");
    }
}

/// The accept loop: one outstanding accept, spawn-and-re-arm on success.
async fn accept_loop(
    shared: Arc<ListenerShared>,
    listener: TcpListener,
    service: HostService,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let graceful = GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("accept interrupted by shutdown");
                        } else {
                            // Unexpected accept failure: the loop terminates
                            // and the listener is down until restarted.
                            tracing::error!(error = %e, "accept failed; accept loop terminating");
                            *shared.local_addr.lock() = None;
                            *shared.state.lock() = ListenerState::Stopped;
                        }
                        break;
                    }
                };

                // A connection that raced a shutdown is discarded.
                if *shared.state.lock() != ListenerState::Listening {
                    tracing::debug!(%peer_addr, "discarding connection accepted while stopping");
                    break;
                }

                tracing::debug!(%peer_addr, "connection accepted");
                let conn = http.serve_connection(TokioIo::new(stream), service.clone());
                let conn = graceful.watch(conn.into_owned());
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!(%peer_addr, error = %e, "connection error");
                    }
                });
                // The loop re-arms the next accept immediately; request
                // processing continues on the spawned task and the pool.
            }

            _ = shutdown_rx.changed() => {
                tracing::debug!("accept loop received shutdown");
                break;
            }
        }
    }

    // Wait for in-flight connections before the task finishes.
    graceful.shutdown().await;
}
