//! Gateway server: accept loop, per-connection tasks and graceful
//! shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{parse_listen_addr, Config};
use crate::error::{GatewayError, Result};
use crate::limit::RuleRegistry;
use crate::proxy::synthetic_response::empty_response;
use crate::proxy::Gateway;

/// Guard to decrement the active connection counter when dropped
struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl ConnectionGuard {
    fn new(counter: Arc<AtomicUsize>, notifier: watch::Sender<()>) -> Self {
        Self { counter, notifier }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.counter.fetch_sub(1, Ordering::Relaxed);
        // Notify when the last connection closes
        if remaining == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// A bound gateway listener ready to serve.
pub struct GatewayServer {
    listener: TcpListener,
    gateway: Arc<Gateway>,
    shutdown_grace: Duration,
}

impl GatewayServer {
    /// Bind the configured listen address and build the request state.
    pub async fn bind(config: &Config, registry: Arc<RuleRegistry>) -> Result<Self> {
        let addr = parse_listen_addr(&config.gateway.listen_addr)?;
        let listener = TcpListener::bind(addr).await.map_err(GatewayError::Io)?;
        let gateway = Arc::new(Gateway::new(config, registry)?);
        Ok(Self {
            listener,
            gateway,
            shutdown_grace: Duration::from_secs(config.gateway.shutdown_grace_secs),
        })
    }

    /// The actual bound address (useful with a `:0` listen port).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(GatewayError::Io)
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Serve until SIGINT or SIGTERM, then drain and tear down.
    pub async fn serve(self) -> Result<()> {
        let mut sigterm = signal(SignalKind::terminate()).map_err(GatewayError::Io)?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(GatewayError::Io)?;
        self.serve_with_shutdown(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
                _ = sigint.recv() => info!("received SIGINT, initiating graceful shutdown"),
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves: stop accepting, wait for in-flight
    /// connections within the grace period, then release all policy state.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self { listener, gateway, shutdown_grace } = self;

        let builder = ConnBuilder::new(TokioExecutor::new());
        let active_connections = Arc::new(AtomicUsize::new(0));
        let (connections_closed_tx, mut connections_closed_rx) = watch::channel(());

        info!(addr = ?listener.local_addr().ok(), "gateway listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept error");
                            continue;
                        }
                    };

                    active_connections.fetch_add(1, Ordering::Relaxed);
                    let guard = ConnectionGuard::new(
                        Arc::clone(&active_connections),
                        connections_closed_tx.clone(),
                    );
                    let gateway = Arc::clone(&gateway);
                    let builder = builder.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                            let gateway = Arc::clone(&gateway);
                            async move {
                                // Handler panics become 500s instead of
                                // tearing down the connection task.
                                let response = AssertUnwindSafe(gateway.handle(req, peer))
                                    .catch_unwind()
                                    .await
                                    .unwrap_or_else(|_| {
                                        error!(?peer, "request handler panicked");
                                        empty_response(StatusCode::INTERNAL_SERVER_ERROR)
                                    });
                                Ok::<_, hyper::Error>(response)
                            }
                        });
                        if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                            debug!(?peer, error = %e, "serve_connection error");
                        }
                    });
                }
            }
        }

        let active = active_connections.load(Ordering::Relaxed);
        if active > 0 {
            info!(
                active_connections = active,
                "waiting for in-flight connections (grace {}s)",
                shutdown_grace.as_secs()
            );
            let deadline = Instant::now() + shutdown_grace;
            loop {
                tokio::select! {
                    changed = connections_closed_rx.changed() => {
                        if changed.is_err() || active_connections.load(Ordering::Relaxed) == 0 {
                            info!("all connections closed");
                            break;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!(
                            active_connections = active_connections.load(Ordering::Relaxed),
                            "shutdown grace elapsed with connections still active"
                        );
                        break;
                    }
                }
            }
        }

        gateway.registry().close();
        info!("gateway stopped");
        Ok(())
    }
}
