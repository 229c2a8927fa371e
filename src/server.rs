//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Moving the dispatcher to `Closing`. Requests keep arriving while the
//!    endpoint is being removed from the load balancer; they get a 503.
//! 2. After the grace period, moving to `Closed` and stopping
//!    `listener.accept()`.
//! 3. Letting every in-flight connection task run to completion.
//! 4. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Keep the grace period plus your slowest request below
//! `terminationGracePeriodSeconds`.
//!
//! Calling [`Dispatcher::close`] (or `graceful_close`) from anywhere else
//! stops the server the same way.

use std::net::SocketAddr;
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app::App;
use crate::dispatcher::Dispatcher;
use crate::error::Error;

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    grace_period: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use catena::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr, grace_period: DEFAULT_GRACE_PERIOD }
    }

    /// How long the dispatcher stays `Closing` after a shutdown signal.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Builds `app` and serves it. See [`serve_dispatcher`](Self::serve_dispatcher).
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_dispatcher(app.build()).await
    }

    /// Starts accepting connections and dispatching them.
    ///
    /// Returns only after the dispatcher reached `Closed` and every
    /// in-flight connection finished.
    pub async fn serve_dispatcher(self, dispatcher: Dispatcher) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "catena listening");

        // Every spawned connection task, so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        let mut signalled = false;

        let closed = dispatcher.closed();
        tokio::pin!(closed);

        loop {
            tokio::select! {
                biased;

                () = &mut closed => {
                    info!(in_flight = tasks.len(), "closed, draining connections");
                    break;
                }

                () = &mut shutdown, if !signalled => {
                    signalled = true;
                    info!(grace_ms = self.grace_period.as_millis() as u64, "shutdown signal received");
                    let dispatcher = dispatcher.clone();
                    let grace = self.grace_period;
                    tokio::spawn(async move { dispatcher.graceful_close(grace).await });
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = dispatcher.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = dispatcher.clone();
                            async move {
                                Ok::<_, std::convert::Infallible>(dispatcher.dispatch(req, Some(remote_addr)).await)
                            }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the JoinSet does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("catena stopped");
        Ok(())
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
