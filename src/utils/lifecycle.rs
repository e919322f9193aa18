//! Listener lifecycle: bind, serve, drain on interrupt.
//!
//! ```text
//! Starting ──bind ok──> Listening ──interrupt──> Draining ──drained──> Stopped
//!     │                     │                        │
//!     └──────bind error─────┴──────serve error───────┴──timeout──> Failed
//! ```
//!
//! Two one-shot channels connect the background signal task with the rest:
//! the first tells axum to stop accepting and drain, the second carries the
//! drain outcome back to [`Server::serve`].
use std::{
    future::{Future, IntoFuture},
    io,
    sync::Arc,
    time::Duration,
};

use axum::Router;
use thiserror::Error;
use tokio::{
    net::TcpListener,
    sync::{oneshot, watch},
    task::JoinHandle,
    time::timeout,
};

/// Drain budget used when none is configured.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Listening,
    Draining,
    Stopped,
    Failed,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    #[error("server stopped before a shutdown signal was received")]
    StoppedUnexpectedly,

    #[error("graceful drain did not finish within {0:?}")]
    DrainTimeout(Duration),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("shutdown outcome was never reported")]
    OutcomeLost,
}

/// The HTTP server and its lifecycle state machine.
pub struct Server {
    addr: String,
    drain_timeout: Duration,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Server {
    /// Configure a server for `addr`. Nothing is bound until [`Server::bind`].
    pub fn new(addr: impl Into<String>, drain_timeout: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            addr: addr.into(),
            drain_timeout,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Bind the listener. On failure the server moves straight to `Failed`.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        match TcpListener::bind(&self.addr).await {
            Ok(listener) => {
                self.state.send_replace(LifecycleState::Listening);
                if let Ok(local_addr) = listener.local_addr() {
                    tracing::info!(addr = %local_addr, "tether listening");
                }
                Ok(listener)
            }
            Err(source) => {
                self.state.send_replace(LifecycleState::Failed);
                tracing::error!(addr = %self.addr, error = %source, "failed to bind listener");
                Err(ServerError::Bind {
                    addr: self.addr.clone(),
                    source,
                })
            }
        }
    }

    /// Bind, then serve until `signal` resolves and the drain completes.
    pub async fn listen<F>(&self, app: Router, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve(listener, app, signal).await
    }

    /// Serve `app` on an already bound listener.
    ///
    /// Returns `Ok(())` once `signal` has resolved and every in-flight
    /// request finished inside the drain budget, and an error if the drain
    /// overran it or the server stopped on its own.
    pub async fn serve<F>(
        &self,
        listener: TcpListener,
        app: Router,
        signal: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let (outcome_tx, outcome_rx) = oneshot::channel::<Result<(), ServerError>>();

        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = drain_rx.await;
        });
        let serve_task = tokio::spawn(server.into_future());

        tokio::spawn(drain_on_signal(
            signal,
            serve_task,
            drain_tx,
            outcome_tx,
            self.drain_timeout,
            self.state.clone(),
        ));

        outcome_rx.await.unwrap_or(Err(ServerError::OutcomeLost))
    }
}

async fn drain_on_signal<F>(
    signal: F,
    mut serve_task: JoinHandle<io::Result<()>>,
    drain_tx: oneshot::Sender<()>,
    outcome_tx: oneshot::Sender<Result<(), ServerError>>,
    drain_timeout: Duration,
    state: Arc<watch::Sender<LifecycleState>>,
) where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::select! {
        () = signal => {}
        result = &mut serve_task => {
            let outcome = match result {
                Ok(Ok(())) => Err(ServerError::StoppedUnexpectedly),
                Ok(Err(e)) => Err(ServerError::Serve(e)),
                Err(e) => Err(ServerError::Task(e)),
            };
            state.send_replace(LifecycleState::Failed);
            let _ = outcome_tx.send(outcome);
            return;
        }
    }

    tracing::info!(timeout = ?drain_timeout, "shutting down server: interrupt received");
    state.send_replace(LifecycleState::Draining);
    let _ = drain_tx.send(());

    let outcome = match timeout(drain_timeout, &mut serve_task).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(ServerError::Serve(e)),
        Ok(Err(e)) => Err(ServerError::Task(e)),
        Err(_) => {
            serve_task.abort();
            Err(ServerError::DrainTimeout(drain_timeout))
        }
    };

    match &outcome {
        Ok(()) => {
            state.send_replace(LifecycleState::Stopped);
            tracing::info!("tether stopped");
        }
        Err(e) => {
            state.send_replace(LifecycleState::Failed);
            tracing::error!("shutdown failed: {}", e);
        }
    }

    let _ = outcome_tx.send(outcome);
}

/// Resolves on the first interrupt (Ctrl-C / SIGINT) the process receives.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install interrupt handler: {}", e);
        std::future::pending::<()>().await;
    }
}
