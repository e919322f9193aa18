//! Tether - a minimal HTTP service skeleton.
//!
//! Tether serves one `GET /status` route behind an ordered middleware
//! pipeline. Every request carries a request-scoped [`RequestContext`]: a
//! string key/value store plus an optional bearer [`Token`] minted by the
//! pipeline. Handlers read that context; they never build it.
//!
//! # Features
//! - Request-scoped context stored in the request extensions, reached through
//!   the [`RequestContextExt`] capability trait and the [`Ctx`] extractor
//! - Short-lived scoped tokens with `exp` and `scopes` claims
//! - Explicit, validated middleware order (context, transport, token, derived state)
//! - Gzip compression, panic recovery and structured access logs via `tower-http`
//! - Central error translation into `{"error": "..."}` JSON bodies
//! - Graceful drain on interrupt with a bounded timeout
//! - Layered configuration: defaults, optional file, `TETHER_*` and `PORT`
//!
//! # Quick Example
//! ```no_run
//! use tether::{
//!     adapters::{Pipeline, router},
//!     config::ServerConfig,
//!     utils::{Server, shutdown_signal},
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = ServerConfig::default();
//! let app = router(&Pipeline::standard(cfg.pipeline_settings()));
//! Server::new(cfg.listen_addr(), cfg.drain_timeout())
//!     .listen(app, shutdown_signal())
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! `core` holds the domain: tokens, the request context and the error
//! taxonomy. `adapters` wires them into axum (middleware, pipeline, the
//! status handler). `utils` owns the listener lifecycle.
//!
//! # Error Handling
//! Request-path failures are [`AppError`]s and are translated in one place.
//! Startup APIs return `eyre::Result<T>` with `WrapErr` context attached.
pub mod config;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{Pipeline, Stage},
    core::{AppError, Ctx, RequestContext, RequestContextExt, Token, TokenIssuer},
    utils::{LifecycleState, Server},
};
