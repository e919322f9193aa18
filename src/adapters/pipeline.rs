//! The ordered middleware pipeline.
//!
//! The pipeline is an explicit list of [`Stage`]s, built once at startup and
//! read-only afterwards. The first stage in the list is the first to see a
//! request. Ordering rules:
//!
//! 1. [`Stage::RequestContext`] comes first; every other stage and the
//!    handler depend on the context it installs.
//! 2. Transport stages ([`Stage::AccessLog`], [`Stage::Recover`],
//!    [`Stage::Compression`]) come before any application stage, so failures
//!    further in are still logged and converted to a safe response.
//! 3. [`Stage::DefaultToken`] runs before derived-state stages.
use std::{collections::HashSet, fmt, sync::Arc};

use axum::{Router, middleware};
use thiserror::Error;
use tower_http::{
    CompressionLevel, catch_panic::CatchPanicLayer, compression::CompressionLayer,
    trace::TraceLayer,
};

use crate::{
    adapters::middleware::{
        access_log, with_default_token, with_request_context, with_request_time,
    },
    core::{error::panic_response, token::TokenIssuer},
};

/// Gzip quality used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 5;

/// A single middleware stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Installs the request context.
    RequestContext,
    /// Request span plus start/finish log lines.
    AccessLog,
    /// Converts panics into an unclassified error response.
    Recover,
    /// Gzip response compression.
    Compression,
    /// Mints and attaches the request token.
    DefaultToken,
    /// Writes fixed entries and the request time into the store.
    RequestTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageClass {
    Context,
    Transport,
    Token,
    DerivedState,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Self::RequestContext => "request_context",
            Self::AccessLog => "access_log",
            Self::Recover => "recover",
            Self::Compression => "compression",
            Self::DefaultToken => "default_token",
            Self::RequestTime => "request_time",
        }
    }

    fn class(self) -> StageClass {
        match self {
            Self::RequestContext => StageClass::Context,
            Self::AccessLog | Self::Recover | Self::Compression => StageClass::Transport,
            Self::DefaultToken => StageClass::Token,
            Self::RequestTime => StageClass::DerivedState,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordering violations detected by [`Pipeline::new`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline has no stages")]
    Empty,

    #[error("the request_context stage must run first, found {0}")]
    ContextNotFirst(Stage),

    #[error("stage {0} appears more than once")]
    Duplicate(Stage),

    #[error("transport stage {stage} must run before application stage {after}")]
    TransportAfterApplication { stage: Stage, after: Stage },

    #[error("stage {stage} must run after the default_token stage")]
    BeforeToken { stage: Stage },
}

/// Settings consumed by the stages that need them.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub issuer: TokenIssuer,
    pub compression_level: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            issuer: TokenIssuer::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// A validated, immutable stage ordering.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    issuer: Arc<TokenIssuer>,
    compression_level: u32,
}

impl Pipeline {
    /// Build a pipeline from an explicit ordering.
    pub fn new(stages: Vec<Stage>, settings: PipelineSettings) -> Result<Self, PipelineError> {
        validate(&stages)?;
        Ok(Self {
            stages,
            issuer: Arc::new(settings.issuer),
            compression_level: settings.compression_level,
        })
    }

    /// The service's stage ordering.
    pub fn standard(settings: PipelineSettings) -> Self {
        Self {
            stages: Self::STANDARD.to_vec(),
            issuer: Arc::new(settings.issuer),
            compression_level: settings.compression_level,
        }
    }

    pub const STANDARD: [Stage; 6] = [
        Stage::RequestContext,
        Stage::AccessLog,
        Stage::Recover,
        Stage::Compression,
        Stage::DefaultToken,
        Stage::RequestTime,
    ];

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Wrap every route and fallback of `router` in the pipeline's stages.
    ///
    /// Call after all routes are registered: axum only layers what exists.
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // The last layer added is the outermost, so walk the list backwards.
        self.stages
            .iter()
            .rev()
            .fold(router, |router, stage| match stage {
                Stage::RequestContext => router.layer(middleware::from_fn(with_request_context)),
                Stage::AccessLog => router
                    .layer(middleware::from_fn(access_log))
                    .layer(TraceLayer::new_for_http()),
                Stage::Recover => router.layer(CatchPanicLayer::custom(panic_response)),
                Stage::Compression => router.layer(
                    CompressionLayer::new()
                        .no_br()
                        .no_deflate()
                        .no_zstd()
                        .quality(CompressionLevel::Precise(self.compression_level as i32)),
                ),
                Stage::DefaultToken => router.layer(middleware::from_fn_with_state(
                    self.issuer.clone(),
                    with_default_token,
                )),
                Stage::RequestTime => router.layer(middleware::from_fn(with_request_time)),
            })
    }
}

fn validate(stages: &[Stage]) -> Result<(), PipelineError> {
    let first = stages.first().ok_or(PipelineError::Empty)?;
    if *first != Stage::RequestContext {
        return Err(PipelineError::ContextNotFirst(*first));
    }

    let mut seen = HashSet::new();
    let mut first_application: Option<Stage> = None;
    let has_token_stage = stages.contains(&Stage::DefaultToken);

    for &stage in stages {
        if !seen.insert(stage) {
            return Err(PipelineError::Duplicate(stage));
        }

        match stage.class() {
            StageClass::Context => {}
            StageClass::Transport => {
                if let Some(after) = first_application {
                    return Err(PipelineError::TransportAfterApplication { stage, after });
                }
            }
            StageClass::Token => {
                first_application.get_or_insert(stage);
            }
            StageClass::DerivedState => {
                if has_token_stage && !seen.contains(&Stage::DefaultToken) {
                    return Err(PipelineError::BeforeToken { stage });
                }
                first_application.get_or_insert(stage);
            }
        }
    }

    Ok(())
}
