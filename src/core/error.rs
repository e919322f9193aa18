//! Error classification and translation into wire responses.
//!
//! Every failure produced while serving a request ends up as an [`AppError`]
//! and is translated exactly once, by its [`IntoResponse`] impl, into a
//! status code and a `{"error": <message>}` body. Only [`AppError::Domain`]
//! carries caller-facing text; the other kinds answer with a fixed message so
//! internal error text never reaches the wire. The internal cause is always
//! logged server side.
use std::any::Any;

use axum::{
    Json,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{context::ContextError, token::TokenError};

/// Boxed error used as the payload of every [`AppError`] variant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message returned for every error whose text must not be exposed.
pub const DEFAULT_ERROR_MESSAGE: &str = "unexpected error occurred";
/// Status returned for unclassified errors.
pub const DEFAULT_STATUS: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

/// A request failure, tagged by where it came from.
#[derive(Error, Debug)]
pub enum AppError {
    /// Raised by the routing/transport layer. The status is predetermined
    /// and the error text stays private.
    #[error("{status}: {source}")]
    Framework {
        status: StatusCode,
        #[source]
        source: BoxError,
    },

    /// Raised by application code with an explicit, caller-safe message.
    #[error("{public}")]
    Domain {
        status: StatusCode,
        public: String,
        #[source]
        internal: BoxError,
    },

    /// Anything else.
    #[error(transparent)]
    Unclassified(BoxError),
}

impl AppError {
    pub fn framework(status: StatusCode, source: impl Into<BoxError>) -> Self {
        Self::Framework {
            status,
            source: source.into(),
        }
    }

    pub fn domain(
        status: StatusCode,
        public: impl Into<String>,
        internal: impl Into<BoxError>,
    ) -> Self {
        Self::Domain {
            status,
            public: public.into(),
            internal: internal.into(),
        }
    }

    pub fn unclassified(source: impl Into<BoxError>) -> Self {
        Self::Unclassified(source.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Framework { .. } => ErrorKind::Framework,
            Self::Domain { .. } => ErrorKind::Domain,
            Self::Unclassified(_) => ErrorKind::Unclassified,
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        let public = match &err {
            TokenError::MissingClaim { .. } | TokenError::InvalidClaimType { .. } => {
                "invalid token"
            }
            _ => "unable to issue token",
        };
        Self::domain(StatusCode::INTERNAL_SERVER_ERROR, public, err)
    }
}

impl From<ContextError> for AppError {
    fn from(err: ContextError) -> Self {
        let public = match &err {
            ContextError::MissingToken => "invalid token",
            _ => "request context unavailable",
        };
        Self::domain(StatusCode::INTERNAL_SERVER_ERROR, public, err)
    }
}

/// The classification tag of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Framework,
    Domain,
    Unclassified,
}

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Outcome of [`translate`]: what goes on the wire and what went to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub body: ErrorBody,
    /// The text written to the server log for this failure.
    pub logged: String,
}

/// Classify `err`, log its internal cause and return the public response parts.
pub fn translate(err: &AppError) -> Classified {
    let classified = match err {
        AppError::Framework { status, source } => Classified {
            kind: ErrorKind::Framework,
            status: *status,
            body: ErrorBody::new(DEFAULT_ERROR_MESSAGE),
            logged: source.to_string(),
        },
        AppError::Domain {
            status,
            public,
            internal,
        } => Classified {
            kind: ErrorKind::Domain,
            status: *status,
            body: ErrorBody::new(public.as_str()),
            logged: internal.to_string(),
        },
        AppError::Unclassified(source) => Classified {
            kind: ErrorKind::Unclassified,
            status: DEFAULT_STATUS,
            body: ErrorBody::new(DEFAULT_ERROR_MESSAGE),
            logged: source.to_string(),
        },
    };

    if classified.status.is_server_error() {
        tracing::error!(
            kind = ?classified.kind,
            status = classified.status.as_u16(),
            error = %classified.logged,
            "request failed"
        );
    } else {
        tracing::warn!(
            kind = ?classified.kind,
            status = classified.status.as_u16(),
            error = %classified.logged,
            "request rejected"
        );
    }

    classified
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let Classified {
            kind, status, body, ..
        } = translate(&self);
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(kind);
        response
    }
}

/// Router fallback for paths with no registered route.
pub async fn route_not_found(uri: Uri) -> AppError {
    AppError::framework(StatusCode::NOT_FOUND, format!("no route for {uri}"))
}

/// Router fallback for a known path hit with the wrong method.
pub async fn method_not_allowed(uri: Uri) -> AppError {
    AppError::framework(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("method not allowed for {uri}"),
    )
}

/// Response for a handler or stage that panicked; used by the recovery stage.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    AppError::unclassified(format!("panic: {message}")).into_response()
}
