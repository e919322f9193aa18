//! Request-scoped context carried alongside the base request.
//!
//! The base request (method, path, headers, body) stays an
//! [`axum::http::Request`]; the extension lives in its typed extension map and
//! is reached through the [`RequestContextExt`] capability. Middleware stages
//! get `&mut` access, handlers get the read-only [`Ctx`] extractor.
use std::{collections::HashMap, ops::Deref};

use axum::{
    extract::FromRequestParts,
    http::{Request, request::Parts},
};
use thiserror::Error;

use crate::core::{error::AppError, token::Token};

/// Errors raised by the context capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("request context has not been installed for this request")]
    Missing,

    #[error("request context is already installed for this request")]
    AlreadyInstalled,

    #[error("a token is already attached to this request")]
    TokenAlreadyAttached,

    #[error("no token is attached to this request")]
    MissingToken,
}

/// Typed, mutable state owned by a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    store: HashMap<String, String>,
    token: Option<Token>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &HashMap<String, String> {
        &self.store
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.store.get(key).map(String::as_str)
    }

    /// Write an entry, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.store.insert(key.into(), value.into())
    }

    pub fn into_store(self) -> HashMap<String, String> {
        self.store
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// The attached token, or [`ContextError::MissingToken`].
    pub fn require_token(&self) -> Result<&Token, ContextError> {
        self.token.as_ref().ok_or(ContextError::MissingToken)
    }

    /// Attach the request's token. A token can be attached once.
    pub fn attach_token(&mut self, token: Token) -> Result<(), ContextError> {
        if self.token.is_some() {
            return Err(ContextError::TokenAlreadyAttached);
        }
        self.token = Some(token);
        Ok(())
    }
}

/// Access to the [`RequestContext`] of a base request.
pub trait RequestContextExt {
    fn context(&self) -> Result<&RequestContext, ContextError>;

    fn context_mut(&mut self) -> Result<&mut RequestContext, ContextError>;

    /// Install a fresh, empty context. Fails if one is already present.
    fn install_context(&mut self) -> Result<(), ContextError>;
}

impl<B> RequestContextExt for Request<B> {
    fn context(&self) -> Result<&RequestContext, ContextError> {
        self.extensions()
            .get::<RequestContext>()
            .ok_or(ContextError::Missing)
    }

    fn context_mut(&mut self) -> Result<&mut RequestContext, ContextError> {
        self.extensions_mut()
            .get_mut::<RequestContext>()
            .ok_or(ContextError::Missing)
    }

    fn install_context(&mut self) -> Result<(), ContextError> {
        if self.extensions().get::<RequestContext>().is_some() {
            return Err(ContextError::AlreadyInstalled);
        }
        self.extensions_mut().insert(RequestContext::new());
        Ok(())
    }
}

impl RequestContextExt for Parts {
    fn context(&self) -> Result<&RequestContext, ContextError> {
        self.extensions
            .get::<RequestContext>()
            .ok_or(ContextError::Missing)
    }

    fn context_mut(&mut self) -> Result<&mut RequestContext, ContextError> {
        self.extensions
            .get_mut::<RequestContext>()
            .ok_or(ContextError::Missing)
    }

    fn install_context(&mut self) -> Result<(), ContextError> {
        if self.extensions.get::<RequestContext>().is_some() {
            return Err(ContextError::AlreadyInstalled);
        }
        self.extensions.insert(RequestContext::new());
        Ok(())
    }
}

/// Read-only handler view of the request context.
///
/// Extraction moves the context out of the request, so it must be the last
/// consumer of the context on the request path.
#[derive(Debug)]
pub struct Ctx(RequestContext);

impl Ctx {
    pub fn into_inner(self) -> RequestContext {
        self.0
    }
}

impl Deref for Ctx {
    type Target = RequestContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .remove::<RequestContext>()
            .map(Ctx)
            .ok_or_else(|| ContextError::Missing.into())
    }
}
