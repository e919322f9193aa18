//! Route table and the status handler.
use std::collections::HashMap;

use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};

use crate::{
    adapters::pipeline::Pipeline,
    core::{
        context::Ctx,
        error::{AppError, method_not_allowed, route_not_found},
    },
};

/// Liveness marker reported by [`status`].
pub const STATUS_UP: &str = "up";

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub store: HashMap<String, String>,
    pub scopes: Vec<String>,
}

/// `GET /status`: liveness plus the request's store and token scopes.
pub async fn status(ctx: Ctx) -> Result<Json<StatusResponse>, AppError> {
    let scopes = ctx.require_token()?.scopes()?;

    Ok(Json(StatusResponse {
        status: STATUS_UP.to_string(),
        store: ctx.into_inner().into_store(),
        scopes,
    }))
}

/// Build the application router with every stage of `pipeline` applied.
pub fn router(pipeline: &Pipeline) -> Router {
    let routes = Router::new()
        .route("/status", get(status))
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed);

    pipeline.apply(routes)
}
