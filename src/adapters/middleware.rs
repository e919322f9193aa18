//! Middleware stages run around every handler.
//!
//! Each stage is a plain `axum::middleware::from_fn` function. Stages that can
//! fail return `Result<Response, AppError>`: an `Err` short-circuits the chain
//! (nothing further down runs) and is translated by [`AppError`]'s
//! `IntoResponse` impl. The order the stages run in is owned by
//! [`Pipeline`](crate::adapters::pipeline::Pipeline), not by this module.
use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{SecondsFormat, Utc};

use crate::core::{
    context::RequestContextExt,
    error::{AppError, ErrorKind},
    token::TokenIssuer,
};

/// Store key holding the request timestamp written by [`with_request_time`].
pub const NOW_KEY: &str = "now";

/// Install an empty [`RequestContext`](crate::core::context::RequestContext)
/// on the request. Must be the outermost stage.
pub async fn with_request_context(mut req: Request, next: Next) -> Result<Response, AppError> {
    req.install_context()?;
    Ok(next.run(req).await)
}

/// Mint a token for the request and attach it to the context.
pub async fn with_default_token(
    State(issuer): State<Arc<TokenIssuer>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = issuer.issue()?;
    tracing::debug!(expires_at = %token.expiry(), "issued request token");

    req.context_mut()?.attach_token(token)?;
    Ok(next.run(req).await)
}

/// Populate the store with fixed entries and the time the request was seen.
pub async fn with_request_time(mut req: Request, next: Next) -> Result<Response, AppError> {
    let ctx = req.context_mut()?;
    ctx.insert("key", "value");
    ctx.insert("foo", "bar");
    ctx.insert(
        NOW_KEY,
        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
    );

    Ok(next.run(req).await)
}

/// One structured line per request.
///
/// Error responses carry the [`ErrorKind`] set by the error translator, so the
/// line says how a failure was classified without re-reading the body.
pub async fn access_log(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let has_context = req.context().is_ok();

    let response = next.run(req).await;
    let error_kind = response.extensions().get::<ErrorKind>().copied();

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        error_kind = ?error_kind,
        has_context,
        latency_ms = start.elapsed().as_secs_f64() * 1000.0,
        "request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use axum::{
        Router,
        body::Body,
        http::StatusCode,
        middleware,
        routing::get,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::core::context::Ctx;

    async fn echo_store(ctx: Ctx) -> String {
        let mut entries: Vec<_> = ctx
            .store()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        entries.sort();
        format!("{} token={}", entries.join(","), ctx.token().is_some())
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_root() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_stage_after_context_can_write_store() {
        let app = Router::new()
            .route("/", get(echo_store))
            .layer(middleware::from_fn(|mut req: Request, next: Next| async move {
                req.context_mut()?.insert("tenant", "acme");
                Ok::<_, AppError>(next.run(req).await)
            }))
            .layer(middleware::from_fn(with_request_context));

        let response = app.oneshot(get_root()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "tenant=acme token=false");
    }

    #[tokio::test]
    async fn test_stage_before_context_fails_capability_check() {
        // Layers added later wrap the earlier ones, so this stage runs first.
        let app = Router::new()
            .route("/", get(echo_store))
            .layer(middleware::from_fn(with_request_context))
            .layer(middleware::from_fn(with_request_time));

        let response = app.oneshot(get_root()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_string(response).await,
            r#"{"error":"request context unavailable"}"#
        );
    }

    #[tokio::test]
    async fn test_token_stage_attaches_token() {
        let issuer = Arc::new(TokenIssuer::default());
        let app = Router::new()
            .route("/", get(echo_store))
            .layer(middleware::from_fn_with_state(issuer, with_default_token))
            .layer(middleware::from_fn(with_request_context));

        let response = app.oneshot(get_root()).await.unwrap();
        assert_eq!(body_string(response).await, " token=true");
    }

    #[tokio::test]
    async fn test_failing_stage_short_circuits_before_token_and_handler() {
        let handler_ran = Arc::new(AtomicBool::new(false));
        let flag = handler_ran.clone();
        let issuer = Arc::new(TokenIssuer::default());

        let app = Router::new()
            .route(
                "/",
                get(move |ctx: Ctx| {
                    let flag = flag.clone();
                    async move {
                        flag.store(true, Ordering::SeqCst);
                        format!("{}", ctx.token().is_some())
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(issuer, with_default_token))
            .layer(middleware::from_fn(|_req: Request, _next: Next| async move {
                Err::<Response, _>(AppError::domain(
                    StatusCode::FORBIDDEN,
                    "forbidden",
                    "caller is on the deny list",
                ))
            }))
            .layer(middleware::from_fn(with_request_context));

        let response = app.oneshot(get_root()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_string(response).await, r#"{"error":"forbidden"}"#);
        assert!(!handler_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_access_log_passes_responses_through() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/denied",
                get(|| async {
                    Err::<(), _>(AppError::domain(
                        StatusCode::FORBIDDEN,
                        "forbidden",
                        "caller is on the deny list",
                    ))
                }),
            )
            .layer(middleware::from_fn(access_log));

        let response = app.clone().oneshot(get_root()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.extensions().get::<ErrorKind>().is_none());
        assert_eq!(body_string(response).await, "ok");

        let response = app
            .oneshot(Request::builder().uri("/denied").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.extensions().get::<ErrorKind>(),
            Some(&ErrorKind::Domain)
        );
        assert_eq!(body_string(response).await, r#"{"error":"forbidden"}"#);
    }

    #[tokio::test]
    async fn test_request_time_stage_populates_store() {
        let app = Router::new()
            .route(
                "/",
                get(|ctx: Ctx| async move {
                    let now = ctx.get(NOW_KEY).unwrap_or_default();
                    let parsed = chrono::DateTime::parse_from_rfc3339(now).is_ok();
                    format!(
                        "{}|{}|{parsed}",
                        ctx.get("key").unwrap_or_default(),
                        ctx.get("foo").unwrap_or_default()
                    )
                }),
            )
            .layer(middleware::from_fn(with_request_time))
            .layer(middleware::from_fn(with_request_context));

        let response = app.oneshot(get_root()).await.unwrap();
        assert_eq!(body_string(response).await, "value|bar|true");
    }
}
