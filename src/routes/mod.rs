// ABOUTME: HTTP boundary assembling the integration and health routers
// ABOUTME: Maps core outcomes to redirects and status codes; account identity comes from upstream
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! HTTP routes.
//!
//! The boundary is deliberately thin: handlers translate between HTTP and
//! the flow controller / token manager, and map [`TokenError`] values to
//! status codes and redirect indicators. The authenticated account id is an
//! opaque input supplied by the upstream session layer in the
//! `x-account-id` header.

pub mod health;
pub mod integrations;

use crate::errors::TokenError;
use crate::flow::FlowController;
use crate::token_manager::TokenManager;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the authenticated account id, set by the session layer.
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Authorization flow controller
    pub flow: Arc<FlowController>,
    /// Token manager
    pub manager: Arc<TokenManager>,
}

/// Build the full application router.
#[must_use]
pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .merge(integrations::routes(state))
        .merge(health::routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Authenticated account id extracted from the request.
#[derive(Debug, Clone, Copy)]
pub struct AccountId(pub Uuid);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AccountId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ACCOUNT_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(unauthorized)?;

        let account_id = Uuid::parse_str(header).map_err(|_| unauthorized())?;
        Ok(Self(account_id))
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": { "code": "unauthenticated", "message": "Missing or invalid account identity" }
        })),
    )
        .into_response()
}

/// Boundary wrapper turning [`TokenError`] into an HTTP response.
///
/// The response body carries only the error code and the user-facing
/// message; provider bodies and token material never leave the process.
pub struct ApiError(pub TokenError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "error": { "code": self.0.code(), "message": self.0.user_message() }
        }));
        tracing::debug!(error = %self.0, status = %status, "request failed");
        (status, body).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(error: TokenError) -> Self {
        Self(error)
    }
}
