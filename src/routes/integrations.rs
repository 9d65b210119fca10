// ABOUTME: Integration route handlers for connect, callback, status, and disconnect
// ABOUTME: Connect and callback answer with redirects; status and disconnect with JSON
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Integration endpoints.
//!
//! - `GET /connect/{provider}` redirects the user to the provider consent page
//! - `GET /connect/{provider}/callback` terminates the flow and redirects to
//!   the integrations page with a success or error indicator
//! - `GET /integrations/status` reports connection summaries and validity
//! - `POST /integrations/disconnect` revokes (best-effort) and removes a
//!   connection

use super::{AccountId, ApiError, AppState};
use crate::flow::{CallbackOutcome, CallbackParams};
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::error;

/// Build the integration router.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/connect/:provider", get(connect))
        .route("/connect/:provider/callback", get(callback))
        .route("/integrations/status", get(status))
        .route("/integrations/disconnect", post(disconnect))
        .with_state(state)
}

async fn connect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    AccountId(account_id): AccountId,
) -> Result<Redirect, ApiError> {
    let redirect = state.flow.initiate(account_id, &provider, None).await?;
    Ok(Redirect::to(&redirect.authorization_url))
}

async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    match state.flow.handle_callback(&provider, params).await {
        Ok(CallbackOutcome::Exchanged { provider, .. }) => {
            Redirect::to(&format!("/integrations?connected={provider}"))
        }
        Ok(CallbackOutcome::Failed { failure }) => {
            Redirect::to(&format!("/integrations?error={}", failure.code()))
        }
        Err(e) => {
            error!(provider, error = %e, "callback handling failed internally");
            Redirect::to(&format!("/integrations?error={}", e.code()))
        }
    }
}

async fn status(
    State(state): State<AppState>,
    AccountId(account_id): AccountId,
) -> Result<Json<serde_json::Value>, ApiError> {
    let connections = state.manager.list_connections(account_id).await?;
    let status = state.manager.validate_all(account_id).await?;

    Ok(Json(serde_json::json!({
        "connections": connections,
        "status": status,
    })))
}

#[derive(Debug, Deserialize)]
struct DisconnectRequest {
    provider: String,
}

async fn disconnect(
    State(state): State<AppState>,
    AccountId(account_id): AccountId,
    Json(request): Json<DisconnectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .manager
        .disconnect(account_id, &request.provider)
        .await?;

    Ok(Json(serde_json::json!({
        "disconnected": request.provider,
    })))
}
