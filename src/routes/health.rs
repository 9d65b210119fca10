// ABOUTME: Health check route handlers for service monitoring
// ABOUTME: Provides liveness and readiness endpoints for load balancers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Health check routes for service monitoring.

use axum::routing::get;
use axum::{Json, Router};

/// Build the health router.
#[must_use]
pub fn routes() -> Router {
    async fn health_handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }

    Router::new().route("/health", get(health_handler))
}
