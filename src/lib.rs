// ABOUTME: Library entry point for the multi-provider OAuth token lifecycle manager
// ABOUTME: Exposes the store, adapters, token manager, flow controller, and HTTP boundary
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

#![deny(unsafe_code)]

//! # Connect Hub
//!
//! Multi-provider OAuth integration and token lifecycle manager. Lets an
//! account connect third-party services (Google, Notion, Slack, Stripe),
//! persists the resulting credentials encrypted at rest, keeps them valid
//! over time, reports their status, and revokes them on demand.
//!
//! ## Architecture
//!
//! - **[`store`]**: SQLite-backed credential persistence, the only component
//!   touching durable storage
//! - **[`providers`]**: one adapter per provider behind a shared trait;
//!   adapters own endpoints, consent flags, and refresh/revoke policy
//! - **[`token_manager`]**: the sole entry point for other subsystems;
//!   issues, refreshes, lists, validates, and revokes credentials
//! - **[`flow`]**: authorization attempts with single-use anti-forgery state
//!   tokens
//! - **[`routes`]**: thin Axum boundary mapping outcomes to redirects and
//!   status codes
//!
//! ## Example
//!
//! ```rust,no_run
//! use connect_hub::config::ServerConfig;
//! use connect_hub::errors::TokenResult;
//!
//! fn main() -> TokenResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("listening on port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Environment-driven server and provider configuration
pub mod config;

/// Unified error taxonomy
pub mod errors;

/// Authorization flow controller and state-token handling
pub mod flow;

/// Structured logging setup
pub mod logging;

/// Credential data model and at-rest encryption
pub mod models;

/// Provider adapters and registry
pub mod providers;

/// HTTP boundary routes
pub mod routes;

/// Durable credential storage
pub mod store;

/// Token lifecycle orchestration
pub mod token_manager;
