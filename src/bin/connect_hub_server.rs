// ABOUTME: Server binary wiring configuration, store, adapters, and the HTTP boundary
// ABOUTME: Registers every configured provider and serves the integration routes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Connect Hub server entry point.

use anyhow::{Context, Result};
use clap::Parser;
use connect_hub::config::ServerConfig;
use connect_hub::flow::FlowController;
use connect_hub::logging::LoggingConfig;
use connect_hub::providers::{
    google::GoogleAdapter, http_client, notion::NotionAdapter, slack::SlackAdapter,
    stripe::StripeAdapter, ProviderRegistry,
};
use connect_hub::routes::{router, AppState};
use connect_hub::store::CredentialStore;
use connect_hub::token_manager::TokenManager;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "connect-hub-server", about = "OAuth integration and token lifecycle manager")]
struct Args {
    /// Override the HTTP port from configuration
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    LoggingConfig::from_env().init()?;

    let mut config = ServerConfig::from_env().context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.http_port = port;
    }

    let store = Arc::new(
        CredentialStore::new(&config.database_url, config.encryption_key.clone())
            .await
            .context("failed to open credential store")?,
    );

    let client = http_client()?;
    let mut registry = ProviderRegistry::new();

    config.providers.google.log_diagnostics("google");
    if config.providers.google.enabled {
        registry.register(Arc::new(GoogleAdapter::new(
            &config.providers.google,
            client.clone(),
        )?));
    }
    config.providers.notion.log_diagnostics("notion");
    if config.providers.notion.enabled {
        registry.register(Arc::new(NotionAdapter::new(
            &config.providers.notion,
            client.clone(),
        )?));
    }
    config.providers.slack.log_diagnostics("slack");
    if config.providers.slack.enabled {
        registry.register(Arc::new(SlackAdapter::new(
            &config.providers.slack,
            client.clone(),
        )?));
    }
    config.providers.stripe.log_diagnostics("stripe");
    if config.providers.stripe.enabled {
        registry.register(Arc::new(StripeAdapter::new(
            &config.providers.stripe,
            client,
        )?));
    }

    let manager = Arc::new(TokenManager::new(store, Arc::new(registry)));

    let flow = FlowController::new(Arc::clone(&manager))
        .with_scope_override("google", config.providers.google.scopes.clone())
        .with_scope_override("notion", config.providers.notion.scopes.clone())
        .with_scope_override("slack", config.providers.slack.scopes.clone())
        .with_scope_override("stripe", config.providers.stripe.scopes.clone());

    let state = AppState {
        flow: Arc::new(flow),
        manager,
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;

    info!(port = config.http_port, "connect-hub server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
