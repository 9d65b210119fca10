// ABOUTME: Environment-driven configuration for the server and provider credentials
// ABOUTME: Loads per-provider OAuth client settings and the at-rest encryption key
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Server configuration, loaded entirely from environment variables.
//!
//! Provider client credentials follow a `{PREFIX}_CLIENT_ID` /
//! `{PREFIX}_CLIENT_SECRET` / `{PREFIX}_REDIRECT_URI` / `{PREFIX}_SCOPES`
//! naming scheme. Secrets are never logged; diagnostics use SHA-256
//! fingerprints so deployed values can be compared without exposure.

use crate::errors::{TokenError, TokenResult};
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use std::env;
use tracing::{info, warn};

/// Default HTTP port for the server.
pub const DEFAULT_HTTP_PORT: u16 = 8081;

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP boundary listens on
    pub http_port: u16,
    /// SQLite database URL for the credential store
    pub database_url: String,
    /// Public base URL used to derive default redirect URIs
    pub public_base_url: String,
    /// 32-byte AES-256 key for token encryption at rest
    pub encryption_key: Vec<u8>,
    /// Per-provider OAuth client configuration
    pub providers: ProvidersConfig,
}

/// OAuth client configuration for every supported provider.
#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    /// Google (calendar/workspace)
    pub google: OAuthProviderConfig,
    /// Notion (knowledge base)
    pub notion: OAuthProviderConfig,
    /// Slack (chat)
    pub slack: OAuthProviderConfig,
    /// Stripe Connect (payments)
    pub stripe: OAuthProviderConfig,
}

/// OAuth client configuration for one provider.
#[derive(Debug, Clone, Default)]
pub struct OAuthProviderConfig {
    /// OAuth client id
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Redirect URI registered with the provider
    pub redirect_uri: Option<String>,
    /// Scope override; empty means the adapter's defaults apply
    pub scopes: Vec<String>,
    /// Whether the provider is configured and should be registered
    pub enabled: bool,
}

impl ServerConfig {
    /// Load the full configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] when a set value cannot be parsed
    /// (port, encryption key).
    pub fn from_env() -> TokenResult<Self> {
        let http_port = match env::var("HTTP_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|e| TokenError::Config(format!("invalid HTTP_PORT: {e}")))?,
            Err(_) => DEFAULT_HTTP_PORT,
        };

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/connect_hub.db?mode=rwc".into());

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{http_port}"));

        let encryption_key = load_encryption_key()?;

        let providers = ProvidersConfig {
            google: OAuthProviderConfig::load("GOOGLE", &public_base_url, "google"),
            notion: OAuthProviderConfig::load("NOTION", &public_base_url, "notion"),
            slack: OAuthProviderConfig::load("SLACK", &public_base_url, "slack"),
            stripe: OAuthProviderConfig::load("STRIPE", &public_base_url, "stripe"),
        };

        Ok(Self {
            http_port,
            database_url,
            public_base_url,
            encryption_key,
            providers,
        })
    }
}

impl OAuthProviderConfig {
    /// Load one provider's client configuration from `{prefix}_*` variables.
    #[must_use]
    pub fn load(prefix: &str, public_base_url: &str, provider: &str) -> Self {
        let client_id = env::var(format!("{prefix}_CLIENT_ID")).ok();
        let client_secret = env::var(format!("{prefix}_CLIENT_SECRET")).ok();
        let redirect_uri = env::var(format!("{prefix}_REDIRECT_URI"))
            .ok()
            .or_else(|| Some(format!("{public_base_url}/connect/{provider}/callback")));

        let scopes = env::var(format!("{prefix}_SCOPES"))
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let enabled = client_id.is_some() && client_secret.is_some();

        Self {
            client_id,
            client_secret,
            redirect_uri,
            scopes,
            enabled,
        }
    }

    /// SHA-256 fingerprint of the client secret (first 8 hex chars), for
    /// comparing deployed secrets without logging their values.
    #[must_use]
    pub fn secret_fingerprint(&self) -> Option<String> {
        self.client_secret.as_ref().map(|secret| {
            let mut hasher = Sha256::new();
            hasher.update(secret.as_bytes());
            let digest = hasher.finalize();
            format!("{digest:x}").chars().take(8).collect()
        })
    }

    /// Log configuration diagnostics for one provider at startup.
    pub fn log_diagnostics(&self, provider: &str) {
        if !self.enabled {
            info!("OAuth provider {provider} is not configured, skipping registration");
            return;
        }
        info!(
            provider = provider,
            client_id = self.client_id.as_deref().unwrap_or(""),
            secret_fingerprint = self.secret_fingerprint().unwrap_or_default(),
            redirect_uri = self.redirect_uri.as_deref().unwrap_or(""),
            "OAuth provider configured"
        );
    }
}

fn load_encryption_key() -> TokenResult<Vec<u8>> {
    match env::var("TOKEN_ENCRYPTION_KEY") {
        Ok(encoded) => {
            let key = general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| {
                    TokenError::Config(format!("TOKEN_ENCRYPTION_KEY is not valid base64: {e}"))
                })?;
            if key.len() != 32 {
                return Err(TokenError::Config(format!(
                    "TOKEN_ENCRYPTION_KEY must decode to 32 bytes, got {}",
                    key.len()
                )));
            }
            Ok(key)
        }
        Err(_) => {
            let key = crate::models::generate_encryption_key();
            let mut hasher = Sha256::new();
            hasher.update(key);
            let fingerprint: String = format!("{:x}", hasher.finalize()).chars().take(8).collect();
            warn!(
                key_fingerprint = fingerprint,
                "TOKEN_ENCRYPTION_KEY not set; generated an ephemeral key. \
                 Stored credentials will be unreadable after restart"
            );
            Ok(key.to_vec())
        }
    }
}
