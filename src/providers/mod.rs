// ABOUTME: Provider adapter contract and registry for OAuth-capable services
// ABOUTME: Shared HTTP plumbing maps transport, status, and parse failures to the error taxonomy
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Provider adapters.
//!
//! One [`ProviderAdapter`] implementation per supported service. Adapters own
//! every provider-specific policy: endpoints, consent flags, scope defaults,
//! whether refresh exists at all, and whether refresh tokens rotate. The
//! token manager and flow controller only ever see the trait.
//!
//! Adding a provider means adding one module here and registering it; no
//! change to the token manager.

pub mod google;
pub mod notion;
pub mod slack;
pub mod stripe;

use crate::errors::{TokenError, TokenResult};
use crate::models::{Credential, ProviderIdentity, TokenGrant};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Canonical provider names.
pub mod names {
    /// Google calendar/workspace provider
    pub const GOOGLE: &str = "google";
    /// Notion knowledge-base provider
    pub const NOTION: &str = "notion";
    /// Slack chat provider
    pub const SLACK: &str = "slack";
    /// Stripe Connect payments provider
    pub const STRIPE: &str = "stripe";
}

/// Timeout applied to every outbound provider call.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the shared HTTP client used by all adapters.
///
/// # Errors
///
/// Returns [`TokenError::Config`] if the client cannot be constructed.
pub fn http_client() -> TokenResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .map_err(|e| TokenError::Config(format!("failed to build HTTP client: {e}")))
}

/// Contract every provider adapter implements.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Canonical provider name.
    fn name(&self) -> &'static str;

    /// Redirect URI registered with this provider.
    fn redirect_uri(&self) -> &str;

    /// Scopes requested when the caller does not specify any.
    fn default_scopes(&self) -> Vec<String>;

    /// Whether the provider has a refresh contract at all.
    fn supports_refresh(&self) -> bool;

    /// Whether the provider issues a new refresh token on every refresh.
    /// When `false`, the previous refresh token stays valid and must be
    /// retained.
    fn rotates_refresh_tokens(&self) -> bool {
        false
    }

    /// Deterministically build the authorization URL for a consent redirect.
    fn authorization_url(&self, redirect_uri: &str, scopes: &[String], state: &str) -> String;

    /// Exchange an authorization code for token material. One network call.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> TokenResult<TokenGrant>;

    /// Exchange a refresh token for fresh token material.
    ///
    /// Providers without a refresh contract fail with
    /// [`TokenError::RefreshNotSupported`].
    async fn refresh(&self, refresh_token: &str) -> TokenResult<TokenGrant>;

    /// Tell the provider to stop honoring the credential. Callers treat
    /// failures as best-effort and never escalate them.
    async fn revoke(&self, credential: &Credential) -> TokenResult<()>;

    /// Fetch display-only identity for the connected external account.
    async fn fetch_identity(&self, access_token: &str) -> TokenResult<ProviderIdentity>;
}

/// Registry of adapters keyed by provider name.
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter under its canonical name.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        info!("Registering OAuth provider adapter: {}", adapter.name());
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Look up an adapter by provider name.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::UnsupportedProvider`] for unknown names.
    pub fn get(&self, provider: &str) -> TokenResult<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(provider)
            .cloned()
            .ok_or_else(|| TokenError::UnsupportedProvider(provider.to_string()))
    }

    /// Names of all registered providers, sorted.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a reqwest transport failure to the error taxonomy.
///
/// Anything that prevented the provider from answering (timeout, connect
/// failure, broken transfer) is `ProviderUnreachable`, so callers can tell
/// "did not answer" from "rejected us".
pub(crate) fn transport_error(provider: &'static str, error: &reqwest::Error) -> TokenError {
    warn!(provider, error = %error, "provider request failed in transport");
    TokenError::ProviderUnreachable {
        provider: provider.to_string(),
    }
}

/// Read a token-endpoint response body and parse it into `T`.
///
/// Non-success statuses become `ProviderExchange` with the raw body kept for
/// logging; parse failures on a success status become `ProviderProtocol`.
pub(crate) async fn parse_token_response<T: DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> TokenResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    if !status.is_success() {
        warn!(provider, %status, body = %body, "provider rejected token request");
        return Err(TokenError::ProviderExchange {
            provider: provider.to_string(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        warn!(provider, error = %e, "provider returned unparseable token response");
        TokenError::ProviderProtocol {
            provider: provider.to_string(),
            detail: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_unknown_provider() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.get("garmin"),
            Err(TokenError::UnsupportedProvider(name)) if name == "garmin"
        ));
    }
}
