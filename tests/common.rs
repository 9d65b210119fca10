// ABOUTME: Shared test fixtures: a configurable mock provider adapter and store helpers
// ABOUTME: Used by the token manager, flow, and route integration tests
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs, dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use connect_hub::errors::{TokenError, TokenResult};
use connect_hub::models::{Credential, ProviderIdentity, TokenGrant};
use connect_hub::providers::{ProviderAdapter, ProviderRegistry};
use connect_hub::store::CredentialStore;
use connect_hub::token_manager::TokenManager;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Provider name used by most tests, matching a calendar/workspace service.
pub const MOCK_PROVIDER: &str = "calendar";

/// Configurable in-memory provider adapter.
///
/// Counts every adapter call so tests can assert on refresh and revoke
/// traffic, and injects failures without any network involvement.
pub struct MockAdapter {
    name: &'static str,
    supports_refresh: bool,
    rotates_refresh_tokens: bool,
    refresh_delay_ms: u64,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
    pub identity_calls: AtomicUsize,
    fail_exchange: AtomicBool,
    fail_revoke: AtomicBool,
    fail_identity: AtomicBool,
    refresh_unreachable_times: AtomicUsize,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            name: MOCK_PROVIDER,
            supports_refresh: true,
            rotates_refresh_tokens: false,
            refresh_delay_ms: 0,
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            identity_calls: AtomicUsize::new(0),
            fail_exchange: AtomicBool::new(false),
            fail_revoke: AtomicBool::new(false),
            fail_identity: AtomicBool::new(false),
            refresh_unreachable_times: AtomicUsize::new(0),
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.supports_refresh = false;
        self
    }

    pub fn rotating_refresh_tokens(mut self) -> Self {
        self.rotates_refresh_tokens = true;
        self
    }

    /// Make each refresh take this long, to force contention in
    /// concurrency tests.
    pub fn with_refresh_delay_ms(mut self, millis: u64) -> Self {
        self.refresh_delay_ms = millis;
        self
    }

    pub fn failing_exchange(self) -> Self {
        self.fail_exchange.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_revoke(self) -> Self {
        self.fail_revoke.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_identity(self) -> Self {
        self.fail_identity.store(true, Ordering::SeqCst);
        self
    }

    /// The next `times` refresh calls fail with `ProviderUnreachable`.
    pub fn unreachable_for_refreshes(self, times: usize) -> Self {
        self.refresh_unreachable_times.store(times, Ordering::SeqCst);
        self
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn redirect_uri(&self) -> &str {
        "http://localhost:8081/connect/calendar/callback"
    }

    fn default_scopes(&self) -> Vec<String> {
        vec!["read".into(), "write".into()]
    }

    fn supports_refresh(&self) -> bool {
        self.supports_refresh
    }

    fn rotates_refresh_tokens(&self) -> bool {
        self.rotates_refresh_tokens
    }

    fn authorization_url(&self, redirect_uri: &str, scopes: &[String], state: &str) -> String {
        format!(
            "https://provider.example/authorize?client_id=mock-client&redirect_uri={}&response_type=code&scope={}&state={}",
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> TokenResult<TokenGrant> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(TokenError::ProviderExchange {
                provider: self.name.into(),
                body: r#"{"error":"invalid_grant"}"#.into(),
            });
        }
        Ok(TokenGrant {
            access_token: format!("token-for-{code}"),
            refresh_token: Some("refresh-initial".into()),
            token_type: "Bearer".into(),
            scope: Some("read write".into()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            provider_meta: serde_json::json!({"workspace": "Test Workspace"}),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> TokenResult<TokenGrant> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.refresh_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.refresh_delay_ms)).await;
        }

        let remaining = self.refresh_unreachable_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.refresh_unreachable_times
                .store(remaining - 1, Ordering::SeqCst);
            return Err(TokenError::ProviderUnreachable {
                provider: self.name.into(),
            });
        }

        Ok(TokenGrant {
            access_token: format!("refreshed-token-{call}"),
            refresh_token: if self.rotates_refresh_tokens {
                Some(format!("refresh-rotated-{call}"))
            } else {
                None
            },
            token_type: "Bearer".into(),
            scope: None,
            expires_at: Some(Utc::now() + Duration::hours(1)),
            provider_meta: serde_json::json!({}),
        })
    }

    async fn revoke(&self, _credential: &Credential) -> TokenResult<()> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_revoke.load(Ordering::SeqCst) {
            return Err(TokenError::ProviderUnreachable {
                provider: self.name.into(),
            });
        }
        Ok(())
    }

    async fn fetch_identity(&self, _access_token: &str) -> TokenResult<ProviderIdentity> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_identity.load(Ordering::SeqCst) {
            return Err(TokenError::ProviderUnreachable {
                provider: self.name.into(),
            });
        }
        Ok(ProviderIdentity {
            external_id: "ext-1".into(),
            label: Some("Test Workspace".into()),
            email: Some("user@example.com".into()),
        })
    }
}

/// Open a store backed by a temp file. The `TempDir` must be kept alive for
/// the duration of the test.
pub async fn test_store() -> (Arc<CredentialStore>, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("tokens.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let key = connect_hub::models::generate_encryption_key().to_vec();
    let store = CredentialStore::new(&url, key)
        .await
        .expect("failed to open store");
    (Arc::new(store), dir)
}

/// A token manager over a temp store and the given adapters.
pub async fn manager_with(
    adapters: Vec<Arc<dyn ProviderAdapter>>,
) -> (Arc<TokenManager>, Arc<CredentialStore>, TempDir) {
    let (store, dir) = test_store().await;
    let mut registry = ProviderRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    let manager = Arc::new(TokenManager::new(Arc::clone(&store), Arc::new(registry)));
    (manager, store, dir)
}

/// A token grant expiring `expires_in_secs` from now (negative = already
/// expired; `None` = never expires).
pub fn grant(expires_in_secs: Option<i64>, refresh_token: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: "stored-access-token".into(),
        refresh_token: refresh_token.map(String::from),
        token_type: "Bearer".into(),
        scope: Some("read".into()),
        expires_at: expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs)),
        provider_meta: serde_json::json!({}),
    }
}
