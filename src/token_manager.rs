// ABOUTME: Token lifecycle orchestration across provider adapters and the credential store
// ABOUTME: Enforces single-flight refresh per (account, provider) and bounded retry on unreachable providers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Token manager.
//!
//! The sole component other subsystems call for credentials. It hands out
//! valid access tokens, transparently refreshing when expiry is imminent,
//! and guarantees at most one in-flight refresh per (account, provider):
//! concurrent callers block on a per-key mutex and reuse the first caller's
//! result instead of issuing duplicate refresh calls, which would invalidate
//! each other's refresh token on rotating providers.

use crate::errors::{TokenError, TokenResult};
use crate::models::{ConnectionStatus, ConnectionSummary, Credential, TokenGrant};
use crate::providers::{ProviderAdapter, ProviderRegistry};
use crate::store::CredentialStore;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Access tokens are treated as stale this long before their actual expiry.
pub const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Maximum refresh attempts when the provider is unreachable.
const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// Initial backoff between refresh attempts; doubles per attempt.
const RETRY_BACKOFF_MS: u64 = 250;

/// Orchestrates provider adapters and the credential store.
pub struct TokenManager {
    store: Arc<CredentialStore>,
    registry: Arc<ProviderRegistry>,
    refresh_locks: DashMap<(Uuid, String), Arc<Mutex<()>>>,
}

impl TokenManager {
    /// Create a token manager over a store and adapter registry.
    #[must_use]
    pub fn new(store: Arc<CredentialStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            store,
            registry,
            refresh_locks: DashMap::new(),
        }
    }

    /// The adapter registry this manager routes through.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Persist a credential from freshly exchanged token material,
    /// overwriting any prior connection for the pair.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the store write fails.
    pub async fn store_credential(
        &self,
        account_id: Uuid,
        provider: &str,
        grant: TokenGrant,
    ) -> TokenResult<Credential> {
        let now = Utc::now();
        let credential = Credential {
            account_id,
            provider: provider.to_string(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type,
            scope: grant.scope,
            issued_at: now,
            expires_at: grant.expires_at,
            provider_meta: grant.provider_meta,
            connected_at: now,
        };

        self.store.upsert(&credential).await?;
        info!(account_id = %account_id, provider, "stored credential");
        Ok(credential)
    }

    /// Return a currently valid access token for the pair, refreshing first
    /// when expiry is within the skew window.
    ///
    /// # Errors
    ///
    /// - [`TokenError::NotConnected`] when no credential exists
    /// - [`TokenError::CredentialExpiredNoRefresh`] when stale without a
    ///   refresh token
    /// - adapter refresh errors, with unreachable providers retried up to
    ///   [`MAX_REFRESH_ATTEMPTS`] times
    pub async fn get_valid_access_token(
        &self,
        account_id: Uuid,
        provider: &str,
    ) -> TokenResult<String> {
        let skew = Duration::seconds(EXPIRY_SKEW_SECONDS);

        let credential = self
            .store
            .get(account_id, provider)
            .await?
            .ok_or_else(|| TokenError::NotConnected {
                provider: provider.to_string(),
            })?;

        if !credential.is_stale(skew) {
            return Ok(credential.access_token);
        }
        if !credential.can_refresh() {
            return Err(TokenError::CredentialExpiredNoRefresh {
                provider: provider.to_string(),
            });
        }

        let lock = self.refresh_lock(account_id, provider);
        let _guard = lock.lock().await;

        // Re-read after acquiring the lock: a caller that held it before us
        // may have completed the refresh already, and its result is reused
        // instead of re-entering the refresh region.
        let credential = self
            .store
            .get(account_id, provider)
            .await?
            .ok_or_else(|| TokenError::NotConnected {
                provider: provider.to_string(),
            })?;

        if !credential.is_stale(skew) {
            return Ok(credential.access_token);
        }

        let refresh_token =
            credential
                .refresh_token
                .clone()
                .ok_or_else(|| TokenError::CredentialExpiredNoRefresh {
                    provider: provider.to_string(),
                })?;

        let adapter = self.registry.get(provider)?;
        if !adapter.supports_refresh() {
            return Err(TokenError::RefreshNotSupported {
                provider: provider.to_string(),
            });
        }

        info!(account_id = %account_id, provider, "refreshing access token");
        let grant = Self::refresh_with_retry(adapter.as_ref(), &refresh_token).await?;
        let updated = Self::apply_refresh(credential, grant, adapter.as_ref());
        self.store.upsert(&updated).await?;

        Ok(updated.access_token)
    }

    /// Existence check only; no network call.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn is_connected(&self, account_id: Uuid, provider: &str) -> TokenResult<bool> {
        Ok(self.store.get(account_id, provider).await?.is_some())
    }

    /// Read-only connection summaries, ordered by provider name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn list_connections(&self, account_id: Uuid) -> TokenResult<Vec<ConnectionSummary>> {
        self.store.list_summaries(account_id).await
    }

    /// Compute validity for every connection from stored expiry, without
    /// forcing a network refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn validate_all(
        &self,
        account_id: Uuid,
    ) -> TokenResult<BTreeMap<String, ConnectionStatus>> {
        let skew = Duration::seconds(EXPIRY_SKEW_SECONDS);
        let mut statuses = BTreeMap::new();

        for credential in self.store.list_all(account_id).await? {
            let stale = credential.is_stale(skew);
            statuses.insert(
                credential.provider.clone(),
                ConnectionStatus {
                    valid: !stale,
                    expires_at: credential.expires_at,
                    needs_refresh: stale && credential.can_refresh(),
                },
            );
        }

        Ok(statuses)
    }

    /// Disconnect the pair: best-effort remote revoke, then hard delete.
    ///
    /// The local credential is always removed when it exists, even if the
    /// remote revoke call fails or times out. Holds the same per-pair lock
    /// as the refresh path, so an in-flight refresh can never upsert the
    /// credential back after the delete.
    ///
    /// # Errors
    ///
    /// - [`TokenError::NotConnected`] when no credential exists
    /// - store errors from the delete
    pub async fn disconnect(&self, account_id: Uuid, provider: &str) -> TokenResult<()> {
        let lock = self.refresh_lock(account_id, provider);
        let _guard = lock.lock().await;

        let Some(credential) = self.store.get(account_id, provider).await? else {
            // Nothing to disconnect; do not leave a lock entry behind
            self.refresh_locks
                .remove(&(account_id, provider.to_string()));
            return Err(TokenError::NotConnected {
                provider: provider.to_string(),
            });
        };

        match self.registry.get(provider) {
            Ok(adapter) => {
                if let Err(e) = adapter.revoke(&credential).await {
                    warn!(
                        account_id = %account_id,
                        provider,
                        error = %e,
                        "remote revoke failed; removing credential locally anyway"
                    );
                }
            }
            Err(e) => {
                // A stored credential for an unregistered provider can still
                // be removed locally
                warn!(provider, error = %e, "no adapter for stored credential");
            }
        }

        self.store.delete(account_id, provider).await?;
        // The pair is gone; drop its lock entry so the table stays bounded.
        // A reconnect mints a fresh entry on the next refresh.
        self.refresh_locks
            .remove(&(account_id, provider.to_string()));
        info!(account_id = %account_id, provider, "disconnected provider");
        Ok(())
    }

    fn refresh_lock(&self, account_id: Uuid, provider: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry((account_id, provider.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Merge a refresh grant into the existing credential.
    ///
    /// The refresh token is replaced only when the provider issued a new
    /// one; otherwise the previous token is retained.
    fn apply_refresh(
        credential: Credential,
        grant: TokenGrant,
        adapter: &dyn ProviderAdapter,
    ) -> Credential {
        if adapter.rotates_refresh_tokens() && grant.refresh_token.is_none() {
            warn!(
                provider = adapter.name(),
                "provider declares refresh rotation but returned no refresh token"
            );
        }

        Credential {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(credential.refresh_token),
            token_type: grant.token_type,
            scope: grant.scope.or(credential.scope),
            issued_at: Utc::now(),
            expires_at: grant.expires_at,
            ..credential
        }
    }

    async fn refresh_with_retry(
        adapter: &dyn ProviderAdapter,
        refresh_token: &str,
    ) -> TokenResult<TokenGrant> {
        let mut backoff = std::time::Duration::from_millis(RETRY_BACKOFF_MS);
        let mut attempt = 1;

        loop {
            match adapter.refresh(refresh_token).await {
                Ok(grant) => return Ok(grant),
                Err(e) if e.is_retryable() && attempt < MAX_REFRESH_ATTEMPTS => {
                    warn!(
                        provider = adapter.name(),
                        attempt,
                        error = %e,
                        "refresh attempt failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
