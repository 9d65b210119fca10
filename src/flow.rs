// ABOUTME: Authorization flow controller driving consent redirects and callback handling
// ABOUTME: Mints single-use, time-bounded state tokens and hands exchanged credentials to the manager
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Authorization flow controller.
//!
//! Each authorization attempt moves through
//! `INITIATED -> CALLBACK_RECEIVED -> { EXCHANGED | FAILED }`. The attempt is
//! anchored by an opaque state token bound to (account, provider, scopes) at
//! mint time: the callback is rejected as a [`CallbackFailure::StateMismatch`]
//! whenever the token is missing, unknown, expired, bound to another
//! provider, or already consumed. Terminal outcomes are never re-entered; a
//! retry requires a fresh [`FlowController::initiate`].

use crate::errors::{TokenError, TokenResult};
use crate::models::ProviderIdentity;
use crate::token_manager::TokenManager;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Lifetime of an unconsumed state token.
pub const STATE_TTL_MINUTES: i64 = 10;

/// Drives the consent redirect and callback side of connecting a provider.
pub struct FlowController {
    manager: Arc<TokenManager>,
    pending: RwLock<HashMap<String, PendingAuthorization>>,
    scope_overrides: HashMap<String, Vec<String>>,
    state_ttl: Duration,
}

/// One in-flight authorization attempt, keyed by its state token.
#[derive(Debug, Clone)]
struct PendingAuthorization {
    account_id: Uuid,
    provider: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Result of initiating an authorization attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    /// Provider being connected
    pub provider: String,
    /// Full provider authorization URL to redirect the user to
    pub authorization_url: String,
    /// Opaque anti-forgery state token carried through the flow
    pub state: String,
    /// How long the attempt stays valid
    pub expires_in_minutes: u32,
}

/// Query parameters a provider sends to the callback endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code, present on success
    pub code: Option<String>,
    /// State token minted at initiation
    pub state: Option<String>,
    /// Provider error code when the user denied consent
    pub error: Option<String>,
}

/// Terminal outcome of a callback.
#[derive(Debug)]
pub enum CallbackOutcome {
    /// The code was exchanged and the credential stored.
    Exchanged {
        /// Provider that was connected
        provider: String,
        /// Account the credential belongs to
        account_id: Uuid,
        /// Scopes granted by the provider
        scope: Option<String>,
        /// Access token expiry, if the token expires
        expires_at: Option<DateTime<Utc>>,
        /// Display identity, when the best-effort fetch succeeded
        identity: Option<ProviderIdentity>,
    },
    /// The attempt terminated without a credential.
    Failed {
        /// Why the attempt failed
        failure: CallbackFailure,
    },
}

/// Reasons a callback terminates in the failed state.
#[derive(Debug)]
pub enum CallbackFailure {
    /// The user (or provider) denied consent; `error` is the provider's code.
    ProviderDenied {
        /// Provider-reported error code from the callback query
        error: String,
    },
    /// State token missing, unknown, expired, already consumed, or bound to
    /// a different provider. Possible CSRF; surfaced as a hard failure.
    StateMismatch,
    /// The adapter's code exchange failed; the error is preserved for
    /// display via its user message.
    Exchange {
        /// The adapter error
        error: TokenError,
    },
}

impl CallbackFailure {
    /// Stable code for redirect query parameters.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProviderDenied { .. } => "provider_denied",
            Self::StateMismatch => "state_mismatch",
            Self::Exchange { error } => error.code(),
        }
    }

    /// User-facing description. Never leaks token material.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderDenied { .. } => "Authorization was denied".into(),
            Self::StateMismatch => TokenError::StateMismatch.user_message(),
            Self::Exchange { error } => error.user_message(),
        }
    }
}

impl FlowController {
    /// Create a flow controller over a token manager.
    #[must_use]
    pub fn new(manager: Arc<TokenManager>) -> Self {
        Self {
            manager,
            pending: RwLock::new(HashMap::new()),
            scope_overrides: HashMap::new(),
            state_ttl: Duration::minutes(STATE_TTL_MINUTES),
        }
    }

    /// Override the requested scopes for one provider (from configuration).
    #[must_use]
    pub fn with_scope_override(mut self, provider: &str, scopes: Vec<String>) -> Self {
        if !scopes.is_empty() {
            self.scope_overrides.insert(provider.to_string(), scopes);
        }
        self
    }

    /// Override the state-token lifetime. Intended for tests.
    #[must_use]
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Start an authorization attempt: mint and store a state token, build
    /// the provider authorization URL.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::UnsupportedProvider`] for unknown providers.
    pub async fn initiate(
        &self,
        account_id: Uuid,
        provider: &str,
        scopes: Option<Vec<String>>,
    ) -> TokenResult<AuthorizationRedirect> {
        let adapter = self.manager.registry().get(provider)?;

        let scopes = scopes
            .filter(|s| !s.is_empty())
            .or_else(|| self.scope_overrides.get(provider).cloned())
            .unwrap_or_else(|| adapter.default_scopes());

        let state = mint_state_token();
        let now = Utc::now();

        {
            let mut pending = self.pending.write().await;
            // Lazy cleanup keeps the table bounded without a timer task
            pending.retain(|_, attempt| attempt.expires_at > now);
            pending.insert(
                state.clone(),
                PendingAuthorization {
                    account_id,
                    provider: provider.to_string(),
                    created_at: now,
                    expires_at: now + self.state_ttl,
                },
            );
        }

        let authorization_url = adapter.authorization_url(adapter.redirect_uri(), &scopes, &state);

        info!(account_id = %account_id, provider, "authorization attempt initiated");
        Ok(AuthorizationRedirect {
            provider: provider.to_string(),
            authorization_url,
            state,
            expires_in_minutes: u32::try_from(STATE_TTL_MINUTES).unwrap_or(10),
        })
    }

    /// Handle the provider redirect back to us and drive the attempt to a
    /// terminal state.
    ///
    /// Protocol-level failures (denial, state mismatch, exchange rejection)
    /// are terminal [`CallbackOutcome::Failed`] values; only internal faults
    /// (store, registry) surface as `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential store fails while persisting a
    /// successful exchange.
    pub async fn handle_callback(
        &self,
        provider: &str,
        params: CallbackParams,
    ) -> TokenResult<CallbackOutcome> {
        if let Some(denial) = params.error {
            // Consume the state if one was sent so the attempt cannot be replayed
            if let Some(state) = params.state {
                let _ = self.consume_state(&state).await;
            }
            warn!(provider, error = %denial, "provider denied authorization");
            return Ok(CallbackOutcome::Failed {
                failure: CallbackFailure::ProviderDenied { error: denial },
            });
        }

        let Some(state) = params.state else {
            warn!(provider, "callback without state token");
            return Ok(CallbackOutcome::Failed {
                failure: CallbackFailure::StateMismatch,
            });
        };

        let Ok(attempt) = self.consume_state(&state).await else {
            warn!(provider, "callback with unknown, expired, or consumed state");
            return Ok(CallbackOutcome::Failed {
                failure: CallbackFailure::StateMismatch,
            });
        };

        if attempt.provider != provider {
            warn!(
                provider,
                bound_provider = %attempt.provider,
                "state token bound to a different provider"
            );
            return Ok(CallbackOutcome::Failed {
                failure: CallbackFailure::StateMismatch,
            });
        }

        let Some(code) = params.code else {
            return Ok(CallbackOutcome::Failed {
                failure: CallbackFailure::Exchange {
                    error: TokenError::ProviderProtocol {
                        provider: provider.to_string(),
                        detail: "callback carried neither code nor error".into(),
                    },
                },
            });
        };

        let adapter = self.manager.registry().get(provider)?;
        let mut grant = match adapter.exchange_code(&code, adapter.redirect_uri()).await {
            Ok(grant) => grant,
            Err(error) => {
                warn!(provider, error = %error, "code exchange failed");
                return Ok(CallbackOutcome::Failed {
                    failure: CallbackFailure::Exchange { error },
                });
            }
        };

        // Display confirmation only; a failure here must not fail the connect
        let identity = match adapter.fetch_identity(&grant.access_token).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(provider, error = %e, "identity fetch failed after connect");
                None
            }
        };
        if let Some(ref identity) = identity {
            attach_identity(&mut grant.provider_meta, identity);
        }

        let credential = self
            .manager
            .store_credential(attempt.account_id, provider, grant)
            .await?;

        info!(
            account_id = %attempt.account_id,
            provider,
            "authorization attempt exchanged"
        );
        Ok(CallbackOutcome::Exchanged {
            provider: provider.to_string(),
            account_id: attempt.account_id,
            scope: credential.scope,
            expires_at: credential.expires_at,
            identity,
        })
    }

    /// Remove and return the attempt for a state token; single use.
    async fn consume_state(&self, state: &str) -> TokenResult<PendingAuthorization> {
        let mut pending = self.pending.write().await;
        let attempt = pending.remove(state).ok_or(TokenError::StateMismatch)?;

        if attempt.expires_at < Utc::now() {
            return Err(TokenError::StateMismatch);
        }
        // created_at is kept for audit logging of attempt age
        let _ = attempt.created_at;

        Ok(attempt)
    }
}

/// Mint a 32-byte random state token, base64url-encoded.
fn mint_state_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn attach_identity(meta: &mut serde_json::Value, identity: &ProviderIdentity) {
    let value = serde_json::json!({
        "external_id": identity.external_id,
        "label": identity.label,
        "email": identity.email,
    });
    match meta.as_object_mut() {
        Some(map) => {
            map.insert("identity".into(), value);
        }
        None => {
            *meta = serde_json::json!({ "identity": value });
        }
    }
}
