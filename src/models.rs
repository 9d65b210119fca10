// ABOUTME: Core data model for stored credentials and provider token grants
// ABOUTME: Includes AES-256-GCM at-rest encryption of access and refresh tokens
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Data model for the token lifecycle manager.
//!
//! A [`Credential`] is the in-memory, decrypted form of one
//! (account, provider) connection. It is never persisted as-is: the store
//! converts it to an [`EncryptedCredential`] first. Tokens are encrypted with
//! AES-256-GCM, each field under an independent random nonce, with the nonce
//! prepended to the ciphertext and the whole value base64-encoded.

use crate::errors::{TokenError, TokenResult};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stored connection between an account and a provider.
///
/// Exists decrypted only in memory during an operation.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Owning account
    pub account_id: Uuid,
    /// Provider name ("google", "notion", "slack", "stripe")
    pub provider: String,
    /// Plain text access token
    pub access_token: String,
    /// Plain text refresh token; absent for providers that issue
    /// non-expiring tokens
    pub refresh_token: Option<String>,
    /// Token type as reported by the provider, usually "Bearer"
    pub token_type: String,
    /// Granted scopes as reported by the provider
    pub scope: Option<String>,
    /// When the current access token was issued
    pub issued_at: DateTime<Utc>,
    /// When the access token expires; `None` means it never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form identity info from the provider (workspace name, account
    /// e-mail, ...). Display and audit only, never used for authorization.
    pub provider_meta: serde_json::Value,
    /// When this connection was first established
    pub connected_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the access token is stale given the expiry skew.
    ///
    /// A credential with no expiry never goes stale.
    #[must_use]
    pub fn is_stale(&self, skew: Duration) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Utc::now() >= expires_at - skew)
    }

    /// Whether an automatic refresh is possible.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Token material returned by a provider adapter after a code exchange or a
/// refresh. The token manager turns this into a [`Credential`].
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// Access token issued by the provider
    pub access_token: String,
    /// Refresh token, when the provider issued one in this response
    pub refresh_token: Option<String>,
    /// Token type, usually "Bearer"
    pub token_type: String,
    /// Granted scopes as reported by the provider
    pub scope: Option<String>,
    /// Access token expiry; `None` for non-expiring tokens
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider-specific metadata captured during the exchange
    pub provider_meta: serde_json::Value,
}

/// Display-only identity of the external account behind a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// Provider-side identifier (Google sub, Slack user id, ...)
    pub external_id: String,
    /// Human-readable label (name, workspace, team)
    pub label: Option<String>,
    /// E-mail when the provider reports one
    pub email: Option<String>,
}

/// Read-only summary of one connection, for status pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSummary {
    /// Provider name
    pub provider: String,
    /// When the connection was first established
    pub connected_at: DateTime<Utc>,
    /// Current access token expiry, if any
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes
    pub scope: Option<String>,
}

/// Computed validity of one connection, derived from stored expiry only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// True while the stored access token is usable without a refresh
    pub valid: bool,
    /// Current access token expiry, if any
    pub expires_at: Option<DateTime<Utc>>,
    /// True when the access token is stale but a refresh token exists
    pub needs_refresh: bool,
}

/// Encrypted form of the token fields, as persisted by the store.
///
/// Each value is base64(\[12-byte nonce\]\[ciphertext + tag\]).
#[derive(Debug, Clone)]
pub struct EncryptedCredential {
    /// Encrypted access token
    pub access_token: String,
    /// Encrypted refresh token, when present
    pub refresh_token: Option<String>,
}

impl EncryptedCredential {
    /// Encrypt the secret fields of a credential.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Crypto`] if the key is not 32 bytes or
    /// encryption fails.
    pub fn seal(
        access_token: &str,
        refresh_token: Option<&str>,
        encryption_key: &[u8],
    ) -> TokenResult<Self> {
        Ok(Self {
            access_token: seal_field(access_token, encryption_key)?,
            refresh_token: refresh_token
                .map(|token| seal_field(token, encryption_key))
                .transpose()?,
        })
    }

    /// Decrypt back to plain token material.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Crypto`] if the ciphertext is malformed or the
    /// key does not match.
    pub fn open(&self, encryption_key: &[u8]) -> TokenResult<(String, Option<String>)> {
        let access = open_field(&self.access_token, encryption_key)?;
        let refresh = self
            .refresh_token
            .as_deref()
            .map(|token| open_field(token, encryption_key))
            .transpose()?;
        Ok((access, refresh))
    }
}

fn seal_field(plaintext: &str, encryption_key: &[u8]) -> TokenResult<String> {
    use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
    use ring::rand::{SecureRandom, SystemRandom};

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; 12];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| TokenError::Crypto("nonce generation failed".into()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound_key = UnboundKey::new(&AES_256_GCM, encryption_key)
        .map_err(|_| TokenError::Crypto("invalid encryption key".into()))?;
    let key = LessSafeKey::new(unbound_key);

    let mut data = plaintext.as_bytes().to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut data)
        .map_err(|_| TokenError::Crypto("encryption failed".into()))?;

    // Prepend nonce to ciphertext
    let mut combined = nonce_bytes.to_vec();
    combined.extend(data);
    Ok(general_purpose::STANDARD.encode(combined))
}

fn open_field(encoded: &str, encryption_key: &[u8]) -> TokenResult<String> {
    use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};

    let combined = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| TokenError::Crypto(format!("invalid ciphertext encoding: {e}")))?;
    if combined.len() < 12 {
        return Err(TokenError::Crypto("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let nonce_array: [u8; 12] = nonce_bytes
        .try_into()
        .map_err(|_| TokenError::Crypto("invalid nonce".into()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_array);

    let unbound_key = UnboundKey::new(&AES_256_GCM, encryption_key)
        .map_err(|_| TokenError::Crypto("invalid encryption key".into()))?;
    let key = LessSafeKey::new(unbound_key);

    let mut data = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut data)
        .map_err(|_| TokenError::Crypto("decryption failed".into()))?;

    String::from_utf8(plaintext.to_vec())
        .map_err(|e| TokenError::Crypto(format!("decrypted token is not UTF-8: {e}")))
}

/// Generate a fresh 32-byte AES-256 encryption key.
#[must_use]
pub fn generate_encryption_key() -> [u8; 32] {
    use rand::RngCore;
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}
