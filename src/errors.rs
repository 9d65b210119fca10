// ABOUTME: Unified error taxonomy for token lifecycle and OAuth flow operations
// ABOUTME: Maps every failure kind to an HTTP status and a non-leaking user message
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Error taxonomy for the token manager and authorization flow.
//!
//! Every fallible operation in this crate returns [`TokenError`]. The
//! variants distinguish "provider rejected us" ([`TokenError::ProviderExchange`])
//! from "provider did not answer" ([`TokenError::ProviderUnreachable`]), which
//! is the only kind safe to retry. Raw provider error bodies are kept on the
//! variant for logging but are never serialized toward clients; boundaries
//! must go through [`TokenError::user_message`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type TokenResult<T> = Result<T, TokenError>;

/// Unified error type for token management and authorization flows.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No credential exists for the (account, provider) pair.
    #[error("no {provider} connection exists for this account")]
    NotConnected {
        /// Provider that was requested
        provider: String,
    },

    /// The stored credential is past expiry and carries no refresh token.
    #[error("{provider} credential is expired and cannot be refreshed")]
    CredentialExpiredNoRefresh {
        /// Provider whose credential expired
        provider: String,
    },

    /// The provider issues non-expiring tokens and has no refresh contract.
    #[error("{provider} does not support token refresh")]
    RefreshNotSupported {
        /// Provider that lacks a refresh endpoint
        provider: String,
    },

    /// The provider answered with a non-success status during code exchange
    /// or refresh. Not retryable without new user consent.
    #[error("{provider} rejected the token request")]
    ProviderExchange {
        /// Provider that rejected the request
        provider: String,
        /// Raw error body from the provider, for logs only
        body: String,
    },

    /// The provider answered but the response could not be parsed into the
    /// expected token shape. Logged as a defect signal.
    #[error("{provider} returned an unexpected response shape")]
    ProviderProtocol {
        /// Provider that returned the malformed response
        provider: String,
        /// Parse failure detail, for logs only
        detail: String,
    },

    /// Network failure or timeout talking to the provider. Safe to retry
    /// with backoff.
    #[error("{provider} did not answer within the timeout")]
    ProviderUnreachable {
        /// Provider that did not answer
        provider: String,
    },

    /// The authorization state token is missing, unknown, expired, or has
    /// already been consumed. Possible CSRF; never retried.
    #[error("authorization state is missing, expired, or already used")]
    StateMismatch,

    /// The provider name is not in the registered set.
    #[error("provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Credential store failure.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration problem (missing client credentials, bad key, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Token encryption or decryption failure.
    #[error("encryption error: {0}")]
    Crypto(String),
}

impl TokenError {
    /// HTTP status code the boundary layer should respond with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotConnected { .. } | Self::UnsupportedProvider(_) => 404,
            Self::CredentialExpiredNoRefresh { .. } | Self::RefreshNotSupported { .. } => 409,
            Self::StateMismatch => 400,
            Self::ProviderExchange { .. } | Self::ProviderProtocol { .. } => 502,
            Self::ProviderUnreachable { .. } => 503,
            Self::Database(_) | Self::Config(_) | Self::Crypto(_) => 500,
        }
    }

    /// Stable machine-readable code for boundary responses and redirects.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected { .. } => "not_connected",
            Self::CredentialExpiredNoRefresh { .. } => "credential_expired",
            Self::RefreshNotSupported { .. } => "refresh_not_supported",
            Self::ProviderExchange { .. } => "provider_rejected",
            Self::ProviderProtocol { .. } => "provider_protocol_error",
            Self::ProviderUnreachable { .. } => "provider_unreachable",
            Self::StateMismatch => "state_mismatch",
            Self::UnsupportedProvider(_) => "unsupported_provider",
            Self::Database(_) => "storage_error",
            Self::Config(_) => "configuration_error",
            Self::Crypto(_) => "encryption_error",
        }
    }

    /// User-facing message. Never contains provider error bodies, tokens,
    /// or other secret material.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConnected { provider } => {
                format!("{provider} is not connected to this account")
            }
            Self::CredentialExpiredNoRefresh { provider } => {
                format!("The {provider} connection has expired; please reconnect")
            }
            Self::RefreshNotSupported { provider } => {
                format!("{provider} connections cannot be refreshed automatically")
            }
            Self::ProviderExchange { provider, .. } => {
                format!("{provider} rejected the authorization; please try connecting again")
            }
            Self::ProviderProtocol { provider, .. } => {
                format!("{provider} returned an unexpected response; please try again later")
            }
            Self::ProviderUnreachable { provider } => {
                format!("{provider} is currently unreachable; please try again later")
            }
            Self::StateMismatch => {
                "The authorization request could not be verified; please start over".into()
            }
            Self::UnsupportedProvider(provider) => format!("Unknown provider: {provider}"),
            Self::Database(_) | Self::Config(_) | Self::Crypto(_) => {
                "An internal error occurred".into()
            }
        }
    }

    /// Whether automatic retry with backoff is appropriate for this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnreachable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        let not_connected = TokenError::NotConnected {
            provider: "google".into(),
        };
        assert_eq!(not_connected.http_status(), 404);
        assert_eq!(TokenError::StateMismatch.http_status(), 400);
        assert_eq!(
            TokenError::ProviderUnreachable {
                provider: "slack".into()
            }
            .http_status(),
            503
        );
    }

    #[test]
    fn test_user_message_does_not_leak_provider_body() {
        let err = TokenError::ProviderExchange {
            provider: "google".into(),
            body: r#"{"error":"invalid_grant","secret":"tok_abc123"}"#.into(),
        };
        let message = err.user_message();
        assert!(!message.contains("tok_abc123"));
        assert!(!message.contains("invalid_grant"));
        assert!(message.contains("google"));
    }

    #[test]
    fn test_only_unreachable_is_retryable() {
        assert!(TokenError::ProviderUnreachable {
            provider: "stripe".into()
        }
        .is_retryable());
        assert!(!TokenError::StateMismatch.is_retryable());
        assert!(!TokenError::ProviderExchange {
            provider: "stripe".into(),
            body: String::new()
        }
        .is_retryable());
    }
}
