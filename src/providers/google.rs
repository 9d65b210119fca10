// ABOUTME: Google OAuth adapter for calendar/workspace access
// ABOUTME: Offline consent flow with refresh support; refresh tokens are not rotated
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Google provider adapter.
//!
//! Requests offline access (`access_type=offline`, `prompt=consent`) so a
//! refresh token is issued on first consent. Google omits the refresh token
//! from refresh responses; the previous one stays valid and the token
//! manager retains it.

use super::{names, parse_token_response, transport_error, ProviderAdapter};
use crate::config::OAuthProviderConfig;
use crate::errors::{TokenError, TokenResult};
use crate::models::{Credential, ProviderIdentity, TokenGrant};
use chrono::Utc;
use serde::Deserialize;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Google OAuth adapter.
#[derive(Debug)]
pub struct GoogleAdapter {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

impl GoogleAdapter {
    /// Build the adapter from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] when client id, secret, or redirect
    /// URI are missing.
    pub fn new(config: &OAuthProviderConfig, client: reqwest::Client) -> TokenResult<Self> {
        Ok(Self {
            client_id: config
                .client_id
                .clone()
                .ok_or_else(|| TokenError::Config("GOOGLE_CLIENT_ID not set".into()))?,
            client_secret: config
                .client_secret
                .clone()
                .ok_or_else(|| TokenError::Config("GOOGLE_CLIENT_SECRET not set".into()))?,
            redirect_uri: config
                .redirect_uri
                .clone()
                .ok_or_else(|| TokenError::Config("GOOGLE_REDIRECT_URI not set".into()))?,
            client,
        })
    }

    fn grant_from(response: GoogleTokenResponse) -> TokenResult<TokenGrant> {
        // expires_in comes straight off the wire; reject values the expiry
        // arithmetic cannot represent instead of trusting them
        let expires_at = chrono::Duration::try_seconds(response.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| TokenError::ProviderProtocol {
                provider: names::GOOGLE.into(),
                detail: format!("implausible expires_in: {}", response.expires_in),
            })?;

        Ok(TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".into()),
            scope: response.scope,
            expires_at: Some(expires_at),
            provider_meta: serde_json::json!({}),
        })
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn name(&self) -> &'static str {
        names::GOOGLE
    }

    fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    fn default_scopes(&self) -> Vec<String> {
        vec![
            "openid".into(),
            "email".into(),
            "profile".into(),
            "https://www.googleapis.com/auth/calendar.readonly".into(),
            "https://www.googleapis.com/auth/drive.readonly".into(),
        ]
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    fn authorization_url(&self, redirect_uri: &str, scopes: &[String], state: &str) -> String {
        let scope = scopes.join(" ");
        format!(
            "{AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> TokenResult<TokenGrant> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(names::GOOGLE, &e))?;

        let token: GoogleTokenResponse = parse_token_response(names::GOOGLE, response).await?;
        Self::grant_from(token)
    }

    async fn refresh(&self, refresh_token: &str) -> TokenResult<TokenGrant> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(names::GOOGLE, &e))?;

        // Google does not return a refresh token here; the old one remains valid
        let token: GoogleTokenResponse = parse_token_response(names::GOOGLE, response).await?;
        Self::grant_from(token)
    }

    async fn revoke(&self, credential: &Credential) -> TokenResult<()> {
        let response = self
            .client
            .post(REVOKE_URL)
            .form(&[("token", credential.access_token.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(names::GOOGLE, &e))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::ProviderExchange {
                provider: names::GOOGLE.into(),
                body,
            });
        }
        Ok(())
    }

    async fn fetch_identity(&self, access_token: &str) -> TokenResult<ProviderIdentity> {
        let response = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(names::GOOGLE, &e))?;

        let info: GoogleUserInfo = parse_token_response(names::GOOGLE, response).await?;
        Ok(ProviderIdentity {
            external_id: info.sub,
            label: info.name,
            email: info.email,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn token_response(expires_in: i64) -> GoogleTokenResponse {
        GoogleTokenResponse {
            access_token: "tok".into(),
            expires_in,
            refresh_token: None,
            scope: None,
            token_type: None,
        }
    }

    #[test]
    fn test_normal_expires_in_yields_future_expiry() {
        let grant = GoogleAdapter::grant_from(token_response(3600)).unwrap();
        assert!(grant.expires_at.unwrap() > Utc::now());
    }

    #[test]
    fn test_out_of_range_expires_in_is_a_protocol_error() {
        for expires_in in [i64::MAX, i64::MIN] {
            assert!(matches!(
                GoogleAdapter::grant_from(token_response(expires_in)),
                Err(TokenError::ProviderProtocol { .. })
            ));
        }
    }
}
