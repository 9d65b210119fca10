// ABOUTME: Slack OAuth adapter for chat access via the v2 OAuth flow
// ABOUTME: Handles Slack's ok/error envelope; no refresh tokens, revoke via auth.revoke
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Slack provider adapter.
//!
//! Slack answers HTTP 200 even for failed exchanges and signals the failure
//! with `"ok": false` plus an `"error"` code in the body, so the adapter
//! checks the envelope after parsing. Tokens issued by `oauth.v2.access` do
//! not expire and no refresh token is issued.

use super::{names, parse_token_response, transport_error, ProviderAdapter};
use crate::config::OAuthProviderConfig;
use crate::errors::{TokenError, TokenResult};
use crate::models::{Credential, ProviderIdentity, TokenGrant};
use serde::Deserialize;

const AUTH_URL: &str = "https://slack.com/oauth/v2/authorize";
const TOKEN_URL: &str = "https://slack.com/api/oauth.v2.access";
const REVOKE_URL: &str = "https://slack.com/api/auth.revoke";
const AUTH_TEST_URL: &str = "https://slack.com/api/auth.test";

/// Slack OAuth adapter.
pub struct SlackAdapter {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SlackTeam {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackOAuthResponse {
    ok: bool,
    error: Option<String>,
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    team: Option<SlackTeam>,
}

#[derive(Debug, Deserialize)]
struct SlackAuthTest {
    ok: bool,
    error: Option<String>,
    user_id: Option<String>,
    user: Option<String>,
    team: Option<String>,
}

impl SlackAdapter {
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
                .ok_or_else(|| TokenError::Config("SLACK_CLIENT_ID not set".into()))?,
            client_secret: config
                .client_secret
                .clone()
                .ok_or_else(|| TokenError::Config("SLACK_CLIENT_SECRET not set".into()))?,
            redirect_uri: config
                .redirect_uri
                .clone()
                .ok_or_else(|| TokenError::Config("SLACK_REDIRECT_URI not set".into()))?,
            client,
        })
    }

    /// Reject Slack's in-body failure envelope.
    fn check_envelope(ok: bool, error: Option<String>) -> TokenResult<()> {
        if ok {
            return Ok(());
        }
        Err(TokenError::ProviderExchange {
            provider: names::SLACK.into(),
            body: error.unwrap_or_else(|| "unknown_error".into()),
        })
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for SlackAdapter {
    fn name(&self) -> &'static str {
        names::SLACK
    }

    fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    fn default_scopes(&self) -> Vec<String> {
        vec![
            "chat:write".into(),
            "channels:read".into(),
            "groups:read".into(),
            "im:read".into(),
            "mpim:read".into(),
        ]
    }

    fn supports_refresh(&self) -> bool {
        false
    }

    fn authorization_url(&self, redirect_uri: &str, scopes: &[String], state: &str) -> String {
        // Slack expects comma-delimited scopes
        let scope = scopes.join(",");
        format!(
            "{AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
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
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(names::SLACK, &e))?;

        let token: SlackOAuthResponse = parse_token_response(names::SLACK, response).await?;
        Self::check_envelope(token.ok, token.error)?;

        let access_token = token
            .access_token
            .ok_or_else(|| TokenError::ProviderProtocol {
                provider: names::SLACK.into(),
                detail: "ok response without access_token".into(),
            })?;

        let team = token.team.unwrap_or(SlackTeam {
            id: None,
            name: None,
        });

        Ok(TokenGrant {
            access_token,
            refresh_token: None,
            token_type: token.token_type.unwrap_or_else(|| "Bearer".into()),
            scope: token.scope,
            // Slack tokens from oauth.v2.access do not expire
            expires_at: None,
            provider_meta: serde_json::json!({
                "team_id": team.id,
                "team_name": team.name,
            }),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> TokenResult<TokenGrant> {
        Err(TokenError::RefreshNotSupported {
            provider: names::SLACK.into(),
        })
    }

    async fn revoke(&self, credential: &Credential) -> TokenResult<()> {
        let response = self
            .client
            .post(REVOKE_URL)
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(|e| transport_error(names::SLACK, &e))?;

        #[derive(Deserialize)]
        struct RevokeResponse {
            ok: bool,
            error: Option<String>,
        }

        let body: RevokeResponse = parse_token_response(names::SLACK, response).await?;
        Self::check_envelope(body.ok, body.error)
    }

    async fn fetch_identity(&self, access_token: &str) -> TokenResult<ProviderIdentity> {
        let response = self
            .client
            .post(AUTH_TEST_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(names::SLACK, &e))?;

        let info: SlackAuthTest = parse_token_response(names::SLACK, response).await?;
        Self::check_envelope(info.ok, info.error)?;

        Ok(ProviderIdentity {
            external_id: info.user_id.unwrap_or_default(),
            label: info.team.or(info.user),
            email: None,
        })
    }
}
