// ABOUTME: Notion OAuth adapter for knowledge-base access
// ABOUTME: Basic-auth JSON code exchange; tokens never expire and cannot be refreshed or revoked
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Notion provider adapter.
//!
//! Notion issues non-expiring tokens: there is no refresh endpoint (refresh
//! fails with [`TokenError::RefreshNotSupported`]) and no revoke endpoint
//! (tokens die when the user removes the integration from the workspace, so
//! revoke is a logged no-op). The token response carries workspace metadata
//! which is kept on the credential for display.

use super::{names, parse_token_response, transport_error, ProviderAdapter};
use crate::config::OAuthProviderConfig;
use crate::errors::{TokenError, TokenResult};
use crate::models::{Credential, ProviderIdentity, TokenGrant};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use tracing::debug;

const AUTH_URL: &str = "https://api.notion.com/v1/oauth/authorize";
const TOKEN_URL: &str = "https://api.notion.com/v1/oauth/token";
const ME_URL: &str = "https://api.notion.com/v1/users/me";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion OAuth adapter.
pub struct NotionAdapter {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct NotionTokenResponse {
    access_token: String,
    token_type: Option<String>,
    bot_id: Option<String>,
    workspace_id: Option<String>,
    workspace_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotionUser {
    id: String,
    name: Option<String>,
}

impl NotionAdapter {
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
                .ok_or_else(|| TokenError::Config("NOTION_CLIENT_ID not set".into()))?,
            client_secret: config
                .client_secret
                .clone()
                .ok_or_else(|| TokenError::Config("NOTION_CLIENT_SECRET not set".into()))?,
            redirect_uri: config
                .redirect_uri
                .clone()
                .ok_or_else(|| TokenError::Config("NOTION_REDIRECT_URI not set".into()))?,
            client,
        })
    }

    fn basic_auth(&self) -> String {
        general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for NotionAdapter {
    fn name(&self) -> &'static str {
        names::NOTION
    }

    fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    fn default_scopes(&self) -> Vec<String> {
        // Notion grants are capability-based through the integration, not
        // scope strings in the authorization request
        Vec::new()
    }

    fn supports_refresh(&self) -> bool {
        false
    }

    fn authorization_url(&self, redirect_uri: &str, _scopes: &[String], state: &str) -> String {
        format!(
            "{AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&owner=user&state={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> TokenResult<TokenGrant> {
        let body = serde_json::json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": redirect_uri,
        });

        let response = self
            .client
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", self.basic_auth()))
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(names::NOTION, &e))?;

        let token: NotionTokenResponse = parse_token_response(names::NOTION, response).await?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: None,
            token_type: token.token_type.unwrap_or_else(|| "Bearer".into()),
            scope: None,
            // Notion tokens do not expire
            expires_at: None,
            provider_meta: serde_json::json!({
                "bot_id": token.bot_id,
                "workspace_id": token.workspace_id,
                "workspace_name": token.workspace_name,
            }),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> TokenResult<TokenGrant> {
        Err(TokenError::RefreshNotSupported {
            provider: names::NOTION.into(),
        })
    }

    async fn revoke(&self, _credential: &Credential) -> TokenResult<()> {
        // No revoke endpoint; the user removes the integration from the
        // workspace to invalidate the token
        debug!("notion has no revoke endpoint, skipping remote revocation");
        Ok(())
    }

    async fn fetch_identity(&self, access_token: &str) -> TokenResult<ProviderIdentity> {
        let response = self
            .client
            .get(ME_URL)
            .bearer_auth(access_token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|e| transport_error(names::NOTION, &e))?;

        let user: NotionUser = parse_token_response(names::NOTION, response).await?;
        Ok(ProviderIdentity {
            external_id: user.id,
            label: user.name,
            email: None,
        })
    }
}
