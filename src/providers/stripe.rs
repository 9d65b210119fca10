// ABOUTME: Stripe Connect OAuth adapter for payments access
// ABOUTME: Non-expiring access tokens with refresh support; deauthorize needs the stripe_user_id
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Stripe Connect provider adapter.
//!
//! Connect access tokens do not expire but a refresh token is still issued
//! and can be exchanged at any time. Deauthorization goes through
//! `/oauth/deauthorize` and requires the connected account id
//! (`stripe_user_id`), which is captured into the credential metadata during
//! the code exchange.

use super::{names, parse_token_response, transport_error, ProviderAdapter};
use crate::config::OAuthProviderConfig;
use crate::errors::{TokenError, TokenResult};
use crate::models::{Credential, ProviderIdentity, TokenGrant};
use serde::Deserialize;

const AUTH_URL: &str = "https://connect.stripe.com/oauth/authorize";
const TOKEN_URL: &str = "https://connect.stripe.com/oauth/token";
const DEAUTHORIZE_URL: &str = "https://connect.stripe.com/oauth/deauthorize";
const ACCOUNT_URL: &str = "https://api.stripe.com/v1/account";

/// Stripe Connect OAuth adapter.
pub struct StripeAdapter {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct StripeTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    stripe_user_id: Option<String>,
    livemode: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StripeBusinessProfile {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeAccount {
    id: String,
    email: Option<String>,
    business_profile: Option<StripeBusinessProfile>,
}

impl StripeAdapter {
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
                .ok_or_else(|| TokenError::Config("STRIPE_CLIENT_ID not set".into()))?,
            client_secret: config
                .client_secret
                .clone()
                .ok_or_else(|| TokenError::Config("STRIPE_CLIENT_SECRET not set".into()))?,
            redirect_uri: config
                .redirect_uri
                .clone()
                .ok_or_else(|| TokenError::Config("STRIPE_REDIRECT_URI not set".into()))?,
            client,
        })
    }

    fn grant_from(response: StripeTokenResponse) -> TokenGrant {
        TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type.unwrap_or_else(|| "bearer".into()),
            scope: response.scope,
            // Connect access tokens do not expire
            expires_at: None,
            provider_meta: serde_json::json!({
                "stripe_user_id": response.stripe_user_id,
                "livemode": response.livemode,
            }),
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for StripeAdapter {
    fn name(&self) -> &'static str {
        names::STRIPE
    }

    fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    fn default_scopes(&self) -> Vec<String> {
        vec!["read_write".into()]
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    fn authorization_url(&self, redirect_uri: &str, scopes: &[String], state: &str) -> String {
        let scope = scopes.join(" ");
        format!(
            "{AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> TokenResult<TokenGrant> {
        let params = [
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(names::STRIPE, &e))?;

        let token: StripeTokenResponse = parse_token_response(names::STRIPE, response).await?;
        Ok(Self::grant_from(token))
    }

    async fn refresh(&self, refresh_token: &str) -> TokenResult<TokenGrant> {
        let params = [
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
            .map_err(|e| transport_error(names::STRIPE, &e))?;

        let token: StripeTokenResponse = parse_token_response(names::STRIPE, response).await?;
        Ok(Self::grant_from(token))
    }

    async fn revoke(&self, credential: &Credential) -> TokenResult<()> {
        let stripe_user_id = credential
            .provider_meta
            .get("stripe_user_id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| TokenError::ProviderProtocol {
                provider: names::STRIPE.into(),
                detail: "credential has no stripe_user_id to deauthorize".into(),
            })?;

        let params = [
            ("client_id", self.client_id.as_str()),
            ("stripe_user_id", stripe_user_id),
        ];

        let response = self
            .client
            .post(DEAUTHORIZE_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(names::STRIPE, &e))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::ProviderExchange {
                provider: names::STRIPE.into(),
                body,
            });
        }
        Ok(())
    }

    async fn fetch_identity(&self, access_token: &str) -> TokenResult<ProviderIdentity> {
        let response = self
            .client
            .get(ACCOUNT_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(names::STRIPE, &e))?;

        let account: StripeAccount = parse_token_response(names::STRIPE, response).await?;
        Ok(ProviderIdentity {
            external_id: account.id,
            label: account.business_profile.and_then(|p| p.name),
            email: account.email,
        })
    }
}
