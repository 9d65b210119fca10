// ABOUTME: Integration tests for the real provider adapters, without any network
// ABOUTME: Covers authorization URLs, declared capabilities, and registry wiring
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use connect_hub::config::OAuthProviderConfig;
use connect_hub::errors::TokenError;
use connect_hub::providers::{
    google::GoogleAdapter, http_client, notion::NotionAdapter, slack::SlackAdapter,
    stripe::StripeAdapter, ProviderAdapter, ProviderRegistry,
};
use std::sync::Arc;

const STATE: &str = "state-token-xyz";

fn config(provider: &str) -> OAuthProviderConfig {
    OAuthProviderConfig {
        client_id: Some(format!("{provider}-client-id")),
        client_secret: Some(format!("{provider}-client-secret")),
        redirect_uri: Some(format!(
            "https://hub.example.com/connect/{provider}/callback"
        )),
        scopes: Vec::new(),
        enabled: true,
    }
}

fn adapters() -> Vec<Arc<dyn ProviderAdapter>> {
    let client = http_client().unwrap();
    vec![
        Arc::new(GoogleAdapter::new(&config("google"), client.clone()).unwrap()),
        Arc::new(NotionAdapter::new(&config("notion"), client.clone()).unwrap()),
        Arc::new(SlackAdapter::new(&config("slack"), client.clone()).unwrap()),
        Arc::new(StripeAdapter::new(&config("stripe"), client).unwrap()),
    ]
}

#[test]
fn adapter_missing_client_id_is_a_config_error() {
    let mut incomplete = config("google");
    incomplete.client_id = None;

    let err = GoogleAdapter::new(&incomplete, http_client().unwrap()).unwrap_err();
    assert!(matches!(err, TokenError::Config(_)));
}

#[test]
fn every_authorization_url_carries_state_and_redirect() {
    for adapter in adapters() {
        let url = adapter.authorization_url(
            adapter.redirect_uri(),
            &adapter.default_scopes(),
            STATE,
        );
        assert!(
            url.contains(&format!("state={STATE}")),
            "{} URL missing state: {url}",
            adapter.name()
        );
        assert!(
            url.contains("redirect_uri=https%3A%2F%2Fhub.example.com"),
            "{} URL missing encoded redirect: {url}",
            adapter.name()
        );
        assert!(
            url.contains("response_type=code"),
            "{} URL missing response_type: {url}",
            adapter.name()
        );
        assert!(
            url.contains(&format!("client_id={}-client-id", adapter.name())),
            "{} URL missing client id: {url}",
            adapter.name()
        );
    }
}

#[test]
fn authorization_urls_are_deterministic() {
    for adapter in adapters() {
        let scopes = adapter.default_scopes();
        let a = adapter.authorization_url(adapter.redirect_uri(), &scopes, STATE);
        let b = adapter.authorization_url(adapter.redirect_uri(), &scopes, STATE);
        assert_eq!(a, b);
    }
}

#[test]
fn google_requests_offline_access_with_forced_consent() {
    let adapter = GoogleAdapter::new(&config("google"), http_client().unwrap()).unwrap();
    let url = adapter.authorization_url(
        adapter.redirect_uri(),
        &["openid".into(), "email".into()],
        STATE,
    );

    assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(url.contains("access_type=offline"));
    assert!(url.contains("prompt=consent"));
    // Space-delimited scopes, URL-encoded
    assert!(url.contains("scope=openid%20email"));
}

#[test]
fn notion_requests_user_owned_grant() {
    let adapter = NotionAdapter::new(&config("notion"), http_client().unwrap()).unwrap();
    let url = adapter.authorization_url(adapter.redirect_uri(), &[], STATE);

    assert!(url.starts_with("https://api.notion.com/v1/oauth/authorize?"));
    assert!(url.contains("owner=user"));
    // Notion grants are not scoped through the URL
    assert!(!url.contains("scope="));
}

#[test]
fn slack_scopes_are_comma_delimited() {
    let adapter = SlackAdapter::new(&config("slack"), http_client().unwrap()).unwrap();
    let url = adapter.authorization_url(
        adapter.redirect_uri(),
        &["channels:read".into(), "chat:write".into()],
        STATE,
    );

    assert!(url.contains(&format!(
        "scope={}",
        urlencoding::encode("channels:read,chat:write")
    )));
}

#[test]
fn stripe_uses_the_connect_authorize_endpoint() {
    let adapter = StripeAdapter::new(&config("stripe"), http_client().unwrap()).unwrap();
    let url = adapter.authorization_url(adapter.redirect_uri(), &["read_write".into()], STATE);

    assert!(url.starts_with("https://connect.stripe.com/oauth/authorize?"));
    assert!(url.contains("scope=read_write"));
}

#[test]
fn refresh_capability_matches_each_provider_contract() {
    let expectations = [
        ("google", true),
        ("notion", false),
        ("slack", false),
        ("stripe", true),
    ];
    let adapters = adapters();

    for (name, supports) in expectations {
        let adapter = adapters.iter().find(|a| a.name() == name).unwrap();
        assert_eq!(adapter.supports_refresh(), supports, "provider {name}");
        // None of the supported providers rotate refresh tokens
        assert!(!adapter.rotates_refresh_tokens(), "provider {name}");
    }
}

#[tokio::test]
async fn refreshless_adapters_fail_without_a_network_call() {
    let client = http_client().unwrap();

    let notion = NotionAdapter::new(&config("notion"), client.clone()).unwrap();
    assert!(matches!(
        notion.refresh("rt").await.unwrap_err(),
        TokenError::RefreshNotSupported { provider } if provider == "notion"
    ));

    let slack = SlackAdapter::new(&config("slack"), client).unwrap();
    assert!(matches!(
        slack.refresh("rt").await.unwrap_err(),
        TokenError::RefreshNotSupported { provider } if provider == "slack"
    ));
}

#[test]
fn registry_routes_by_canonical_name() {
    let mut registry = ProviderRegistry::new();
    for adapter in adapters() {
        registry.register(adapter);
    }

    assert_eq!(
        registry.provider_names(),
        vec!["google", "notion", "slack", "stripe"]
    );
    assert_eq!(registry.get("notion").unwrap().name(), "notion");
    assert!(matches!(
        registry.get("fax-machine"),
        Err(TokenError::UnsupportedProvider(_))
    ));
}
