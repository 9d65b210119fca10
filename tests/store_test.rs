// ABOUTME: Integration tests for the SQLite credential store
// ABOUTME: Covers upsert semantics, listing, deletion, and encryption at rest
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, TimeZone, Utc};
use connect_hub::errors::TokenError;
use connect_hub::models::{generate_encryption_key, Credential};
use connect_hub::store::CredentialStore;
use tempfile::TempDir;
use uuid::Uuid;

fn credential(account_id: Uuid, provider: &str) -> Credential {
    Credential {
        account_id,
        provider: provider.to_string(),
        access_token: "super-secret-access-token".into(),
        refresh_token: Some("super-secret-refresh-token".into()),
        token_type: "Bearer".into(),
        scope: Some("read write".into()),
        issued_at: Utc::now(),
        expires_at: Some(Utc::now() + Duration::hours(1)),
        provider_meta: serde_json::json!({"workspace": "Acme"}),
        connected_at: Utc::now(),
    }
}

#[tokio::test]
async fn upsert_and_get_round_trip() {
    let (store, _dir) = common::test_store().await;
    let account = Uuid::new_v4();

    let original = credential(account, "calendar");
    store.upsert(&original).await.unwrap();

    let loaded = store.get(account, "calendar").await.unwrap().unwrap();
    assert_eq!(loaded.account_id, account);
    assert_eq!(loaded.access_token, "super-secret-access-token");
    assert_eq!(
        loaded.refresh_token.as_deref(),
        Some("super-secret-refresh-token")
    );
    assert_eq!(loaded.scope.as_deref(), Some("read write"));
    assert_eq!(loaded.provider_meta["workspace"], "Acme");
    assert_eq!(
        loaded.expires_at.unwrap().timestamp(),
        original.expires_at.unwrap().timestamp()
    );
}

#[tokio::test]
async fn get_unknown_pair_returns_none() {
    let (store, _dir) = common::test_store().await;
    assert!(store.get(Uuid::new_v4(), "calendar").await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_overwrites_but_retains_connected_at() {
    let (store, _dir) = common::test_store().await;
    let account = Uuid::new_v4();
    let first_connection = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();

    let mut first = credential(account, "calendar");
    first.connected_at = first_connection;
    store.upsert(&first).await.unwrap();

    let mut second = credential(account, "calendar");
    second.access_token = "rotated-access-token".into();
    second.connected_at = Utc::now();
    store.upsert(&second).await.unwrap();

    let loaded = store.get(account, "calendar").await.unwrap().unwrap();
    assert_eq!(loaded.access_token, "rotated-access-token");
    assert_eq!(
        loaded.connected_at.timestamp(),
        first_connection.timestamp(),
        "a refresh must not reset the connection age"
    );

    assert_eq!(store.list_all(account).await.unwrap().len(), 1);
}

#[tokio::test]
async fn credentials_are_scoped_per_account() {
    let (store, _dir) = common::test_store().await;
    let account_a = Uuid::new_v4();
    let account_b = Uuid::new_v4();

    store.upsert(&credential(account_a, "calendar")).await.unwrap();

    assert!(store.get(account_b, "calendar").await.unwrap().is_none());
    assert!(store.list_all(account_b).await.unwrap().is_empty());
}

#[tokio::test]
async fn summaries_are_ordered_and_token_free() {
    let (store, _dir) = common::test_store().await;
    let account = Uuid::new_v4();

    for provider in ["payments", "calendar", "chat"] {
        store.upsert(&credential(account, provider)).await.unwrap();
    }

    let summaries = store.list_summaries(account).await.unwrap();
    let names: Vec<&str> = summaries.iter().map(|s| s.provider.as_str()).collect();
    assert_eq!(names, vec!["calendar", "chat", "payments"]);
    assert_eq!(summaries[0].scope.as_deref(), Some("read write"));
}

#[tokio::test]
async fn delete_reports_whether_a_row_existed() {
    let (store, _dir) = common::test_store().await;
    let account = Uuid::new_v4();

    store.upsert(&credential(account, "calendar")).await.unwrap();

    assert!(store.delete(account, "calendar").await.unwrap());
    assert!(!store.delete(account, "calendar").await.unwrap());
    assert!(store.get(account, "calendar").await.unwrap().is_none());
}

#[tokio::test]
async fn tokens_are_not_stored_in_plaintext() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokens.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());

    let store = CredentialStore::new(&url, generate_encryption_key().to_vec())
        .await
        .unwrap();
    store.upsert(&credential(Uuid::new_v4(), "calendar")).await.unwrap();
    store.close().await;
    drop(store);

    let raw = std::fs::read(&path).unwrap();
    let needle = b"super-secret-access-token";
    let found = raw.windows(needle.len()).any(|window| window == needle);
    assert!(!found, "plaintext access token leaked into the database file");

    let refresh_needle = b"super-secret-refresh-token";
    let found_refresh = raw
        .windows(refresh_needle.len())
        .any(|window| window == refresh_needle);
    assert!(!found_refresh, "plaintext refresh token leaked into the database file");
}

#[tokio::test]
async fn wrong_key_cannot_open_stored_tokens() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokens.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let account = Uuid::new_v4();

    let store = CredentialStore::new(&url, generate_encryption_key().to_vec())
        .await
        .unwrap();
    store.upsert(&credential(account, "calendar")).await.unwrap();
    store.close().await;
    drop(store);

    let reopened = CredentialStore::new(&url, generate_encryption_key().to_vec())
        .await
        .unwrap();
    let err = reopened.get(account, "calendar").await.unwrap_err();
    assert!(matches!(err, TokenError::Crypto(_)));
}

#[tokio::test]
async fn short_encryption_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("tokens.db").display());

    let err = CredentialStore::new(&url, vec![0u8; 16]).await.unwrap_err();
    assert!(matches!(err, TokenError::Crypto(_)));
}
