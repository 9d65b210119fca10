// ABOUTME: Durable credential storage backed by SQLite via sqlx
// ABOUTME: The only component that touches storage; tokens are encrypted before any write
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Credential store.
//!
//! Persists one row per (account, provider) pair. Upserts go through a single
//! `INSERT .. ON CONFLICT DO UPDATE` statement so two near-simultaneous
//! writes for the same pair can never interleave partial column updates.
//! Access and refresh tokens are sealed with [`EncryptedCredential`] before
//! they reach the pool and opened on the way out; plaintext tokens never hit
//! disk.

use crate::errors::{TokenError, TokenResult};
use crate::models::{ConnectionSummary, Credential, EncryptedCredential};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;
use zeroize::Zeroize;

/// SQLite-backed credential store with AES-256-GCM token encryption.
#[derive(Debug)]
pub struct CredentialStore {
    pool: SqlitePool,
    encryption_key: Vec<u8>,
}

impl CredentialStore {
    /// Open (or create) the store and run schema setup.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Database`] if the pool cannot be created or the
    /// schema statement fails, and [`TokenError::Crypto`] if the key is not
    /// 32 bytes.
    pub async fn new(database_url: &str, encryption_key: Vec<u8>) -> TokenResult<Self> {
        if encryption_key.len() != 32 {
            return Err(TokenError::Crypto(
                "encryption key must be 32 bytes".into(),
            ));
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| TokenError::Database(format!("failed to open {database_url}: {e}")))?;

        let store = Self {
            pool,
            encryption_key,
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> TokenResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_credentials (
                account_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                token_type TEXT NOT NULL DEFAULT 'Bearer',
                scope TEXT,
                issued_at INTEGER NOT NULL,
                expires_at INTEGER,
                provider_meta TEXT NOT NULL DEFAULT '{}',
                connected_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (account_id, provider)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TokenError::Database(format!("schema setup failed: {e}")))?;

        Ok(())
    }

    /// Insert or overwrite the credential for its (account, provider) pair.
    ///
    /// On conflict the original `connected_at` is retained so refreshes do
    /// not reset the connection age.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the database write fails.
    pub async fn upsert(&self, credential: &Credential) -> TokenResult<()> {
        let sealed = EncryptedCredential::seal(
            &credential.access_token,
            credential.refresh_token.as_deref(),
            &self.encryption_key,
        )?;

        let meta = serde_json::to_string(&credential.provider_meta)
            .map_err(|e| TokenError::Database(format!("failed to serialize metadata: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO oauth_credentials
                (account_id, provider, access_token, refresh_token, token_type,
                 scope, issued_at, expires_at, provider_meta, connected_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (account_id, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                scope = excluded.scope,
                issued_at = excluded.issued_at,
                expires_at = excluded.expires_at,
                provider_meta = excluded.provider_meta,
                updated_at = excluded.updated_at
            ",
        )
        .bind(credential.account_id.to_string())
        .bind(&credential.provider)
        .bind(&sealed.access_token)
        .bind(&sealed.refresh_token)
        .bind(&credential.token_type)
        .bind(&credential.scope)
        .bind(credential.issued_at.timestamp())
        .bind(credential.expires_at.map(|t| t.timestamp()))
        .bind(&meta)
        .bind(credential.connected_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| TokenError::Database(format!("failed to upsert credential: {e}")))?;

        Ok(())
    }

    /// Fetch and decrypt the credential for one (account, provider) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or decryption fails.
    pub async fn get(
        &self,
        account_id: Uuid,
        provider: &str,
    ) -> TokenResult<Option<Credential>> {
        let row = sqlx::query(
            r"
            SELECT account_id, provider, access_token, refresh_token, token_type,
                   scope, issued_at, expires_at, provider_meta, connected_at
            FROM oauth_credentials
            WHERE account_id = $1 AND provider = $2
            ",
        )
        .bind(account_id.to_string())
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TokenError::Database(format!("failed to query credential: {e}")))?;

        row.map(|row| self.credential_from_row(&row)).transpose()
    }

    /// All decrypted credentials for an account, ordered by provider name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or decryption fails.
    pub async fn list_all(&self, account_id: Uuid) -> TokenResult<Vec<Credential>> {
        let rows = sqlx::query(
            r"
            SELECT account_id, provider, access_token, refresh_token, token_type,
                   scope, issued_at, expires_at, provider_meta, connected_at
            FROM oauth_credentials
            WHERE account_id = $1
            ORDER BY provider
            ",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TokenError::Database(format!("failed to list credentials: {e}")))?;

        rows.iter()
            .map(|row| self.credential_from_row(row))
            .collect()
    }

    /// Connection summaries for an account, ordered by provider name.
    ///
    /// Does not decrypt token material.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_summaries(&self, account_id: Uuid) -> TokenResult<Vec<ConnectionSummary>> {
        let rows = sqlx::query(
            r"
            SELECT provider, connected_at, expires_at, scope
            FROM oauth_credentials
            WHERE account_id = $1
            ORDER BY provider
            ",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TokenError::Database(format!("failed to list connections: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(ConnectionSummary {
                    provider: row.get("provider"),
                    connected_at: timestamp_column(row.get("connected_at"))?,
                    expires_at: row
                        .get::<Option<i64>, _>("expires_at")
                        .map(timestamp_column)
                        .transpose()?,
                    scope: row.get("scope"),
                })
            })
            .collect()
    }

    /// Hard-delete the credential for one (account, provider) pair.
    ///
    /// Returns `false` when no row existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete(&self, account_id: Uuid, provider: &str) -> TokenResult<bool> {
        let result = sqlx::query(
            "DELETE FROM oauth_credentials WHERE account_id = $1 AND provider = $2",
        )
        .bind(account_id.to_string())
        .bind(provider)
        .execute(&self.pool)
        .await
        .map_err(|e| TokenError::Database(format!("failed to delete credential: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Close the pool, checkpointing any pending writes.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn credential_from_row(&self, row: &sqlx::sqlite::SqliteRow) -> TokenResult<Credential> {
        let account_id: String = row.get("account_id");
        let account_id = Uuid::parse_str(&account_id)
            .map_err(|e| TokenError::Database(format!("invalid account id in store: {e}")))?;

        let sealed = EncryptedCredential {
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
        };
        let (access_token, refresh_token) = sealed.open(&self.encryption_key)?;

        let meta: String = row.get("provider_meta");
        let provider_meta = serde_json::from_str(&meta)
            .map_err(|e| TokenError::Database(format!("invalid metadata in store: {e}")))?;

        Ok(Credential {
            account_id,
            provider: row.get("provider"),
            access_token,
            refresh_token,
            token_type: row.get("token_type"),
            scope: row.get("scope"),
            issued_at: timestamp_column(row.get("issued_at"))?,
            expires_at: row
                .get::<Option<i64>, _>("expires_at")
                .map(timestamp_column)
                .transpose()?,
            provider_meta,
            connected_at: timestamp_column(row.get("connected_at"))?,
        })
    }
}

impl Drop for CredentialStore {
    fn drop(&mut self) {
        // Scrub key material before the allocation is returned
        self.encryption_key.zeroize();
    }
}

fn timestamp_column(seconds: i64) -> TokenResult<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| TokenError::Database(format!("invalid timestamp in store: {seconds}")))
}
