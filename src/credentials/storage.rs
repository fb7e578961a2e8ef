//! Encrypted credential storage using SQLite.
//!
//! Stores OAuth grants for (user, provider) pairs. Token columns hold
//! AES-256-GCM ciphertext produced by the injected cipher; everything else
//! is plaintext metadata.

use super::{CredentialRecord, CredentialStatus, NewCredential};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use crate::crypto::{CredentialCipher, EncryptedBlob};
use crate::scopes::Provider;

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     id INTEGER PRIMARY KEY,
///     user_id TEXT NOT NULL,
///     provider TEXT NOT NULL,
///     access_token TEXT NOT NULL,       -- Encrypted
///     access_token_nonce TEXT NOT NULL,
///     refresh_token TEXT,               -- Encrypted (optional)
///     refresh_token_nonce TEXT,
///     expires_at TEXT NOT NULL,         -- ISO 8601 timestamp
///     scope TEXT NOT NULL,              -- JSON array of strings
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(user_id, provider)
/// );
/// ```
///
/// # Thread Safety
/// Connection is wrapped in a Mutex; SQLite itself is serialized.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    cipher: CredentialCipher,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `cipher` - Cipher used for all token columns
    pub fn new<P: AsRef<Path>>(db_path: P, cipher: CredentialCipher) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                access_token TEXT NOT NULL,
                access_token_nonce TEXT NOT NULL,
                refresh_token TEXT,
                refresh_token_nonce TEXT,
                expires_at TEXT NOT NULL,
                scope TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, provider)
            )
            "#,
            [],
        )
        .context("Failed to create credentials table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_user_provider ON credentials(user_id, provider)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    /// Creates or replaces the grant for (user, provider).
    ///
    /// An existing record keeps its `created_at`; tokens, expiry, scope,
    /// and `updated_at` are replaced. The superseded tokens become
    /// unreachable immediately.
    pub fn upsert(&self, credential: &NewCredential) -> Result<()> {
        let access = self
            .cipher
            .encrypt(&credential.access_token)
            .context("Failed to encrypt access token")?;

        let refresh = credential
            .refresh_token
            .as_deref()
            .map(|token| self.cipher.encrypt(token))
            .transpose()
            .context("Failed to encrypt refresh token")?;

        let scope_json =
            serde_json::to_string(&credential.scope).context("Failed to serialize scope")?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO credentials (
                    user_id, provider,
                    access_token, access_token_nonce,
                    refresh_token, refresh_token_nonce,
                    expires_at, scope, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(user_id, provider) DO UPDATE SET
                    access_token = excluded.access_token,
                    access_token_nonce = excluded.access_token_nonce,
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    expires_at = excluded.expires_at,
                    scope = excluded.scope,
                    updated_at = excluded.updated_at
                "#,
                params![
                    credential.user_id,
                    credential.provider.as_str(),
                    access.ciphertext,
                    access.nonce,
                    refresh.as_ref().map(|b| b.ciphertext.clone()),
                    refresh.as_ref().map(|b| b.nonce.clone()),
                    credential.expires_at.to_rfc3339(),
                    scope_json,
                    now,
                    now,
                ],
            )
            .context("Failed to store credential")?;

        Ok(())
    }

    /// Retrieves and decrypts the grant for (user, provider).
    pub fn get(&self, user_id: &str, provider: Provider) -> Result<Option<CredentialRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT access_token, access_token_nonce,
                       refresh_token, refresh_token_nonce,
                       expires_at, scope, created_at, updated_at
                FROM credentials
                WHERE user_id = ?1 AND provider = ?2
                "#,
            )
            .context("Failed to prepare query")?;

        let mut rows = stmt
            .query(params![user_id, provider.as_str()])
            .context("Failed to execute query")?;

        let row = match rows.next().context("Failed to read row")? {
            Some(row) => row,
            None => return Ok(None),
        };

        let access_blob = EncryptedBlob {
            ciphertext: row.get(0)?,
            nonce: row.get(1)?,
        };
        let access_token = self
            .cipher
            .decrypt(&access_blob)
            .context("Failed to decrypt access token")?;

        let refresh_ciphertext: Option<String> = row.get(2)?;
        let refresh_nonce: Option<String> = row.get(3)?;
        let refresh_token = match (refresh_ciphertext, refresh_nonce) {
            (Some(ciphertext), Some(nonce)) => Some(
                self.cipher
                    .decrypt(&EncryptedBlob { ciphertext, nonce })
                    .context("Failed to decrypt refresh token")?,
            ),
            _ => None,
        };

        let expires_at = parse_timestamp(&row.get::<_, String>(4)?)?;
        let scope: Vec<String> =
            serde_json::from_str(&row.get::<_, String>(5)?).context("Failed to parse scope")?;
        let created_at = parse_timestamp(&row.get::<_, String>(6)?)?;
        let updated_at = parse_timestamp(&row.get::<_, String>(7)?)?;

        Ok(Some(CredentialRecord {
            user_id: user_id.to_string(),
            provider,
            access_token,
            refresh_token,
            expires_at,
            scope,
            created_at,
            updated_at,
        }))
    }

    /// Replaces the access token and expiry after a refresh exchange.
    ///
    /// The stored refresh token is left untouched.
    pub fn update_access_token(
        &self,
        user_id: &str,
        provider: Provider,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let access = self
            .cipher
            .encrypt(access_token)
            .context("Failed to encrypt access token")?;

        let rows = self
            .conn
            .lock()
            .unwrap()
            .execute(
                r#"
                UPDATE credentials
                SET access_token = ?3, access_token_nonce = ?4,
                    expires_at = ?5, updated_at = ?6
                WHERE user_id = ?1 AND provider = ?2
                "#,
                params![
                    user_id,
                    provider.as_str(),
                    access.ciphertext,
                    access.nonce,
                    expires_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to update access token")?;

        if rows == 0 {
            anyhow::bail!("no credential row for user and provider");
        }

        Ok(())
    }

    /// Grant metadata for status queries. Token columns are read back as
    /// ciphertext only, never decrypted here.
    pub fn status(&self, user_id: &str, provider: Provider) -> Result<Option<CredentialStatus>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT expires_at, scope FROM credentials WHERE user_id = ?1 AND provider = ?2",
            )
            .context("Failed to prepare query")?;

        let mut rows = stmt
            .query(params![user_id, provider.as_str()])
            .context("Failed to execute query")?;

        let row = match rows.next().context("Failed to read row")? {
            Some(row) => row,
            None => return Ok(None),
        };

        let expires_at = parse_timestamp(&row.get::<_, String>(0)?)?;
        let scope: Vec<String> =
            serde_json::from_str(&row.get::<_, String>(1)?).context("Failed to parse scope")?;

        Ok(Some(CredentialStatus { expires_at, scope }))
    }

    /// Deletes the grant for (user, provider).
    ///
    /// Returns whether a row existed; deleting an absent grant is not an
    /// error.
    pub fn delete(&self, user_id: &str, provider: Provider) -> Result<bool> {
        let rows_affected = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM credentials WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider.as_str()],
            )
            .context("Failed to delete credential")?;

        Ok(rows_affected > 0)
    }

    /// Providers with a stored grant for this user.
    pub fn list_providers(&self, user_id: &str) -> Result<Vec<Provider>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT provider FROM credentials WHERE user_id = ?1 ORDER BY provider")
            .context("Failed to prepare query")?;

        let names = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to read results")?;

        names
            .iter()
            .map(|name| {
                Provider::from_str(name)
                    .map_err(|e| anyhow::anyhow!("unknown provider in store: {}", e))
            })
            .collect()
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .context("Failed to parse timestamp")
}
