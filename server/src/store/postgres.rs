//! Postgres-backed credential store.
//!
//! Every mutation is a single statement so per-admin updates are atomic
//! without explicit transactions. `increment_failed_attempts` uses
//! `RETURNING` to hand back the post-increment count, and
//! `consume_backup_code` guards the removal with `= ANY(...)` so two
//! concurrent consumers of the same code cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Admin, CredentialStore, StoreError};

const ADMIN_COLUMNS: &str = "id, email, role, password_hash, failed_attempts, locked_until, \
     totp_secret, totp_enabled, backup_codes, active, last_login_at, last_login_ip, \
     created_at, updated_at";

/// Create a connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(Into::into)
}

/// Run pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))
}

/// Production [`CredentialStore`].
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Admin>, StoreError> {
        let admin = sqlx::query_as::<_, Admin>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Admin>, StoreError> {
        let admin = sqlx::query_as::<_, Admin>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn increment_failed_attempts(&self, id: Uuid) -> Result<i32, StoreError> {
        let count: i32 = sqlx::query_scalar(
            "UPDATE admins
             SET failed_attempts = failed_attempts + 1, updated_at = NOW()
             WHERE id = $1
             RETURNING failed_attempts",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn clear_failed_attempts(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE admins SET failed_attempts = 0, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_lockout(&self, id: Uuid, until: Option<DateTime<Utc>>) -> Result<(), StoreError> {
        // Setting a deadline starts the next attempt window clean.
        sqlx::query(
            "UPDATE admins
             SET locked_until = $2,
                 failed_attempts = CASE WHEN $2 IS NULL THEN failed_attempts ELSE 0 END,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_totp_secret(&self, id: Uuid, secret: Option<&str>) -> Result<(), StoreError> {
        sqlx::query("UPDATE admins SET totp_secret = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(secret)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn enable_totp(
        &self,
        id: Uuid,
        backup_code_digests: &[String],
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE admins
             SET totp_enabled = TRUE, backup_codes = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(backup_code_digests)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn disable_totp(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE admins
             SET totp_enabled = FALSE, totp_secret = NULL, backup_codes = '{}',
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_backup_codes(&self, id: Uuid, digests: &[String]) -> Result<(), StoreError> {
        sqlx::query("UPDATE admins SET backup_codes = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(digests)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, digest: &str) -> Result<bool, StoreError> {
        // The WHERE guard makes removal first-wins under concurrency.
        let result = sqlx::query(
            "UPDATE admins
             SET backup_codes = array_remove(backup_codes, $2), updated_at = NOW()
             WHERE id = $1 AND $2 = ANY(backup_codes)",
        )
        .bind(id)
        .bind(digest)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_login(&self, id: Uuid, ip: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE admins
             SET last_login_at = NOW(), last_login_ip = $2,
                 failed_attempts = 0, locked_until = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(ip)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE admins SET active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
