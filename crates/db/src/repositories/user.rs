use chrono::{DateTime, Utc};
use sqlx::Row;

use slotguard_core::domain::user::{User, UserStatus};
use slotguard_core::time::encode_timestamp;

use super::{parse_optional_timestamp, parse_timestamp, RepositoryError, UserRepository};
use crate::DbPool;

const COLUMNS: &str = "reviewer_login, status, telegram_chat_id, created_at, last_auth_success_at,
                       last_auth_failure_at";

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = UserStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown user status `{status}`")))?;

    Ok(User {
        reviewer_login: row.try_get("reviewer_login")?,
        status,
        telegram_chat_id: row.try_get("telegram_chat_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        last_auth_success_at: parse_optional_timestamp(
            "last_auth_success_at",
            row.try_get("last_auth_success_at")?,
        )?,
        last_auth_failure_at: parse_optional_timestamp(
            "last_auth_failure_at",
            row.try_get("last_auth_failure_at")?,
        )?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_login(&self, reviewer_login: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM users WHERE reviewer_login = ?"))
            .bind(reviewer_login)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_telegram_chat_id(&self, chat_id: i64) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM users WHERE telegram_chat_id = ? ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn upsert(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (reviewer_login, status, telegram_chat_id, created_at,
                                last_auth_success_at, last_auth_failure_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(reviewer_login) DO UPDATE SET
                 status = excluded.status,
                 telegram_chat_id = excluded.telegram_chat_id,
                 last_auth_success_at = excluded.last_auth_success_at,
                 last_auth_failure_at = excluded.last_auth_failure_at",
        )
        .bind(&user.reviewer_login)
        .bind(user.status.as_str())
        .bind(user.telegram_chat_id)
        .bind(encode_timestamp(user.created_at))
        .bind(user.last_auth_success_at.map(encode_timestamp))
        .bind(user.last_auth_failure_at.map(encode_timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(
        &self,
        reviewer_login: &str,
        status: UserStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE users SET status = ? WHERE reviewer_login = ?")
            .bind(status.as_str())
            .bind(reviewer_login)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_active(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM users WHERE status = ? ORDER BY reviewer_login ASC"
        ))
        .bind(UserStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn record_auth_success(
        &self,
        reviewer_login: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE users SET last_auth_success_at = ? WHERE reviewer_login = ?")
            .bind(encode_timestamp(at))
            .bind(reviewer_login)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_auth_failure(
        &self,
        reviewer_login: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE users SET last_auth_failure_at = ? WHERE reviewer_login = ?")
            .bind(encode_timestamp(at))
            .bind(reviewer_login)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
