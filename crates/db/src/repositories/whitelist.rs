use sqlx::Row;

use slotguard_core::domain::whitelist::{EntryType, WhitelistEntry};
use slotguard_core::time::{encode_timestamp, now_utc};

use super::{RepositoryError, WhitelistRepository};
use crate::DbPool;

pub struct SqlWhitelistRepository {
    pool: DbPool,
}

impl SqlWhitelistRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<WhitelistEntry, RepositoryError> {
    let entry_type: String = row.try_get("entry_type")?;
    let entry_type = EntryType::parse(&entry_type)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown whitelist entry type `{entry_type}`")))?;

    Ok(WhitelistEntry {
        reviewer_login: row.try_get("reviewer_login")?,
        entry_type,
        name: row.try_get("name")?,
    })
}

#[async_trait::async_trait]
impl WhitelistRepository for SqlWhitelistRepository {
    async fn list_for_reviewer(
        &self,
        reviewer_login: &str,
    ) -> Result<Vec<WhitelistEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT reviewer_login, entry_type, name
             FROM user_project_whitelist
             WHERE reviewer_login = ?
             ORDER BY entry_type ASC, name ASC",
        )
        .bind(reviewer_login)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn add(&self, entry: &WhitelistEntry) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO user_project_whitelist (reviewer_login, entry_type, name, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(reviewer_login, entry_type, name) DO NOTHING",
        )
        .bind(&entry.reviewer_login)
        .bind(entry.entry_type.as_str())
        .bind(&entry.name)
        .bind(encode_timestamp(now_utc()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, reviewer_login: &str, name: &str) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM user_project_whitelist WHERE reviewer_login = ? AND name = ?")
                .bind(reviewer_login)
                .bind(name)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn is_whitelisted(
        &self,
        reviewer_login: &str,
        project_name: Option<&str>,
        family_label: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        if project_name.is_none() && family_label.is_none() {
            return Ok(false);
        }

        let matched: i64 = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM user_project_whitelist
                 WHERE reviewer_login = ?
                   AND ((entry_type = 'PROJECT' AND name = ?)
                     OR (entry_type = 'FAMILY' AND name = ?))
             )",
        )
        .bind(reviewer_login)
        .bind(project_name)
        .bind(family_label)
        .fetch_one(&self.pool)
        .await?;

        Ok(matched == 1)
    }
}

#[cfg(test)]
mod tests {
    use slotguard_core::domain::whitelist::WhitelistEntry;

    use super::SqlWhitelistRepository;
    use crate::repositories::WhitelistRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlWhitelistRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlWhitelistRepository::new(pool)
    }

    #[tokio::test]
    async fn add_reports_duplicates() {
        let repo = setup().await;
        let entry = WhitelistEntry::project("alice", "go-concurrency");

        assert!(repo.add(&entry).await.expect("first add"));
        assert!(!repo.add(&entry).await.expect("second add"));
        assert_eq!(repo.list_for_reviewer("alice").await.expect("list"), vec![entry]);
    }

    #[tokio::test]
    async fn gate_matches_project_or_family_for_the_owner_only() {
        let repo = setup().await;
        repo.add(&WhitelistEntry::project("alice", "go-concurrency")).await.expect("project");
        repo.add(&WhitelistEntry::family("alice", "C - Algorithms")).await.expect("family");

        assert!(repo.is_whitelisted("alice", Some("go-concurrency"), None).await.expect("gate"));
        assert!(repo.is_whitelisted("alice", Some("c-sorts"), Some("C - Algorithms")).await.expect("gate"));
        assert!(!repo.is_whitelisted("alice", Some("C - Algorithms"), None).await.expect("gate"));
        assert!(!repo.is_whitelisted("bob", Some("go-concurrency"), None).await.expect("gate"));
        assert!(!repo.is_whitelisted("alice", None, None).await.expect("gate"));
    }

    #[tokio::test]
    async fn remove_drops_entries_of_both_types() {
        let repo = setup().await;
        repo.add(&WhitelistEntry::project("alice", "Go")).await.expect("project");
        repo.add(&WhitelistEntry::family("alice", "Go")).await.expect("family");
        repo.add(&WhitelistEntry::family("bob", "Go")).await.expect("other reviewer");

        assert_eq!(repo.remove("alice", "Go").await.expect("remove"), 2);
        assert_eq!(repo.remove("alice", "Go").await.expect("remove again"), 0);
        assert!(repo.list_for_reviewer("alice").await.expect("list").is_empty());
        assert_eq!(repo.list_for_reviewer("bob").await.expect("list").len(), 1);
    }
}
