use sqlx::Row;

use slotguard_core::domain::project::ProjectFamily;

use super::{ProjectFamilyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProjectFamilyRepository {
    pool: DbPool,
}

impl SqlProjectFamilyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProjectFamilyRepository for SqlProjectFamilyRepository {
    async fn replace_all(&self, families: &[ProjectFamily]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM project_families").execute(&mut *tx).await?;
        for family in families {
            sqlx::query(
                "INSERT INTO project_families (family_label, project_name) VALUES (?, ?)
                 ON CONFLICT(family_label, project_name) DO NOTHING",
            )
            .bind(&family.family_label)
            .bind(&family.project_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ProjectFamily>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT family_label, project_name FROM project_families
             ORDER BY family_label ASC, project_name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ProjectFamily {
                    family_label: row.try_get("family_label")?,
                    project_name: row.try_get("project_name")?,
                })
            })
            .collect()
    }

    async fn family_for_project(
        &self,
        project_name: &str,
    ) -> Result<Option<String>, RepositoryError> {
        // A project listed under several families resolves to the first label.
        let label = sqlx::query_scalar(
            "SELECT family_label FROM project_families WHERE project_name = ?
             ORDER BY family_label ASC LIMIT 1",
        )
        .bind(project_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(label)
    }

    async fn projects_in_family(&self, family_label: &str) -> Result<Vec<String>, RepositoryError> {
        let projects = sqlx::query_scalar(
            "SELECT project_name FROM project_families WHERE family_label = ?
             ORDER BY project_name ASC",
        )
        .bind(family_label)
        .fetch_all(&self.pool)
        .await?;

        Ok(projects)
    }
}
