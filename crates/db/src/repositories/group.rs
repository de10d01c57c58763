use chrono::{DateTime, Utc};
use larder_core::{normalize_join_code, InventoryGroup};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

pub struct SqlGroupRepository {
    pool: DbPool,
}

impl SqlGroupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates a group and enrolls the creator in one transaction.
    pub async fn create(
        &self,
        name: &str,
        join_code: &str,
        created_by: i64,
    ) -> Result<InventoryGroup, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO inventory_group (group_name, join_code, created_by, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(join_code)
        .bind(created_by)
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        let group_id = result.last_insert_rowid();

        sqlx::query("INSERT INTO group_member (group_id, user_id) VALUES (?, ?)")
            .bind(group_id)
            .bind(created_by)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(InventoryGroup {
            id: group_id,
            group_name: name.to_string(),
            join_code: join_code.to_string(),
            created_by,
            created_at,
        })
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<InventoryGroup>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, group_name, join_code, created_by, created_at
             FROM inventory_group WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| group_from_row(&row)).transpose()
    }

    pub async fn groups_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<InventoryGroup>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT g.id, g.group_name, g.join_code, g.created_by, g.created_at
             FROM inventory_group g
             JOIN group_member m ON m.group_id = g.id
             WHERE m.user_id = ?
             ORDER BY g.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(group_from_row).collect()
    }

    /// The heuristic fallback target for add proposals without a usable
    /// group id: the caller's lowest-numbered group.
    pub async fn first_group_id_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<i64>, RepositoryError> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT group_id FROM group_member WHERE user_id = ? ORDER BY group_id LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn is_member(&self, group_id: i64, user_id: i64) -> Result<bool, RepositoryError> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM group_member WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Joins by code; enrolling an existing member is a no-op that still
    /// returns the group.
    pub async fn join_by_code(
        &self,
        code: &str,
        user_id: i64,
    ) -> Result<Option<InventoryGroup>, RepositoryError> {
        let normalized = normalize_join_code(code);
        let row = sqlx::query(
            "SELECT id, group_name, join_code, created_by, created_at
             FROM inventory_group WHERE join_code = ?",
        )
        .bind(&normalized)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let group = group_from_row(&row)?;

        sqlx::query("INSERT OR IGNORE INTO group_member (group_id, user_id) VALUES (?, ?)")
            .bind(group.id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(Some(group))
    }

    /// Cascade-deletes the group and its items.
    pub async fn delete(&self, group_id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM inventory_group WHERE id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_member(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM group_member WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn group_from_row(row: &SqliteRow) -> Result<InventoryGroup, RepositoryError> {
    Ok(InventoryGroup {
        id: row.try_get("id")?,
        group_name: row.try_get("group_name")?,
        join_code: row.try_get("join_code")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
