use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use larder_core::{InventoryItem, ItemCondition, ItemKind, NewItem, SnapshotLine};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::RepositoryError;
use crate::DbPool;

/// Result of one reduce operation. Storage never holds a zero or negative
/// quantity: anything that would reach zero is deleted instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOutcome {
    NotFound,
    Deleted,
    Remaining(i64),
}

pub struct SqlInventoryRepository {
    pool: DbPool,
}

impl SqlInventoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The sole consumption write path. One transaction per call so batch
    /// items fail independently. An item with untracked (NULL) quantity is
    /// binary present/absent and is deleted by any valid reduce.
    pub async fn reduce_quantity(
        &self,
        id: i64,
        amount: i64,
    ) -> Result<ReduceOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT quantity FROM inventory_item WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(ReduceOutcome::NotFound);
        };

        let current: Option<i64> = row.try_get("quantity")?;
        let outcome = match current {
            None => {
                sqlx::query("DELETE FROM inventory_item WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                ReduceOutcome::Deleted
            }
            Some(current) => {
                let remaining = current - amount;
                if remaining <= 0 {
                    sqlx::query("DELETE FROM inventory_item WHERE id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    ReduceOutcome::Deleted
                } else {
                    sqlx::query("UPDATE inventory_item SET quantity = ? WHERE id = ?")
                        .bind(remaining)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    ReduceOutcome::Remaining(remaining)
                }
            }
        };

        tx.commit().await?;
        debug!(event_name = "inventory.reduce.applied", item_id = id, amount, ?outcome);
        Ok(outcome)
    }

    /// Inserts a draft item, resolving the category by exact name or
    /// lazily creating it, in one transaction.
    pub async fn add_item(
        &self,
        group_id: i64,
        draft: &NewItem,
        category_name: &str,
        created_by: Option<i64>,
    ) -> Result<InventoryItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let category_id = resolve_category(&mut tx, category_name).await?;

        let result = sqlx::query(
            "INSERT INTO inventory_item
                (name, quantity, price, kind, expiry_date, condition, category_id, group_id, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&draft.name)
        .bind(draft.quantity)
        .bind(draft.price.map(|price| price.to_string()))
        .bind(draft.kind.as_str())
        .bind(draft.expiry_date)
        .bind(draft.condition.map(|condition| condition.as_str()))
        .bind(category_id)
        .bind(group_id)
        .bind(created_by)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(InventoryItem {
            id: result.last_insert_rowid(),
            name: draft.name.clone(),
            quantity: draft.quantity,
            price: draft.price,
            kind: draft.kind,
            expiry_date: draft.expiry_date,
            condition: draft.condition,
            category: Some(category_name.to_string()),
            group_id,
        })
    }

    /// Replaces an item's fields in place, keeping its group. Returns
    /// `None` when the item does not exist.
    pub async fn update_item(
        &self,
        id: i64,
        draft: &NewItem,
        category_name: &str,
    ) -> Result<Option<InventoryItem>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let group_id: Option<i64> =
            sqlx::query_scalar("SELECT group_id FROM inventory_item WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(group_id) = group_id else {
            return Ok(None);
        };

        let category_id = resolve_category(&mut tx, category_name).await?;

        sqlx::query(
            "UPDATE inventory_item
             SET name = ?, quantity = ?, price = ?, kind = ?, expiry_date = ?, condition = ?, category_id = ?
             WHERE id = ?",
        )
        .bind(&draft.name)
        .bind(draft.quantity)
        .bind(draft.price.map(|price| price.to_string()))
        .bind(draft.kind.as_str())
        .bind(draft.expiry_date)
        .bind(draft.condition.map(|condition| condition.as_str()))
        .bind(category_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(InventoryItem {
            id,
            name: draft.name.clone(),
            quantity: draft.quantity,
            price: draft.price,
            kind: draft.kind,
            expiry_date: draft.expiry_date,
            condition: draft.condition,
            category: Some(category_name.to_string()),
            group_id,
        }))
    }

    pub async fn find_item(&self, id: i64) -> Result<Option<InventoryItem>, RepositoryError> {
        let row = sqlx::query(&format!("{ITEM_SELECT} WHERE i.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| item_from_row(&row)).transpose()
    }

    pub async fn items_for_group(
        &self,
        group_id: i64,
    ) -> Result<Vec<InventoryItem>, RepositoryError> {
        let rows = sqlx::query(&format!("{ITEM_SELECT} WHERE i.group_id = ? ORDER BY i.id"))
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(item_from_row).collect()
    }

    /// Substring search on item and category names, scoped to the groups the
    /// user belongs to.
    pub async fn search_for_user(
        &self,
        user_id: i64,
        query: &str,
    ) -> Result<Vec<InventoryItem>, RepositoryError> {
        let pattern = format!("%{}%", query.trim().to_ascii_lowercase());
        let rows = sqlx::query(&format!(
            "{ITEM_SELECT}
             JOIN group_member m ON m.group_id = i.group_id
             WHERE m.user_id = ? AND (LOWER(i.name) LIKE ? OR LOWER(IFNULL(c.name, '')) LIKE ?)
             ORDER BY i.id"
        ))
        .bind(user_id)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    pub async fn delete_item(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM inventory_item WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Snapshot lines for every group the user belongs to, ordered so the
    /// context builder can emit one header per group.
    pub async fn snapshot_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<SnapshotLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT g.id AS group_id, g.group_name, i.id AS item_id, i.name,
                    i.quantity, i.expiry_date, c.name AS category_name
             FROM inventory_item i
             JOIN inventory_group g ON g.id = i.group_id
             JOIN group_member m ON m.group_id = g.id
             LEFT JOIN category c ON c.id = i.category_id
             WHERE m.user_id = ?
             ORDER BY g.id, i.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SnapshotLine {
                    group_id: row.try_get("group_id")?,
                    group_name: row.try_get("group_name")?,
                    item_id: row.try_get("item_id")?,
                    name: row.try_get("name")?,
                    quantity: row.try_get("quantity")?,
                    category: row.try_get("category_name")?,
                    expiry_date: row.try_get::<Option<NaiveDate>, _>("expiry_date")?,
                })
            })
            .collect()
    }
}

const ITEM_SELECT: &str = "SELECT i.id, i.name, i.quantity, i.price, i.kind, i.expiry_date,
        i.condition, i.group_id, c.name AS category_name
 FROM inventory_item i
 LEFT JOIN category c ON c.id = i.category_id";

async fn resolve_category(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    name: &str,
) -> Result<i64, RepositoryError> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM category WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let result =
        sqlx::query("INSERT INTO category (name) VALUES (?)").bind(name).execute(&mut **tx).await?;
    Ok(result.last_insert_rowid())
}

fn item_from_row(row: &SqliteRow) -> Result<InventoryItem, RepositoryError> {
    let kind_raw: String = row.try_get("kind")?;
    let kind = kind_from_storage(&kind_raw)?;

    let price = row
        .try_get::<Option<String>, _>("price")?
        .map(|raw| {
            Decimal::from_str(&raw)
                .map_err(|err| RepositoryError::Decode(format!("bad price `{raw}`: {err}")))
        })
        .transpose()?;

    let condition = row
        .try_get::<Option<String>, _>("condition")?
        .map(|raw| {
            ItemCondition::from_wire(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown condition `{raw}`")))
        })
        .transpose()?;

    Ok(InventoryItem {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        quantity: row.try_get("quantity")?,
        price,
        kind,
        expiry_date: row.try_get::<Option<NaiveDate>, _>("expiry_date")?,
        condition,
        category: row.try_get("category_name")?,
        group_id: row.try_get("group_id")?,
    })
}

fn kind_from_storage(raw: &str) -> Result<ItemKind, RepositoryError> {
    match raw {
        "food" => Ok(ItemKind::Food),
        "medical" => Ok(ItemKind::Medical),
        "pantry" => Ok(ItemKind::Pantry),
        "electronics" => Ok(ItemKind::Electronics),
        "supply" => Ok(ItemKind::Supply),
        other => Err(RepositoryError::Decode(format!("unknown item kind `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use larder_core::{render_inventory_context, ItemKind, NewItem};

    use crate::repositories::group::SqlGroupRepository;
    use crate::repositories::user::SqlUserRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    use super::{ReduceOutcome, SqlInventoryRepository};

    struct Fixture {
        pool: DbPool,
        user_id: i64,
        group_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let user = SqlUserRepository::new(pool.clone())
            .sync("auth0|pantry", None)
            .await
            .expect("sync user");
        let group = SqlGroupRepository::new(pool.clone())
            .create("Flat 4b", "AB12CD", user.id)
            .await
            .expect("create group");

        Fixture { pool, user_id: user.id, group_id: group.id }
    }

    fn food_draft(name: &str, quantity: Option<i64>) -> NewItem {
        NewItem::from_wire(Some("food"), name, quantity, None, None, None)
    }

    #[tokio::test]
    async fn partial_reduce_decrements_and_keeps_the_item() {
        let fixture = setup().await;
        let repo = SqlInventoryRepository::new(fixture.pool);
        let item = repo
            .add_item(fixture.group_id, &food_draft("Milk", Some(3)), "Dairy", None)
            .await
            .expect("add");

        let outcome = repo.reduce_quantity(item.id, 2).await.expect("reduce");
        assert_eq!(outcome, ReduceOutcome::Remaining(1));

        let reloaded = repo.find_item(item.id).await.expect("find").expect("present");
        assert_eq!(reloaded.quantity, Some(1));
    }

    #[tokio::test]
    async fn reduce_at_or_past_zero_deletes_the_item() {
        let fixture = setup().await;
        let repo = SqlInventoryRepository::new(fixture.pool);
        let item = repo
            .add_item(fixture.group_id, &food_draft("Milk", Some(1)), "Dairy", None)
            .await
            .expect("add");

        let outcome = repo.reduce_quantity(item.id, 5).await.expect("reduce");
        assert_eq!(outcome, ReduceOutcome::Deleted);
        assert!(repo.find_item(item.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn untracked_quantity_items_are_deleted_by_any_reduce() {
        let fixture = setup().await;
        let repo = SqlInventoryRepository::new(fixture.pool);
        let item = repo
            .add_item(fixture.group_id, &food_draft("Soy Sauce", None), "Condiments", None)
            .await
            .expect("add");

        let outcome = repo.reduce_quantity(item.id, 1).await.expect("reduce");
        assert_eq!(outcome, ReduceOutcome::Deleted);
        assert!(repo.find_item(item.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn reduce_on_missing_item_reports_not_found() {
        let fixture = setup().await;
        let repo = SqlInventoryRepository::new(fixture.pool);

        let outcome = repo.reduce_quantity(9999, 1).await.expect("reduce");
        assert_eq!(outcome, ReduceOutcome::NotFound);
    }

    #[tokio::test]
    async fn categories_are_created_lazily_and_reused_by_exact_name() {
        let fixture = setup().await;
        let repo = SqlInventoryRepository::new(fixture.pool.clone());

        repo.add_item(fixture.group_id, &food_draft("Milk", Some(1)), "Dairy", None)
            .await
            .expect("first add");
        repo.add_item(fixture.group_id, &food_draft("Butter", Some(1)), "Dairy", None)
            .await
            .expect("second add");
        // Case differs, so this is a distinct category.
        repo.add_item(fixture.group_id, &food_draft("Cheese", Some(1)), "dairy", None)
            .await
            .expect("third add");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM category")
            .fetch_one(&fixture.pool)
            .await
            .expect("count categories");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn snapshot_covers_member_groups_only_and_feeds_the_context_builder() {
        let fixture = setup().await;
        let repo = SqlInventoryRepository::new(fixture.pool.clone());

        let expiry = NaiveDate::from_ymd_opt(2025, 6, 1);
        let draft = NewItem::from_wire(Some("food"), "Milk", Some(2), None, expiry, None);
        repo.add_item(fixture.group_id, &draft, "Dairy", None).await.expect("add");

        // Item in a group the user does not belong to must stay invisible.
        let outsider = SqlUserRepository::new(fixture.pool.clone())
            .sync("auth0|outsider", None)
            .await
            .expect("outsider");
        let other_group = SqlGroupRepository::new(fixture.pool.clone())
            .create("Elsewhere", "ZZ99XX", outsider.id)
            .await
            .expect("other group");
        repo.add_item(other_group.id, &food_draft("Secret Snacks", Some(1)), "Dairy", None)
            .await
            .expect("foreign add");

        let lines = repo.snapshot_for_user(fixture.user_id).await.expect("snapshot");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].name, "Milk");
        assert_eq!(lines[0].expiry_date, expiry);

        let context = render_inventory_context(&lines);
        assert!(context.contains("Group: Flat 4b"));
        assert!(context.contains("[Expires: 2025-06-01]"));
        assert!(!context.contains("Secret Snacks"));
    }

    #[tokio::test]
    async fn search_matches_name_and_category_within_membership() {
        let fixture = setup().await;
        let repo = SqlInventoryRepository::new(fixture.pool);

        repo.add_item(fixture.group_id, &food_draft("Whole Milk", Some(1)), "Dairy", None)
            .await
            .expect("add milk");
        repo.add_item(
            fixture.group_id,
            &NewItem::from_wire(Some("electronics"), "Air Fryer", Some(1), None, None, Some("good")),
            "Kitchenware",
            None,
        )
        .await
        .expect("add fryer");

        let by_name = repo.search_for_user(fixture.user_id, "milk").await.expect("search");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "Whole Milk");

        let by_category = repo.search_for_user(fixture.user_id, "kitchen").await.expect("search");
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].kind, ItemKind::Electronics);
    }

    #[tokio::test]
    async fn update_keeps_the_group_and_swaps_the_category() {
        let fixture = setup().await;
        let repo = SqlInventoryRepository::new(fixture.pool);
        let item = repo
            .add_item(fixture.group_id, &food_draft("Milk", Some(1)), "Dairy", None)
            .await
            .expect("add");

        let updated = repo
            .update_item(item.id, &food_draft("Oat Milk", Some(2)), "Alt Dairy")
            .await
            .expect("update")
            .expect("present");

        assert_eq!(updated.group_id, fixture.group_id);
        assert_eq!(updated.name, "Oat Milk");
        assert_eq!(updated.category.as_deref(), Some("Alt Dairy"));

        let missing =
            repo.update_item(9999, &food_draft("Ghost", None), "Nowhere").await.expect("update");
        assert!(missing.is_none());
    }
}
