use chrono::{DateTime, Utc};
use larder_core::AppUser;
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Finds or creates the user row for a request identity. The subject is
    /// the unique username; a missing email gets a placeholder so the column
    /// stays non-null (mirrors the original token sync).
    pub async fn sync(&self, subject: &str, email: Option<&str>) -> Result<AppUser, RepositoryError> {
        if let Some(user) = self.find_by_username(subject).await? {
            return Ok(user);
        }

        let email = match email.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => value.to_string(),
            None => format!("{subject}@larder.local"),
        };

        sqlx::query(
            "INSERT OR IGNORE INTO app_user (username, email, created_at) VALUES (?, ?, ?)",
        )
        .bind(subject)
        .bind(&email)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_username(subject).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("user `{subject}` missing after sync insert"))
        })
    }

    pub async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AppUser>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, username, email, created_at FROM app_user WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(AppUser {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                email: row.try_get("email")?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use crate::{connect_with_settings, migrations};

    use super::SqlUserRepository;

    #[tokio::test]
    async fn sync_creates_once_and_then_reuses_the_row() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlUserRepository::new(pool.clone());

        let first = repo.sync("auth0|abc123", Some("kim@example.com")).await.expect("first sync");
        let second = repo.sync("auth0|abc123", None).await.expect("second sync");

        assert_eq!(first.id, second.id);
        assert_eq!(second.email, "kim@example.com");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_user")
            .fetch_one(&pool)
            .await
            .expect("count users");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn sync_fills_a_placeholder_email_when_absent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlUserRepository::new(pool);

        let user = repo.sync("auth0|noemail", None).await.expect("sync");
        assert_eq!(user.email, "auth0|noemail@larder.local");
    }
}
