use chrono::{DateTime, Utc};
use larder_core::{ChatSession, ChatTurn, TurnRole};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

pub struct SqlChatRepository {
    pool: DbPool,
}

impl SqlChatRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_session(
        &self,
        user_id: i64,
        title: &str,
    ) -> Result<ChatSession, RepositoryError> {
        let created_at = Utc::now();
        let result =
            sqlx::query("INSERT INTO chat_session (user_id, title, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(title)
                .bind(created_at.to_rfc3339())
                .execute(&self.pool)
                .await?;

        Ok(ChatSession {
            id: result.last_insert_rowid(),
            user_id,
            title: title.to_string(),
            created_at,
        })
    }

    pub async fn sessions_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, created_at FROM chat_session
             WHERE user_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }

    pub async fn find_session(&self, id: i64) -> Result<Option<ChatSession>, RepositoryError> {
        let row =
            sqlx::query("SELECT id, user_id, title, created_at FROM chat_session WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|row| session_from_row(&row)).transpose()
    }

    pub async fn rename_session(&self, id: i64, title: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE chat_session SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_session(&self, id: i64) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM chat_session WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn append_turn(
        &self,
        session_id: i64,
        role: TurnRole,
        content: &str,
    ) -> Result<ChatTurn, RepositoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO chat_message (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(ChatTurn {
            id: result.last_insert_rowid(),
            session_id,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    /// Turns in creation order. The id tiebreak keeps the user/assistant
    /// pair of one exchange stable when both land on the same timestamp.
    pub async fn turns_for_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<ChatTurn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM chat_message
             WHERE session_id = ?
             ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(turn_from_row).collect()
    }

    pub async fn find_turn(&self, id: i64) -> Result<Option<ChatTurn>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM chat_message WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| turn_from_row(&row)).transpose()
    }

    /// The execution marker's write path: content is otherwise immutable.
    pub async fn update_turn_content(
        &self,
        id: i64,
        content: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE chat_message SET content = ? WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn session_from_row(row: &SqliteRow) -> Result<ChatSession, RepositoryError> {
    Ok(ChatSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn turn_from_row(row: &SqliteRow) -> Result<ChatTurn, RepositoryError> {
    let role_raw: String = row.try_get("role")?;
    let role = TurnRole::from_str(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown turn role `{role_raw}`")))?;

    Ok(ChatTurn {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        role,
        content: row.try_get("content")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use larder_core::TurnRole;

    use crate::repositories::user::SqlUserRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    use super::SqlChatRepository;

    async fn setup() -> (DbPool, i64) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let user = SqlUserRepository::new(pool.clone())
            .sync("auth0|chatter", None)
            .await
            .expect("sync user");
        (pool, user.id)
    }

    #[tokio::test]
    async fn turns_replay_in_creation_order() {
        let (pool, user_id) = setup().await;
        let repo = SqlChatRepository::new(pool);
        let session = repo.create_session(user_id, "New Chat").await.expect("session");

        repo.append_turn(session.id, TurnRole::User, "got milk?").await.expect("turn 1");
        repo.append_turn(session.id, TurnRole::Assistant, "two cartons").await.expect("turn 2");
        repo.append_turn(session.id, TurnRole::User, "use one").await.expect("turn 3");

        let turns = repo.turns_for_session(session.id).await.expect("turns");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].content, "got milk?");
        assert_eq!(turns[1].role, TurnRole::Assistant);
        assert_eq!(turns[2].content, "use one");
    }

    #[tokio::test]
    async fn sessions_list_newest_first_per_user() {
        let (pool, user_id) = setup().await;
        let repo = SqlChatRepository::new(pool.clone());

        let first = repo.create_session(user_id, "New Chat").await.expect("first");
        let second = repo.create_session(user_id, "New Chat").await.expect("second");

        let other = SqlUserRepository::new(pool).sync("auth0|other", None).await.expect("other");
        repo.create_session(other.id, "New Chat").await.expect("other session");

        let sessions = repo.sessions_for_user(user_id).await.expect("list");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, second.id);
        assert_eq!(sessions[1].id, first.id);
    }

    #[tokio::test]
    async fn deleting_a_session_cascades_to_its_turns() {
        let (pool, user_id) = setup().await;
        let repo = SqlChatRepository::new(pool.clone());
        let session = repo.create_session(user_id, "New Chat").await.expect("session");
        repo.append_turn(session.id, TurnRole::User, "hello").await.expect("turn");

        assert!(repo.delete_session(session.id).await.expect("delete"));

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_message WHERE session_id = ?")
                .bind(session.id)
                .fetch_one(&pool)
                .await
                .expect("count turns");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn turn_content_rewrite_persists() {
        let (pool, user_id) = setup().await;
        let repo = SqlChatRepository::new(pool);
        let session = repo.create_session(user_id, "New Chat").await.expect("session");
        let turn =
            repo.append_turn(session.id, TurnRole::Assistant, "original").await.expect("turn");

        assert!(repo.update_turn_content(turn.id, "rewritten").await.expect("update"));
        let reloaded = repo.find_turn(turn.id).await.expect("find").expect("present");
        assert_eq!(reloaded.content, "rewritten");
    }
}
