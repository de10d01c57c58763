use thiserror::Error;

pub mod chat;
pub mod group;
pub mod item;
pub mod user;

pub use chat::SqlChatRepository;
pub use group::SqlGroupRepository;
pub use item::{ReduceOutcome, SqlInventoryRepository};
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}
