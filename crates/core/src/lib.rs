pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod proposal;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use context::{render_inventory_context, SnapshotLine};
pub use domain::chat::{auto_title, ChatSession, ChatTurn, TurnRole, DEFAULT_SESSION_TITLE};
pub use domain::group::{normalize_join_code, AppUser, InventoryGroup};
pub use domain::item::{InventoryItem, ItemCondition, ItemKind, NewItem};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use proposal::{
    is_marked_executed, mark_executed, parse_proposal, AddItem, MutationProposal, ReduceItem,
};
