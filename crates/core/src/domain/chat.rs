use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Auto-title grabs at most this many characters of the first user message.
const TITLE_PREFIX_CHARS: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// One message in a session. Immutable once written, except for the
/// execution marker's content rewrite.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub id: i64,
    pub session_id: i64,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Title heuristic for young sessions: while the title is still the default
/// placeholder and at most two turns preceded this one, the first user
/// message names the session. Returns `None` when no retitle applies.
pub fn auto_title(current_title: &str, prior_turns: usize, user_text: &str) -> Option<String> {
    if current_title != DEFAULT_SESSION_TITLE || prior_turns > 2 {
        return None;
    }

    let prefix: String = user_text.chars().take(TITLE_PREFIX_CHARS).collect();
    if user_text.chars().count() > TITLE_PREFIX_CHARS {
        Some(format!("{prefix}..."))
    } else {
        Some(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::{auto_title, TurnRole, DEFAULT_SESSION_TITLE};

    #[test]
    fn long_first_message_is_truncated_to_thirty_chars_with_ellipsis() {
        let text = "what can I cook with the stuff expiring this week?";
        assert!(text.chars().count() > 30);

        let title = auto_title(DEFAULT_SESSION_TITLE, 0, text).expect("should retitle");
        assert_eq!(title, format!("{}...", &text[..30]));
        assert_eq!(title.chars().count(), 33);
    }

    #[test]
    fn short_message_becomes_title_verbatim() {
        let title = auto_title(DEFAULT_SESSION_TITLE, 2, "dinner ideas").expect("should retitle");
        assert_eq!(title, "dinner ideas");
    }

    #[test]
    fn custom_title_is_never_overwritten() {
        assert_eq!(auto_title("Meal planning", 0, "hello"), None);
    }

    #[test]
    fn established_sessions_keep_their_title() {
        assert_eq!(auto_title(DEFAULT_SESSION_TITLE, 3, "hello"), None);
    }

    #[test]
    fn role_round_trips_through_storage_form() {
        assert_eq!(TurnRole::from_str(TurnRole::User.as_str()), Some(TurnRole::User));
        assert_eq!(TurnRole::from_str(TurnRole::Assistant.as_str()), Some(TurnRole::Assistant));
        assert_eq!(TurnRole::from_str("system"), None);
    }
}
