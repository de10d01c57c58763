use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A shared inventory namespace. Members see each other's items; the
/// creator owns the group's lifetime.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryGroup {
    pub id: i64,
    pub group_name: String,
    pub join_code: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Join codes are compared uppercased and trimmed so users can type them
/// however they were shown.
pub fn normalize_join_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::normalize_join_code;

    #[test]
    fn join_codes_normalize_case_and_whitespace() {
        assert_eq!(normalize_join_code("  ab12cd "), "AB12CD");
        assert_eq!(normalize_join_code("AB12CD"), "AB12CD");
    }
}
