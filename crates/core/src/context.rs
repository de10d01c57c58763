use chrono::NaiveDate;

/// One line of the inventory snapshot injected into the system prompt.
/// Transient: produced fresh per context build, never persisted. Lines are
/// expected pre-sorted by group (the repository query orders them).
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotLine {
    pub group_id: i64,
    pub group_name: String,
    pub item_id: i64,
    pub name: String,
    pub quantity: Option<i64>,
    pub category: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Renders the snapshot as the text block the assistant sees. Pure
/// projection, no side effects.
pub fn render_inventory_context(lines: &[SnapshotLine]) -> String {
    if lines.is_empty() {
        return "Inventory is empty.".to_string();
    }

    let mut out = String::new();
    let mut current_group = None;

    for line in lines {
        if current_group != Some(line.group_id) {
            out.push_str(&format!("Group: {} [ID: {}]\n", line.group_name, line.group_id));
            current_group = Some(line.group_id);
        }

        let quantity = match line.quantity {
            Some(quantity) => quantity.to_string(),
            None => "n/a".to_string(),
        };
        let category = line.category.as_deref().unwrap_or("Unknown");
        out.push_str(&format!(
            "  - [ID: {}] {} (Qty: {}) [Category: {}]",
            line.item_id, line.name, quantity, category
        ));
        if let Some(expiry) = line.expiry_date {
            out.push_str(&format!(" [Expires: {expiry}]"));
        }
        out.push('\n');
    }

    out
}
