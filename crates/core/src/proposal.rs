//! Decoding of assistant-emitted mutation proposals and the executed-flag
//! rewrite applied to the originating message.
//!
//! A proposal travels as a fenced ```json block inside free-form assistant
//! text. Decoding is strict on the `action` discriminator and lenient per
//! item: malformed items are skipped with a warning, never fatal to the
//! batch.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::warn;

use crate::domain::item::ItemKind;
use crate::errors::DomainError;

pub const ACTION_REDUCE_QUANTITY: &str = "REDUCE_QUANTITY";
pub const ACTION_ADD_ITEMS: &str = "ADD_ITEMS";

#[derive(Clone, Debug, PartialEq)]
pub enum MutationProposal {
    ReduceQuantity { items: Vec<ReduceItem> },
    AddItems { items: Vec<AddItem> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReduceItem {
    pub item_id: i64,
    pub name: Option<String>,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AddItem {
    pub name: String,
    pub quantity: i64,
    /// `None` when absent or non-positive on the wire; resolved to the
    /// acting user's first available group at execution time.
    pub group_id: Option<i64>,
    pub category: String,
    pub expiry_date: Option<NaiveDate>,
    pub kind: ItemKind,
}

/// Decodes an untrusted proposal payload. Accepts either the bare JSON
/// object or surrounding assistant text, in which case the first fenced
/// block is located and decoded.
pub fn parse_proposal(raw: &str) -> Result<MutationProposal, DomainError> {
    let payload = decode_payload(raw)?;

    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::InvalidProposal("missing action discriminator".to_string()))?;

    let items = payload.get("items").and_then(Value::as_array).cloned().unwrap_or_default();

    match action {
        ACTION_REDUCE_QUANTITY => {
            Ok(MutationProposal::ReduceQuantity { items: decode_reduce_items(&items) })
        }
        ACTION_ADD_ITEMS => Ok(MutationProposal::AddItems { items: decode_add_items(&items) }),
        other => {
            Err(DomainError::InvalidProposal(format!("unrecognized action `{other}`")))
        }
    }
}

fn decode_payload(raw: &str) -> Result<Value, DomainError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(value);
    }

    let block = fenced_block(raw).ok_or_else(|| {
        DomainError::InvalidProposal(
            "payload is neither a JSON object nor text containing a fenced block".to_string(),
        )
    })?;
    serde_json::from_str(block)
        .map_err(|err| DomainError::InvalidProposal(format!("fenced block is not valid JSON: {err}")))
}

fn decode_reduce_items(items: &[Value]) -> Vec<ReduceItem> {
    let mut decoded = Vec::with_capacity(items.len());
    for item in items {
        let item_id = item.get("id").and_then(Value::as_i64).unwrap_or(0);
        let quantity = item.get("quantity").and_then(Value::as_i64).unwrap_or(0);
        if item_id <= 0 || quantity <= 0 {
            warn!(
                event_name = "proposal.reduce.item_skipped",
                item_id,
                quantity,
                "reduce item skipped: id and quantity must both be positive"
            );
            continue;
        }
        let name = item.get("name").and_then(Value::as_str).map(str::to_string);
        decoded.push(ReduceItem { item_id, name, quantity });
    }
    decoded
}

fn decode_add_items(items: &[Value]) -> Vec<AddItem> {
    let mut decoded = Vec::with_capacity(items.len());
    for item in items {
        let name = item.get("name").and_then(Value::as_str).map(str::trim).unwrap_or_default();
        let quantity = item.get("quantity").and_then(Value::as_i64).unwrap_or(0);
        if name.is_empty() || quantity <= 0 {
            warn!(
                event_name = "proposal.add.item_skipped",
                item_name = name,
                quantity,
                "add item skipped: name and a positive quantity are required"
            );
            continue;
        }

        let expiry_raw = item.get("expiryDate").and_then(Value::as_str).filter(|s| !s.is_empty());
        let expiry_date = match expiry_raw {
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    warn!(
                        event_name = "proposal.add.item_skipped",
                        item_name = name,
                        expiry = raw,
                        "add item skipped: expiry date is not YYYY-MM-DD"
                    );
                    continue;
                }
            },
            None => None,
        };

        let group_id = item.get("groupId").and_then(Value::as_i64).filter(|id| *id > 0);
        let category = item
            .get("category")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("General")
            .to_string();
        let kind = ItemKind::from_wire(item.get("type").and_then(Value::as_str).unwrap_or_default());

        decoded.push(AddItem {
            name: name.to_string(),
            quantity,
            group_id,
            category,
            expiry_date: expiry_date.filter(|_| kind.is_expirable()),
            kind,
        });
    }
    decoded
}

/// Rewrites a stored assistant message so its proposal block carries an
/// `"executed": true` flag ahead of the `action` key. Returns `None` when
/// nothing changes: no fenced block, no decodable object, no `action` key,
/// or the flag is already present (idempotent). Only the first fenced block
/// of a message is considered.
pub fn mark_executed(content: &str) -> Option<String> {
    let (inner_start, inner) = fenced_block_span(content)?;
    let payload: Value = serde_json::from_str(inner).ok()?;
    let object = payload.as_object()?;
    if !object.contains_key("action") {
        return None;
    }
    if object.get("executed").and_then(Value::as_bool) == Some(true) {
        return None;
    }

    let action_offset = inner.find("\"action\"")?;
    let insert_at = inner_start + action_offset;

    let mut updated = String::with_capacity(content.len() + 20);
    updated.push_str(&content[..insert_at]);
    updated.push_str("\"executed\": true, ");
    updated.push_str(&content[insert_at..]);
    Some(updated)
}

/// True when the message's first fenced block already carries the flag.
pub fn is_marked_executed(content: &str) -> bool {
    let Some((_, inner)) = fenced_block_span(content) else {
        return false;
    };
    serde_json::from_str::<Value>(inner)
        .ok()
        .and_then(|payload| payload.get("executed").and_then(Value::as_bool))
        == Some(true)
}

fn fenced_block(text: &str) -> Option<&str> {
    fenced_block_span(text).map(|(_, inner)| inner)
}

/// Locates the first fenced code block and returns the byte offset and text
/// of its payload (the info string on the opening line is skipped).
fn fenced_block_span(text: &str) -> Option<(usize, &str)> {
    let open = text.find("```")?;
    let after_open = open + 3;
    let info_len = text[after_open..].find('\n')?;
    let inner_start = after_open + info_len + 1;
    let close = text[inner_start..].find("```")?;
    Some((inner_start, &text[inner_start..inner_start + close]))
}
