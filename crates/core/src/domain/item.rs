use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Item kinds split into two families: expirable kinds carry an optional
/// expiry date, condition-bearing kinds carry an optional qualitative
/// condition. Exactly one family applies per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Food,
    Medical,
    Pantry,
    Electronics,
    Supply,
}

impl ItemKind {
    /// Maps the wire `type` string, case-insensitively. Absent or
    /// unrecognized values fall back to Supply.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "food" => Self::Food,
            "medical" => Self::Medical,
            "pantry" => Self::Pantry,
            "electronics" => Self::Electronics,
            _ => Self::Supply,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Medical => "medical",
            Self::Pantry => "pantry",
            Self::Electronics => "electronics",
            Self::Supply => "supply",
        }
    }

    pub fn is_expirable(&self) -> bool {
        matches!(self, Self::Food | Self::Medical | Self::Pantry)
    }

    pub fn is_condition_bearing(&self) -> bool {
        !self.is_expirable()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCondition {
    New,
    Good,
    Fair,
    Poor,
}

impl ItemCondition {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "good" => Some(Self::Good),
            "fair" => Some(Self::Fair),
            "poor" => Some(Self::Poor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

/// A persisted inventory item. `quantity` is `None` for items tracked as
/// present/absent only; stored quantities are always positive (the mutator
/// deletes instead of storing zero or below).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: i64,
    pub name: String,
    pub quantity: Option<i64>,
    pub price: Option<Decimal>,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub expiry_date: Option<NaiveDate>,
    pub condition: Option<ItemCondition>,
    pub category: Option<String>,
    pub group_id: i64,
}

/// Draft for a not-yet-persisted item. Construct through [`NewItem::from_wire`]
/// so kind-specific fields land only on kinds that carry them.
#[derive(Clone, Debug, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub quantity: Option<i64>,
    pub price: Option<Decimal>,
    pub kind: ItemKind,
    pub expiry_date: Option<NaiveDate>,
    pub condition: Option<ItemCondition>,
}

impl NewItem {
    /// Factory replacing the class-per-kind dispatch: selects the kind from
    /// the wire `type` string and keeps expiry only for expirable kinds,
    /// condition only for condition-bearing kinds.
    pub fn from_wire(
        kind: Option<&str>,
        name: impl Into<String>,
        quantity: Option<i64>,
        price: Option<Decimal>,
        expiry_date: Option<NaiveDate>,
        condition: Option<&str>,
    ) -> Self {
        let kind = ItemKind::from_wire(kind.unwrap_or_default());
        Self {
            name: name.into(),
            quantity,
            price,
            kind,
            expiry_date: expiry_date.filter(|_| kind.is_expirable()),
            condition: condition
                .and_then(ItemCondition::from_wire)
                .filter(|_| kind.is_condition_bearing()),
        }
    }
}
