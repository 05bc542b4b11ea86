//! Persisted row shapes for property keys and values.
//!
//! # Invariants
//! - A `PropertyKey` row exists only while at least one `PropertyValue`
//!   references it.
//! - `(key_id, pattern, change_set)` is unique across `PropertyValue` rows.
//! - `payload` always holds JSON text produced by `serde_json`.

use crate::model::key_values::DomainSpecificValue;
use crate::model::pattern::ValueSlot;
use serde::{Deserialize, Serialize};

/// Parent row identifying one configuration property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyKey {
    pub id: String,
    pub description: Option<String>,
}

impl PropertyKey {
    pub fn new(id: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: id.into(),
            description,
        }
    }
}

/// Child row holding one pattern/change-set scoped value of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub key_id: String,
    pub pattern: String,
    /// `None` means the value belongs to no change-set.
    pub change_set: Option<String>,
    /// Serialized payload (JSON text).
    pub payload: String,
}

impl PropertyValue {
    pub fn slot(&self) -> ValueSlot<'_> {
        ValueSlot::new(&self.pattern, self.change_set.as_deref())
    }

    /// Cross-type equality against an in-memory value.
    pub fn matches<P>(&self, value: &DomainSpecificValue<P>) -> bool {
        self.slot() == value.slot()
    }
}

/// Row handed to the transaction boundary for staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Key(PropertyKey),
    Value(PropertyValue),
}

impl Entity {
    /// Short label used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Key(_) => "key",
            Self::Value(_) => "value",
        }
    }
}

impl From<PropertyKey> for Entity {
    fn from(value: PropertyKey) -> Self {
        Self::Key(value)
    }
}

impl From<PropertyValue> for Entity {
    fn from(value: PropertyValue) -> Self {
        Self::Value(value)
    }
}
