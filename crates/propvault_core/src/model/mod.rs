//! Domain and persisted shapes of the configuration model.
//!
//! # Responsibility
//! - Define persisted rows (`PropertyKey`, `PropertyValue`).
//! - Define the in-memory shape (`KeyValues`, `DomainSpecificValue`).
//! - Own the single comparator matching the two shapes (`ValueSlot`).

pub mod entity;
pub mod key_values;
pub mod pattern;
