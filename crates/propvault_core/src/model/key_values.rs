//! In-memory configuration model for one property key.
//!
//! # Responsibility
//! - Hold the description and all domain-specific values of one key.
//! - Build patterns from ordered domain-key parts.
//!
//! # Invariants
//! - At most one value per `(pattern, change_set)` slot; inserting into an
//!   occupied slot replaces the previous value.
//! - Iteration order is deterministic (`pattern ASC`, then change-set).

use crate::model::entity::PropertyValue;
use crate::model::pattern::{PatternCodec, ValueSlot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors raised while editing a [`KeyValues`] container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValuesError {
    /// Domain-key part contains the pattern delimiter.
    InvalidDomainKeyPart { part: String, delimiter: char },
}

impl Display for KeyValuesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDomainKeyPart { part, delimiter } => write!(
                f,
                "domain key part `{part}` must not contain delimiter `{delimiter}`"
            ),
        }
    }
}

impl Error for KeyValuesError {}

/// One pattern/change-set scoped value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSpecificValue<P> {
    /// Delimiter-joined domain-key parts.
    pub pattern: String,
    /// `None` means the value belongs to no change-set.
    pub change_set: Option<String>,
    /// `None` marks an incomplete value that cannot be persisted.
    pub value: Option<P>,
}

impl<P> DomainSpecificValue<P> {
    pub fn new(pattern: impl Into<String>, change_set: Option<&str>, value: Option<P>) -> Self {
        Self {
            pattern: pattern.into(),
            change_set: change_set.map(str::to_string),
            value,
        }
    }

    pub fn slot(&self) -> ValueSlot<'_> {
        ValueSlot::new(&self.pattern, self.change_set.as_deref())
    }

    pub fn change_set_is(&self, change_set: Option<&str>) -> bool {
        self.change_set.as_deref() == change_set
    }

    /// Cross-type equality against a persisted row.
    pub fn matches_row(&self, row: &PropertyValue) -> bool {
        row.matches(self)
    }
}

/// Description plus every domain-specific value of one key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValues<P> {
    description: Option<String>,
    codec: PatternCodec,
    values: BTreeMap<(String, Option<String>), DomainSpecificValue<P>>,
}

impl<P> Default for KeyValues<P> {
    fn default() -> Self {
        Self::with_codec(PatternCodec::default())
    }
}

impl<P> KeyValues<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(codec: PatternCodec) -> Self {
        Self {
            description: None,
            codec,
            values: BTreeMap::new(),
        }
    }

    pub fn codec(&self) -> PatternCodec {
        self.codec
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// Puts a value outside of any change-set.
    pub fn put<S: AsRef<str>>(&mut self, value: P, parts: &[S]) -> Result<(), KeyValuesError> {
        self.put_with_change_set(None, value, parts)
    }

    /// Puts a value for the pattern built from `parts`.
    pub fn put_with_change_set<S: AsRef<str>>(
        &mut self,
        change_set: Option<&str>,
        value: P,
        parts: &[S],
    ) -> Result<(), KeyValuesError> {
        let pattern = self
            .codec
            .join(parts)
            .map_err(|part| KeyValuesError::InvalidDomainKeyPart {
                part,
                delimiter: self.codec.delimiter(),
            })?;
        self.insert(DomainSpecificValue::new(pattern, change_set, Some(value)));
        Ok(())
    }

    /// Inserts a prepared value, returning the one it replaced.
    pub fn insert(&mut self, value: DomainSpecificValue<P>) -> Option<DomainSpecificValue<P>> {
        let slot = (value.pattern.clone(), value.change_set.clone());
        self.values.insert(slot, value)
    }

    /// Looks up the value stored for exactly these parts and change-set.
    pub fn get<S: AsRef<str>>(&self, change_set: Option<&str>, parts: &[S]) -> Option<&P> {
        let pattern = self.codec.join(parts).ok()?;
        self.values
            .get(&(pattern, change_set.map(str::to_string)))
            .and_then(|value| value.value.as_ref())
    }

    pub fn domain_specific_values(&self) -> impl Iterator<Item = &DomainSpecificValue<P>> {
        self.values.values()
    }

    /// Values whose change-set equals `change_set`.
    pub fn values_for_change_set<'a>(
        &'a self,
        change_set: Option<&'a str>,
    ) -> impl Iterator<Item = &'a DomainSpecificValue<P>> {
        self.values
            .values()
            .filter(move |value| value.change_set_is(change_set))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds empty [`KeyValues`] containers for the load paths.
///
/// Implemented for every `Fn() -> KeyValues<P>`, so `&KeyValues::default`
/// or a closure capturing a custom codec can be passed directly.
pub trait KeyValuesFactory<P> {
    fn create(&self) -> KeyValues<P>;
}

impl<P, F> KeyValuesFactory<P> for F
where
    F: Fn() -> KeyValues<P>,
{
    fn create(&self) -> KeyValues<P> {
        self()
    }
}
