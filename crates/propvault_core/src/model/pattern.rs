//! Pattern encoding and the shared value-slot comparator.
//!
//! A pattern is the ordered list of domain-key parts a value applies to,
//! joined by a reserved delimiter. The empty pattern (no parts) is the
//! key's default value.
//!
//! # Invariants
//! - `split(join(parts)) == parts` for every part list without the delimiter,
//!   except `[""]`: a single empty part and no parts both encode as `""` and
//!   name the same slot, which always splits back to no parts.
//! - Persisted rows and in-memory values are matched on [`ValueSlot`] only.

use crate::config::DEFAULT_PATTERN_DELIMITER;

/// Joins and splits domain-key parts around one delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternCodec {
    delimiter: char,
}

impl Default for PatternCodec {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_DELIMITER)
    }
}

impl PatternCodec {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Joins parts into a pattern string.
    ///
    /// Returns the first offending part when one contains the delimiter.
    pub fn join<S: AsRef<str>>(&self, parts: &[S]) -> Result<String, String> {
        let mut pattern = String::new();
        for (index, part) in parts.iter().enumerate() {
            let part = part.as_ref();
            if part.contains(self.delimiter) {
                return Err(part.to_string());
            }
            if index > 0 {
                pattern.push(self.delimiter);
            }
            pattern.push_str(part);
        }
        Ok(pattern)
    }

    /// Splits a stored pattern back into its ordered parts.
    ///
    /// `""` yields no parts, never `[""]`.
    pub fn split<'a>(&self, pattern: &'a str) -> Vec<&'a str> {
        if pattern.is_empty() {
            return Vec::new();
        }
        pattern.split(self.delimiter).collect()
    }
}

/// Identity of a value within one key: pattern plus change-set.
///
/// Payloads never take part in the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueSlot<'a> {
    pub pattern: &'a str,
    pub change_set: Option<&'a str>,
}

impl<'a> ValueSlot<'a> {
    pub fn new(pattern: &'a str, change_set: Option<&'a str>) -> Self {
        Self {
            pattern,
            change_set,
        }
    }
}
