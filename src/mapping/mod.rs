//! Mapping Module
//!
//! The in-memory key → value table owned by the store.
//!
//! ## Responsibilities
//! - Enforce key uniqueness under one comparison mode
//! - Keep the caller's key spelling for serialization
//! - Cheap snapshots (values are reference-counted `Bytes`)
//!
//! ## Comparison Modes
//! The mode is fixed when the table is created. Every lookup, insert and
//! removal goes through the same folding function, so a table never holds
//! two keys that compare equal.

mod table;

use std::borrow::Cow;

pub use table::Mapping;

/// How keys are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyComparison {
    /// Exact, byte-for-byte comparison
    #[default]
    Ordinal,

    /// Ordinal comparison after simple uppercase folding of each char
    OrdinalIgnoreCase,
}

impl KeyComparison {
    /// Pick the mode for an `ignore_case` flag
    pub fn from_ignore_case(ignore_case: bool) -> Self {
        if ignore_case {
            KeyComparison::OrdinalIgnoreCase
        } else {
            KeyComparison::Ordinal
        }
    }

    pub fn is_ignore_case(self) -> bool {
        matches!(self, KeyComparison::OrdinalIgnoreCase)
    }

    /// Lookup form of a key. Borrows when folding changes nothing.
    pub fn fold<'a>(self, key: &'a str) -> Cow<'a, str> {
        match self {
            KeyComparison::Ordinal => Cow::Borrowed(key),
            KeyComparison::OrdinalIgnoreCase => {
                if key.chars().all(|c| !has_case_mapping(c)) {
                    Cow::Borrowed(key)
                } else {
                    Cow::Owned(key.chars().map(fold_char).collect())
                }
            }
        }
    }

    /// Whether two keys name the same entry under this mode
    pub fn keys_equal(self, a: &str, b: &str) -> bool {
        self.fold(a) == self.fold(b)
    }
}

/// Simple (one-to-one) uppercase mapping. Chars whose uppercase form expands
/// to several chars (e.g. 'ß') are left as-is.
fn fold_char(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

fn has_case_mapping(c: char) -> bool {
    fold_char(c) != c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_fold_borrows() {
        assert!(matches!(KeyComparison::Ordinal.fold("Key"), Cow::Borrowed("Key")));
    }

    #[test]
    fn test_ignore_case_folds_ascii_and_unicode() {
        let mode = KeyComparison::OrdinalIgnoreCase;
        assert_eq!(mode.fold("user"), "USER");
        assert_eq!(mode.fold("Ärger"), "ÄRGER");
        assert!(mode.keys_equal("Straße", "STRAßE"));
        assert!(!KeyComparison::Ordinal.keys_equal("Key", "key"));
    }

    #[test]
    fn test_already_folded_key_borrows() {
        let mode = KeyComparison::OrdinalIgnoreCase;
        assert!(matches!(mode.fold("ABC-123"), Cow::Borrowed(_)));
    }
}
