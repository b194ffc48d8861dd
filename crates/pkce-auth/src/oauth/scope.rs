//! Scope sets.
//!
//! Space-delimited text on the wire, a sorted set internally so that
//! duplicates and ordering never affect comparison.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A set of scope tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope(BTreeSet<String>);

impl Scope {
    /// Parse a space-delimited scope string. Any run of whitespace separates tokens.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(raw.split_whitespace().map(str::to_owned).collect())
    }

    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Scope {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collapses_whitespace_and_duplicates() {
        let scope = Scope::parse("  api.read\tapi.write  api.read\n");
        assert_eq!(scope.len(), 2);
        assert!(scope.contains("api.read"));
        assert!(scope.contains("api.write"));
    }

    #[test]
    fn test_empty() {
        assert!(Scope::parse("").is_empty());
        assert!(Scope::parse("   ").is_empty());
        assert_eq!(Scope::default().to_string(), "");
    }

    #[test]
    fn test_order_does_not_matter() {
        assert_eq!(Scope::parse("b a"), Scope::parse("a b"));
        assert_eq!(Scope::parse("b a").to_string(), "a b");
    }

    #[test]
    fn test_no_prefix_match() {
        let scope = Scope::parse("api.readonly");
        assert!(!scope.contains("api.read"));
    }

    #[test]
    fn test_serde_as_string() {
        let scope = Scope::parse("profile api.read");
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json, serde_json::json!("api.read profile"));

        let back: Scope = serde_json::from_value(json).unwrap();
        assert_eq!(back, scope);
    }
}
