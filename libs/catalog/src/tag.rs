//! The `key=value` tag wire format.

use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// A single service tag.
///
/// Both parts are non-empty and free of `=` by construction, so the encoded
/// wire form `key=value` is always unambiguous. The registry stores tags as
/// plain strings with no escaping; any string that would not round-trip is
/// rejected up front instead of being silently truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Build a tag, validating both parts.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, CatalogError> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() || value.is_empty() {
            return Err(CatalogError::InvalidTag(
                "key and value must be non-empty".to_string(),
            ));
        }
        if key.contains('=') || value.contains('=') {
            return Err(CatalogError::InvalidTag(format!(
                "key and value must not contain '=': {key}={value}"
            )));
        }

        Ok(Self { key, value })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The wire form, `key=value`.
    pub fn encoded(&self) -> String {
        format!("{}={}", self.key, self.value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

impl FromStr for Tag {
    type Err = CatalogError;

    /// Decode a `key=value` string, splitting on the first `=`.
    ///
    /// Strings with zero or more than one `=` are rejected; the wire format
    /// has no escaping, so such strings cannot be decoded unambiguously.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| CatalogError::InvalidTag(format!("missing '=' in tag string: {s}")))?;

        Tag::new(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_well_formed() {
        let tag = Tag::new("k", "v").unwrap();
        assert_eq!(tag.encoded(), "k=v");
        assert_eq!(tag.to_string(), "k=v");
    }

    #[test]
    fn test_build_rejects_empty_key() {
        assert!(matches!(
            Tag::new("", "v"),
            Err(CatalogError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_build_rejects_empty_value() {
        assert!(matches!(
            Tag::new("k", ""),
            Err(CatalogError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_build_rejects_equals_in_parts() {
        assert!(Tag::new("k=x", "v").is_err());
        assert!(Tag::new("k", "v=1").is_err());
    }

    #[test]
    fn test_deconstruct_well_formed() {
        let tag: Tag = "toto=titi".parse().unwrap();
        assert_eq!(tag.key(), "toto");
        assert_eq!(tag.value(), "titi");
    }

    #[test]
    fn test_deconstruct_rejects_missing_separator() {
        assert!("toto".parse::<Tag>().is_err());
    }

    #[test]
    fn test_deconstruct_rejects_multiple_separators() {
        // `a=b=c` splits into ("a", "b=c"); the remainder is ambiguous.
        assert!("a=b=c".parse::<Tag>().is_err());
    }

    #[test]
    fn test_deconstruct_rejects_empty_parts() {
        assert!("=v".parse::<Tag>().is_err());
        assert!("k=".parse::<Tag>().is_err());
    }
}
