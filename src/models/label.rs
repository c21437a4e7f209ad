//! Labelled sub-collection keys.
//!
//! A document field named `"<prefix>:<name>"` carries a whole sub-collection
//! as its value. This is how a tree of collections is flattened into one
//! keyed object without losing structure, and it must stay bit-compatible
//! with previously exported files.

use super::path;
use std::fmt;

/// Default collection prefix.
pub const DEFAULT_COLLECTION_PREFIX: &str = "collection";

/// The reserved prefix marking labelled collection keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPrefix(String);

impl CollectionPrefix {
    /// Creates a prefix. An empty prefix falls back to the default.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if prefix.is_empty() {
            Self::default()
        } else {
            Self(prefix)
        }
    }

    /// Returns the bare prefix, without the separator.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Labels a collection name: `users` becomes `collection:users`.
    #[must_use]
    pub fn label(&self, name: &str) -> String {
        format!("{}:{name}", self.0)
    }

    /// Labels the last segment of a collection path.
    #[must_use]
    pub fn label_path(&self, collection_path: &str) -> String {
        self.label(path::last_segment(collection_path))
    }

    /// Strips the label from a key, returning the collection name.
    ///
    /// Returns `None` for ordinary field names.
    #[must_use]
    pub fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }

    /// Returns whether the key is a labelled collection key.
    #[must_use]
    pub fn is_label(&self, key: &str) -> bool {
        self.strip(key).is_some()
    }

    /// Translates a collection path into the chain of keys that reaches it in a
    /// labelled tree: collection segments are labelled, document IDs are not.
    ///
    /// `users/u1/posts` becomes `["collection:users", "u1", "collection:posts"]`.
    #[must_use]
    pub fn labelled_keys(&self, collection_path: &str) -> Vec<String> {
        path::segments(collection_path)
            .enumerate()
            .map(|(i, segment)| {
                if i % 2 == 0 {
                    self.label(segment)
                } else {
                    segment.to_string()
                }
            })
            .collect()
    }
}

impl Default for CollectionPrefix {
    fn default() -> Self {
        Self(DEFAULT_COLLECTION_PREFIX.to_string())
    }
}

impl fmt::Display for CollectionPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_and_strip() {
        let prefix = CollectionPrefix::default();
        assert_eq!(prefix.label("users"), "collection:users");
        assert_eq!(prefix.strip("collection:users"), Some("users"));
        assert_eq!(prefix.strip("collectionusers"), None);
        assert_eq!(prefix.strip("name"), None);
        assert!(prefix.is_label("collection:posts"));
    }

    #[test]
    fn test_custom_prefix() {
        let prefix = CollectionPrefix::new("coll");
        assert_eq!(prefix.label_path("users/u1/posts"), "coll:posts");
        assert!(!prefix.is_label("collection:posts"));
        assert_eq!(CollectionPrefix::new("").as_str(), DEFAULT_COLLECTION_PREFIX);
    }

    #[test]
    fn test_labelled_keys() {
        let prefix = CollectionPrefix::default();
        assert_eq!(
            prefix.labelled_keys("/users/u1/posts/"),
            vec!["collection:users", "u1", "collection:posts"]
        );
    }
}
