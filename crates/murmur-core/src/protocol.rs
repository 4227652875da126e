//! Core identifier types shared by every component.
//!
//! - [`NodeId`]: name of a cluster member (or client) as assigned by the coordinator
//! - [`MessageId`]: opaque broadcast value, meaningful only by equality

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of a cluster member.
///
/// Node ids are assigned externally (for example `n0`, `n1`, ...) and stay
/// stable for the lifetime of the process. Clients use the same namespace
/// (`c1`, `c2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A broadcast value.
///
/// Ids are origin-agnostic: the same value broadcast at two different nodes
/// is the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// Wraps a raw integer value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn node_id_serializes_as_plain_string() {
        let id = NodeId::from("n1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"n1\"");

        let back: NodeId = serde_json::from_str("\"n1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn node_id_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(NodeId::from("n3"), 3);
        assert_eq!(map.get("n3"), Some(&3));
    }

    #[test]
    fn message_id_serializes_as_integer() {
        let id = MessageId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");

        let back: MessageId = serde_json::from_str("-5").unwrap();
        assert_eq!(back.value(), -5);
    }

    #[test]
    fn message_id_rejects_non_integers() {
        assert!(serde_json::from_str::<MessageId>("\"7\"").is_err());
        assert!(serde_json::from_str::<MessageId>("1.5").is_err());
    }

    #[test]
    fn display_formats() {
        assert_eq!(NodeId::new("c4").to_string(), "c4");
        assert_eq!(MessageId::from(9).to_string(), "9");
    }
}
