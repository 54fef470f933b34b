//! Request identifier type

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Server-assigned identifier of one in-flight request.
///
/// Streaming actions reuse it as the key of their exec session, so at most
/// one session exists per `RequestId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Create a new request ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is blank
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for RequestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_transparent_on_the_wire() {
        let id = RequestId::new("r1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""r1""#);
        assert_eq!(format!("{}", id), "r1");
    }

    #[test]
    fn test_request_id_borrow_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(RequestId::from("s1"), 1);
        assert_eq!(map.get("s1"), Some(&1));
    }
}
