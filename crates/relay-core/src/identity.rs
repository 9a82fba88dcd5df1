//! Participant identities.
//!
//! An identity is an opaque, case-sensitive, non-empty string. Two identities
//! are the same participant only if their strings are byte-for-byte equal;
//! no trimming or case folding is ever applied.

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Name of a participant (or of the admin).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and wrap an identity string.
    pub fn new(name: impl Into<String>) -> RelayResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(RelayError::InvalidIdentity("identity must not be empty".into()));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = RelayError;
    fn try_from(s: String) -> Result<Self, RelayError> {
        Identity::new(s)
    }
}

impl TryFrom<&str> for Identity {
    type Error = RelayError;
    fn try_from(s: &str) -> Result<Self, RelayError> {
        Identity::new(s)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> String {
        id.0
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(Identity::new("").is_err());
    }

    #[test]
    fn case_sensitive() {
        let a = Identity::new("Alice").unwrap();
        let b = Identity::new("alice").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn no_trimming() {
        let a = Identity::new(" alice").unwrap();
        assert_eq!(a.as_str(), " alice");
        assert_ne!(a, Identity::new("alice").unwrap());
    }

    #[test]
    fn deserialize_validates() {
        let ok: Identity = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(ok.as_str(), "bob");
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }
}
