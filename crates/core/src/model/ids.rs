use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique identifier for a flashcard, as assigned by the catalog.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlashcardId(u64);

impl FlashcardId {
    /// Creates a new `FlashcardId`
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying u64 value
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for FlashcardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlashcardId({})", self.0)
    }
}

impl fmt::Display for FlashcardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for parsing ID from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

impl FromStr for FlashcardId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(FlashcardId::new)
            .map_err(|_| ParseIdError {
                kind: "FlashcardId".to_string(),
            })
    }
}

// ─── Owners ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OwnerError {
    #[error("user id must not be empty")]
    EmptyUserId,
}

/// Opaque user identifier handed out by the identity provider.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Wraps a provider-issued identifier.
    ///
    /// # Errors
    ///
    /// Returns `OwnerError::EmptyUserId` if the identifier is blank.
    pub fn new(id: impl Into<String>) -> Result<Self, OwnerError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(OwnerError::EmptyUserId);
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a progress record belongs to.
///
/// `Anonymous` is the single implicit owner of a demo session; it has no
/// identity across devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Owner {
    User(UserId),
    Anonymous,
}

impl Owner {
    /// Key used by storage backends. User ids are never empty, so the empty
    /// string is free to stand for the anonymous owner.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        match self {
            Owner::User(id) => id.as_str(),
            Owner::Anonymous => "",
        }
    }

    /// Inverse of [`Owner::storage_key`].
    ///
    /// # Errors
    ///
    /// Never fails for keys produced by `storage_key`; kept fallible so callers
    /// can surface malformed persisted state.
    pub fn from_storage_key(key: &str) -> Result<Self, OwnerError> {
        if key.is_empty() {
            Ok(Owner::Anonymous)
        } else {
            UserId::new(key).map(Owner::User)
        }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Owner::Anonymous)
    }
}

impl From<UserId> for Owner {
    fn from(id: UserId) -> Self {
        Owner::User(id)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::User(id) => write!(f, "user:{id}"),
            Owner::Anonymous => f.write_str("anonymous"),
        }
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flashcard_id_display_and_parse() {
        let id = FlashcardId::new(42);
        assert_eq!(id.to_string(), "42");
        let parsed: FlashcardId = " 42 ".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn flashcard_id_from_str_invalid() {
        assert!("not-a-number".parse::<FlashcardId>().is_err());
        assert!("-1".parse::<FlashcardId>().is_err());
    }

    #[test]
    fn blank_user_id_is_rejected() {
        assert_eq!(UserId::new("  ").unwrap_err(), OwnerError::EmptyUserId);
    }

    #[test]
    fn owner_storage_key_roundtrip() {
        let user = Owner::User(UserId::new("u-1").unwrap());
        assert_eq!(Owner::from_storage_key(user.storage_key()).unwrap(), user);
        assert_eq!(
            Owner::from_storage_key(Owner::Anonymous.storage_key()).unwrap(),
            Owner::Anonymous
        );
    }

    #[test]
    fn owner_display() {
        assert_eq!(Owner::Anonymous.to_string(), "anonymous");
        assert_eq!(Owner::from(UserId::new("abc").unwrap()).to_string(), "user:abc");
    }
}
