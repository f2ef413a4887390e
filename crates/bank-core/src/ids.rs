//! Type-safe identifiers shared by the ledger, the registries and the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Usernames
// ============================================================================

/// Login name of a client profile or a teller.
///
/// Usernames are compared exactly; no case folding is applied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Creates a new Username from a string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the name is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Username {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Account Ids
// ============================================================================

/// Numeric identifier of an account.
///
/// Ids are allocated by the ledger and never reused while the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(u64);

impl AccountId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

impl From<u64> for AccountId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Session Tokens
// ============================================================================

/// Opaque token identifying one authenticated session.
///
/// Generated from a random UUID at login, so tokens are unique per login
/// even for the same user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a fresh, globally unique token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing token string (as received on the wire).
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened display form (first 8 characters) for logs.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Role a session authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Account holder at an ATM or client terminal.
    Client,
    /// Bank employee acting on behalf of clients.
    Teller,
}

impl Role {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Teller => "teller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Lockable Resources
// ============================================================================

/// A lockable resource: a client profile, an account or a teller record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "resource", content = "id", rename_all = "snake_case")]
pub enum ResourceId {
    Profile(Username),
    Account(AccountId),
    Teller(Username),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile(name) => write!(f, "profile:{name}"),
            Self::Account(id) => write!(f, "account:{id}"),
            Self::Teller(name) => write!(f, "teller:{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = SessionToken::generate();
        let b = SessionToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_account_id_display_is_padded() {
        assert_eq!(AccountId::new(42).to_string(), "00000042");
    }

    #[test]
    fn test_resource_display() {
        assert_eq!(
            ResourceId::Profile(Username::new("alice")).to_string(),
            "profile:alice"
        );
        assert_eq!(ResourceId::Account(AccountId::new(7)).to_string(), "account:00000007");
        assert_eq!(ResourceId::Teller(Username::new("bob")).to_string(), "teller:bob");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Teller).unwrap();
        assert_eq!(json, "\"teller\"");
    }

    #[test]
    fn test_blank_username() {
        assert!(Username::new("   ").is_blank());
        assert!(!Username::new("alice").is_blank());
    }
}
