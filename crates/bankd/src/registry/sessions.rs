//! Session registry: token -> session, one live session per (username, role).

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use bank_core::{BankError, BankResult, Role, SessionToken, Username};

/// Metadata of one authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: SessionToken,
    pub username: Username,
    pub role: Role,
    pub logged_in_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Concurrent map of live sessions.
///
/// Two concurrent maps: one keyed by token, one by identity. The identity
/// map is the uniqueness guard; a login claims its `(username, role)` slot
/// before the session itself becomes visible.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    by_token: DashMap<SessionToken, Session>,
    by_identity: DashMap<(Username, Role), SessionToken>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session with a freshly generated token.
    ///
    /// # Errors
    ///
    /// `BankError::AlreadyLoggedIn` if `(username, role)` already has a live session.
    pub fn create(&self, username: Username, role: Role) -> BankResult<Session> {
        let token = SessionToken::generate();

        match self.by_identity.entry((username.clone(), role)) {
            Entry::Occupied(_) => {
                debug!(username = %username, role = %role, "Rejected duplicate login");
                return Err(BankError::AlreadyLoggedIn { username, role });
            }
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }

        let now = Utc::now();
        let session = Session {
            token: token.clone(),
            username,
            role,
            logged_in_at: now,
            last_active: now,
        };
        self.by_token.insert(token, session.clone());

        info!(
            username = %session.username,
            role = %session.role,
            token = %session.token.short(),
            "Session created"
        );
        Ok(session)
    }

    /// Returns a copy of the session for `token`, if it is live.
    pub fn lookup(&self, token: &SessionToken) -> Option<Session> {
        self.by_token.get(token).map(|entry| entry.value().clone())
    }

    /// Removes the session for `token`. Returns the removed session.
    pub fn remove(&self, token: &SessionToken) -> Option<Session> {
        let (_, session) = self.by_token.remove(token)?;
        self.by_identity
            .remove_if(&(session.username.clone(), session.role), |_, owner| {
                owner == token
            });

        info!(
            username = %session.username,
            role = %session.role,
            token = %token.short(),
            "Session removed"
        );
        Some(session)
    }

    /// Updates the last-active timestamp. Returns false if the token is unknown.
    pub fn touch(&self, token: &SessionToken) -> bool {
        match self.by_token.get_mut(token) {
            Some(mut entry) => {
                entry.last_active = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Returns true if `(username, role)` currently has a live session.
    pub fn is_logged_in(&self, username: &Username, role: Role) -> bool {
        self.by_identity.contains_key(&(username.clone(), role))
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}
