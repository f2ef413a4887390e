//! Client profiles and teller records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{AccountId, Username};

/// Contact details stored on a client profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

/// A bank client: credentials, contact details and the accounts they can use.
///
/// Mutated only by the session holding the profile's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    username: Username,
    password: String,
    #[serde(default)]
    contact: ContactInfo,
    /// Owned and shared account ids, unique and sorted.
    #[serde(default)]
    account_ids: BTreeSet<AccountId>,
}

impl ClientProfile {
    pub fn new(username: Username, password: impl Into<String>, contact: ContactInfo) -> Self {
        Self {
            username,
            password: password.into(),
            contact,
            account_ids: BTreeSet::new(),
        }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn account_ids(&self) -> &BTreeSet<AccountId> {
        &self.account_ids
    }

    /// Exact value comparison of the stored password.
    #[must_use]
    pub fn verify_password(&self, candidate: &str) -> bool {
        self.password == candidate
    }

    #[must_use]
    pub fn owns(&self, account_id: AccountId) -> bool {
        self.account_ids.contains(&account_id)
    }

    /// Adds an account id; returns false if it was already listed.
    pub fn add_account(&mut self, account_id: AccountId) -> bool {
        self.account_ids.insert(account_id)
    }

    /// Removes an account id; returns false if it was not listed.
    pub fn remove_account(&mut self, account_id: AccountId) -> bool {
        self.account_ids.remove(&account_id)
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    pub fn set_contact(&mut self, contact: ContactInfo) {
        self.contact = contact;
    }
}

/// Credentials of a bank teller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TellerRecord {
    username: Username,
    password: String,
}

impl TellerRecord {
    pub fn new(username: Username, password: impl Into<String>) -> Self {
        Self {
            username,
            password: password.into(),
        }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    /// Exact value comparison of the stored password.
    #[must_use]
    pub fn verify_password(&self, candidate: &str) -> bool {
        self.password == candidate
    }
}
