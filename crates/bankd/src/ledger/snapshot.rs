//! JSON snapshot of the ledger, used to seed and keep state across restarts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bank_core::{Account, AccountId, AccountVariant, ClientProfile, Money, TellerRecord, Username};

/// Everything the ledger holds, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub tellers: Vec<TellerRecord>,
    #[serde(default)]
    pub profiles: Vec<ClientProfile>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

/// Errors reading or writing a snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Account {account_id} balance does not match its transaction log")]
    InconsistentBalance { account_id: AccountId },

    #[error("Account {account_id} is below its credit limit of {limit}")]
    CreditLimitBreached { account_id: AccountId, limit: Money },

    #[error("Profile {username} lists unknown account {account_id}")]
    UnknownAccount {
        username: Username,
        account_id: AccountId,
    },
}

impl LedgerSnapshot {
    /// Orders entries by key so saved files diff cleanly.
    pub fn sort(&mut self) {
        self.tellers.sort_by(|a, b| a.username().cmp(b.username()));
        self.profiles.sort_by(|a, b| a.username().cmp(b.username()));
        self.accounts.sort_by_key(Account::id);
    }

    /// Checks the ledger invariants a restored ledger must hold.
    ///
    /// Every balance must equal its replayed log, no credit line may sit
    /// below its floor, and every listed account id must exist.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for account in &self.accounts {
            if !account.is_consistent() {
                return Err(SnapshotError::InconsistentBalance {
                    account_id: account.id(),
                });
            }
            if let AccountVariant::CreditLine { credit_limit } = account.variant() {
                if account.balance() < -*credit_limit {
                    return Err(SnapshotError::CreditLimitBreached {
                        account_id: account.id(),
                        limit: *credit_limit,
                    });
                }
            }
        }

        let known: HashSet<AccountId> = self.accounts.iter().map(Account::id).collect();
        for profile in &self.profiles {
            if let Some(missing) = profile.account_ids().iter().find(|id| !known.contains(*id)) {
                return Err(SnapshotError::UnknownAccount {
                    username: profile.username().clone(),
                    account_id: *missing,
                });
            }
        }
        Ok(())
    }

    /// Loads a snapshot. A missing file yields `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot to load");
                return Ok(None);
            }
            Err(source) => {
                return Err(SnapshotError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let snapshot = serde_json::from_str(&raw).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(snapshot))
    }

    /// Writes the snapshot, replacing the file atomically via a temp file.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(self)?;
        let write_err = |source| SnapshotError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;

        info!(
            path = %path.display(),
            profiles = self.profiles.len(),
            accounts = self.accounts.len(),
            "Snapshot saved"
        );
        Ok(())
    }
}
