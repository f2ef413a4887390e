//! In-memory ledger: tellers, client profiles and accounts.
//!
//! The ledger itself performs no authorization. Callers (the router) check
//! lock ownership before mutating an entity; the maps only guarantee that
//! each individual read or write is atomic.
//!
//! No method holds a reference into one map while touching another, so
//! the three maps never deadlock against each other.

mod snapshot;

pub use snapshot::{LedgerSnapshot, SnapshotError};

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use bank_core::{
    Account, AccountId, AccountType, AccountVariant, BankError, BankResult, ClientProfile, Money,
    ResourceId, TellerRecord, Transaction, Username,
};
use bank_protocol::{AccountSummary, ProfileSummary};

/// First id handed out by an empty ledger.
const FIRST_ACCOUNT_ID: u64 = 1;

/// Shared store of every profile, account and teller.
#[derive(Debug)]
pub struct Ledger {
    tellers: DashMap<Username, TellerRecord>,
    profiles: DashMap<Username, ClientProfile>,
    accounts: DashMap<AccountId, Account>,
    next_account_id: AtomicU64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            tellers: DashMap::new(),
            profiles: DashMap::new(),
            accounts: DashMap::new(),
            next_account_id: AtomicU64::new(FIRST_ACCOUNT_ID),
        }
    }

    // ------------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------------

    /// Adds or replaces a teller record.
    pub fn add_teller(&self, teller: TellerRecord) {
        self.tellers.insert(teller.username().clone(), teller);
    }

    /// Checks a client's password.
    ///
    /// Unknown users and wrong passwords produce the same error.
    pub fn authenticate_client(&self, username: &Username, password: &str) -> BankResult<()> {
        match self.profiles.get(username) {
            Some(profile) if profile.verify_password(password) => Ok(()),
            _ => Err(BankError::InvalidCredentials),
        }
    }

    /// Checks a teller's password.
    pub fn authenticate_teller(&self, username: &Username, password: &str) -> BankResult<()> {
        match self.tellers.get(username) {
            Some(teller) if teller.verify_password(password) => Ok(()),
            _ => Err(BankError::InvalidCredentials),
        }
    }

    // ------------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------------

    pub fn profile_exists(&self, username: &Username) -> bool {
        self.profiles.contains_key(username)
    }

    /// Returns a copy of a profile.
    pub fn profile(&self, username: &Username) -> BankResult<ClientProfile> {
        self.profiles
            .get(username)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BankError::ProfileNotFound {
                username: username.clone(),
            })
    }

    /// Registers a new profile.
    ///
    /// # Errors
    ///
    /// `BankError::ProfileAlreadyExists` if the username is taken.
    pub fn create_profile(&self, profile: ClientProfile) -> BankResult<()> {
        match self.profiles.entry(profile.username().clone()) {
            Entry::Occupied(entry) => Err(BankError::ProfileAlreadyExists {
                username: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                info!(username = %profile.username(), "Profile created");
                entry.insert(profile);
                Ok(())
            }
        }
    }

    /// Applies `change` to a profile and returns the updated copy.
    pub fn update_profile<F>(&self, username: &Username, change: F) -> BankResult<ClientProfile>
    where
        F: FnOnce(&mut ClientProfile),
    {
        let mut entry = self
            .profiles
            .get_mut(username)
            .ok_or_else(|| BankError::ProfileNotFound {
                username: username.clone(),
            })?;
        change(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Removes a profile. Accounts are not touched.
    pub fn remove_profile(&self, username: &Username) -> BankResult<ClientProfile> {
        let (_, profile) =
            self.profiles
                .remove(username)
                .ok_or_else(|| BankError::ProfileNotFound {
                    username: username.clone(),
                })?;
        info!(username = %username, "Profile removed");
        Ok(profile)
    }

    /// Builds the redacted summary of a profile.
    ///
    /// Listed ids whose account has disappeared are skipped.
    pub fn profile_summary(&self, username: &Username) -> BankResult<ProfileSummary> {
        let profile = self.profile(username)?;
        let accounts = profile
            .account_ids()
            .iter()
            .filter_map(|id| self.accounts.get(id).map(|a| AccountSummary::from(a.value())))
            .collect();
        Ok(ProfileSummary::new(&profile, accounts))
    }

    /// Lists an account on a profile. Returns false if it was already listed.
    pub fn link_account(&self, username: &Username, account_id: AccountId) -> BankResult<bool> {
        if !self.accounts.contains_key(&account_id) {
            return Err(BankError::AccountNotFound { account_id });
        }
        let mut entry = self
            .profiles
            .get_mut(username)
            .ok_or_else(|| BankError::ProfileNotFound {
                username: username.clone(),
            })?;
        Ok(entry.add_account(account_id))
    }

    /// Returns the ids listed by `username` that no other profile lists.
    pub fn accounts_listed_only_by(&self, username: &Username) -> BankResult<Vec<AccountId>> {
        let owned = self.profile(username)?.account_ids().clone();

        let mut exclusive: Vec<AccountId> = owned.into_iter().collect();
        for other in self.profiles.iter() {
            if other.key() == username {
                continue;
            }
            exclusive.retain(|id| !other.owns(*id));
        }
        Ok(exclusive)
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    pub fn account_exists(&self, account_id: AccountId) -> bool {
        self.accounts.contains_key(&account_id)
    }

    /// Returns a copy of an account.
    pub fn account(&self, account_id: AccountId) -> BankResult<Account> {
        self.accounts
            .get(&account_id)
            .map(|entry| entry.value().clone())
            .ok_or(BankError::AccountNotFound { account_id })
    }

    /// Returns true if any checking account listed by `username` holds at
    /// least `threshold`.
    pub fn has_checking_with_balance(
        &self,
        username: &Username,
        threshold: Money,
    ) -> BankResult<bool> {
        let ids = self.profile(username)?.account_ids().clone();
        Ok(ids.iter().any(|id| {
            self.accounts.get(id).is_some_and(|account| {
                account.account_type() == AccountType::Checking && account.balance() >= threshold
            })
        }))
    }

    /// Opens a new account with a fresh id and lists it on `owner`.
    pub fn open_account(&self, owner: &Username, variant: AccountVariant) -> BankResult<Account> {
        if !self.profile_exists(owner) {
            return Err(BankError::ProfileNotFound {
                username: owner.clone(),
            });
        }

        let id = AccountId::new(self.next_account_id.fetch_add(1, Ordering::Relaxed));
        let account = Account::new(id, variant);
        self.accounts.insert(id, account.clone());

        // The profile may have vanished in between; undo the insert then.
        let listed = self
            .profiles
            .get_mut(owner)
            .map(|mut profile| profile.add_account(id))
            .is_some();
        if !listed {
            self.accounts.remove(&id);
            return Err(BankError::ProfileNotFound {
                username: owner.clone(),
            });
        }

        info!(
            account_id = %id,
            owner = %owner,
            account_type = %account.account_type(),
            "Account opened"
        );
        Ok(account)
    }

    /// Applies a transaction through the account's business rules.
    ///
    /// On rejection the account is left exactly as it was.
    pub fn add_transaction(
        &self,
        account_id: AccountId,
        transaction: Transaction,
    ) -> BankResult<Account> {
        let mut entry = self
            .accounts
            .get_mut(&account_id)
            .ok_or(BankError::AccountNotFound { account_id })?;
        entry.add_transaction(transaction)?;

        debug!(
            account_id = %account_id,
            balance = %entry.balance(),
            "Transaction applied"
        );
        Ok(entry.value().clone())
    }

    /// Applies a fallible settings change to an account.
    pub fn update_account<F>(&self, account_id: AccountId, change: F) -> BankResult<Account>
    where
        F: FnOnce(&mut Account) -> BankResult<()>,
    {
        let mut entry = self
            .accounts
            .get_mut(&account_id)
            .ok_or(BankError::AccountNotFound { account_id })?;
        change(entry.value_mut())?;
        Ok(entry.value().clone())
    }

    /// Removes an account and unlists it from every profile.
    pub fn remove_account(&self, account_id: AccountId) -> BankResult<Account> {
        let (_, account) = self
            .accounts
            .remove(&account_id)
            .ok_or(BankError::AccountNotFound { account_id })?;

        for mut profile in self.profiles.iter_mut() {
            profile.remove_account(account_id);
        }

        info!(account_id = %account_id, "Account removed");
        Ok(account)
    }

    // ------------------------------------------------------------------------
    // Bulk views
    // ------------------------------------------------------------------------

    /// Every lockable resource currently in the ledger.
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .profiles
            .iter()
            .map(|p| ResourceId::Profile(p.key().clone()))
            .collect();
        ids.extend(self.accounts.iter().map(|a| ResourceId::Account(*a.key())));
        ids.extend(self.tellers.iter().map(|t| ResourceId::Teller(t.key().clone())));
        ids
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Copies the whole ledger into a serializable snapshot.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot {
            tellers: self.tellers.iter().map(|t| t.value().clone()).collect(),
            profiles: self.profiles.iter().map(|p| p.value().clone()).collect(),
            accounts: self.accounts.iter().map(|a| a.value().clone()).collect(),
        };
        snapshot.sort();
        snapshot
    }

    /// Rebuilds a ledger from a snapshot.
    ///
    /// The snapshot is validated first; the id counter resumes after the
    /// highest restored account id.
    ///
    /// # Errors
    ///
    /// Any `SnapshotError` raised by `LedgerSnapshot::validate`.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, SnapshotError> {
        snapshot.validate()?;

        let next = snapshot
            .accounts
            .iter()
            .map(|a| a.id().get())
            .max()
            .map_or(FIRST_ACCOUNT_ID, |max| max.saturating_add(1));

        let ledger = Self {
            next_account_id: AtomicU64::new(next),
            ..Self::new()
        };

        for teller in snapshot.tellers {
            ledger.add_teller(teller);
        }
        for profile in snapshot.profiles {
            ledger.profiles.insert(profile.username().clone(), profile);
        }
        for account in snapshot.accounts {
            ledger.accounts.insert(account.id(), account);
        }

        info!(
            tellers = ledger.tellers.len(),
            profiles = ledger.profiles.len(),
            accounts = ledger.accounts.len(),
            "Ledger restored"
        );
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bank_core::{ContactInfo, Operation};

    fn ledger_with(user: &str) -> Ledger {
        let ledger = Ledger::new();
        ledger
            .create_profile(ClientProfile::new(
                Username::new(user),
                "pw",
                ContactInfo::default(),
            ))
            .unwrap();
        ledger
    }

    #[test]
    fn test_authentication() {
        let ledger = ledger_with("alice");
        ledger.add_teller(TellerRecord::new(Username::new("tom"), "secret"));

        assert!(ledger.authenticate_client(&Username::new("alice"), "pw").is_ok());
        assert!(ledger.authenticate_client(&Username::new("alice"), "PW").is_err());
        assert!(ledger.authenticate_client(&Username::new("ghost"), "pw").is_err());
        assert!(ledger.authenticate_teller(&Username::new("tom"), "secret").is_ok());
        assert!(ledger.authenticate_teller(&Username::new("alice"), "pw").is_err());
    }

    #[test]
    fn test_duplicate_profile_rejected() {
        let ledger = ledger_with("alice");
        let err = ledger
            .create_profile(ClientProfile::new(
                Username::new("alice"),
                "other",
                ContactInfo::default(),
            ))
            .unwrap_err();
        assert!(matches!(err, BankError::ProfileAlreadyExists { .. }));
    }

    #[test]
    fn test_open_account_assigns_unique_ids() {
        let ledger = ledger_with("alice");
        let alice = Username::new("alice");

        let a = ledger.open_account(&alice, AccountVariant::Checking).unwrap();
        let b = ledger.open_account(&alice, AccountVariant::Checking).unwrap();
        assert_ne!(a.id(), b.id());

        let profile = ledger.profile(&alice).unwrap();
        assert!(profile.owns(a.id()));
        assert!(profile.owns(b.id()));
    }

    #[test]
    fn test_open_account_for_missing_profile() {
        let ledger = Ledger::new();
        let err = ledger
            .open_account(&Username::new("ghost"), AccountVariant::Checking)
            .unwrap_err();
        assert!(matches!(err, BankError::ProfileNotFound { .. }));
        assert_eq!(ledger.account_count(), 0);
    }

    #[test]
    fn test_summary_lists_accounts() {
        let ledger = ledger_with("alice");
        let alice = Username::new("alice");
        let account = ledger.open_account(&alice, AccountVariant::Checking).unwrap();
        ledger
            .add_transaction(
                account.id(),
                Transaction::now(Operation::Deposit, Money::from_cents(1_234)),
            )
            .unwrap();

        let summary = ledger.profile_summary(&alice).unwrap();
        assert_eq!(summary.accounts.len(), 1);
        assert_eq!(summary.accounts[0].balance, Money::from_cents(1_234));
    }

    #[test]
    fn test_rejected_transaction_leaves_account_untouched() {
        let ledger = ledger_with("alice");
        let alice = Username::new("alice");
        let account = ledger
            .open_account(
                &alice,
                AccountVariant::CreditLine {
                    credit_limit: Money::from_cents(10_000),
                },
            )
            .unwrap();

        let err = ledger
            .add_transaction(
                account.id(),
                Transaction::now(Operation::Withdrawal, Money::from_cents(15_000)),
            )
            .unwrap_err();
        assert!(matches!(err, BankError::CreditLimitExceeded { .. }));

        let after = ledger.account(account.id()).unwrap();
        assert!(after.balance().is_zero());
        assert!(after.transactions().is_empty());
    }

    #[test]
    fn test_remove_account_unlists_everywhere() {
        let ledger = ledger_with("alice");
        ledger
            .create_profile(ClientProfile::new(
                Username::new("bob"),
                "pw",
                ContactInfo::default(),
            ))
            .unwrap();
        let alice = Username::new("alice");
        let bob = Username::new("bob");

        let account = ledger.open_account(&alice, AccountVariant::Checking).unwrap();
        assert!(ledger.link_account(&bob, account.id()).unwrap());
        assert!(ledger.accounts_listed_only_by(&alice).unwrap().is_empty());

        ledger.remove_account(account.id()).unwrap();
        assert!(!ledger.profile(&alice).unwrap().owns(account.id()));
        assert!(!ledger.profile(&bob).unwrap().owns(account.id()));
    }

    #[test]
    fn test_checking_threshold() {
        let ledger = ledger_with("alice");
        let alice = Username::new("alice");
        let checking = ledger.open_account(&alice, AccountVariant::Checking).unwrap();
        ledger
            .add_transaction(
                checking.id(),
                Transaction::now(Operation::Deposit, Money::from_cents(50_000)),
            )
            .unwrap();

        assert!(ledger
            .has_checking_with_balance(&alice, Money::from_cents(50_000))
            .unwrap());
        assert!(!ledger
            .has_checking_with_balance(&alice, Money::from_cents(100_000))
            .unwrap());
    }

    #[test]
    fn test_restore_rejects_dangling_account_id() {
        let ledger = ledger_with("alice");
        let mut snapshot = ledger.snapshot();
        snapshot.profiles[0].add_account(AccountId::new(42));

        let err = Ledger::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownAccount { .. }));
    }

    #[test]
    fn test_snapshot_restore_resumes_ids() {
        let ledger = ledger_with("alice");
        let alice = Username::new("alice");
        ledger.add_teller(TellerRecord::new(Username::new("tom"), "secret"));
        let first = ledger.open_account(&alice, AccountVariant::Checking).unwrap();

        let restored = Ledger::from_snapshot(ledger.snapshot()).unwrap();
        assert_eq!(restored.profile_count(), 1);
        assert_eq!(restored.account_count(), 1);
        assert!(restored.authenticate_teller(&Username::new("tom"), "secret").is_ok());

        let next = restored.open_account(&alice, AccountVariant::Checking).unwrap();
        assert!(next.id() > first.id());
    }
}
