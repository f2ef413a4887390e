//! Read-only views sent to clients in success payloads.
//!
//! Views are built from ledger entities and never carry credentials.

use bank_core::{
    Account, AccountId, AccountType, AccountVariant, ClientProfile, ContactInfo, Money,
    Transaction, Username,
};
use serde::{Deserialize, Serialize};

/// One line of a profile summary: id, type and balance only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: AccountId,
    pub account_type: AccountType,
    pub balance: Money,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id(),
            account_type: account.account_type(),
            balance: account.balance(),
        }
    }
}

/// Redacted profile returned by load/create/save profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub username: Username,
    pub contact: ContactInfo,
    pub accounts: Vec<AccountSummary>,
}

impl ProfileSummary {
    /// Builds a summary from a profile and the accounts it lists.
    ///
    /// Accounts are expected in the profile's id order; ids with no
    /// matching account are simply absent from `accounts`.
    pub fn new(profile: &ClientProfile, accounts: Vec<AccountSummary>) -> Self {
        Self {
            username: profile.username().clone(),
            contact: profile.contact().clone(),
            accounts,
        }
    }
}

/// Variant-specific fields of an account snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountDetails {
    Checking,
    Saving {
        withdrawals_this_month: u32,
        withdrawal_limit: u32,
    },
    CreditLine {
        credit_limit: Money,
    },
}

/// Full, type-tagged account state returned by load account and transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub balance: Money,
    pub transactions: Vec<Transaction>,
    #[serde(flatten)]
    pub details: AccountDetails,
}

impl AccountSnapshot {
    pub fn account_type(&self) -> AccountType {
        match self.details {
            AccountDetails::Checking => AccountType::Checking,
            AccountDetails::Saving { .. } => AccountType::Saving,
            AccountDetails::CreditLine { .. } => AccountType::CreditLine,
        }
    }
}

impl From<&Account> for AccountSnapshot {
    fn from(account: &Account) -> Self {
        let details = match account.variant() {
            AccountVariant::Checking => AccountDetails::Checking,
            AccountVariant::Saving {
                withdrawal_limit,
                withdrawals_this_month,
                ..
            } => AccountDetails::Saving {
                withdrawals_this_month: *withdrawals_this_month,
                withdrawal_limit: *withdrawal_limit,
            },
            AccountVariant::CreditLine { credit_limit } => AccountDetails::CreditLine {
                credit_limit: *credit_limit,
            },
        };

        Self {
            id: account.id(),
            balance: account.balance(),
            transactions: account.transactions().to_vec(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bank_core::Operation;

    #[test]
    fn test_profile_summary_has_no_password() {
        let profile = ClientProfile::new(Username::new("alice"), "hunter2", ContactInfo::default());
        let summary = ProfileSummary::new(&profile, Vec::new());
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_snapshot_is_type_tagged() {
        let mut account = Account::credit_line(AccountId::new(3), Money::from_cents(10_000));
        account
            .add_transaction(Transaction::now(Operation::Deposit, Money::from_cents(500)))
            .unwrap();

        let snapshot = AccountSnapshot::from(&account);
        assert_eq!(snapshot.account_type(), AccountType::CreditLine);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["type"], "credit_line");
        assert_eq!(json["credit_limit"], "100.00");
        assert_eq!(json["balance"], "5.00");
        assert_eq!(json["transactions"].as_array().unwrap().len(), 1);
    }
}
