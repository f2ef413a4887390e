//! Accounts and their per-type business rules.
//!
//! `Account::add_transaction` is the single mutation entry point for the
//! balance. It either appends the transaction and updates the balance, or
//! returns an error and leaves both untouched.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::{AccountId, BankError, BankResult, Money, Transaction};

// ============================================================================
// Calendar month marker
// ============================================================================

/// A calendar month, used as the savings withdrawal-counter reset marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthStamp {
    pub year: i32,
    pub month: u32,
}

impl MonthStamp {
    pub const fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// The calendar month containing `timestamp` (UTC).
    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }
}

impl fmt::Display for MonthStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ============================================================================
// Account types
// ============================================================================

/// Account type as named in requests and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Saving,
    CreditLine,
}

impl AccountType {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Saving => "saving",
            Self::CreditLine => "credit line",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Variant-specific state of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountVariant {
    /// No extra invariant.
    Checking,

    /// At most `withdrawal_limit` withdrawals per calendar month.
    Saving {
        withdrawal_limit: u32,
        withdrawals_this_month: u32,
        last_reset: MonthStamp,
    },

    /// Balance may go negative down to `-credit_limit`.
    CreditLine { credit_limit: Money },
}

impl AccountVariant {
    pub fn account_type(&self) -> AccountType {
        match self {
            Self::Checking => AccountType::Checking,
            Self::Saving { .. } => AccountType::Saving,
            Self::CreditLine { .. } => AccountType::CreditLine,
        }
    }
}

// ============================================================================
// Account
// ============================================================================

/// An account with its balance and ordered transaction log.
///
/// Invariant: `balance` equals the sum of every logged transaction amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    variant: AccountVariant,
    balance: Money,
    transactions: Vec<Transaction>,
}

impl Account {
    /// Creates an empty account of the given variant.
    pub fn new(id: AccountId, variant: AccountVariant) -> Self {
        Self {
            id,
            variant,
            balance: Money::zero(),
            transactions: Vec::new(),
        }
    }

    pub fn checking(id: AccountId) -> Self {
        Self::new(id, AccountVariant::Checking)
    }

    /// Creates a savings account whose counter starts in the month of `opened_at`.
    pub fn saving(id: AccountId, withdrawal_limit: u32, opened_at: DateTime<Utc>) -> Self {
        Self::new(
            id,
            AccountVariant::Saving {
                withdrawal_limit,
                withdrawals_this_month: 0,
                last_reset: MonthStamp::of(opened_at),
            },
        )
    }

    pub fn credit_line(id: AccountId, credit_limit: Money) -> Self {
        Self::new(id, AccountVariant::CreditLine { credit_limit })
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn variant(&self) -> &AccountVariant {
        &self.variant
    }

    pub fn account_type(&self) -> AccountType {
        self.variant.account_type()
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Recomputes the balance by replaying the log from zero.
    pub fn replayed_balance(&self) -> Money {
        self.transactions.iter().map(Transaction::amount).sum()
    }

    /// Returns true if the stored balance matches the replayed log.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.replayed_balance() == self.balance
    }

    /// Applies a transaction if the account's rules allow it.
    ///
    /// The transaction's own timestamp decides the calendar month for the
    /// savings counter, so replaying a log is deterministic.
    ///
    /// # Errors
    ///
    /// - `BankError::WithdrawalLimitReached` for a savings withdrawal past the monthly cap
    /// - `BankError::CreditLimitExceeded` if a credit line would drop below `-credit_limit`
    /// - `BankError::BalanceOverflow` if the decimal balance would overflow
    pub fn add_transaction(&mut self, transaction: Transaction) -> BankResult<()> {
        let new_balance = self
            .balance
            .checked_add(transaction.amount())
            .ok_or(BankError::BalanceOverflow {
                account_id: self.id,
            })?;

        match &mut self.variant {
            AccountVariant::Checking => {}

            AccountVariant::Saving {
                withdrawal_limit,
                withdrawals_this_month,
                last_reset,
            } => {
                let month = MonthStamp::of(transaction.timestamp());
                if month > *last_reset {
                    debug!(
                        account_id = %self.id,
                        from = %last_reset,
                        to = %month,
                        "Resetting monthly withdrawal counter"
                    );
                    *withdrawals_this_month = 0;
                    *last_reset = month;
                }

                if transaction.operation().is_withdrawal() {
                    if *withdrawals_this_month >= *withdrawal_limit {
                        return Err(BankError::WithdrawalLimitReached {
                            limit: *withdrawal_limit,
                        });
                    }
                    *withdrawals_this_month += 1;
                }
            }

            AccountVariant::CreditLine { credit_limit } => {
                if new_balance < -*credit_limit {
                    return Err(BankError::CreditLimitExceeded {
                        limit: *credit_limit,
                    });
                }
            }
        }

        self.balance = new_balance;
        self.transactions.push(transaction);
        Ok(())
    }

    /// Changes a savings account's monthly withdrawal limit.
    pub fn set_withdrawal_limit(&mut self, limit: u32) -> BankResult<()> {
        match &mut self.variant {
            AccountVariant::Saving {
                withdrawal_limit, ..
            } => {
                *withdrawal_limit = limit;
                Ok(())
            }
            other => Err(BankError::UnsupportedSetting {
                account_type: other.account_type().label(),
            }),
        }
    }

    /// Changes a credit line's limit.
    ///
    /// Rejected if the current balance already lies below the new floor.
    pub fn set_credit_limit(&mut self, limit: Money) -> BankResult<()> {
        let balance = self.balance;
        match &mut self.variant {
            AccountVariant::CreditLine { credit_limit } => {
                if limit.is_negative() {
                    return Err(BankError::InvalidField {
                        field: "credit_limit".to_string(),
                        reason: "must not be negative".to_string(),
                    });
                }
                if balance < -limit {
                    return Err(BankError::CreditLimitExceeded { limit });
                }
                *credit_limit = limit;
                Ok(())
            }
            other => Err(BankError::UnsupportedSetting {
                account_type: other.account_type().label(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operation;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    fn tx(ts: DateTime<Utc>, op: Operation, cents: i64) -> Transaction {
        Transaction::new(ts, op, Money::from_cents(cents))
    }

    fn withdrawals(account: &Account) -> u32 {
        match account.variant() {
            AccountVariant::Saving {
                withdrawals_this_month,
                ..
            } => *withdrawals_this_month,
            _ => panic!("not a savings account"),
        }
    }

    #[test]
    fn test_checking_deposit_then_withdraw() {
        let mut account = Account::checking(AccountId::new(1));
        let now = Utc::now();
        account.add_transaction(tx(now, Operation::Deposit, 50_000)).unwrap();
        account.add_transaction(tx(now, Operation::Withdrawal, 20_000)).unwrap();

        assert_eq!(account.balance(), Money::from_cents(30_000));
        assert_eq!(account.transactions().len(), 2);
        assert!(account.is_consistent());
    }

    #[test]
    fn test_checking_may_go_negative() {
        let mut account = Account::checking(AccountId::new(1));
        account
            .add_transaction(tx(Utc::now(), Operation::Withdrawal, 1_000))
            .unwrap();
        assert_eq!(account.balance(), Money::from_cents(-1_000));
    }

    #[test]
    fn test_saving_sixth_withdrawal_rejected() {
        let march = at(2026, 3, 2);
        let mut account = Account::saving(AccountId::new(2), 5, march);
        account.add_transaction(tx(march, Operation::Deposit, 100_000)).unwrap();

        for _ in 0..5 {
            account
                .add_transaction(tx(march, Operation::Withdrawal, 1_000))
                .unwrap();
        }
        let balance = account.balance();

        let err = account
            .add_transaction(tx(march, Operation::Withdrawal, 1_000))
            .unwrap_err();
        assert_eq!(err, BankError::WithdrawalLimitReached { limit: 5 });
        assert_eq!(withdrawals(&account), 5);
        assert_eq!(account.balance(), balance);
        assert_eq!(account.transactions().len(), 6);
    }

    #[test]
    fn test_saving_deposits_do_not_count() {
        let march = at(2026, 3, 2);
        let mut account = Account::saving(AccountId::new(2), 1, march);
        for _ in 0..3 {
            account.add_transaction(tx(march, Operation::Deposit, 100)).unwrap();
        }
        assert_eq!(withdrawals(&account), 0);
    }

    #[test]
    fn test_saving_counter_resets_once_per_month() {
        let march = at(2026, 3, 30);
        let april = at(2026, 4, 1);
        let mut account = Account::saving(AccountId::new(3), 2, march);
        account.add_transaction(tx(march, Operation::Deposit, 10_000)).unwrap();
        account.add_transaction(tx(march, Operation::Withdrawal, 100)).unwrap();
        account.add_transaction(tx(march, Operation::Withdrawal, 100)).unwrap();
        assert!(account
            .add_transaction(tx(march, Operation::Withdrawal, 100))
            .is_err());

        // First attempt in April resets the counter
        account.add_transaction(tx(april, Operation::Withdrawal, 100)).unwrap();
        assert_eq!(withdrawals(&account), 1);

        // Later April transactions do not reset again
        account.add_transaction(tx(at(2026, 4, 20), Operation::Withdrawal, 100)).unwrap();
        assert_eq!(withdrawals(&account), 2);
        assert!(account
            .add_transaction(tx(at(2026, 4, 21), Operation::Withdrawal, 100))
            .is_err());
    }

    #[test]
    fn test_saving_reset_across_year_boundary() {
        let december = at(2025, 12, 31);
        let january = at(2026, 1, 1);
        let mut account = Account::saving(AccountId::new(4), 1, december);
        account.add_transaction(tx(december, Operation::Withdrawal, 100)).unwrap();
        account.add_transaction(tx(january, Operation::Withdrawal, 100)).unwrap();
        assert_eq!(withdrawals(&account), 1);
    }

    #[test]
    fn test_saving_reset_happens_on_rejected_attempt() {
        let march = at(2026, 3, 1);
        let mut account = Account::saving(AccountId::new(5), 0, march);
        let err = account
            .add_transaction(tx(at(2026, 5, 1), Operation::Withdrawal, 100))
            .unwrap_err();
        assert_eq!(err, BankError::WithdrawalLimitReached { limit: 0 });
        match account.variant() {
            AccountVariant::Saving { last_reset, .. } => {
                assert_eq!(*last_reset, MonthStamp::new(2026, 5));
            }
            _ => panic!("not a savings account"),
        }
    }

    #[test]
    fn test_credit_line_breach_rejected() {
        let mut account = Account::credit_line(AccountId::new(6), Money::from_cents(10_000));
        let err = account
            .add_transaction(tx(Utc::now(), Operation::Withdrawal, 15_000))
            .unwrap_err();
        assert_eq!(
            err,
            BankError::CreditLimitExceeded {
                limit: Money::from_cents(10_000)
            }
        );
        assert_eq!(account.balance(), Money::zero());
        assert!(account.transactions().is_empty());
    }

    #[test]
    fn test_credit_line_down_to_exact_limit() {
        let mut account = Account::credit_line(AccountId::new(7), Money::from_cents(10_000));
        account
            .add_transaction(tx(Utc::now(), Operation::Withdrawal, 10_000))
            .unwrap();
        assert_eq!(account.balance(), Money::from_cents(-10_000));
        assert!(account
            .add_transaction(tx(Utc::now(), Operation::Withdrawal, 1))
            .is_err());
    }

    #[test]
    fn test_replay_matches_balance_after_mixed_history() {
        let mut account = Account::credit_line(AccountId::new(8), Money::from_cents(5_000));
        let now = Utc::now();
        let steps = [
            (Operation::Deposit, 1_234),
            (Operation::Withdrawal, 4_000),
            (Operation::Withdrawal, 9_999), // rejected
            (Operation::Deposit, 1),
            (Operation::Withdrawal, 2_235),
        ];
        for (op, cents) in steps {
            let _ = account.add_transaction(tx(now, op, cents));
        }
        assert!(account.is_consistent());
        assert_eq!(account.replayed_balance(), Money::from_cents(-5_000));
    }

    #[test]
    fn test_set_credit_limit_rejects_existing_breach() {
        let mut account = Account::credit_line(AccountId::new(9), Money::from_cents(10_000));
        account
            .add_transaction(tx(Utc::now(), Operation::Withdrawal, 8_000))
            .unwrap();
        assert!(account.set_credit_limit(Money::from_cents(5_000)).is_err());
        account.set_credit_limit(Money::from_cents(8_000)).unwrap();
    }

    #[test]
    fn test_settings_on_wrong_type() {
        let mut account = Account::checking(AccountId::new(10));
        assert!(matches!(
            account.set_withdrawal_limit(3),
            Err(BankError::UnsupportedSetting { .. })
        ));
        assert!(matches!(
            account.set_credit_limit(Money::from_cents(100)),
            Err(BankError::UnsupportedSetting { .. })
        ));
    }
}
