//! Ledger transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Money;

/// What a transaction does to the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deposit,
    Withdrawal,
}

impl Operation {
    /// Applies the operation's sign to a positive amount.
    pub fn signed(&self, amount: Money) -> Money {
        match self {
            Self::Deposit => amount,
            Self::Withdrawal => -amount,
        }
    }

    #[must_use]
    pub fn is_withdrawal(&self) -> bool {
        matches!(self, Self::Withdrawal)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => write!(f, "deposit"),
            Self::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// One entry in an account's transaction log.
///
/// Immutable once appended: the ledger only ever pushes new entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    timestamp: DateTime<Utc>,
    /// Signed amount: positive for deposits, negative for withdrawals.
    amount: Money,
    operation: Operation,
}

impl Transaction {
    /// Creates a transaction from a positive amount and an operation.
    pub fn new(timestamp: DateTime<Utc>, operation: Operation, amount: Money) -> Self {
        Self {
            timestamp,
            amount: operation.signed(amount),
            operation,
        }
    }

    /// Creates a transaction timestamped now.
    pub fn now(operation: Operation, amount: Money) -> Self {
        Self::new(Utc::now(), operation, amount)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amounts() {
        let deposit = Transaction::now(Operation::Deposit, Money::from_cents(500));
        let withdrawal = Transaction::now(Operation::Withdrawal, Money::from_cents(200));
        assert_eq!(deposit.amount(), Money::from_cents(500));
        assert_eq!(withdrawal.amount(), Money::from_cents(-200));
        assert!(withdrawal.operation().is_withdrawal());
    }
}
