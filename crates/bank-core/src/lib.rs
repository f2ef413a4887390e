//! Bank Core - Shared domain types for the bank server
//!
//! This crate provides the ledger entities (client profiles, accounts,
//! transactions) and the per-account-type business rules shared between
//! the server (bankd) and the wire protocol.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod account;
pub mod error;
pub mod ids;
pub mod money;
pub mod profile;
pub mod transaction;

// Re-exports for convenience
pub use account::{Account, AccountType, AccountVariant, MonthStamp};
pub use error::{BankError, BankResult, ErrorKind};
pub use ids::{AccountId, ResourceId, Role, SessionToken, Username};
pub use money::{parse_positive_amount, Money};
pub use profile::{ClientProfile, ContactInfo, TellerRecord};
pub use transaction::{Operation, Transaction};
