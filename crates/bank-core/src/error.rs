//! Domain error taxonomy following the panic-free policy.
//!
//! Every variant maps onto one [`ErrorKind`]; the kind travels on the wire
//! so clients can tell "busy" apart from "forbidden" without parsing text.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{AccountId, Money, ResourceId, Role, Username};

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad credentials or duplicate session.
    Authentication,
    /// Resource not owned, or lock not held by the caller.
    Authorization,
    /// Try-acquire failed because another session holds the lock.
    ResourceBusy,
    /// Malformed input or a business rule rejected the change.
    Validation,
    /// Unknown profile or account.
    NotFound,
    /// Message kind not valid in the current state or for the current role.
    Protocol,
    /// Server-side fault unrelated to the request.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::ResourceBusy => "resource busy",
            Self::Validation => "validation",
            Self::NotFound => "not found",
            Self::Protocol => "protocol",
            Self::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Errors raised while validating, authorizing or applying a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BankError {
    // --- authentication ---------------------------------------------------
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{username} is already logged in elsewhere as {role}")]
    AlreadyLoggedIn { username: Username, role: Role },

    #[error("Session token is missing or does not belong to this connection")]
    InvalidSession,

    // --- authorization ----------------------------------------------------
    #[error("Account {account_id} is not owned by {username}")]
    AccountNotOwned {
        account_id: AccountId,
        username: Username,
    },

    #[error("Profile {username} is not accessible from this session")]
    ProfileNotAccessible { username: Username },

    #[error("{resource} must be loaded by this session first")]
    LockNotHeld { resource: ResourceId },

    // --- busy -------------------------------------------------------------
    #[error("{resource} is currently in use")]
    ResourceBusy { resource: ResourceId },

    // --- validation -------------------------------------------------------
    #[error("Invalid amount: {value:?}")]
    InvalidAmount { value: String },

    #[error("Amount must be greater than zero, got {value}")]
    NonPositiveAmount { value: String },

    #[error("Monthly withdrawal limit of {limit} reached")]
    WithdrawalLimitReached { limit: u32 },

    #[error("Transaction would exceed the credit limit of {limit}")]
    CreditLimitExceeded { limit: Money },

    #[error("Credit line requires a checking account holding at least {threshold}")]
    CreditLineIneligible { threshold: Money },

    #[error("Setting not supported for a {account_type} account")]
    UnsupportedSetting { account_type: &'static str },

    #[error("Profile {username} already exists")]
    ProfileAlreadyExists { username: Username },

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Balance overflow on account {account_id}")]
    BalanceOverflow { account_id: AccountId },

    // --- not found --------------------------------------------------------
    #[error("Profile not found: {username}")]
    ProfileNotFound { username: Username },

    #[error("Account not found: {account_id}")]
    AccountNotFound { account_id: AccountId },

    #[error("{resource} does not exist")]
    UnknownResource { resource: ResourceId },

    // --- protocol ---------------------------------------------------------
    #[error("Must log in first")]
    NotLoggedIn,

    #[error("Already logged in; log out first")]
    AlreadyAuthenticated,

    #[error("Operation {operation} is not permitted for {role} sessions")]
    OperationNotPermitted { operation: String, role: Role },

    #[error("Unrecognized message")]
    UnrecognizedMessage,

    #[error("Protocol version {client} not compatible with server version {server}")]
    IncompatibleVersion { client: String, server: String },
}

impl BankError {
    /// Returns the wire category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials | Self::AlreadyLoggedIn { .. } | Self::InvalidSession => {
                ErrorKind::Authentication
            }
            Self::AccountNotOwned { .. }
            | Self::ProfileNotAccessible { .. }
            | Self::LockNotHeld { .. } => ErrorKind::Authorization,
            Self::ResourceBusy { .. } => ErrorKind::ResourceBusy,
            Self::InvalidAmount { .. }
            | Self::NonPositiveAmount { .. }
            | Self::WithdrawalLimitReached { .. }
            | Self::CreditLimitExceeded { .. }
            | Self::CreditLineIneligible { .. }
            | Self::UnsupportedSetting { .. }
            | Self::ProfileAlreadyExists { .. }
            | Self::InvalidField { .. } => ErrorKind::Validation,
            Self::BalanceOverflow { .. } => ErrorKind::Internal,
            Self::ProfileNotFound { .. }
            | Self::AccountNotFound { .. }
            | Self::UnknownResource { .. } => ErrorKind::NotFound,
            Self::NotLoggedIn
            | Self::AlreadyAuthenticated
            | Self::OperationNotPermitted { .. }
            | Self::UnrecognizedMessage
            | Self::IncompatibleVersion { .. } => ErrorKind::Protocol,
        }
    }
}

/// Result type for domain operations.
pub type BankResult<T> = Result<T, BankError>;
