//! Protocol message types for client/server communication.

use bank_core::{
    AccountId, AccountType, BankError, ContactInfo, ErrorKind, Operation, Role, SessionToken,
    Username,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::version::ProtocolVersion;
use crate::view::{AccountSnapshot, ProfileSummary};

// ============================================================================
// Message kinds
// ============================================================================

/// Every message kind that can appear on the wire, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    LoginClient,
    LoginTeller,
    LogoutAtm,
    LogoutClient,
    LogoutTeller,
    Success,
    Failure,
    LoadAccount,
    SaveAccount,
    CreateAccount,
    DeleteAccount,
    ExitAccount,
    LoadProfile,
    SaveProfile,
    CreateProfile,
    DeleteProfile,
    ExitProfile,
    ShareAccount,
    Transaction,
    Disconnect,
    Shutdown,
    Unknown,
}

impl MessageKind {
    /// Returns the upper-case wire name, e.g. `LOAD_ACCOUNT`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginClient => "LOGIN_CLIENT",
            Self::LoginTeller => "LOGIN_TELLER",
            Self::LogoutAtm => "LOGOUT_ATM",
            Self::LogoutClient => "LOGOUT_CLIENT",
            Self::LogoutTeller => "LOGOUT_TELLER",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::LoadAccount => "LOAD_ACCOUNT",
            Self::SaveAccount => "SAVE_ACCOUNT",
            Self::CreateAccount => "CREATE_ACCOUNT",
            Self::DeleteAccount => "DELETE_ACCOUNT",
            Self::ExitAccount => "EXIT_ACCOUNT",
            Self::LoadProfile => "LOAD_PROFILE",
            Self::SaveProfile => "SAVE_PROFILE",
            Self::CreateProfile => "CREATE_PROFILE",
            Self::DeleteProfile => "DELETE_PROFILE",
            Self::ExitProfile => "EXIT_PROFILE",
            Self::ShareAccount => "SHARE_ACCOUNT",
            Self::Transaction => "TRANSACTION",
            Self::Disconnect => "DISCONNECT",
            Self::Shutdown => "SHUTDOWN",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Returns true for the two login kinds.
    #[must_use]
    pub fn is_login(&self) -> bool {
        matches!(self, Self::LoginClient | Self::LoginTeller)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Request payloads sent by clients to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
    /// Log in as an account holder (ATM or client terminal)
    LoginClient { username: Username, password: String },

    /// Log in as a bank teller
    LoginTeller { username: Username, password: String },

    /// End a client session started from an ATM
    LogoutAtm,

    /// End a client session
    LogoutClient,

    /// End a teller session
    LogoutTeller,

    /// Lock a profile and fetch its redacted summary
    LoadProfile { username: Username },

    /// Update a locked profile's password and/or contact details
    SaveProfile {
        username: Username,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact: Option<ContactInfo>,
    },

    /// Register a new client profile
    CreateProfile {
        username: Username,
        password: String,
        #[serde(default)]
        contact: ContactInfo,
    },

    /// Delete a locked profile and the accounts only it lists
    DeleteProfile { username: Username },

    /// Release a profile lock
    ExitProfile {
        #[serde(default)]
        username: Option<Username>,
    },

    /// Lock an account listed by `owner` and fetch its snapshot
    LoadAccount { owner: Username, account_id: AccountId },

    /// Update a locked account's settings
    SaveAccount {
        account_id: AccountId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        withdrawal_limit: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credit_limit: Option<String>,
    },

    /// Open a new account for `owner`
    CreateAccount {
        owner: Username,
        account_type: AccountType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credit_limit: Option<String>,
    },

    /// Delete a locked account
    DeleteAccount { account_id: AccountId },

    /// Release an account lock
    ExitAccount {
        #[serde(default)]
        account_id: Option<AccountId>,
    },

    /// List a locked account on another profile
    ShareAccount {
        owner: Username,
        account_id: AccountId,
        target: Username,
    },

    /// Deposit to or withdraw from a locked account
    Transaction {
        account_id: AccountId,
        operation: Operation,
        /// Decimal string, validated by the server
        amount: String,
    },

    /// Log out (if logged in) and close the connection
    Disconnect,

    /// A frame that could not be decoded; never on the wire
    #[serde(skip)]
    Malformed { reason: String },

    /// Any `type` tag this server does not know
    #[serde(other)]
    Unknown,
}

impl RequestBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::LoginClient { .. } => MessageKind::LoginClient,
            Self::LoginTeller { .. } => MessageKind::LoginTeller,
            Self::LogoutAtm => MessageKind::LogoutAtm,
            Self::LogoutClient => MessageKind::LogoutClient,
            Self::LogoutTeller => MessageKind::LogoutTeller,
            Self::LoadProfile { .. } => MessageKind::LoadProfile,
            Self::SaveProfile { .. } => MessageKind::SaveProfile,
            Self::CreateProfile { .. } => MessageKind::CreateProfile,
            Self::DeleteProfile { .. } => MessageKind::DeleteProfile,
            Self::ExitProfile { .. } => MessageKind::ExitProfile,
            Self::LoadAccount { .. } => MessageKind::LoadAccount,
            Self::SaveAccount { .. } => MessageKind::SaveAccount,
            Self::CreateAccount { .. } => MessageKind::CreateAccount,
            Self::DeleteAccount { .. } => MessageKind::DeleteAccount,
            Self::ExitAccount { .. } => MessageKind::ExitAccount,
            Self::ShareAccount { .. } => MessageKind::ShareAccount,
            Self::Transaction { .. } => MessageKind::Transaction,
            Self::Disconnect => MessageKind::Disconnect,
            Self::Malformed { .. } | Self::Unknown => MessageKind::Unknown,
        }
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version
    #[serde(default)]
    pub protocol_version: ProtocolVersion,

    /// Session token; absent only for login messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SessionToken>,

    /// Message payload
    #[serde(flatten)]
    pub body: RequestBody,
}

impl Request {
    /// Creates an unauthenticated request with the current protocol version.
    pub fn new(body: RequestBody) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            token: None,
            body,
        }
    }

    /// Creates a request carrying a session token.
    pub fn with_token(token: SessionToken, body: RequestBody) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            token: Some(token),
            body,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Creates a login request for the given role.
    pub fn login(role: Role, username: &str, password: &str) -> Self {
        let username = Username::new(username);
        let password = password.to_string();
        Self::new(match role {
            Role::Client => RequestBody::LoginClient { username, password },
            Role::Teller => RequestBody::LoginTeller { username, password },
        })
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Contextual data returned with a success response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuccessPayload {
    /// Plain acknowledgement
    Ack,

    /// Login accepted
    LoggedIn {
        token: SessionToken,
        username: Username,
        role: Role,
    },

    /// Redacted profile summary
    Profile { profile: ProfileSummary },

    /// Type-tagged account snapshot
    Account { account: Box<AccountSnapshot> },
}

/// Messages sent from server to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Request succeeded
    Success { payload: SuccessPayload },

    /// Request rejected; connection and session stay open
    Failure {
        /// Error category
        kind: ErrorKind,
        /// Human-readable reason
        reason: String,
    },

    /// Server is going away; the client should drop the connection
    Shutdown,
}

impl Response {
    /// Creates a plain acknowledgement.
    pub fn ack() -> Self {
        Self::success(SuccessPayload::Ack)
    }

    pub fn success(payload: SuccessPayload) -> Self {
        Self::Success { payload }
    }

    /// Creates a login acknowledgement.
    pub fn logged_in(token: SessionToken, username: Username, role: Role) -> Self {
        Self::success(SuccessPayload::LoggedIn {
            token,
            username,
            role,
        })
    }

    pub fn profile(profile: ProfileSummary) -> Self {
        Self::success(SuccessPayload::Profile { profile })
    }

    pub fn account(account: AccountSnapshot) -> Self {
        Self::success(SuccessPayload::Account {
            account: Box::new(account),
        })
    }

    /// Creates a failure response.
    pub fn failure(kind: ErrorKind, reason: &str) -> Self {
        Self::Failure {
            kind,
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Success { .. } => MessageKind::Success,
            Self::Failure { .. } => MessageKind::Failure,
            Self::Shutdown => MessageKind::Shutdown,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<BankError> for Response {
    fn from(err: BankError) -> Self {
        Self::Failure {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}
