//! Per-connection authenticated state machine.
//!
//! ```text
//!                    login ok
//!  Unauthenticated ───────────▶ Authenticated(role)
//!        ▲                            │
//!        └──────── logout ────────────┘
//!
//!  any state + disconnect ──▶ cleanup, ack, close
//! ```
//!
//! A `Router` is cheap to clone and shared by all workers; the state lives
//! in each worker's `ConnectionState`. Every rejected request becomes a
//! failure response; the router never closes a connection except on
//! `disconnect`.

mod handlers;
mod permissions;

pub use permissions::{is_logout, is_permitted};

use std::sync::Arc;

use tracing::{debug, info, warn};

use bank_core::{BankError, BankResult, ResourceId, Role, SessionToken, Username};
use bank_protocol::{ProtocolVersion, Request, RequestBody, Response};

use crate::state::BankState;

/// Identity of an authenticated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub token: SessionToken,
    pub username: Username,
    pub role: Role,
}

/// Authentication state of one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Unauthenticated,
    Authenticated(AuthContext),
}

impl ConnectionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn context(&self) -> Option<&AuthContext> {
        match self {
            Self::Authenticated(ctx) => Some(ctx),
            Self::Unauthenticated => None,
        }
    }
}

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub response: Response,
    /// Close the connection after sending `response`
    pub disconnect: bool,
}

impl Outcome {
    fn reply(response: Response) -> Self {
        Self {
            response,
            disconnect: false,
        }
    }
}

/// Validates, authorizes and dispatches requests against shared state.
#[derive(Debug, Clone)]
pub struct Router {
    state: Arc<BankState>,
}

impl Router {
    pub fn new(state: Arc<BankState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<BankState> {
        &self.state
    }

    /// Handles one request and returns the response to send.
    pub fn dispatch(&self, conn: &mut ConnectionState, request: Request) -> Outcome {
        let kind = request.kind();

        // Leaving is always allowed, whatever version the client speaks
        if let RequestBody::Disconnect = request.body {
            self.end_session(conn);
            return Outcome {
                response: Response::ack(),
                disconnect: true,
            };
        }

        if !ProtocolVersion::CURRENT.is_compatible_with(&request.protocol_version) {
            warn!(
                client_version = %request.protocol_version,
                server_version = %ProtocolVersion::CURRENT,
                "Incompatible protocol version"
            );
            return Outcome::reply(
                BankError::IncompatibleVersion {
                    client: request.protocol_version.to_string(),
                    server: ProtocolVersion::CURRENT.to_string(),
                }
                .into(),
            );
        }

        match request.body {
            RequestBody::Malformed { ref reason } => {
                warn!(reason = %reason, "Rejecting malformed request");
                return Outcome::reply(BankError::UnrecognizedMessage.into());
            }
            RequestBody::Unknown => {
                debug!("Rejecting unknown message type");
                return Outcome::reply(BankError::UnrecognizedMessage.into());
            }
            _ => {}
        }

        let result = match conn.context().cloned() {
            None => self.handle_unauthenticated(conn, request.body),
            Some(ctx) => {
                self.handle_authenticated(conn, &ctx, request.token.as_ref(), request.body)
            }
        };

        let response = result.unwrap_or_else(|err| {
            debug!(kind = %kind, error = %err, "Request rejected");
            Response::from(err)
        });
        Outcome::reply(response)
    }

    /// Runs logout cleanup for the connection, if it has a session.
    ///
    /// Releases every lock the session holds and removes the session. Used by
    /// logout, disconnect and transport loss alike.
    pub fn end_session(&self, conn: &mut ConnectionState) {
        let ConnectionState::Authenticated(ctx) = std::mem::take(conn) else {
            return;
        };

        let released = self.state.locks.release_all(&ctx.token);
        self.state.sessions.remove(&ctx.token);

        info!(
            username = %ctx.username,
            role = %ctx.role,
            released = released.len(),
            "Logged out"
        );
    }

    fn handle_unauthenticated(
        &self,
        conn: &mut ConnectionState,
        body: RequestBody,
    ) -> BankResult<Response> {
        let (username, password, role) = match body {
            RequestBody::LoginClient { username, password } => (username, password, Role::Client),
            RequestBody::LoginTeller { username, password } => (username, password, Role::Teller),
            _ => return Err(BankError::NotLoggedIn),
        };

        let ctx = self.login(username, &password, role)?;
        let response = Response::logged_in(ctx.token.clone(), ctx.username.clone(), ctx.role);
        *conn = ConnectionState::Authenticated(ctx);
        Ok(response)
    }

    fn login(&self, username: Username, password: &str, role: Role) -> BankResult<AuthContext> {
        if username.is_blank() {
            return Err(BankError::InvalidCredentials);
        }

        match role {
            Role::Client => self.state.ledger.authenticate_client(&username, password)?,
            Role::Teller => self.state.ledger.authenticate_teller(&username, password)?,
        }

        let session = self.state.sessions.create(username, role)?;

        if role == Role::Teller {
            let resource = ResourceId::Teller(session.username.clone());
            if let Err(err) = self.state.locks.try_acquire(&resource, &session.token) {
                self.state.sessions.remove(&session.token);
                return Err(err);
            }
        }

        info!(username = %session.username, role = %role, "Logged in");
        Ok(AuthContext {
            token: session.token,
            username: session.username,
            role,
        })
    }

    fn handle_authenticated(
        &self,
        conn: &mut ConnectionState,
        ctx: &AuthContext,
        token: Option<&SessionToken>,
        body: RequestBody,
    ) -> BankResult<Response> {
        let kind = body.kind();

        if kind.is_login() {
            return Err(BankError::AlreadyAuthenticated);
        }
        if token != Some(&ctx.token) || !self.state.sessions.touch(&ctx.token) {
            return Err(BankError::InvalidSession);
        }
        if !is_permitted(kind, ctx.role) {
            return Err(BankError::OperationNotPermitted {
                operation: kind.name().to_string(),
                role: ctx.role,
            });
        }

        debug!(kind = %kind, username = %ctx.username, role = %ctx.role, "Dispatching");

        if is_logout(kind) {
            self.end_session(conn);
            return Ok(Response::ack());
        }

        let state = self.state.as_ref();
        match body {
            RequestBody::LoadProfile { username } => handlers::load_profile(state, ctx, &username),
            RequestBody::SaveProfile {
                username,
                password,
                contact,
            } => handlers::save_profile(state, ctx, &username, password, contact),
            RequestBody::CreateProfile {
                username,
                password,
                contact,
            } => handlers::create_profile(state, &username, &password, contact),
            RequestBody::DeleteProfile { username } => {
                handlers::delete_profile(state, ctx, &username)
            }
            RequestBody::ExitProfile { username } => handlers::exit_profile(state, ctx, username),
            RequestBody::LoadAccount { owner, account_id } => {
                handlers::load_account(state, ctx, &owner, account_id)
            }
            RequestBody::SaveAccount {
                account_id,
                withdrawal_limit,
                credit_limit,
            } => handlers::save_account(state, ctx, account_id, withdrawal_limit, credit_limit),
            RequestBody::CreateAccount {
                owner,
                account_type,
                credit_limit,
            } => handlers::create_account(state, ctx, &owner, account_type, credit_limit),
            RequestBody::DeleteAccount { account_id } => {
                handlers::delete_account(state, ctx, account_id)
            }
            RequestBody::ExitAccount { account_id } => {
                handlers::exit_account(state, ctx, account_id)
            }
            RequestBody::ShareAccount {
                owner,
                account_id,
                target,
            } => handlers::share_account(state, ctx, &owner, account_id, &target),
            RequestBody::Transaction {
                account_id,
                operation,
                amount,
            } => handlers::transaction(state, ctx, account_id, operation, &amount),

            // Filtered out above
            RequestBody::LoginClient { .. }
            | RequestBody::LoginTeller { .. }
            | RequestBody::LogoutAtm
            | RequestBody::LogoutClient
            | RequestBody::LogoutTeller
            | RequestBody::Disconnect
            | RequestBody::Unknown
            | RequestBody::Malformed { .. } => Err(BankError::UnrecognizedMessage),
        }
    }
}
