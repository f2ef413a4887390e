//! Bank daemon - multi-client session and resource-lock server
//!
//! This crate provides the core infrastructure for the bank daemon:
//! - `channel` - Length-framed JSON channel with independent reader/writer tasks
//! - `registry` - Session registry and advisory resource locks
//! - `ledger` - In-memory profiles, accounts and tellers, plus snapshots
//! - `router` - Authenticated per-connection state machine
//! - `server` - TCP server and per-client workers
//! - `config` - TOML configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        bankd daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   BankServer    │────▶│  ClientWorker (per client)  │    │
//! │  │  (TcpListener)  │     │  Channel ─▶ Router          │    │
//! │  └─────────────────┘     └──────────────┬──────────────┘    │
//! │                                         │                   │
//! │                                         ▼                   │
//! │                        ┌─────────────────────────────────┐  │
//! │                        │ BankState (Arc, shared)         │  │
//! │                        │  SessionRegistry  LockRegistry  │  │
//! │                        │  Ledger           RulesConfig   │  │
//! │                        └─────────────────────────────────┘  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod channel;
pub mod config;
pub mod ledger;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;

pub use channel::{Channel, ChannelError, Outbox};
pub use config::{BankConfig, ConfigError, RulesConfig};
pub use ledger::{Ledger, LedgerSnapshot, SnapshotError};
pub use registry::{LockGuard, LockRegistry, Session, SessionRegistry};
pub use router::{AuthContext, ConnectionState, Outcome, Router};
pub use server::{BankServer, ClientWorker, ServerError};
pub use state::BankState;
