//! Shared session and lock registries.
//!
//! Both registries are plain concurrent maps shared by reference between
//! every client worker. There is no owning task and no global mutex:
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ ClientWorker │   │ ClientWorker │   │ ClientWorker │
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        │ Router           │ Router           │ Router
//!        ▼                  ▼                  ▼
//! ┌──────────────────────────────────────────────────────┐
//! │  SessionRegistry (token -> Session)                  │
//! │  LockRegistry    (ResourceId -> Option<holder>)      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `BankResult` or `Option`

mod locks;
mod sessions;

pub use locks::{LockGuard, LockRegistry};
pub use sessions::{Session, SessionRegistry};
