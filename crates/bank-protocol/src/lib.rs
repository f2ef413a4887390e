//! Bank Protocol - Wire protocol for server communication
//!
//! This crate provides the request/response envelopes exchanged between
//! ATM and teller clients and the bank server, the redacted views carried
//! in success payloads, and the frame trait the connection channel relies on.

pub mod frame;
pub mod message;
pub mod version;
pub mod view;

pub use frame::Frame;
pub use message::{MessageKind, Request, RequestBody, Response, SuccessPayload};
pub use version::ProtocolVersion;
pub use view::{AccountDetails, AccountSnapshot, AccountSummary, ProfileSummary};
