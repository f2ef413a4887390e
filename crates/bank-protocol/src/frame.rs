//! What a connection channel needs to know about the messages it carries.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::message::{MessageKind, Request, RequestBody, Response};

/// A message type that can travel through a length-framed JSON channel.
pub trait Frame: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind of this message, for logging.
    fn kind(&self) -> MessageKind;

    /// Returns true if receiving this frame should terminate the channel.
    fn is_shutdown(&self) -> bool {
        false
    }

    /// Placeholder delivered in place of a frame that failed to decode.
    ///
    /// `None` means undecodable frames are dropped.
    fn malformed(_reason: String) -> Option<Self> {
        None
    }
}

impl Frame for Request {
    fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    fn malformed(reason: String) -> Option<Self> {
        Some(Request::new(RequestBody::Malformed { reason }))
    }
}

impl Frame for Response {
    fn kind(&self) -> MessageKind {
        Response::kind(self)
    }

    fn is_shutdown(&self) -> bool {
        matches!(self, Response::Shutdown)
    }
}
