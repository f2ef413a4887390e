//! Per-connection dispatch loop.

use tracing::{debug, info};

use bank_protocol::{Request, Response};

use crate::channel::Channel;
use crate::router::{ConnectionState, Router};

/// Drains one connection's inbound queue through the router.
///
/// Requests are handled strictly one at a time. When the loop ends for any
/// reason (disconnect request, peer close, server shutdown) the session is
/// cleaned up exactly as on logout.
pub struct ClientWorker {
    client_id: u64,
    channel: Channel<Request, Response>,
    router: Router,
    conn: ConnectionState,
}

impl ClientWorker {
    pub fn new(client_id: u64, channel: Channel<Request, Response>, router: Router) -> Self {
        Self {
            client_id,
            channel,
            router,
            conn: ConnectionState::default(),
        }
    }

    /// Runs until the connection ends.
    pub async fn run(mut self) {
        info!(client_id = self.client_id, peer = %self.channel.peer(), "Client connected");

        while let Some(request) = self.channel.receive().await {
            debug!(client_id = self.client_id, kind = %request.kind(), "Request received");

            let outcome = self.router.dispatch(&mut self.conn, request);

            if let Err(e) = self.channel.send(outcome.response) {
                debug!(client_id = self.client_id, error = %e, "Response not sent");
                break;
            }
            if outcome.disconnect {
                debug!(client_id = self.client_id, "Client requested disconnect");
                break;
            }
        }

        self.router.end_session(&mut self.conn);
        self.channel.close().await;

        info!(client_id = self.client_id, "Client disconnected");
    }
}
