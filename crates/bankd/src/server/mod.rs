//! TCP server for the bank daemon.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a `ClientWorker` for each client
//! - Tracks attached clients so it can broadcast a shutdown frame
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   BankServer    │
//! │                 │
//! │  TcpListener    │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │  ClientWorker   │────▶│     Router      │──▶ SessionRegistry
//! │  (per client)   │     │ (shared state)  │──▶ LockRegistry
//! └─────────────────┘     └─────────────────┘──▶ Ledger
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and allow continued operation

mod worker;

pub use worker::ClientWorker;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use bank_protocol::{Request, Response};

use crate::channel::{Channel, Outbox};
use crate::router::Router;
use crate::state::BankState;

/// What the server keeps about an attached client.
struct ClientHandle {
    outbox: Outbox<Response>,
    cancel: CancellationToken,
}

type ClientsMap = Arc<DashMap<u64, ClientHandle>>;

/// TCP server accepting bank clients.
pub struct BankServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating client IDs
    connection_counter: AtomicU64,

    /// Attached clients, keyed by client id
    clients: ClientsMap,
}

impl BankServer {
    /// Binds the listener. The server does nothing until `run` is called.
    pub async fn bind(
        addr: SocketAddr,
        state: Arc<BankState>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr,
            error: e.to_string(),
        })?;

        Ok(Self {
            listener,
            local_addr,
            router: Router::new(state),
            cancel_token,
            connection_counter: AtomicU64::new(0),
            clients: Arc::new(DashMap::new()),
        })
    }

    /// Returns the bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the number of attached clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// sends a shutdown frame to every client and waits for their workers
    /// to finish.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, "Bank server listening");

        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let client_id = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.attach(&mut workers, stream, client_id);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }

                Some(finished) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = finished {
                        error!(error = %e, "Client worker failed");
                    }
                }
            }
        }

        self.shutdown_clients();
        while workers.join_next().await.is_some() {}

        info!("Server shutdown complete");
        Ok(())
    }

    /// Spawns a worker for a new connection and records the client.
    fn attach(&self, workers: &mut JoinSet<()>, stream: TcpStream, client_id: u64) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(client_id, error = %e, "Failed to set TCP_NODELAY");
        }

        let channel: Channel<Request, Response> = Channel::from_tcp(stream);
        self.clients.insert(
            client_id,
            ClientHandle {
                outbox: channel.outbox(),
                cancel: channel.cancellation(),
            },
        );

        let worker = ClientWorker::new(client_id, channel, self.router.clone());
        let clients = Arc::clone(&self.clients);

        workers.spawn(async move {
            worker.run().await;

            if clients.remove(&client_id).is_some() {
                debug!(client_id, "Client detached");
            }
        });
    }

    /// Sends a shutdown frame to every attached client and closes them.
    fn shutdown_clients(&self) {
        let ids: Vec<u64> = self.clients.iter().map(|entry| *entry.key()).collect();

        for client_id in ids {
            let Some((_, client)) = self.clients.remove(&client_id) else {
                continue;
            };
            if client.outbox.send(Response::Shutdown).is_err() {
                debug!(client_id, "Client already closing");
            }
            // Queued frames, including the shutdown, are flushed before the writer stops
            client.cancel.cancel();
        }

        info!("Shutdown sent to all clients");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },
}
