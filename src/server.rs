//! TCP Accept Loop
//!
//! [`serve`] accepts clients until the shutdown future resolves, spawning
//! one [`ConnectionHandler`](crate::connection::ConnectionHandler) task per
//! connection. Connections already running are left to finish on their own.

use crate::connection::handle_connection;
use crate::storage::Engine;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Pause after a failed `accept` (e.g. out of file descriptors) before
/// trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Runs the accept loop on `listener` until `shutdown` completes.
pub async fn serve(listener: TcpListener, engine: Engine, shutdown: impl Future<Output = ()>) {
    tokio::pin!(shutdown);
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    next_id += 1;
                    tokio::spawn(handle_connection(stream, addr, next_id, engine.clone()));
                }
                Err(err) => {
                    error!(error = %err, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
}
