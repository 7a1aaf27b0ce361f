//! Connection Handler Module
//!
//! This module manages individual client connections to kiwi.
//! Each client connection is handled by its own async task, allowing
//! the server to handle thousands of concurrent clients efficiently.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────┐     │
//! │  │ Read bytes  │───>│ Decode RESP │───>│ Dispatch to  │     │
//! │  └─────────────┘    └─────────────┘    │ shard queues │     │
//! │                                        └──────┬───────┘     │
//! │                                               ▼             │
//! │                                  ┌────────────────────┐     │
//! │                                  │ Write replies, in  │     │
//! │                                  │ request order      │     │
//! │                                  └────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Pipelining**: many requests in flight per connection, replies in order
//! - **Backpressure**: reads pause while the outbound buffer is over its
//!   high watermark
//! - **Generic transport**: the handler runs over any `AsyncRead + AsyncWrite`
//!
//! ## Example
//!
//! ```ignore
//! use kiwi::connection::handle_connection;
//! use kiwi::storage::Engine;
//!
//! let engine = Engine::start(&config);
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, id, engine.clone()));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler};
