//! # kiwi - A Sharded In-Memory Key-Value Server
//!
//! kiwi is an in-memory key-value store that speaks the Redis protocol
//! (RESP). Clients connect over TCP, pipeline command frames and get typed
//! replies back in order.
//!
//! ## Features
//!
//! - **Redis-Compatible**: RESP framing and the common string, list, hash,
//!   set and sorted-set commands
//! - **Shard Executors**: the keyspace is split into partitions, each owned by
//!   a single task, so commands on a shard run one at a time without locks
//! - **TTL Support**: per-key expiry, lazily on access and actively by a
//!   background sweeper
//! - **Pipelining**: many requests in flight per connection, with
//!   backpressure on the outbound buffer
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                 kiwi                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (serve)     │    │  Pipeline   │    │  Table      │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   RESP      │    │                   Engine                     │    │
//! │  │   Decoder   │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  │             │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │    │
//! │  └─────────────┘    │  │ task   │ │ task   │ │ task   │ │shards  │ │    │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │                     └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use kiwi::config::Config;
//! use kiwi::storage::{Engine, ExpirySweeper};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let engine = Engine::start(&config);
//!     let _sweeper = ExpirySweeper::start(engine.clone(), config.sweep_interval);
//!
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     kiwi::server::serve(listener, engine, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP request decoder and reply encoder
//! - [`storage`]: Values, shards, the engine and the expiry sweeper
//! - [`commands`]: The static command table and every handler
//! - [`connection`]: Per-client pipeline
//! - [`server`]: TCP accept loop
//! - [`config`]: The startup configuration record
//! - [`error`]: Command and shard error types
//!
//! ## Design Highlights
//!
//! ### Message Passing Instead of Locks
//!
//! Each shard is owned by one task fed through a bounded queue. A command
//! whose keys all live on one shard is atomic with respect to every other
//! command on that shard. Commands whose keys span shards are rejected with
//! `CROSSSLOT`; hash tags (`{user1}:name`, `{user1}:age`) co-locate keys.
//!
//! ### Owned Values
//!
//! The decoder copies each argument out of the connection's read buffer
//! into its own `bytes::Bytes`. Stored keys and values never alias a buffer
//! the connection will reuse, and cloning them between shards and replies
//! is a reference-count bump.

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::{CommandError, ShardError};
pub use protocol::{ProtocolError, Request, RespValue};
pub use storage::{Engine, ExpirySweeper};

/// The default port kiwi listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// Version of kiwi
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
