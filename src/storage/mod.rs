//! Storage Engine Module
//!
//! The keyspace lives here: typed values, the shards that own them, the
//! engine that routes requests to shard executors, and the background
//! expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! │   route(key) ──► mpsc queue ──► executor task ──► Shard      │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐             │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │  ...N   │             │
//! │  │  task   │ │  task   │ │  task   │ │ shards  │             │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘             │
//! └──────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ sweep job per shard
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Shard executors**: one task per shard; commands on a shard never overlap
//! - **No locks**: the task owns its shard, so handlers mutate it directly
//! - **Typed values**: strings, lists, hashes, sets and sorted sets
//! - **Lazy expiry**: expired keys are dropped on access
//! - **Active expiry**: the sweeper reclaims keys nobody reads again
//!
//! ## Example
//!
//! ```
//! use kiwi::config::Config;
//! use kiwi::protocol::{Request, RespValue};
//! use kiwi::storage::Engine;
//! use bytes::Bytes;
//!
//! # tokio_test::block_on(async {
//! let engine = Engine::start(&Config::default());
//!
//! engine.execute(Request::new(["SET", "name", "Ariz"])).await.unwrap();
//! let value = engine.execute(Request::new(["GET", "name"])).await.unwrap();
//! assert_eq!(value, RespValue::bulk_string(Bytes::from("Ariz")));
//! # });
//! ```

pub mod engine;
pub mod expiry;
pub mod glob;
pub mod shard;
pub mod value;

// Re-export commonly used types
pub use engine::{shard_for_key, Engine, EngineInfo, PendingReply};
pub use expiry::ExpirySweeper;
pub use glob::GlobPattern;
pub use shard::{Shard, ShardStats};
pub use value::{Entry, SortedSet, Value};
