//! Keyspace Engine
//!
//! The engine owns a fixed array of shard executors. Each executor is a
//! tokio task that owns one [`Shard`] outright and drains a bounded queue
//! of jobs, so commands against a shard run one at a time in the order
//! they were enqueued, while different shards run in parallel.
//!
//! ## Routing
//!
//! A key is routed by hashing it (or the non-empty body of its first
//! `{...}` hash tag) modulo the shard count. The count is fixed when the
//! engine starts. A command whose keys land on more than one shard is
//! rejected with `CROSSSLOT` before anything is enqueued.
//!
//! ## Dispatch
//!
//! [`Engine::dispatch`] validates a request against the command table and
//! enqueues it, returning a [`PendingReply`] immediately. Only the enqueue
//! is awaited, which is how a connection keeps several requests in flight
//! while still handing them to shards in arrival order.

use super::shard::{Shard, ShardStats, SWEEP_BUDGET};
use crate::commands::{self, Handler, MergeFn, ShardFn};
use crate::config::Config;
use crate::error::{CommandError, ShardError};
use crate::protocol::{Request, RespValue};
use bytes::Bytes;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Returns the bytes a key is routed by: the body of its first non-empty
/// `{...}` tag, or the whole key.
pub fn routing_bytes(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        if let Some(len) = key[open + 1..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[open + 1..open + 1 + len];
            }
        }
    }
    key
}

/// Partition function: which of `shard_count` shards owns `key`.
pub fn shard_for_key(key: &[u8], shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    routing_bytes(key).hash(&mut hasher);
    (hasher.finish() as usize) % shard_count
}

/// Read-only facts about the running engine, handed to local and merge
/// handlers.
#[derive(Debug)]
pub struct EngineInfo {
    pub config: Config,
    pub started_at: Instant,
}

impl EngineInfo {
    pub fn shard_count(&self) -> usize {
        self.config.shards.max(1)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

enum ShardJob {
    Command {
        handler: ShardFn,
        args: Vec<Bytes>,
        reply: oneshot::Sender<RespValue>,
    },
    Sweep {
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<ShardStats>,
    },
}

/// Sending side of one shard executor's queue.
#[derive(Debug, Clone)]
pub struct ShardHandle {
    id: usize,
    tx: mpsc::Sender<ShardJob>,
}

impl std::fmt::Debug for ShardJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardJob::Command { args, .. } => write!(f, "Command({} args)", args.len()),
            ShardJob::Sweep { .. } => f.write_str("Sweep"),
            ShardJob::Stats { .. } => f.write_str("Stats"),
        }
    }
}

impl ShardHandle {
    /// Spawns the executor task for shard `id` and returns its handle.
    fn spawn(id: usize, partitions: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth);
        let task = tokio::spawn(run_shard(Shard::new(id, partitions), rx));
        tokio::spawn(async move {
            if let Err(err) = task.await {
                if err.is_panic() {
                    error!(shard = id, "shard executor panicked, its keys are unavailable");
                }
            }
        });
        Self { id, tx }
    }

    /// Enqueues a command. Waits only while the queue is full.
    async fn submit(
        &self,
        handler: ShardFn,
        args: Vec<Bytes>,
    ) -> Result<oneshot::Receiver<RespValue>, ShardError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ShardJob::Command {
                handler,
                args,
                reply,
            })
            .await
            .map_err(|_| ShardError::Unavailable(self.id))?;
        Ok(rx)
    }

    async fn request<T>(
        &self,
        job: impl FnOnce(oneshot::Sender<T>) -> ShardJob,
    ) -> Result<T, ShardError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(job(reply))
            .await
            .map_err(|_| ShardError::Unavailable(self.id))?;
        rx.await.map_err(|_| ShardError::Unavailable(self.id))
    }
}

/// The executor loop. Owns the shard for the life of the task.
async fn run_shard(mut shard: Shard, mut rx: mpsc::Receiver<ShardJob>) {
    debug!(shard = shard.id(), "shard executor started");

    while let Some(job) = rx.recv().await {
        match job {
            ShardJob::Command {
                handler,
                args,
                reply,
            } => {
                shard.record_command();
                let value = match handler(&mut shard, &args) {
                    Ok(value) => value,
                    Err(err) => err.into(),
                };
                // The requester may have disconnected; the work still happened.
                let _ = reply.send(value);
            }
            ShardJob::Sweep { reply } => {
                let removed = shard.sweep(Instant::now(), SWEEP_BUDGET);
                if removed > 0 {
                    debug!(shard = shard.id(), expired = removed, "swept expired keys");
                }
                let _ = reply.send(removed);
            }
            ShardJob::Stats { reply } => {
                let _ = reply.send(shard.stats());
            }
        }
    }

    debug!(shard = shard.id(), "shard executor stopped");
}

/// A reply that may still be computing on one or more shards.
#[derive(Debug)]
pub enum PendingReply {
    /// Already known (local commands and validation errors).
    Ready(RespValue),
    /// Waiting on one shard.
    Single {
        shard: usize,
        rx: oneshot::Receiver<RespValue>,
    },
    /// Waiting on every shard; combined with `merge` when all have answered.
    Gather {
        parts: VecDeque<(usize, oneshot::Receiver<RespValue>)>,
        done: Vec<RespValue>,
        merge: MergeFn,
        info: Arc<EngineInfo>,
        args: Vec<Bytes>,
    },
}

impl PendingReply {
    pub fn is_ready(&self) -> bool {
        matches!(self, PendingReply::Ready(_))
    }

    /// Waits until the reply is available.
    ///
    /// Cancel safe: a completed shard answer is recorded before the next
    /// await point, so dropping this future loses nothing.
    pub async fn ready(&mut self) -> Result<(), ShardError> {
        loop {
            match self {
                PendingReply::Ready(_) => return Ok(()),
                PendingReply::Single { shard, rx } => {
                    let value = rx.await.map_err(|_| ShardError::Unavailable(*shard))?;
                    *self = PendingReply::Ready(value);
                }
                PendingReply::Gather { parts, done, .. } => {
                    if let Some((shard, rx)) = parts.front_mut() {
                        let value = rx.await.map_err(|_| ShardError::Unavailable(*shard))?;
                        parts.pop_front();
                        done.push(value);
                    }
                    self.finish_gather();
                }
            }
        }
    }

    /// Non-blocking form of [`ready`](Self::ready). Returns `Ok(true)` once
    /// the reply is available.
    pub fn try_ready(&mut self) -> Result<bool, ShardError> {
        use oneshot::error::TryRecvError;

        match self {
            PendingReply::Ready(_) => return Ok(true),
            PendingReply::Single { shard, rx } => match rx.try_recv() {
                Ok(value) => *self = PendingReply::Ready(value),
                Err(TryRecvError::Empty) => return Ok(false),
                Err(TryRecvError::Closed) => return Err(ShardError::Unavailable(*shard)),
            },
            PendingReply::Gather { parts, done, .. } => {
                while let Some((shard, rx)) = parts.front_mut() {
                    match rx.try_recv() {
                        Ok(value) => {
                            parts.pop_front();
                            done.push(value);
                        }
                        Err(TryRecvError::Empty) => return Ok(false),
                        Err(TryRecvError::Closed) => {
                            return Err(ShardError::Unavailable(*shard))
                        }
                    }
                }
                self.finish_gather();
            }
        }
        Ok(self.is_ready())
    }

    /// The finished reply, or `None` if it is still pending.
    pub fn into_reply(self) -> Option<RespValue> {
        match self {
            PendingReply::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Waits for and returns the reply.
    pub async fn wait(mut self) -> Result<RespValue, ShardError> {
        self.ready().await?;
        Ok(self.into_reply().unwrap_or(RespValue::Null))
    }

    fn finish_gather(&mut self) {
        if let PendingReply::Gather {
            parts,
            done,
            merge,
            info,
            args,
        } = self
        {
            if parts.is_empty() {
                let merged = merge(info, args, std::mem::take(done));
                *self = PendingReply::Ready(merged);
            }
        }
    }
}

/// Handle to the running keyspace. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Engine {
    shards: Arc<[ShardHandle]>,
    info: Arc<EngineInfo>,
}

impl Engine {
    /// Spawns one executor per shard. Must be called inside a tokio runtime.
    pub fn start(config: &Config) -> Self {
        let count = config.shards.max(1);
        let shards: Vec<ShardHandle> = (0..count)
            .map(|id| ShardHandle::spawn(id, count, config.shard_queue_depth.max(1)))
            .collect();

        info!(shards = count, "keyspace engine started");

        Self {
            shards: shards.into(),
            info: Arc::new(EngineInfo {
                config: config.clone(),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    /// Validates a request and hands it to the owning shard(s).
    ///
    /// Request-level failures (unknown command, arity, cross-shard keys)
    /// come back as a ready error reply. `Err` means a shard executor is
    /// gone.
    pub async fn dispatch(&self, request: Request) -> Result<PendingReply, ShardError> {
        let Some(spec) = commands::lookup(&request.name) else {
            let name = String::from_utf8_lossy(&request.name).into_owned();
            return Ok(ready_err(CommandError::UnknownCommand(name)));
        };
        if let Err(err) = spec.check_arity(request.args.len()) {
            return Ok(ready_err(err));
        }

        match spec.handler {
            Handler::Local(handler) => Ok(PendingReply::Ready(
                handler(&self.info, &request.args).unwrap_or_else(Into::into),
            )),
            Handler::Keyed(handler) => {
                let shard = match self.route(spec.keys.iter(&request.args)) {
                    Ok(shard) => shard,
                    Err(err) => return Ok(ready_err(err)),
                };
                let rx = self.shards[shard].submit(handler, request.args).await?;
                Ok(PendingReply::Single { shard, rx })
            }
            Handler::Broadcast { each, merge } => {
                let mut parts = VecDeque::with_capacity(self.shards.len());
                for handle in self.shards.iter() {
                    let rx = handle.submit(each, request.args.clone()).await?;
                    parts.push_back((handle.id, rx));
                }
                Ok(PendingReply::Gather {
                    parts,
                    done: Vec::with_capacity(self.shards.len()),
                    merge,
                    info: Arc::clone(&self.info),
                    args: request.args,
                })
            }
        }
    }

    /// Dispatches a request and waits for its reply.
    pub async fn execute(&self, request: Request) -> Result<RespValue, ShardError> {
        self.dispatch(request).await?.wait().await
    }

    /// Runs an active expiry pass on every shard. Returns keys removed.
    pub async fn sweep(&self) -> Result<usize, ShardError> {
        let mut removed = 0;
        for handle in self.shards.iter() {
            removed += handle.request(|reply| ShardJob::Sweep { reply }).await?;
        }
        Ok(removed)
    }

    /// Summed counters across every shard.
    pub async fn stats(&self) -> Result<ShardStats, ShardError> {
        let mut total = ShardStats::default();
        for handle in self.shards.iter() {
            total = total + handle.request(|reply| ShardJob::Stats { reply }).await?;
        }
        Ok(total)
    }

    /// Picks the single shard owning every key, or fails with `CrossShard`.
    fn route<'a>(&self, mut keys: impl Iterator<Item = &'a Bytes>) -> Result<usize, CommandError> {
        let count = self.shards.len();
        let Some(first) = keys.next() else {
            return Ok(0);
        };
        let shard = shard_for_key(first, count);
        if keys.all(|key| shard_for_key(key, count) == shard) {
            Ok(shard)
        } else {
            Err(CommandError::CrossShard)
        }
    }
}

fn ready_err(err: CommandError) -> PendingReply {
    PendingReply::Ready(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn engine(shards: usize) -> Engine {
        Engine::start(&Config {
            shards,
            ..Config::default()
        })
    }

    async fn run(engine: &Engine, parts: &[&str]) -> RespValue {
        let request = Request::new(parts.iter().map(|p| Bytes::from(p.to_string())));
        assert_ok!(engine.execute(request).await)
    }

    #[test]
    fn test_hash_tag_routing() {
        assert_eq!(routing_bytes(b"{user:1}:name"), b"user:1");
        assert_eq!(routing_bytes(b"plain"), b"plain");
        assert_eq!(routing_bytes(b"{}empty"), b"{}empty");
        assert_eq!(routing_bytes(b"open{only"), b"open{only");
        assert_eq!(
            shard_for_key(b"{user:1}:name", 16),
            shard_for_key(b"{user:1}:email", 16)
        );
    }

    #[test]
    fn test_partition_is_stable() {
        for key in [&b"a"[..], b"b", b"user:42", b""] {
            let shard = shard_for_key(key, 8);
            assert!(shard < 8);
            assert_eq!(shard, shard_for_key(key, 8));
        }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let engine = engine(4);
        assert_eq!(run(&engine, &["SET", "name", "Ariz"]).await, RespValue::ok());
        assert_eq!(
            run(&engine, &["GET", "name"]).await,
            RespValue::bulk_string(Bytes::from("Ariz"))
        );
    }

    #[tokio::test]
    async fn test_validation_order() {
        let engine = engine(2);
        assert_eq!(
            run(&engine, &["NOPE", "x"]).await,
            RespValue::error("ERR unknown command 'NOPE'")
        );
        assert_eq!(
            run(&engine, &["get"]).await,
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[tokio::test]
    async fn test_cross_shard_rejected() {
        let engine = engine(16);
        // Find two keys on different shards.
        let a = "a";
        let b = (0..100)
            .map(|i| format!("k{}", i))
            .find(|k| shard_for_key(k.as_bytes(), 16) != shard_for_key(a.as_bytes(), 16))
            .unwrap();

        let reply = run(&engine, &["MSET", a, "1", b.as_str(), "2"]).await;
        assert_eq!(
            reply,
            RespValue::error("CROSSSLOT Keys in request don't hash to the same shard")
        );
        // Nothing was written.
        assert_eq!(run(&engine, &["GET", a]).await, RespValue::Null);

        let reply = run(&engine, &["MSET", "{t}a", "1", "{t}b", "2"]).await;
        assert_eq!(reply, RespValue::ok());
    }

    #[tokio::test]
    async fn test_broadcast_dbsize_and_flush() {
        let engine = engine(8);
        for i in 0..20 {
            let key = format!("key:{}", i);
            run(&engine, &["SET", key.as_str(), "v"]).await;
        }
        assert_eq!(run(&engine, &["DBSIZE"]).await, RespValue::integer(20));
        assert_eq!(run(&engine, &["FLUSHDB"]).await, RespValue::ok());
        assert_eq!(run(&engine, &["DBSIZE"]).await, RespValue::integer(0));
    }

    #[tokio::test]
    async fn test_concurrent_incr_has_no_lost_updates() {
        let engine = engine(4);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    engine.execute(Request::new(["INCR", "counter"])).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(
            run(&engine, &["GET", "counter"]).await,
            RespValue::bulk_string(Bytes::from("800"))
        );
    }

    #[tokio::test]
    async fn test_sweep_removes_unread_keys() {
        let engine = engine(4);
        run(&engine, &["SET", "a", "1", "PX", "20"]).await;
        run(&engine, &["SET", "b", "1", "PX", "20"]).await;
        run(&engine, &["SET", "c", "1"]).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(assert_ok!(engine.sweep().await), 2);

        let stats = assert_ok!(engine.stats().await);
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.expired_keys, 2);
    }

    #[tokio::test]
    async fn test_dbsize_skips_expired_keys_before_sweep() {
        let engine = engine(1);
        run(&engine, &["SET", "k", "v", "PX", "1"]).await;
        run(&engine, &["SET", "kept", "v"]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(run(&engine, &["DBSIZE"]).await, RespValue::integer(1));
        let stats = assert_ok!(engine.stats().await);
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.expires, 0);
        assert_eq!(run(&engine, &["GET", "k"]).await, RespValue::Null);
    }

    #[tokio::test]
    async fn test_dispatch_returns_before_reply_is_awaited() {
        let engine = engine(1);
        let first = assert_ok!(engine.dispatch(Request::new(["RPUSH", "l", "x"])).await);
        let second = assert_ok!(engine.dispatch(Request::new(["RPUSH", "l", "y"])).await);
        assert_eq!(assert_ok!(second.wait().await), RespValue::integer(2));
        assert_eq!(assert_ok!(first.wait().await), RespValue::integer(1));
    }

    #[tokio::test]
    async fn test_local_commands_are_ready() {
        let engine = engine(2);
        let pending = assert_ok!(engine.dispatch(Request::new(["PING"])).await);
        assert!(pending.is_ready());
        assert_eq!(pending.into_reply(), Some(RespValue::pong()));
    }
}
