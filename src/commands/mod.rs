//! Command Dispatch Table
//!
//! Every command kiwi understands is one entry in the static [`COMMANDS`]
//! table: its name, arity bounds, where its keys sit in the argument list,
//! and the function that runs it. An unknown name is a lookup miss, never a
//! runtime surprise.
//!
//! ## Architecture
//!
//! ```text
//! Request (name + args)
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ lookup()        │  unknown name  → ERR unknown command
//! │ check_arity()   │  wrong count   → ERR wrong number of arguments
//! └────────┬────────┘
//!          │ Handler
//!    ┌─────┼──────────────┬──────────────────┐
//!    ▼     ▼              ▼                  ▼
//!  Local  Keyed         Broadcast
//!  (no    (one shard,   (every shard, answers merged)
//!  shard)  by key)
//! ```
//!
//! Handlers receive the arguments after the command name. Arity has been
//! checked before they run, so fixed positions can be indexed directly.
//!
//! ## Command Families
//!
//! - `keys`: DEL, EXISTS, EXPIRE family, TTL, PTTL, PERSIST, TYPE, RENAME, KEYS
//! - `string`: GET, SET, SETNX, SETEX, MGET, MSET, INCR family, APPEND, ...
//! - `list`: LPUSH, RPUSH, LPOP, RPOP, LRANGE, LINDEX, LSET, LREM, LTRIM, ...
//! - `hash`: HSET, HGET, HDEL, HGETALL, HINCRBY, ...
//! - `set`: SADD, SREM, SMEMBERS, SINTER, SUNION, SDIFF and their STORE forms
//! - `zset`: ZADD, ZREM, ZSCORE, ZINCRBY, ZRANK, ZRANGE, ZRANGEBYSCORE, ...
//! - `server`: PING, ECHO, SELECT, DBSIZE, FLUSHDB, INFO, COMMAND, CONFIG, TIME, QUIT

pub mod hash;
pub mod keys;
pub mod list;
pub mod parse;
pub mod server;
pub mod set;
pub mod string;
pub mod zset;

use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::{EngineInfo, Shard};
use bytes::Bytes;

/// Runs against the shard that owns the command's keys.
pub type ShardFn = fn(&mut Shard, &[Bytes]) -> CommandResult;
/// Runs on the connection's task without touching any shard.
pub type LocalFn = fn(&EngineInfo, &[Bytes]) -> CommandResult;
/// Combines one answer per shard into the client's reply.
pub type MergeFn = fn(&EngineInfo, &[Bytes], Vec<RespValue>) -> RespValue;

/// How a command is executed.
#[derive(Debug, Clone, Copy)]
pub enum Handler {
    Local(LocalFn),
    Keyed(ShardFn),
    Broadcast { each: ShardFn, merge: MergeFn },
}

/// Key positions, counted the way COMMAND reports them: the command name is
/// position 0, `last == -1` means the final argument, `first == 0` means the
/// command takes no keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub first: usize,
    pub last: i64,
    pub step: usize,
}

impl KeySpec {
    pub const NONE: KeySpec = KeySpec { first: 0, last: 0, step: 0 };
    pub const ONE: KeySpec = KeySpec { first: 1, last: 1, step: 1 };
    pub const TWO: KeySpec = KeySpec { first: 1, last: 2, step: 1 };
    pub const ALL: KeySpec = KeySpec { first: 1, last: -1, step: 1 };
    pub const PAIRS: KeySpec = KeySpec { first: 1, last: -1, step: 2 };

    /// The keys within `args` (the arguments after the command name).
    pub fn iter<'a>(&self, args: &'a [Bytes]) -> impl Iterator<Item = &'a Bytes> + 'a {
        let len = args.len() as i64;
        let (start, end) = if self.first == 0 {
            (0, -1)
        } else {
            let end = if self.last < 0 { len + self.last } else { self.last - 1 };
            (self.first as i64 - 1, end.min(len - 1))
        };
        let step = self.step.max(1);
        (start..=end)
            .step_by(step)
            .filter_map(move |i| args.get(i as usize))
    }
}

/// One row of the command table.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Fewest arguments after the name.
    pub min_args: usize,
    /// Most arguments after the name; `None` for variadic commands.
    pub max_args: Option<usize>,
    pub keys: KeySpec,
    pub flags: &'static [&'static str],
    pub handler: Handler,
}

impl CommandSpec {
    pub fn check_arity(&self, argc: usize) -> Result<(), CommandError> {
        let too_many = self.max_args.map(|max| argc > max).unwrap_or(false);
        if argc < self.min_args || too_many {
            return Err(CommandError::wrong_args(self.name));
        }
        Ok(())
    }

    /// Arity in COMMAND's convention: counts the name, negative when variadic.
    pub fn arity(&self) -> i64 {
        let total = self.min_args as i64 + 1;
        if self.max_args == Some(self.min_args) {
            total
        } else {
            -total
        }
    }
}

const READ: &[&str] = &["readonly"];
const WRITE: &[&str] = &["write"];
const ADMIN: &[&str] = &["admin"];
const FAST: &[&str] = &["fast"];

const fn read(
    name: &'static str,
    min: usize,
    max: Option<usize>,
    keys: KeySpec,
    f: ShardFn,
) -> CommandSpec {
    CommandSpec {
        name,
        min_args: min,
        max_args: max,
        keys,
        flags: READ,
        handler: Handler::Keyed(f),
    }
}

const fn write(
    name: &'static str,
    min: usize,
    max: Option<usize>,
    keys: KeySpec,
    f: ShardFn,
) -> CommandSpec {
    CommandSpec {
        name,
        min_args: min,
        max_args: max,
        keys,
        flags: WRITE,
        handler: Handler::Keyed(f),
    }
}

const fn local(name: &'static str, min: usize, max: Option<usize>, f: LocalFn) -> CommandSpec {
    CommandSpec {
        name,
        min_args: min,
        max_args: max,
        keys: KeySpec::NONE,
        flags: FAST,
        handler: Handler::Local(f),
    }
}

const fn broadcast(
    name: &'static str,
    min: usize,
    max: Option<usize>,
    flags: &'static [&'static str],
    each: ShardFn,
    merge: MergeFn,
) -> CommandSpec {
    CommandSpec {
        name,
        min_args: min,
        max_args: max,
        keys: KeySpec::NONE,
        flags,
        handler: Handler::Broadcast { each, merge },
    }
}

/// The command table.
pub static COMMANDS: &[CommandSpec] = &[
    // Keys
    write("DEL", 1, None, KeySpec::ALL, keys::del),
    read("EXISTS", 1, None, KeySpec::ALL, keys::exists),
    write("EXPIRE", 2, Some(2), KeySpec::ONE, keys::expire),
    write("PEXPIRE", 2, Some(2), KeySpec::ONE, keys::pexpire),
    write("EXPIREAT", 2, Some(2), KeySpec::ONE, keys::expireat),
    write("PEXPIREAT", 2, Some(2), KeySpec::ONE, keys::pexpireat),
    read("TTL", 1, Some(1), KeySpec::ONE, keys::ttl),
    read("PTTL", 1, Some(1), KeySpec::ONE, keys::pttl),
    write("PERSIST", 1, Some(1), KeySpec::ONE, keys::persist),
    read("TYPE", 1, Some(1), KeySpec::ONE, keys::key_type),
    write("RENAME", 2, Some(2), KeySpec::TWO, keys::rename),
    write("RENAMENX", 2, Some(2), KeySpec::TWO, keys::renamenx),
    broadcast("KEYS", 1, Some(1), READ, keys::keys, keys::merge_keys),
    // Strings
    read("GET", 1, Some(1), KeySpec::ONE, string::get),
    write("SET", 2, None, KeySpec::ONE, string::set),
    write("SETNX", 2, Some(2), KeySpec::ONE, string::setnx),
    write("SETEX", 3, Some(3), KeySpec::ONE, string::setex),
    write("PSETEX", 3, Some(3), KeySpec::ONE, string::psetex),
    write("GETSET", 2, Some(2), KeySpec::ONE, string::getset),
    write("GETDEL", 1, Some(1), KeySpec::ONE, string::getdel),
    read("MGET", 1, None, KeySpec::ALL, string::mget),
    write("MSET", 2, None, KeySpec::PAIRS, string::mset),
    write("MSETNX", 2, None, KeySpec::PAIRS, string::msetnx),
    write("INCR", 1, Some(1), KeySpec::ONE, string::incr),
    write("DECR", 1, Some(1), KeySpec::ONE, string::decr),
    write("INCRBY", 2, Some(2), KeySpec::ONE, string::incrby),
    write("DECRBY", 2, Some(2), KeySpec::ONE, string::decrby),
    write("INCRBYFLOAT", 2, Some(2), KeySpec::ONE, string::incrbyfloat),
    write("APPEND", 2, Some(2), KeySpec::ONE, string::append),
    read("STRLEN", 1, Some(1), KeySpec::ONE, string::strlen),
    read("GETRANGE", 3, Some(3), KeySpec::ONE, string::getrange),
    // Lists
    write("LPUSH", 2, None, KeySpec::ONE, list::lpush),
    write("RPUSH", 2, None, KeySpec::ONE, list::rpush),
    write("LPUSHX", 2, None, KeySpec::ONE, list::lpushx),
    write("RPUSHX", 2, None, KeySpec::ONE, list::rpushx),
    write("LPOP", 1, Some(2), KeySpec::ONE, list::lpop),
    write("RPOP", 1, Some(2), KeySpec::ONE, list::rpop),
    read("LLEN", 1, Some(1), KeySpec::ONE, list::llen),
    read("LRANGE", 3, Some(3), KeySpec::ONE, list::lrange),
    read("LINDEX", 2, Some(2), KeySpec::ONE, list::lindex),
    write("LSET", 3, Some(3), KeySpec::ONE, list::lset),
    write("LREM", 3, Some(3), KeySpec::ONE, list::lrem),
    write("LTRIM", 3, Some(3), KeySpec::ONE, list::ltrim),
    // Hashes
    write("HSET", 3, None, KeySpec::ONE, hash::hset),
    write("HSETNX", 3, Some(3), KeySpec::ONE, hash::hsetnx),
    read("HGET", 2, Some(2), KeySpec::ONE, hash::hget),
    read("HMGET", 2, None, KeySpec::ONE, hash::hmget),
    write("HDEL", 2, None, KeySpec::ONE, hash::hdel),
    read("HEXISTS", 2, Some(2), KeySpec::ONE, hash::hexists),
    read("HLEN", 1, Some(1), KeySpec::ONE, hash::hlen),
    read("HKEYS", 1, Some(1), KeySpec::ONE, hash::hkeys),
    read("HVALS", 1, Some(1), KeySpec::ONE, hash::hvals),
    read("HGETALL", 1, Some(1), KeySpec::ONE, hash::hgetall),
    write("HINCRBY", 3, Some(3), KeySpec::ONE, hash::hincrby),
    read("HSTRLEN", 2, Some(2), KeySpec::ONE, hash::hstrlen),
    // Sets
    write("SADD", 2, None, KeySpec::ONE, set::sadd),
    write("SREM", 2, None, KeySpec::ONE, set::srem),
    read("SISMEMBER", 2, Some(2), KeySpec::ONE, set::sismember),
    read("SMEMBERS", 1, Some(1), KeySpec::ONE, set::smembers),
    read("SCARD", 1, Some(1), KeySpec::ONE, set::scard),
    read("SINTER", 1, None, KeySpec::ALL, set::sinter),
    read("SUNION", 1, None, KeySpec::ALL, set::sunion),
    read("SDIFF", 1, None, KeySpec::ALL, set::sdiff),
    write("SINTERSTORE", 2, None, KeySpec::ALL, set::sinterstore),
    write("SUNIONSTORE", 2, None, KeySpec::ALL, set::sunionstore),
    write("SDIFFSTORE", 2, None, KeySpec::ALL, set::sdiffstore),
    // Sorted sets
    write("ZADD", 3, None, KeySpec::ONE, zset::zadd),
    write("ZREM", 2, None, KeySpec::ONE, zset::zrem),
    read("ZSCORE", 2, Some(2), KeySpec::ONE, zset::zscore),
    write("ZINCRBY", 3, Some(3), KeySpec::ONE, zset::zincrby),
    read("ZCARD", 1, Some(1), KeySpec::ONE, zset::zcard),
    read("ZCOUNT", 3, Some(3), KeySpec::ONE, zset::zcount),
    read("ZRANK", 2, Some(2), KeySpec::ONE, zset::zrank),
    read("ZREVRANK", 2, Some(2), KeySpec::ONE, zset::zrevrank),
    read("ZRANGE", 3, Some(4), KeySpec::ONE, zset::zrange),
    read("ZREVRANGE", 3, Some(4), KeySpec::ONE, zset::zrevrange),
    read("ZRANGEBYSCORE", 3, Some(7), KeySpec::ONE, zset::zrangebyscore),
    // Server
    local("PING", 0, Some(1), server::ping),
    local("ECHO", 1, Some(1), server::echo),
    local("SELECT", 1, Some(1), server::select),
    local("TIME", 0, Some(0), server::time),
    local("COMMAND", 0, None, server::command),
    local("CONFIG", 1, None, server::config),
    local("QUIT", 0, Some(0), server::quit),
    broadcast("DBSIZE", 0, Some(0), READ, server::dbsize, server::merge_sum),
    broadcast("FLUSHDB", 0, Some(1), WRITE, server::flush, server::merge_ok),
    broadcast("FLUSHALL", 0, Some(1), WRITE, server::flush, server::merge_ok),
    broadcast("INFO", 0, Some(1), ADMIN, server::shard_stats, server::merge_info),
];

/// Finds a command by name, ignoring ASCII case.
pub fn lookup(name: &[u8]) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.as_bytes().eq_ignore_ascii_case(name))
}

/// Whether `name` is QUIT, after which the connection closes.
pub fn is_quit(name: &[u8]) -> bool {
    name.eq_ignore_ascii_case(b"QUIT")
}

/// Runs commands straight against a shard, bypassing the engine.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn run(shard: &mut Shard, parts: &[&str]) -> RespValue {
        let spec = lookup(parts[0].as_bytes()).expect("known command");
        let args: Vec<Bytes> = parts[1..]
            .iter()
            .map(|p| Bytes::from(p.to_string()))
            .collect();
        if let Err(err) = spec.check_arity(args.len()) {
            return err.into();
        }
        let handler = match spec.handler {
            Handler::Keyed(f) => f,
            Handler::Broadcast { each, .. } => each,
            Handler::Local(_) => panic!("{} does not run on a shard", spec.name),
        };
        handler(shard, &args).unwrap_or_else(Into::into)
    }

    pub fn bulk(s: &str) -> RespValue {
        RespValue::bulk_string(Bytes::from(s.to_string()))
    }

    /// Array elements in a stable order, for replies built from hash sets.
    pub fn sorted(reply: RespValue) -> Vec<RespValue> {
        let mut items = reply.into_array().expect("array reply");
        items.sort_by_key(|v| v.to_string());
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn args(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::from(p.to_string())).collect()
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup(b"get").map(|c| c.name), Some("GET"));
        assert_eq!(lookup(b"GeT").map(|c| c.name), Some("GET"));
        assert!(lookup(b"NOPE").is_none());
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<_> = COMMANDS.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), COMMANDS.len());
    }

    #[test]
    fn test_arity() {
        let get = lookup(b"GET").unwrap();
        assert!(get.check_arity(1).is_ok());
        assert_eq!(get.check_arity(0), Err(CommandError::wrong_args("get")));
        assert!(get.check_arity(2).is_err());
        assert_eq!(get.arity(), 2);
        assert_eq!(lookup(b"DEL").unwrap().arity(), -2);
    }

    #[test]
    fn test_key_positions() {
        let mset = args(&["a", "1", "b", "2"]);
        let keys: Vec<_> = KeySpec::PAIRS.iter(&mset).collect();
        assert_eq!(keys, vec![&Bytes::from("a"), &Bytes::from("b")]);

        let rename = args(&["old", "new"]);
        assert_eq!(KeySpec::TWO.iter(&rename).count(), 2);

        let zrange = args(&["z", "0", "-1"]);
        assert_eq!(KeySpec::ONE.iter(&zrange).count(), 1);

        assert_eq!(KeySpec::NONE.iter(&zrange).count(), 0);
        assert_eq!(KeySpec::ALL.iter(&[]).count(), 0);
    }
}
