//! Key commands: existence, deletion, expiry, type and renaming.

use super::parse::{self, Deadline, MILLIS, SECONDS};
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::{EngineInfo, GlobPattern, Shard};
use bytes::Bytes;
use std::time::{Duration, Instant};

/// DEL key [key ...]
pub fn del(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let removed = args.iter().filter(|key| shard.delete(key)).count();
    Ok(RespValue::integer(removed as i64))
}

/// EXISTS key [key ...]
///
/// A key named twice is counted twice.
pub fn exists(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let found = args.iter().filter(|key| shard.contains(key)).count();
    Ok(RespValue::integer(found as i64))
}

fn expire_with(shard: &mut Shard, args: &[Bytes], deadline: Deadline) -> CommandResult {
    let key = &args[0];
    if !shard.contains(key) {
        return Ok(RespValue::integer(0));
    }
    match deadline {
        Deadline::At(at) => {
            shard.set_expiry(key, Some(at));
        }
        Deadline::Elapsed => {
            shard.delete(key);
        }
    }
    Ok(RespValue::integer(1))
}

/// EXPIRE key seconds
pub fn expire(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let deadline = parse::deadline_in(parse::int(&args[1])?, SECONDS, "expire")?;
    expire_with(shard, args, deadline)
}

/// PEXPIRE key milliseconds
pub fn pexpire(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let deadline = parse::deadline_in(parse::int(&args[1])?, MILLIS, "pexpire")?;
    expire_with(shard, args, deadline)
}

/// EXPIREAT key unix-seconds
pub fn expireat(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let deadline = parse::deadline_at_unix(parse::int(&args[1])?, SECONDS, "expireat")?;
    expire_with(shard, args, deadline)
}

/// PEXPIREAT key unix-milliseconds
pub fn pexpireat(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let deadline = parse::deadline_at_unix(parse::int(&args[1])?, MILLIS, "pexpireat")?;
    expire_with(shard, args, deadline)
}

/// Remaining time to live: -2 if the key is missing, -1 if it never expires.
fn remaining(shard: &mut Shard, key: &[u8]) -> Result<Duration, i64> {
    let entry = shard.get(key).ok_or(-2)?;
    let at = entry.expires_at.ok_or(-1)?;
    Ok(at.saturating_duration_since(Instant::now()))
}

/// TTL key
pub fn ttl(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let secs = match remaining(shard, &args[0]) {
        Ok(left) => ((left.as_millis() + 500) / 1000) as i64,
        Err(code) => code,
    };
    Ok(RespValue::integer(secs))
}

/// PTTL key
pub fn pttl(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let millis = match remaining(shard, &args[0]) {
        Ok(left) => left.as_millis() as i64,
        Err(code) => code,
    };
    Ok(RespValue::integer(millis))
}

/// PERSIST key
pub fn persist(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let key = &args[0];
    let has_expiry = shard.get(key).map(|e| e.expires_at.is_some()).unwrap_or(false);
    if has_expiry {
        shard.set_expiry(key, None);
    }
    Ok(RespValue::integer(has_expiry as i64))
}

/// TYPE key
pub fn key_type(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let name = shard.value(&args[0]).map(|v| v.type_name()).unwrap_or("none");
    Ok(RespValue::simple_string(name))
}

/// RENAME key newkey
///
/// The value keeps its expiry under the new name.
pub fn rename(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let entry = shard.take(&args[0]).ok_or(CommandError::KeyNotFound)?;
    shard.insert_entry(args[1].clone(), entry);
    Ok(RespValue::ok())
}

/// RENAMENX key newkey
pub fn renamenx(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    if !shard.contains(&args[0]) {
        return Err(CommandError::KeyNotFound);
    }
    if shard.contains(&args[1]) {
        return Ok(RespValue::integer(0));
    }
    rename(shard, args)?;
    Ok(RespValue::integer(1))
}

/// KEYS pattern, one shard's share.
pub fn keys(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let pattern = GlobPattern::new(&args[0]);
    Ok(RespValue::bulk_array(shard.keys(&pattern)))
}

/// Concatenates every shard's KEYS answer.
pub fn merge_keys(_info: &EngineInfo, _args: &[Bytes], parts: Vec<RespValue>) -> RespValue {
    let keys = parts
        .into_iter()
        .filter_map(RespValue::into_array)
        .flatten()
        .collect();
    RespValue::array(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{bulk, run};

    #[test]
    fn test_del_and_exists() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "a", "1"]);
        run(&mut shard, &["SET", "b", "2"]);
        assert_eq!(run(&mut shard, &["EXISTS", "a", "a", "c"]), RespValue::integer(2));
        assert_eq!(run(&mut shard, &["DEL", "a", "b", "c"]), RespValue::integer(2));
        assert_eq!(run(&mut shard, &["EXISTS", "a"]), RespValue::integer(0));
    }

    #[test]
    fn test_ttl_states() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(run(&mut shard, &["TTL", "missing"]), RespValue::integer(-2));
        run(&mut shard, &["SET", "k", "v"]);
        assert_eq!(run(&mut shard, &["TTL", "k"]), RespValue::integer(-1));
        assert_eq!(run(&mut shard, &["EXPIRE", "k", "100"]), RespValue::integer(1));
        assert_eq!(run(&mut shard, &["TTL", "k"]), RespValue::integer(100));
        let pttl = run(&mut shard, &["PTTL", "k"]).as_integer().unwrap();
        assert!(pttl > 99_000 && pttl <= 100_000);
        assert_eq!(run(&mut shard, &["PERSIST", "k"]), RespValue::integer(1));
        assert_eq!(run(&mut shard, &["PERSIST", "k"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["TTL", "k"]), RespValue::integer(-1));
    }

    #[test]
    fn test_expire_missing_key() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(run(&mut shard, &["EXPIRE", "nope", "10"]), RespValue::integer(0));
    }

    #[test]
    fn test_non_positive_expire_deletes() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "k", "v"]);
        assert_eq!(run(&mut shard, &["PEXPIRE", "k", "0"]), RespValue::integer(1));
        assert_eq!(run(&mut shard, &["EXISTS", "k"]), RespValue::integer(0));

        run(&mut shard, &["SET", "k", "v"]);
        assert_eq!(run(&mut shard, &["EXPIREAT", "k", "1"]), RespValue::integer(1));
        assert_eq!(run(&mut shard, &["GET", "k"]), RespValue::Null);
    }

    #[test]
    fn test_expire_rejects_garbage() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "k", "v"]);
        assert_eq!(
            run(&mut shard, &["EXPIRE", "k", "soon"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            run(&mut shard, &["EXPIRE", "k", "9223372036854775807"]),
            RespValue::error("ERR invalid expire time in 'expire' command")
        );
    }

    #[test]
    fn test_type() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "s", "v"]);
        run(&mut shard, &["RPUSH", "l", "v"]);
        run(&mut shard, &["ZADD", "z", "1", "m"]);
        assert_eq!(run(&mut shard, &["TYPE", "s"]), RespValue::simple_string("string"));
        assert_eq!(run(&mut shard, &["TYPE", "l"]), RespValue::simple_string("list"));
        assert_eq!(run(&mut shard, &["TYPE", "z"]), RespValue::simple_string("zset"));
        assert_eq!(run(&mut shard, &["TYPE", "x"]), RespValue::simple_string("none"));
    }

    #[test]
    fn test_rename_keeps_expiry() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "old", "v", "EX", "100"]);
        assert_eq!(run(&mut shard, &["RENAME", "old", "new"]), RespValue::ok());
        assert_eq!(run(&mut shard, &["GET", "new"]), bulk("v"));
        assert_eq!(run(&mut shard, &["EXISTS", "old"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["TTL", "new"]), RespValue::integer(100));
    }

    #[test]
    fn test_rename_missing_key() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(
            run(&mut shard, &["RENAME", "nope", "x"]),
            RespValue::error("ERR no such key")
        );
    }

    #[test]
    fn test_renamenx() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "a", "1"]);
        run(&mut shard, &["SET", "b", "2"]);
        assert_eq!(run(&mut shard, &["RENAMENX", "a", "b"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["RENAMENX", "a", "c"]), RespValue::integer(1));
        assert_eq!(run(&mut shard, &["GET", "c"]), bulk("1"));
    }

    #[test]
    fn test_keys_pattern() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "user:1", "a"]);
        run(&mut shard, &["SET", "user:2", "b"]);
        run(&mut shard, &["SET", "session:1", "c"]);
        let mut found = run(&mut shard, &["KEYS", "user:*"]).into_array().unwrap();
        found.sort_by_key(|v| v.to_string());
        assert_eq!(found, vec![bulk("user:1"), bulk("user:2")]);
    }
}
