//! String commands.
//!
//! Writes that replace a value (`SET`, `GETSET`, `MSET`, ...) drop any
//! expiry the key had unless `KEEPTTL` is given. In-place updates
//! (`INCR*`, `APPEND`) keep it.

use super::parse::{self, MILLIS, SECONDS};
use crate::error::{CommandError, CommandResult, NumberKind};
use crate::protocol::{format_float, RespValue};
use crate::storage::value::{self, normalize_range, Entry, Value};
use crate::storage::Shard;
use bytes::{Bytes, BytesMut};
use std::time::Instant;

/// Current string value, `None` if missing, `WrongType` for other kinds.
fn read_str(shard: &mut Shard, key: &[u8]) -> Result<Option<Bytes>, CommandError> {
    match shard.value(key) {
        Some(v) => Ok(Some(v.as_str()?.clone())),
        None => Ok(None),
    }
}

/// GET key
pub fn get(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    Ok(RespValue::optional(read_str(shard, &args[0])?))
}

#[derive(Debug, Default)]
struct SetOptions {
    expires_at: Option<Instant>,
    nx: bool,
    xx: bool,
    get: bool,
    keep_ttl: bool,
}

impl SetOptions {
    fn parse(opts: &[Bytes]) -> Result<Self, CommandError> {
        let mut options = SetOptions::default();
        let mut has_expiry = false;
        let mut i = 0;
        while i < opts.len() {
            let opt = &opts[i];
            if parse::is(opt, "EX") || parse::is(opt, "PX") {
                let unit = if parse::is(opt, "EX") { SECONDS } else { MILLIS };
                let amount = opts.get(i + 1).ok_or(CommandError::Syntax)?;
                if has_expiry || options.keep_ttl {
                    return Err(CommandError::Syntax);
                }
                options.expires_at = Some(parse::ttl_option(amount, unit, "set")?);
                has_expiry = true;
                i += 1;
            } else if parse::is(opt, "NX") {
                options.nx = true;
            } else if parse::is(opt, "XX") {
                options.xx = true;
            } else if parse::is(opt, "GET") {
                options.get = true;
            } else if parse::is(opt, "KEEPTTL") {
                if has_expiry {
                    return Err(CommandError::Syntax);
                }
                options.keep_ttl = true;
            } else {
                return Err(CommandError::Syntax);
            }
            i += 1;
        }
        if options.nx && options.xx {
            return Err(CommandError::Syntax);
        }
        Ok(options)
    }
}

/// SET key value [EX seconds | PX milliseconds | KEEPTTL] [NX | XX] [GET]
pub fn set(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let options = SetOptions::parse(&args[2..])?;
    let value = args[1].clone();

    shard.mutate(&args[0], |slot| {
        let old = match slot {
            Some(entry) if options.get => Some(entry.value.as_str()?.clone()),
            _ => None,
        };
        let exists = slot.is_some();
        let skip = (options.nx && exists) || (options.xx && !exists);

        if !skip {
            let expires_at = if options.keep_ttl {
                slot.as_ref().and_then(|e| e.expires_at)
            } else {
                options.expires_at
            };
            *slot = Some(Entry::with_expiry(Value::Str(value), expires_at));
        }

        Ok(match (options.get, skip) {
            (true, _) => RespValue::optional(old),
            (false, true) => RespValue::Null,
            (false, false) => RespValue::ok(),
        })
    })
}

/// SETNX key value
pub fn setnx(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    if shard.contains(&args[0]) {
        return Ok(RespValue::integer(0));
    }
    shard.set(args[0].clone(), Value::Str(args[1].clone()), None);
    Ok(RespValue::integer(1))
}

/// SETEX key seconds value
pub fn setex(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let at = parse::ttl_option(&args[1], SECONDS, "setex")?;
    shard.set(args[0].clone(), Value::Str(args[2].clone()), Some(at));
    Ok(RespValue::ok())
}

/// PSETEX key milliseconds value
pub fn psetex(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let at = parse::ttl_option(&args[1], MILLIS, "psetex")?;
    shard.set(args[0].clone(), Value::Str(args[2].clone()), Some(at));
    Ok(RespValue::ok())
}

/// GETSET key value
pub fn getset(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let old = read_str(shard, &args[0])?;
    shard.set(args[0].clone(), Value::Str(args[1].clone()), None);
    Ok(RespValue::optional(old))
}

/// GETDEL key
pub fn getdel(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let old = read_str(shard, &args[0])?;
    if old.is_some() {
        shard.delete(&args[0]);
    }
    Ok(RespValue::optional(old))
}

/// MGET key [key ...]
///
/// Keys holding other kinds read as null rather than failing.
pub fn mget(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let values = args
        .iter()
        .map(|key| match shard.value(key) {
            Some(Value::Str(s)) => RespValue::BulkString(s.clone()),
            _ => RespValue::Null,
        })
        .collect();
    Ok(RespValue::array(values))
}

fn check_pairs(args: &[Bytes], command: &str) -> Result<(), CommandError> {
    if args.len() % 2 != 0 {
        return Err(CommandError::wrong_args(command));
    }
    Ok(())
}

/// MSET key value [key value ...]
pub fn mset(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    check_pairs(args, "mset")?;
    for pair in args.chunks_exact(2) {
        shard.set(pair[0].clone(), Value::Str(pair[1].clone()), None);
    }
    Ok(RespValue::ok())
}

/// MSETNX key value [key value ...]
pub fn msetnx(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    check_pairs(args, "msetnx")?;
    if args.chunks_exact(2).any(|pair| shard.contains(&pair[0])) {
        return Ok(RespValue::integer(0));
    }
    for pair in args.chunks_exact(2) {
        shard.set(pair[0].clone(), Value::Str(pair[1].clone()), None);
    }
    Ok(RespValue::integer(1))
}

/// Adds `delta` to the integer stored at `key`, creating it at 0.
fn incr_by(shard: &mut Shard, key: &Bytes, delta: i64) -> CommandResult {
    shard.mutate(key, |slot| {
        let current = match slot {
            Some(entry) => value::parse_i64(entry.value.as_str()?)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
        let text = Bytes::from(next.to_string());
        match slot {
            Some(entry) => entry.value = Value::Str(text),
            None => *slot = Some(Entry::new(Value::Str(text))),
        }
        Ok(RespValue::integer(next))
    })
}

/// INCR key
pub fn incr(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    incr_by(shard, &args[0], 1)
}

/// DECR key
pub fn decr(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    incr_by(shard, &args[0], -1)
}

/// INCRBY key increment
pub fn incrby(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    incr_by(shard, &args[0], parse::int(&args[1])?)
}

/// DECRBY key decrement
pub fn decrby(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let delta = parse::int(&args[1])?
        .checked_neg()
        .ok_or(CommandError::Overflow)?;
    incr_by(shard, &args[0], delta)
}

/// INCRBYFLOAT key increment
pub fn incrbyfloat(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let delta = parse::float(&args[1])?;
    shard.mutate(&args[0], |slot| {
        let current = match slot {
            Some(entry) => value::parse_f64(entry.value.as_str()?)
                .map_err(|_| CommandError::NotANumber(NumberKind::Float))?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(CommandError::Other(
                "increment would produce NaN or Infinity".to_string(),
            ));
        }
        let text = Bytes::from(format_float(next));
        match slot {
            Some(entry) => entry.value = Value::Str(text.clone()),
            None => *slot = Some(Entry::new(Value::Str(text.clone()))),
        }
        Ok(RespValue::BulkString(text))
    })
}

/// APPEND key value
pub fn append(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let suffix = &args[1];
    shard.mutate(&args[0], |slot| {
        let current = value::value_or_insert(slot, || Value::Str(Bytes::new())).as_str_mut()?;
        let mut joined = BytesMut::with_capacity(current.len() + suffix.len());
        joined.extend_from_slice(current);
        joined.extend_from_slice(suffix);
        *current = joined.freeze();
        Ok(RespValue::integer(current.len() as i64))
    })
}

/// STRLEN key
pub fn strlen(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let len = read_str(shard, &args[0])?.map(|s| s.len()).unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

/// GETRANGE key start end
pub fn getrange(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let start = parse::int(&args[1])?;
    let end = parse::int(&args[2])?;
    let value = read_str(shard, &args[0])?.unwrap_or_default();
    let slice = match normalize_range(start, end, value.len()) {
        Some((from, to)) => value.slice(from..=to),
        None => Bytes::new(),
    };
    Ok(RespValue::BulkString(slice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{bulk, run};

    #[test]
    fn test_set_get() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(run(&mut shard, &["SET", "name", "Ariz"]), RespValue::ok());
        assert_eq!(run(&mut shard, &["GET", "name"]), bulk("Ariz"));
        assert_eq!(run(&mut shard, &["GET", "missing"]), RespValue::Null);
    }

    #[test]
    fn test_set_then_incr() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "a", "1"]);
        assert_eq!(run(&mut shard, &["INCR", "a"]), RespValue::integer(2));
        assert_eq!(run(&mut shard, &["GET", "a"]), bulk("2"));
    }

    #[test]
    fn test_incr_non_numeric_leaves_value() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "a", "x"]);
        assert_eq!(
            run(&mut shard, &["INCR", "a"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(run(&mut shard, &["GET", "a"]), bulk("x"));
    }

    #[test]
    fn test_incr_overflow() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "n", "9223372036854775807"]);
        assert_eq!(
            run(&mut shard, &["INCR", "n"]),
            RespValue::error("ERR increment or decrement would overflow")
        );
        assert_eq!(run(&mut shard, &["GET", "n"]), bulk("9223372036854775807"));
        assert_eq!(
            run(&mut shard, &["DECRBY", "m", "-9223372036854775808"]),
            RespValue::error("ERR increment or decrement would overflow")
        );
    }

    #[test]
    fn test_incr_family() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(run(&mut shard, &["INCR", "c"]), RespValue::integer(1));
        assert_eq!(run(&mut shard, &["INCRBY", "c", "10"]), RespValue::integer(11));
        assert_eq!(run(&mut shard, &["DECR", "c"]), RespValue::integer(10));
        assert_eq!(run(&mut shard, &["DECRBY", "c", "4"]), RespValue::integer(6));
        assert_eq!(run(&mut shard, &["INCRBYFLOAT", "c", "0.5"]), bulk("6.5"));
        assert_eq!(
            run(&mut shard, &["INCR", "c"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
    }

    #[test]
    fn test_incr_keeps_ttl() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "c", "1", "EX", "100"]);
        run(&mut shard, &["INCR", "c"]);
        assert_eq!(run(&mut shard, &["TTL", "c"]), RespValue::integer(100));
        run(&mut shard, &["SET", "c", "5"]);
        assert_eq!(run(&mut shard, &["TTL", "c"]), RespValue::integer(-1));
    }

    #[test]
    fn test_set_options() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(run(&mut shard, &["SET", "k", "v1", "XX"]), RespValue::Null);
        assert_eq!(run(&mut shard, &["SET", "k", "v1", "NX"]), RespValue::ok());
        assert_eq!(run(&mut shard, &["SET", "k", "v2", "NX"]), RespValue::Null);
        assert_eq!(run(&mut shard, &["SET", "k", "v3", "GET"]), bulk("v1"));
        assert_eq!(run(&mut shard, &["SET", "k", "v4", "px", "5000"]), RespValue::ok());
        assert_eq!(run(&mut shard, &["SET", "k", "v5", "KEEPTTL"]), RespValue::ok());
        let pttl = run(&mut shard, &["PTTL", "k"]).as_integer().unwrap();
        assert!(pttl > 0 && pttl <= 5000);
    }

    #[test]
    fn test_set_option_errors() {
        let mut shard = Shard::new(0, 1);
        let syntax = RespValue::error("ERR syntax error");
        assert_eq!(run(&mut shard, &["SET", "k", "v", "NX", "XX"]), syntax);
        assert_eq!(run(&mut shard, &["SET", "k", "v", "EX"]), syntax);
        assert_eq!(run(&mut shard, &["SET", "k", "v", "EX", "1", "KEEPTTL"]), syntax);
        assert_eq!(run(&mut shard, &["SET", "k", "v", "BOGUS"]), syntax);
        assert_eq!(
            run(&mut shard, &["SET", "k", "v", "EX", "0"]),
            RespValue::error("ERR invalid expire time in 'set' command")
        );
        assert_eq!(run(&mut shard, &["EXISTS", "k"]), RespValue::integer(0));
    }

    #[test]
    fn test_set_get_on_wrong_type() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["RPUSH", "l", "x"]);
        assert_eq!(
            run(&mut shard, &["SET", "l", "v", "GET"]),
            RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
        );
        assert_eq!(run(&mut shard, &["LLEN", "l"]), RespValue::integer(1));
        // Plain SET replaces any kind.
        assert_eq!(run(&mut shard, &["SET", "l", "v"]), RespValue::ok());
        assert_eq!(run(&mut shard, &["GET", "l"]), bulk("v"));
    }

    #[test]
    fn test_setnx_setex_getset_getdel() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(run(&mut shard, &["SETNX", "k", "1"]), RespValue::integer(1));
        assert_eq!(run(&mut shard, &["SETNX", "k", "2"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["GETSET", "k", "3"]), bulk("1"));
        assert_eq!(run(&mut shard, &["GETDEL", "k"]), bulk("3"));
        assert_eq!(run(&mut shard, &["GETDEL", "k"]), RespValue::Null);

        assert_eq!(run(&mut shard, &["SETEX", "t", "10", "v"]), RespValue::ok());
        assert_eq!(run(&mut shard, &["TTL", "t"]), RespValue::integer(10));
        assert_eq!(run(&mut shard, &["PSETEX", "p", "10000", "v"]), RespValue::ok());
        assert_eq!(run(&mut shard, &["TTL", "p"]), RespValue::integer(10));
    }

    #[test]
    fn test_mset_mget() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(run(&mut shard, &["MSET", "a", "1", "b", "2"]), RespValue::ok());
        run(&mut shard, &["RPUSH", "l", "x"]);
        assert_eq!(
            run(&mut shard, &["MGET", "a", "b", "l", "c"]),
            RespValue::array(vec![bulk("1"), bulk("2"), RespValue::Null, RespValue::Null])
        );
        assert_eq!(
            run(&mut shard, &["MSET", "a", "1", "b"]),
            RespValue::error("ERR wrong number of arguments for 'mset' command")
        );
    }

    #[test]
    fn test_msetnx_is_all_or_nothing() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "b", "old"]);
        assert_eq!(run(&mut shard, &["MSETNX", "a", "1", "b", "2"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["EXISTS", "a"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["MSETNX", "a", "1", "c", "2"]), RespValue::integer(1));
    }

    #[test]
    fn test_append_strlen_getrange() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(run(&mut shard, &["APPEND", "s", "Hello"]), RespValue::integer(5));
        assert_eq!(run(&mut shard, &["APPEND", "s", " World"]), RespValue::integer(11));
        assert_eq!(run(&mut shard, &["STRLEN", "s"]), RespValue::integer(11));
        assert_eq!(run(&mut shard, &["STRLEN", "none"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["GETRANGE", "s", "0", "4"]), bulk("Hello"));
        assert_eq!(run(&mut shard, &["GETRANGE", "s", "-5", "-1"]), bulk("World"));
        assert_eq!(run(&mut shard, &["GETRANGE", "s", "20", "30"]), bulk(""));
    }

    #[test]
    fn test_incrbyfloat_rejects_infinity() {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SET", "f", "1"]);
        assert_eq!(
            run(&mut shard, &["INCRBYFLOAT", "f", "inf"]),
            RespValue::error("ERR increment would produce NaN or Infinity")
        );
        assert_eq!(run(&mut shard, &["GET", "f"]), bulk("1"));
    }
}
