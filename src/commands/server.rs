//! Server commands.
//!
//! Connection-level commands (`PING`, `ECHO`, `SELECT`, `QUIT`, ...) never
//! touch a shard. Whole-keyspace commands (`DBSIZE`, `FLUSHDB`, `INFO`)
//! run one part on every shard and merge the answers; they are not atomic
//! across shards.

use super::{parse, COMMANDS};
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::{EngineInfo, GlobPattern, Shard, ShardStats};
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// PING [message]
pub fn ping(_info: &EngineInfo, args: &[Bytes]) -> CommandResult {
    Ok(match args.first() {
        Some(message) => RespValue::BulkString(message.clone()),
        None => RespValue::pong(),
    })
}

/// ECHO message
pub fn echo(_info: &EngineInfo, args: &[Bytes]) -> CommandResult {
    Ok(RespValue::BulkString(args[0].clone()))
}

/// SELECT index
///
/// Only database 0 exists.
pub fn select(_info: &EngineInfo, args: &[Bytes]) -> CommandResult {
    match parse::int(&args[0])? {
        0 => Ok(RespValue::ok()),
        _ => Err(CommandError::Other("DB index is out of range".to_string())),
    }
}

/// QUIT
///
/// The connection closes itself once this reply is flushed.
pub fn quit(_info: &EngineInfo, _args: &[Bytes]) -> CommandResult {
    Ok(RespValue::ok())
}

/// TIME
pub fn time(_info: &EngineInfo, _args: &[Bytes]) -> CommandResult {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);

    Ok(RespValue::array(vec![
        RespValue::bulk_string(Bytes::from(now.as_secs().to_string())),
        RespValue::bulk_string(Bytes::from(now.subsec_micros().to_string())),
    ]))
}

/// One COMMAND entry: name, arity, flags, first key, last key, step.
fn describe(spec: &super::CommandSpec) -> RespValue {
    let flags = spec
        .flags
        .iter()
        .map(|f| RespValue::simple_string(*f))
        .collect();
    RespValue::array(vec![
        RespValue::bulk_string(Bytes::from(spec.name.to_ascii_lowercase())),
        RespValue::integer(spec.arity()),
        RespValue::array(flags),
        RespValue::integer(spec.keys.first as i64),
        RespValue::integer(spec.keys.last),
        RespValue::integer(spec.keys.step as i64),
    ])
}

/// COMMAND [COUNT | LIST | INFO name [name ...]]
pub fn command(_info: &EngineInfo, args: &[Bytes]) -> CommandResult {
    let Some(sub) = args.first() else {
        return Ok(RespValue::array(COMMANDS.iter().map(describe).collect()));
    };

    if parse::is(sub, "COUNT") {
        Ok(RespValue::integer(COMMANDS.len() as i64))
    } else if parse::is(sub, "LIST") {
        Ok(RespValue::bulk_array(
            COMMANDS
                .iter()
                .map(|c| Bytes::from(c.name.to_ascii_lowercase())),
        ))
    } else if parse::is(sub, "INFO") {
        let found = args[1..]
            .iter()
            .map(|name| match super::lookup(name) {
                Some(spec) => describe(spec),
                None => RespValue::NullArray,
            })
            .collect();
        Ok(RespValue::array(found))
    } else {
        Err(CommandError::Other(format!(
            "unknown subcommand '{}'",
            String::from_utf8_lossy(sub)
        )))
    }
}

/// CONFIG GET pattern [pattern ...]
///
/// The configuration is fixed at startup, so CONFIG SET is refused.
pub fn config(info: &EngineInfo, args: &[Bytes]) -> CommandResult {
    let sub = &args[0];
    if parse::is(sub, "GET") {
        if args.len() < 2 {
            return Err(CommandError::wrong_args("config|get"));
        }
        let patterns: Vec<GlobPattern> = args[1..]
            .iter()
            .map(|p| GlobPattern::new(p.to_ascii_lowercase()))
            .collect();
        let mut out = Vec::new();
        for (name, value) in info.config.entries() {
            if patterns.iter().any(|p| p.matches(name.as_bytes())) {
                out.push(RespValue::bulk_string(Bytes::from_static(name.as_bytes())));
                out.push(RespValue::bulk_string(Bytes::from(value)));
            }
        }
        Ok(RespValue::array(out))
    } else if parse::is(sub, "SET") {
        Err(CommandError::Other(
            "CONFIG SET is not supported; configuration is fixed at startup".to_string(),
        ))
    } else {
        Err(CommandError::Other(format!(
            "unknown subcommand '{}'",
            String::from_utf8_lossy(sub)
        )))
    }
}

/// DBSIZE, one shard's share.
pub fn dbsize(shard: &mut Shard, _args: &[Bytes]) -> CommandResult {
    Ok(RespValue::integer(shard.live_len() as i64))
}

/// FLUSHDB / FLUSHALL [ASYNC | SYNC], one shard's share.
pub fn flush(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    if let Some(mode) = args.first() {
        if !parse::is(mode, "ASYNC") && !parse::is(mode, "SYNC") {
            return Err(CommandError::Syntax);
        }
    }
    shard.clear();
    Ok(RespValue::ok())
}

/// INFO, one shard's share: its counters as an integer array.
pub fn shard_stats(shard: &mut Shard, _args: &[Bytes]) -> CommandResult {
    let stats = shard.stats();
    Ok(RespValue::array(vec![
        RespValue::integer(stats.keys as i64),
        RespValue::integer(stats.expires as i64),
        RespValue::integer(stats.expired_keys as i64),
        RespValue::integer(stats.commands as i64),
        RespValue::integer(stats.used_memory as i64),
    ]))
}

/// The first error among shard answers, if any.
fn first_error(parts: &[RespValue]) -> Option<RespValue> {
    parts.iter().find(|p| p.is_error()).cloned()
}

/// Sums integer answers.
pub fn merge_sum(_info: &EngineInfo, _args: &[Bytes], parts: Vec<RespValue>) -> RespValue {
    if let Some(err) = first_error(&parts) {
        return err;
    }
    RespValue::integer(parts.iter().filter_map(RespValue::as_integer).sum())
}

/// `+OK` once every shard agreed.
pub fn merge_ok(_info: &EngineInfo, _args: &[Bytes], parts: Vec<RespValue>) -> RespValue {
    first_error(&parts).unwrap_or_else(RespValue::ok)
}

fn parse_stats(part: RespValue) -> ShardStats {
    let fields: Vec<u64> = part
        .into_array()
        .unwrap_or_default()
        .iter()
        .map(|v| v.as_integer().unwrap_or(0).max(0) as u64)
        .collect();
    let field = |i: usize| fields.get(i).copied().unwrap_or(0);
    ShardStats {
        keys: field(0),
        expires: field(1),
        expired_keys: field(2),
        commands: field(3),
        used_memory: field(4),
    }
}

/// INFO [section]
pub fn merge_info(info: &EngineInfo, args: &[Bytes], parts: Vec<RespValue>) -> RespValue {
    if let Some(err) = first_error(&parts) {
        return err;
    }
    let stats = parts
        .into_iter()
        .map(parse_stats)
        .fold(ShardStats::default(), |acc, s| acc + s);

    let wanted = args
        .first()
        .map(|s| String::from_utf8_lossy(s).to_ascii_lowercase())
        .unwrap_or_else(|| "all".to_string());
    let show = |section: &str| wanted == "all" || wanted == "default" || wanted == section;

    let mut out = String::new();
    if show("server") {
        out.push_str(&format!(
            "# Server\r\n\
             kiwi_version:{}\r\n\
             os:{}\r\n\
             tcp_port:{}\r\n\
             uptime_in_seconds:{}\r\n\
             shards:{}\r\n\
             \r\n",
            crate::VERSION,
            std::env::consts::OS,
            info.config.port,
            info.uptime_secs(),
            info.shard_count(),
        ));
    }
    if show("memory") {
        out.push_str(&format!(
            "# Memory\r\n\
             used_memory:{}\r\n\
             used_memory_human:{}K\r\n\
             \r\n",
            stats.used_memory,
            stats.used_memory / 1024,
        ));
    }
    if show("stats") {
        out.push_str(&format!(
            "# Stats\r\n\
             total_commands_processed:{}\r\n\
             expired_keys:{}\r\n\
             \r\n",
            stats.commands, stats.expired_keys,
        ));
    }
    if show("keyspace") {
        out.push_str("# Keyspace\r\n");
        if stats.keys > 0 {
            out.push_str(&format!("db0:keys={},expires={}\r\n", stats.keys, stats.expires));
        }
    }

    RespValue::bulk_string(Bytes::from(out))
}
