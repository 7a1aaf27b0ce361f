//! Sorted set commands.

use super::parse;
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::value::{value_or_insert, ScoreBound, SortedSet, Value, ZAddFlags};
use crate::storage::Shard;
use bytes::Bytes;

fn read_zset<'a>(shard: &'a mut Shard, key: &[u8]) -> Result<Option<&'a SortedSet>, CommandError> {
    shard.value(key).map(Value::as_zset).transpose()
}

/// Flattens `(member, score)` pairs, with scores only when asked for.
fn scored_reply<'a>(items: impl Iterator<Item = (&'a Bytes, f64)>, with_scores: bool) -> RespValue {
    let mut out = Vec::new();
    for (member, score) in items {
        out.push(RespValue::BulkString(member.clone()));
        if with_scores {
            out.push(RespValue::float(score));
        }
    }
    RespValue::array(out)
}

/// ZADD key [NX | XX] [GT | LT] [CH] score member [score member ...]
pub fn zadd(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let mut flags = ZAddFlags::default();
    let mut changed = false;
    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        if parse::is(arg, "NX") {
            flags.nx = true;
        } else if parse::is(arg, "XX") {
            flags.xx = true;
        } else if parse::is(arg, "GT") {
            flags.gt = true;
        } else if parse::is(arg, "LT") {
            flags.lt = true;
        } else if parse::is(arg, "CH") {
            changed = true;
        } else {
            break;
        }
        i += 1;
    }

    if flags.nx && flags.xx {
        return Err(CommandError::Other(
            "XX and NX options at the same time are not compatible".to_string(),
        ));
    }
    if (flags.gt && flags.lt) || (flags.nx && (flags.gt || flags.lt)) {
        return Err(CommandError::Other(
            "GT, LT, and/or NX options at the same time are not compatible".to_string(),
        ));
    }

    let pairs = &args[i..];
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    let mut scored = Vec::with_capacity(pairs.len() / 2);
    for pair in pairs.chunks_exact(2) {
        scored.push((parse::float(&pair[0])?, pair[1].clone()));
    }

    shard.mutate(&args[0], |slot| {
        let zset = value_or_insert(slot, || Value::ZSet(SortedSet::new())).as_zset_mut()?;
        let mut count = 0;
        for (score, member) in scored {
            let outcome = zset.add(member, score, flags);
            if outcome.added || (changed && outcome.updated) {
                count += 1;
            }
        }
        Ok(RespValue::integer(count))
    })
}

/// ZREM key member [member ...]
pub fn zrem(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let members = &args[1..];
    shard.mutate(&args[0], |slot| {
        let Some(entry) = slot else {
            return Ok(RespValue::integer(0));
        };
        let zset = entry.value.as_zset_mut()?;
        let removed = members.iter().filter(|m| zset.remove(m)).count();
        Ok(RespValue::integer(removed as i64))
    })
}

/// ZSCORE key member
pub fn zscore(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let score = read_zset(shard, &args[0])?.and_then(|z| z.score(&args[1]));
    Ok(score.map(RespValue::float).unwrap_or(RespValue::Null))
}

/// ZINCRBY key increment member
pub fn zincrby(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let delta = parse::float(&args[1])?;
    let member = args[2].clone();
    shard.mutate(&args[0], |slot| {
        let zset = value_or_insert(slot, || Value::ZSet(SortedSet::new())).as_zset_mut()?;
        let score = zset.incr(member, delta)?;
        Ok(RespValue::float(score))
    })
}

/// ZCARD key
pub fn zcard(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let len = read_zset(shard, &args[0])?.map(|z| z.len()).unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

/// ZCOUNT key min max
pub fn zcount(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let min = ScoreBound::parse(&args[1])?;
    let max = ScoreBound::parse(&args[2])?;
    let count = read_zset(shard, &args[0])?
        .map(|z| z.range_by_score(min, max).count())
        .unwrap_or(0);
    Ok(RespValue::integer(count as i64))
}

fn rank(shard: &mut Shard, args: &[Bytes], reverse: bool) -> CommandResult {
    let rank = read_zset(shard, &args[0])?.and_then(|z| {
        if reverse {
            z.rev_rank(&args[1])
        } else {
            z.rank(&args[1])
        }
    });
    Ok(rank
        .map(|r| RespValue::integer(r as i64))
        .unwrap_or(RespValue::Null))
}

/// ZRANK key member
pub fn zrank(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    rank(shard, args, false)
}

/// ZREVRANK key member
pub fn zrevrank(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    rank(shard, args, true)
}

fn with_scores_flag(rest: &[Bytes]) -> Result<bool, CommandError> {
    match rest {
        [] => Ok(false),
        [flag] if parse::is(flag, "WITHSCORES") => Ok(true),
        _ => Err(CommandError::Syntax),
    }
}

fn range(shard: &mut Shard, args: &[Bytes], reverse: bool) -> CommandResult {
    let start = parse::int(&args[1])?;
    let stop = parse::int(&args[2])?;
    let with_scores = with_scores_flag(&args[3..])?;
    let items = read_zset(shard, &args[0])?
        .map(|z| z.range_by_rank(start, stop, reverse))
        .unwrap_or_default();
    Ok(scored_reply(items.iter().map(|(m, s)| (m, *s)), with_scores))
}

/// ZRANGE key start stop [WITHSCORES]
pub fn zrange(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    range(shard, args, false)
}

/// ZREVRANGE key start stop [WITHSCORES]
pub fn zrevrange(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    range(shard, args, true)
}

/// ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count]
///
/// A negative LIMIT count returns everything after the offset.
pub fn zrangebyscore(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let min = ScoreBound::parse(&args[1])?;
    let max = ScoreBound::parse(&args[2])?;

    let mut with_scores = false;
    let mut offset = 0usize;
    let mut limit = usize::MAX;
    let mut i = 3;
    while i < args.len() {
        if parse::is(&args[i], "WITHSCORES") {
            with_scores = true;
            i += 1;
        } else if parse::is(&args[i], "LIMIT") && i + 2 < args.len() {
            let off = parse::int(&args[i + 1])?;
            let count = parse::int(&args[i + 2])?;
            if off < 0 {
                return Ok(RespValue::array(Vec::new()));
            }
            offset = off as usize;
            limit = usize::try_from(count).unwrap_or(usize::MAX);
            i += 3;
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let Some(zset) = read_zset(shard, &args[0])? else {
        return Ok(RespValue::array(Vec::new()));
    };
    let items = zset.range_by_score(min, max).skip(offset).take(limit);
    Ok(scored_reply(items, with_scores))
}
