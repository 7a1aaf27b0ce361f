//! Hash commands.

use super::parse;
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::value::{self, value_or_insert, Value};
use crate::storage::Shard;
use bytes::Bytes;
use std::collections::HashMap;

fn read_hash<'a>(
    shard: &'a mut Shard,
    key: &[u8],
) -> Result<Option<&'a HashMap<Bytes, Bytes>>, CommandError> {
    shard.value(key).map(Value::as_hash).transpose()
}

/// HSET key field value [field value ...]
///
/// Replies with the number of fields that were newly created.
pub fn hset(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let pairs = &args[1..];
    if pairs.len() % 2 != 0 {
        return Err(CommandError::wrong_args("hset"));
    }
    shard.mutate(&args[0], |slot| {
        let hash = value_or_insert(slot, || Value::Hash(HashMap::new())).as_hash_mut()?;
        let created = pairs
            .chunks_exact(2)
            .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
            .count();
        Ok(RespValue::integer(created as i64))
    })
}

/// HSETNX key field value
pub fn hsetnx(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    shard.mutate(&args[0], |slot| {
        let hash = value_or_insert(slot, || Value::Hash(HashMap::new())).as_hash_mut()?;
        if hash.contains_key(&args[1]) {
            return Ok(RespValue::integer(0));
        }
        hash.insert(args[1].clone(), args[2].clone());
        Ok(RespValue::integer(1))
    })
}

/// HGET key field
pub fn hget(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let value = read_hash(shard, &args[0])?.and_then(|h| h.get(&args[1]).cloned());
    Ok(RespValue::optional(value))
}

/// HMGET key field [field ...]
pub fn hmget(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let hash = read_hash(shard, &args[0])?;
    let values = args[1..]
        .iter()
        .map(|field| RespValue::optional(hash.and_then(|h| h.get(field).cloned())))
        .collect();
    Ok(RespValue::array(values))
}

/// HDEL key field [field ...]
pub fn hdel(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let fields = &args[1..];
    shard.mutate(&args[0], |slot| {
        let Some(entry) = slot else {
            return Ok(RespValue::integer(0));
        };
        let hash = entry.value.as_hash_mut()?;
        let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
        Ok(RespValue::integer(removed as i64))
    })
}

/// HEXISTS key field
pub fn hexists(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let found = read_hash(shard, &args[0])?
        .map(|h| h.contains_key(&args[1]))
        .unwrap_or(false);
    Ok(RespValue::integer(found as i64))
}

/// HLEN key
pub fn hlen(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let len = read_hash(shard, &args[0])?.map(|h| h.len()).unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

/// HKEYS key
pub fn hkeys(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let hash = read_hash(shard, &args[0])?;
    Ok(RespValue::bulk_array(hash.into_iter().flat_map(|h| h.keys().cloned())))
}

/// HVALS key
pub fn hvals(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let hash = read_hash(shard, &args[0])?;
    Ok(RespValue::bulk_array(hash.into_iter().flat_map(|h| h.values().cloned())))
}

/// HGETALL key
pub fn hgetall(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let hash = read_hash(shard, &args[0])?;
    let flat = hash
        .into_iter()
        .flat_map(|h| h.iter())
        .flat_map(|(f, v)| [f.clone(), v.clone()]);
    Ok(RespValue::bulk_array(flat))
}

/// HINCRBY key field increment
pub fn hincrby(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let delta = parse::int(&args[2])?;
    shard.mutate(&args[0], |slot| {
        let hash = value_or_insert(slot, || Value::Hash(HashMap::new())).as_hash_mut()?;
        let current = match hash.get(&args[1]) {
            Some(v) => value::parse_i64(v).map_err(|_| {
                CommandError::Other("hash value is not an integer".to_string())
            })?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
        hash.insert(args[1].clone(), Bytes::from(next.to_string()));
        Ok(RespValue::integer(next))
    })
}

/// HSTRLEN key field
pub fn hstrlen(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let len = read_hash(shard, &args[0])?
        .and_then(|h| h.get(&args[1]).map(|v| v.len()))
        .unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}
