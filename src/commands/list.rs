//! List commands.

use super::parse;
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::value::{normalize_range, value_or_insert, Value};
use crate::storage::Shard;
use bytes::Bytes;
use std::collections::VecDeque;

#[derive(Clone, Copy, PartialEq, Eq)]
enum End {
    Head,
    Tail,
}

fn push(shard: &mut Shard, args: &[Bytes], end: End, only_existing: bool) -> CommandResult {
    let values = &args[1..];
    shard.mutate(&args[0], |slot| {
        if only_existing && slot.is_none() {
            return Ok(RespValue::integer(0));
        }
        let list = value_or_insert(slot, || Value::List(VecDeque::new())).as_list_mut()?;
        for value in values {
            match end {
                End::Head => list.push_front(value.clone()),
                End::Tail => list.push_back(value.clone()),
            }
        }
        Ok(RespValue::integer(list.len() as i64))
    })
}

/// LPUSH key value [value ...]
pub fn lpush(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    push(shard, args, End::Head, false)
}

/// RPUSH key value [value ...]
pub fn rpush(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    push(shard, args, End::Tail, false)
}

/// LPUSHX key value [value ...]
pub fn lpushx(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    push(shard, args, End::Head, true)
}

/// RPUSHX key value [value ...]
pub fn rpushx(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    push(shard, args, End::Tail, true)
}

fn pop(shard: &mut Shard, args: &[Bytes], end: End) -> CommandResult {
    let count = args.get(1).map(|c| parse::count(c)).transpose()?;
    shard.mutate(&args[0], |slot| {
        let Some(entry) = slot else {
            return Ok(match count {
                Some(_) => RespValue::NullArray,
                None => RespValue::Null,
            });
        };
        let list = entry.value.as_list_mut()?;
        let mut take = || match end {
            End::Head => list.pop_front(),
            End::Tail => list.pop_back(),
        };
        Ok(match count {
            None => RespValue::optional(take()),
            Some(n) => RespValue::bulk_array(std::iter::from_fn(take).take(n)),
        })
    })
}

/// LPOP key [count]
pub fn lpop(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    pop(shard, args, End::Head)
}

/// RPOP key [count]
pub fn rpop(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    pop(shard, args, End::Tail)
}

fn read_list<'a>(
    shard: &'a mut Shard,
    key: &[u8],
) -> Result<Option<&'a VecDeque<Bytes>>, CommandError> {
    shard.value(key).map(Value::as_list).transpose()
}

/// LLEN key
pub fn llen(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let len = read_list(shard, &args[0])?.map(|l| l.len()).unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

/// LRANGE key start stop
pub fn lrange(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let start = parse::int(&args[1])?;
    let stop = parse::int(&args[2])?;
    let Some(list) = read_list(shard, &args[0])? else {
        return Ok(RespValue::array(Vec::new()));
    };
    let items = match normalize_range(start, stop, list.len()) {
        Some((from, to)) => list.range(from..=to).cloned().collect(),
        None => Vec::new(),
    };
    Ok(RespValue::bulk_array(items))
}

/// Maps a possibly negative index onto `0..len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

/// LINDEX key index
pub fn lindex(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let index = parse::int(&args[1])?;
    let item = read_list(shard, &args[0])?
        .and_then(|list| resolve_index(index, list.len()).and_then(|i| list.get(i).cloned()));
    Ok(RespValue::optional(item))
}

/// LSET key index value
pub fn lset(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let index = parse::int(&args[1])?;
    let value = args[2].clone();
    shard.mutate(&args[0], |slot| {
        let entry = slot.as_mut().ok_or(CommandError::KeyNotFound)?;
        let list = entry.value.as_list_mut()?;
        let i = resolve_index(index, list.len()).ok_or(CommandError::OutOfRange)?;
        list[i] = value;
        Ok(RespValue::ok())
    })
}

/// LREM key count value
///
/// `count > 0` removes from the head, `count < 0` from the tail, `0` all.
pub fn lrem(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let count = parse::int(&args[1])?;
    let target = &args[2];
    shard.mutate(&args[0], |slot| {
        let Some(entry) = slot else {
            return Ok(RespValue::integer(0));
        };
        let list = entry.value.as_list_mut()?;
        let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
        let mut removed = 0;

        if count >= 0 {
            let mut i = 0;
            while i < list.len() && removed < limit {
                if list[i] == *target {
                    list.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = list.len();
            while i > 0 && removed < limit {
                i -= 1;
                if list[i] == *target {
                    list.remove(i);
                    removed += 1;
                }
            }
        }
        Ok(RespValue::integer(removed as i64))
    })
}

/// LTRIM key start stop
pub fn ltrim(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let start = parse::int(&args[1])?;
    let stop = parse::int(&args[2])?;
    shard.mutate(&args[0], |slot| {
        let Some(entry) = slot else {
            return Ok(RespValue::ok());
        };
        let list = entry.value.as_list_mut()?;
        match normalize_range(start, stop, list.len()) {
            Some((from, to)) => {
                list.truncate(to + 1);
                list.drain(..from);
            }
            None => list.clear(),
        }
        Ok(RespValue::ok())
    })
}
