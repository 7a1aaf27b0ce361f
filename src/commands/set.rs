//! Set commands, including the algebra over several keys.
//!
//! Every key of a multi-key call lives on the executing shard (the engine
//! rejects the call otherwise), so the algebra reads consistent values.

use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::value::{value_or_insert, Value};
use crate::storage::Shard;
use bytes::Bytes;
use std::collections::HashSet;

fn read_set<'a>(
    shard: &'a mut Shard,
    key: &[u8],
) -> Result<Option<&'a HashSet<Bytes>>, CommandError> {
    shard.value(key).map(Value::as_set).transpose()
}

/// SADD key member [member ...]
pub fn sadd(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let members = &args[1..];
    shard.mutate(&args[0], |slot| {
        let set = value_or_insert(slot, || Value::Set(HashSet::new())).as_set_mut()?;
        let added = members.iter().filter(|m| set.insert((*m).clone())).count();
        Ok(RespValue::integer(added as i64))
    })
}

/// SREM key member [member ...]
pub fn srem(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let members = &args[1..];
    shard.mutate(&args[0], |slot| {
        let Some(entry) = slot else {
            return Ok(RespValue::integer(0));
        };
        let set = entry.value.as_set_mut()?;
        let removed = members.iter().filter(|m| set.remove(*m)).count();
        Ok(RespValue::integer(removed as i64))
    })
}

/// SISMEMBER key member
pub fn sismember(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let found = read_set(shard, &args[0])?
        .map(|s| s.contains(&args[1]))
        .unwrap_or(false);
    Ok(RespValue::integer(found as i64))
}

/// SMEMBERS key
pub fn smembers(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let set = read_set(shard, &args[0])?;
    Ok(RespValue::bulk_array(set.into_iter().flat_map(|s| s.iter().cloned())))
}

/// SCARD key
pub fn scard(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    let len = read_set(shard, &args[0])?.map(|s| s.len()).unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

#[derive(Clone, Copy)]
enum SetOp {
    Inter,
    Union,
    Diff,
}

/// Evaluates `op` over `keys`, treating missing keys as empty sets.
///
/// Every key is type-checked before any result is built.
fn combine(shard: &mut Shard, keys: &[Bytes], op: SetOp) -> Result<HashSet<Bytes>, CommandError> {
    let mut sets: Vec<HashSet<Bytes>> = Vec::with_capacity(keys.len());
    for key in keys {
        sets.push(read_set(shard, key)?.cloned().unwrap_or_default());
    }
    let mut sets = sets.into_iter();
    let Some(mut acc) = sets.next() else {
        return Ok(HashSet::new());
    };
    for set in sets {
        match op {
            SetOp::Inter => acc.retain(|m| set.contains(m)),
            SetOp::Union => acc.extend(set),
            SetOp::Diff => acc.retain(|m| !set.contains(m)),
        }
    }
    Ok(acc)
}

fn read_op(shard: &mut Shard, args: &[Bytes], op: SetOp) -> CommandResult {
    Ok(RespValue::bulk_array(combine(shard, args, op)?))
}

/// Stores the result at `args[0]`, replacing it whatever its kind.
fn store_op(shard: &mut Shard, args: &[Bytes], op: SetOp) -> CommandResult {
    let result = combine(shard, &args[1..], op)?;
    let len = result.len();
    if result.is_empty() {
        shard.delete(&args[0]);
    } else {
        shard.set(args[0].clone(), Value::Set(result), None);
    }
    Ok(RespValue::integer(len as i64))
}

/// SINTER key [key ...]
pub fn sinter(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    read_op(shard, args, SetOp::Inter)
}

/// SUNION key [key ...]
pub fn sunion(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    read_op(shard, args, SetOp::Union)
}

/// SDIFF key [key ...]
pub fn sdiff(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    read_op(shard, args, SetOp::Diff)
}

/// SINTERSTORE destination key [key ...]
pub fn sinterstore(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    store_op(shard, args, SetOp::Inter)
}

/// SUNIONSTORE destination key [key ...]
pub fn sunionstore(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    store_op(shard, args, SetOp::Union)
}

/// SDIFFSTORE destination key [key ...]
pub fn sdiffstore(shard: &mut Shard, args: &[Bytes]) -> CommandResult {
    store_op(shard, args, SetOp::Diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{bulk, run, sorted};

    fn fixture() -> Shard {
        let mut shard = Shard::new(0, 1);
        run(&mut shard, &["SADD", "a", "1", "2", "3"]);
        run(&mut shard, &["SADD", "b", "2", "3", "4"]);
        shard
    }

    #[test]
    fn test_sadd_srem_membership() {
        let mut shard = Shard::new(0, 1);
        assert_eq!(run(&mut shard, &["SADD", "s", "x", "y", "x"]), RespValue::integer(2));
        assert_eq!(run(&mut shard, &["SCARD", "s"]), RespValue::integer(2));
        assert_eq!(run(&mut shard, &["SISMEMBER", "s", "x"]), RespValue::integer(1));
        assert_eq!(run(&mut shard, &["SISMEMBER", "s", "z"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["SREM", "s", "x", "z"]), RespValue::integer(1));
        assert_eq!(sorted(run(&mut shard, &["SMEMBERS", "s"])), vec![bulk("y")]);
        run(&mut shard, &["SREM", "s", "y"]);
        assert_eq!(run(&mut shard, &["EXISTS", "s"]), RespValue::integer(0));
    }

    #[test]
    fn test_algebra() {
        let mut shard = fixture();
        assert_eq!(sorted(run(&mut shard, &["SINTER", "a", "b"])), vec![bulk("2"), bulk("3")]);
        assert_eq!(
            sorted(run(&mut shard, &["SUNION", "a", "b"])),
            vec![bulk("1"), bulk("2"), bulk("3"), bulk("4")]
        );
        assert_eq!(sorted(run(&mut shard, &["SDIFF", "a", "b"])), vec![bulk("1")]);
        assert_eq!(run(&mut shard, &["SINTER", "a", "missing"]), RespValue::array(vec![]));
    }

    #[test]
    fn test_store_variants() {
        let mut shard = fixture();
        assert_eq!(run(&mut shard, &["SUNIONSTORE", "u", "a", "b"]), RespValue::integer(4));
        assert_eq!(run(&mut shard, &["SCARD", "u"]), RespValue::integer(4));
        assert_eq!(run(&mut shard, &["SINTERSTORE", "u", "a", "missing"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["EXISTS", "u"]), RespValue::integer(0));
        assert_eq!(run(&mut shard, &["SDIFFSTORE", "a", "a", "b"]), RespValue::integer(1));
        assert_eq!(sorted(run(&mut shard, &["SMEMBERS", "a"])), vec![bulk("1")]);
    }

    #[test]
    fn test_algebra_type_checks_every_key() {
        let mut shard = fixture();
        run(&mut shard, &["SET", "s", "v"]);
        assert_eq!(
            run(&mut shard, &["SUNIONSTORE", "dest", "a", "s"]),
            RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
        );
        assert_eq!(run(&mut shard, &["EXISTS", "dest"]), RespValue::integer(0));
    }
}
