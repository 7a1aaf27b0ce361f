//! Typed Values and Entries
//!
//! Every key maps to an [`Entry`]: one of five value kinds plus an
//! optional absolute expiry instant. Entries own their bytes outright;
//! nothing in here points back into a connection's read buffer.
//!
//! Accessors are type-checked. Asking a string for its list fails with
//! `WrongType` and leaves the value exactly as it was.

use crate::error::{CommandError, NumberKind};
use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::ops::Bound;
use std::time::Instant;

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(Bytes),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
    ZSet(SortedSet),
}

impl Value {
    /// Name reported by the TYPE command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::ZSet(_) => "zset",
        }
    }

    /// Collections with no elements are never kept in the keyspace.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::ZSet(z) => z.is_empty(),
        }
    }

    pub fn as_str(&self) -> Result<&Bytes, CommandError> {
        match self {
            Value::Str(b) => Ok(b),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_str_mut(&mut self) -> Result<&mut Bytes, CommandError> {
        match self {
            Value::Str(b) => Ok(b),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, CommandError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, CommandError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<Bytes, Bytes>, CommandError> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<Bytes, Bytes>, CommandError> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&HashSet<Bytes>, CommandError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut HashSet<Bytes>, CommandError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_zset(&self) -> Result<&SortedSet, CommandError> {
        match self {
            Value::ZSet(z) => Ok(z),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut SortedSet, CommandError> {
        match self {
            Value::ZSet(z) => Ok(z),
            _ => Err(CommandError::WrongType),
        }
    }

    /// Rough heap footprint, reported by INFO.
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Str(b) => b.len(),
            Value::List(l) => l.iter().map(|b| b.len() + 16).sum(),
            Value::Hash(h) => h.iter().map(|(f, v)| f.len() + v.len() + 32).sum(),
            Value::Set(s) => s.iter().map(|m| m.len() + 16).sum(),
            Value::ZSet(z) => z.iter().map(|(m, _)| m.len() * 2 + 48).sum(),
        }
    }
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The actual value stored
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: Value, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    /// Checks if this entry has expired as of `now`.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Returns the remaining TTL in milliseconds, or None if no expiry.
    pub fn ttl_ms(&self, now: Instant) -> Option<u64> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(now).as_millis() as u64)
    }
}

/// Returns the slot's value, creating it with `default` when the key is absent.
///
/// An existing value is returned untouched whatever its kind, so the
/// caller's typed accessor still reports `WrongType` before any write.
pub fn value_or_insert(slot: &mut Option<Entry>, default: impl FnOnce() -> Value) -> &mut Value {
    &mut slot.get_or_insert_with(|| Entry::new(default())).value
}

/// Parses stored or argument bytes as a signed 64-bit integer.
pub fn parse_i64(bytes: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(bytes)
        .ok()
        .filter(|s| {
            let digits = s.strip_prefix('-').unwrap_or(s);
            // Canonical form only: `+1`, `01` and `-0` are rejected.
            !digits.starts_with(&['+', '-'][..])
                && !(digits.starts_with('0') && (digits.len() > 1 || digits.len() != s.len()))
        })
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotANumber(NumberKind::Integer))
}

/// Parses bytes as a float. Accepts `inf`/`-inf`, rejects NaN.
pub fn parse_f64(bytes: &[u8]) -> Result<f64, CommandError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| CommandError::NotANumber(NumberKind::Float))?;
    let n = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        other => other
            .parse::<f64>()
            .map_err(|_| CommandError::NotANumber(NumberKind::Float))?,
    };
    if n.is_nan() {
        return Err(CommandError::NotANumber(NumberKind::Float));
    }
    Ok(n)
}

/// Resolves a Redis-style inclusive index range with negative offsets
/// against a collection of length `len`. Returns `None` when empty.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };

    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// One end of a score interval (`5`, `(5`, `-inf`, `+inf`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreBound {
    pub fn parse(bytes: &[u8]) -> Result<Self, CommandError> {
        let (exclusive, rest) = match bytes.first() {
            Some(b'(') => (true, &bytes[1..]),
            _ => (false, bytes),
        };
        let value = parse_f64(rest).map_err(|_| {
            CommandError::Other("min or max is not a float".to_string())
        })?;
        Ok(Self { value, exclusive })
    }

    fn admits_from_below(&self, score: f64) -> bool {
        if self.exclusive {
            score > self.value
        } else {
            score >= self.value
        }
    }

    fn admits_from_above(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }
}

/// Flags that control ZADD behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZAddFlags {
    /// Only add new members, don't update existing scores.
    pub nx: bool,
    /// Only update existing members, don't add new ones.
    pub xx: bool,
    /// Only update when new score > current score.
    pub gt: bool,
    /// Only update when new score < current score.
    pub lt: bool,
}

/// Result of a single ZADD member operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub added: bool,
    pub updated: bool,
}

/// A set of unique members, each with a float score.
///
/// Members are ordered by `(score, member bytes)`; rank 0 is the lowest
/// score. A hash map answers score lookups and a B-tree keeps the order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    scores: HashMap<Bytes, OrderedFloat<f64>>,
    ordered: BTreeSet<(OrderedFloat<f64>, Bytes)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).map(|s| s.0)
    }

    /// Adds or updates a member under ZADD flag semantics.
    pub fn add(&mut self, member: Bytes, score: f64, flags: ZAddFlags) -> AddOutcome {
        let new_score = OrderedFloat(score);
        match self.scores.get(&member).copied() {
            Some(old_score) => {
                if flags.nx
                    || (flags.gt && new_score <= old_score)
                    || (flags.lt && new_score >= old_score)
                    || new_score == old_score
                {
                    return AddOutcome {
                        added: false,
                        updated: false,
                    };
                }
                self.ordered.remove(&(old_score, member.clone()));
                self.ordered.insert((new_score, member.clone()));
                self.scores.insert(member, new_score);
                AddOutcome {
                    added: false,
                    updated: true,
                }
            }
            None => {
                if flags.xx {
                    return AddOutcome {
                        added: false,
                        updated: false,
                    };
                }
                self.ordered.insert((new_score, member.clone()));
                self.scores.insert(member, new_score);
                AddOutcome {
                    added: true,
                    updated: false,
                }
            }
        }
    }

    /// Adds `delta` to a member's score, creating it at `delta`.
    pub fn incr(&mut self, member: Bytes, delta: f64) -> Result<f64, CommandError> {
        let current = self.score(&member).unwrap_or(0.0);
        let next = current + delta;
        if next.is_nan() {
            return Err(CommandError::NotAllowedNaN);
        }
        self.add(member, next, ZAddFlags::default());
        Ok(next)
    }

    /// Removes a member. Returns `true` if it existed.
    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove_entry(member) {
            Some((name, score)) => {
                self.ordered.remove(&(score, name));
                true
            }
            None => false,
        }
    }

    /// 0-based rank in ascending order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let (name, score) = self.scores.get_key_value(member)?;
        Some(
            self.ordered
                .range(..(*score, name.clone()))
                .count(),
        )
    }

    /// 0-based rank in descending order.
    pub fn rev_rank(&self, member: &[u8]) -> Option<usize> {
        self.rank(member).map(|r| self.len() - 1 - r)
    }

    /// Members in the inclusive rank range, negative indices allowed.
    pub fn range_by_rank(&self, start: i64, stop: i64, reverse: bool) -> Vec<(Bytes, f64)> {
        let Some((s, e)) = normalize_range(start, stop, self.len()) else {
            return Vec::new();
        };
        let take = e - s + 1;
        if reverse {
            self.ordered
                .iter()
                .rev()
                .skip(s)
                .take(take)
                .map(|(score, m)| (m.clone(), score.0))
                .collect()
        } else {
            self.ordered
                .iter()
                .skip(s)
                .take(take)
                .map(|(score, m)| (m.clone(), score.0))
                .collect()
        }
    }

    /// Members whose score lies within `[min, max]`, ascending.
    pub fn range_by_score(
        &self,
        min: ScoreBound,
        max: ScoreBound,
    ) -> impl Iterator<Item = (&Bytes, f64)> + '_ {
        let lower = Bound::Included((OrderedFloat(min.value), Bytes::new()));
        self.ordered
            .range((lower, Bound::Unbounded))
            .map(|(score, m)| (m, score.0))
            .skip_while(move |(_, score)| !min.admits_from_below(*score))
            .take_while(move |(_, score)| max.admits_from_above(*score))
    }

    /// Iterates members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        self.ordered.iter().map(|(score, m)| (m, score.0))
    }
}
