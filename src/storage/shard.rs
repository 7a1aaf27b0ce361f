//! A Single Keyspace Partition
//!
//! A `Shard` is plain data: a map from key to [`Entry`] and an ordered
//! expiration index. It carries no lock. Exactly one executor task owns each
//! shard (see `engine.rs`), so every method here runs serialized with every
//! other command touching the same partition.
//!
//! ## Expiry
//!
//! Expired entries are logically absent. Every lookup first drops the key
//! if its instant has passed (lazy expiry), and [`Shard::sweep`] pops the
//! front of the expiration index so keys that are never read again still
//! get reclaimed.
//!
//! The index holds `(instant, key)` for exactly those live entries that
//! carry an expiry. All writes go through `set`, `delete`, `mutate` or
//! `set_expiry`, which keep the two structures in step.

use super::engine::shard_for_key;
use super::glob::GlobPattern;
use super::value::{Entry, Value};
use crate::error::CommandError;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// Most keys one active sweep pass removes from a shard.
pub const SWEEP_BUDGET: usize = 10_000;

/// Counters reported through INFO.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardStats {
    /// Number of live keys
    pub keys: u64,
    /// Live keys that carry an expiry
    pub expires: u64,
    /// Keys removed because their expiry passed, lazily or by sweep
    pub expired_keys: u64,
    /// Commands executed on this shard
    pub commands: u64,
    /// Approximate bytes held by keys and values
    pub used_memory: u64,
}

impl std::ops::Add for ShardStats {
    type Output = ShardStats;

    fn add(self, rhs: ShardStats) -> ShardStats {
        ShardStats {
            keys: self.keys + rhs.keys,
            expires: self.expires + rhs.expires,
            expired_keys: self.expired_keys + rhs.expired_keys,
            commands: self.commands + rhs.commands,
            used_memory: self.used_memory + rhs.used_memory,
        }
    }
}

#[derive(Debug)]
pub struct Shard {
    id: usize,
    partitions: usize,
    entries: HashMap<Bytes, Entry>,
    expirations: BTreeSet<(Instant, Bytes)>,
    expired_keys: u64,
    commands: u64,
}

impl Shard {
    /// Creates shard `id` of `partitions`.
    pub fn new(id: usize, partitions: usize) -> Self {
        Self {
            id,
            partitions,
            entries: HashMap::new(),
            expirations: BTreeSet::new(),
            expired_keys: 0,
            commands: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a live entry, removing it first if it has expired.
    pub fn get(&mut self, key: &[u8]) -> Option<&Entry> {
        self.expire_if_needed(key, Instant::now());
        self.entries.get(key)
    }

    /// Shorthand for `get(key).map(|e| &e.value)`.
    pub fn value(&mut self, key: &[u8]) -> Option<&Value> {
        self.get(key).map(|e| &e.value)
    }

    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn set(&mut self, key: Bytes, value: Value, expires_at: Option<Instant>) {
        self.debug_assert_owned(&key);
        self.insert_entry(key, Entry::with_expiry(value, expires_at));
    }

    /// Stores a whole entry (value plus expiry) under `key`.
    pub fn insert_entry(&mut self, key: Bytes, entry: Entry) {
        self.debug_assert_owned(&key);
        if let Some(old) = self.entries.get(&key) {
            if let Some(at) = old.expires_at {
                self.expirations.remove(&(at, key.clone()));
            }
        }
        if entry.value.is_empty_collection() {
            self.entries.remove(&key);
            return;
        }
        if let Some(at) = entry.expires_at {
            self.expirations.insert((at, key.clone()));
        }
        self.entries.insert(key, entry);
    }

    /// Removes `key`. Returns `true` if a live entry was removed.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.take(key).is_some()
    }

    /// Removes `key` and hands back its live entry.
    pub fn take(&mut self, key: &[u8]) -> Option<Entry> {
        self.expire_if_needed(key, Instant::now());
        let (key, entry) = self.entries.remove_entry(key)?;
        if let Some(at) = entry.expires_at {
            self.expirations.remove(&(at, key));
        }
        Some(entry)
    }

    /// Runs `f` against the slot for `key` and writes back the result.
    ///
    /// The slot is `None` when the key is absent or expired. `f` may fill,
    /// change, or empty it; afterwards the entry is reinserted (or dropped
    /// if it became `None` or an empty collection) and the expiration index
    /// is brought in line with the entry's expiry.
    ///
    /// Handlers perform every fallible check before their first write, so
    /// the slot is unchanged whenever `f` returns `Err`.
    pub fn mutate<R, F>(&mut self, key: &Bytes, f: F) -> Result<R, CommandError>
    where
        F: FnOnce(&mut Option<Entry>) -> Result<R, CommandError>,
    {
        self.debug_assert_owned(key);
        self.expire_if_needed(key, Instant::now());

        let (owned_key, mut slot) = match self.entries.remove_entry(key.as_ref()) {
            Some((k, entry)) => (k, Some(entry)),
            None => (key.clone(), None),
        };
        let old_expiry = slot.as_ref().and_then(|e| e.expires_at);

        let result = f(&mut slot);

        if let Some(at) = old_expiry {
            self.expirations.remove(&(at, owned_key.clone()));
        }
        if let Some(entry) = slot {
            if !entry.value.is_empty_collection() {
                if let Some(at) = entry.expires_at {
                    self.expirations.insert((at, owned_key.clone()));
                }
                self.entries.insert(owned_key, entry);
            }
        }
        result
    }

    /// Sets or clears the expiry of an existing key.
    ///
    /// Returns `false` if the key does not exist.
    pub fn set_expiry(&mut self, key: &[u8], expires_at: Option<Instant>) -> bool {
        self.expire_if_needed(key, Instant::now());
        let Some((owned_key, entry)) = self.entries.get_key_value(key) else {
            return false;
        };
        let owned_key = owned_key.clone();
        let old = entry.expires_at;
        if old == expires_at {
            return true;
        }
        if let Some(at) = old {
            self.expirations.remove(&(at, owned_key.clone()));
        }
        if let Some(at) = expires_at {
            self.expirations.insert((at, owned_key.clone()));
        }
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at = expires_at;
        }
        true
    }

    /// Removes up to `budget` keys whose expiry is at or before `now`,
    /// earliest first. Anything left over is picked up by the next pass.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&mut self, now: Instant, budget: usize) -> usize {
        let mut removed = 0;
        while removed < budget {
            match self.expirations.first() {
                Some((at, _)) if *at <= now => {}
                _ => break,
            }
            if let Some((_, key)) = self.expirations.pop_first() {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        self.expired_keys += removed as u64;
        removed
    }

    /// Keys whose expiry has passed but that are still held.
    fn due(&self, now: Instant) -> usize {
        self.expirations
            .iter()
            .take_while(|(at, _)| *at <= now)
            .count()
    }

    /// Number of live keys. Expired keys not yet swept are not counted.
    pub fn live_len(&self) -> usize {
        self.entries.len() - self.due(Instant::now())
    }

    /// Drops every key.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.expirations.clear();
    }

    /// Live keys matching `pattern`.
    pub fn keys(&self, pattern: &GlobPattern) -> Vec<Bytes> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn record_command(&mut self) {
        self.commands += 1;
    }

    pub fn stats(&self) -> ShardStats {
        let due = self.due(Instant::now()) as u64;
        let used_memory = self
            .entries
            .iter()
            .map(|(k, e)| (k.len() + e.value.approx_size()) as u64)
            .sum();
        ShardStats {
            keys: self.entries.len() as u64 - due,
            expires: self.expirations.len() as u64 - due,
            expired_keys: self.expired_keys,
            commands: self.commands,
            used_memory,
        }
    }

    /// Lazy expiry. Returns `true` if the key was dropped.
    fn expire_if_needed(&mut self, key: &[u8], now: Instant) -> bool {
        let at = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => entry.expires_at,
            _ => return false,
        };
        if let Some((owned_key, _)) = self.entries.remove_entry(key) {
            if let Some(at) = at {
                self.expirations.remove(&(at, owned_key));
            }
            self.expired_keys += 1;
        }
        true
    }

    #[inline]
    fn debug_assert_owned(&self, key: &[u8]) {
        debug_assert_eq!(
            shard_for_key(key, self.partitions),
            self.id,
            "key routed to the wrong shard"
        );
    }

    #[cfg(test)]
    fn index_is_consistent(&self) -> bool {
        let with_expiry = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at.is_some())
            .count();
        with_expiry == self.expirations.len()
            && self.expirations.iter().all(|(at, key)| {
                self.entries
                    .get(key)
                    .map(|e| e.expires_at == Some(*at))
                    .unwrap_or(false)
            })
    }
}
