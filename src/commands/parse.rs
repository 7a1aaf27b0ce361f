//! Argument parsing shared by the command families.

use crate::error::CommandError;
use crate::storage::value;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub fn int(arg: &[u8]) -> Result<i64, CommandError> {
    value::parse_i64(arg)
}

pub fn float(arg: &[u8]) -> Result<f64, CommandError> {
    value::parse_f64(arg)
}

/// Parses a count that must not be negative.
pub fn count(arg: &[u8]) -> Result<usize, CommandError> {
    let n = int(arg)?;
    usize::try_from(n)
        .map_err(|_| CommandError::Other("value is out of range, must be positive".to_string()))
}

/// Case-insensitive keyword match.
pub fn is(arg: &[u8], keyword: &str) -> bool {
    arg.eq_ignore_ascii_case(keyword.as_bytes())
}

/// When a key should expire, relative to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    At(Instant),
    /// The requested instant is now or already past.
    Elapsed,
}

/// Resolves `amount` units of `unit` from now.
pub fn deadline_in(amount: i64, unit: Duration, command: &str) -> Result<Deadline, CommandError> {
    if amount <= 0 {
        return Ok(Deadline::Elapsed);
    }
    let invalid = || CommandError::InvalidExpire(command.to_ascii_lowercase());
    let millis = (amount as u128)
        .checked_mul(unit.as_millis())
        .and_then(|ms| u64::try_from(ms).ok())
        .ok_or_else(invalid)?;
    Instant::now()
        .checked_add(Duration::from_millis(millis))
        .map(Deadline::At)
        .ok_or_else(invalid)
}

/// Resolves a Unix timestamp given in `unit`s to a monotonic deadline.
pub fn deadline_at_unix(
    amount: i64,
    unit: Duration,
    command: &str,
) -> Result<Deadline, CommandError> {
    let invalid = || CommandError::InvalidExpire(command.to_ascii_lowercase());
    let target_ms = i128::from(amount)
        .checked_mul(unit.as_millis() as i128)
        .ok_or_else(invalid)?;
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as i128;
    let delta = target_ms - now_ms;
    if delta <= 0 {
        return Ok(Deadline::Elapsed);
    }
    let delta = i64::try_from(delta).map_err(|_| invalid())?;
    deadline_in(delta, Duration::from_millis(1), command)
}

/// Positive-only relative expiry, as `SET EX`, `SETEX` and friends require.
pub fn ttl_option(arg: &[u8], unit: Duration, command: &str) -> Result<Instant, CommandError> {
    let amount = int(arg)?;
    match deadline_in(amount, unit, command)? {
        Deadline::At(at) => Ok(at),
        Deadline::Elapsed => Err(CommandError::InvalidExpire(command.to_ascii_lowercase())),
    }
}

pub const SECONDS: Duration = Duration::from_secs(1);
pub const MILLIS: Duration = Duration::from_millis(1);
