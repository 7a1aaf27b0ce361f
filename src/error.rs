//! Error Types
//!
//! Two layers of failure exist in kiwi:
//!
//! - [`CommandError`] is request-fatal. It becomes a single `-KIND message`
//!   reply and the connection goes on with the next pipelined request.
//! - [`ShardError`] means a shard executor has stopped. That only happens
//!   when a handler broke an internal invariant, so the connection that
//!   observes it logs the failure and closes.

use crate::protocol::RespValue;
use thiserror::Error;

/// The numeric format a command expected to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Integer,
    Float,
}

impl std::fmt::Display for NumberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberKind::Integer => f.write_str("value is not an integer or out of range"),
            NumberKind::Float => f.write_str("value is not a valid float"),
        }
    }
}

/// Errors produced while validating or executing a single command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("{0}")]
    NotANumber(NumberKind),

    #[error("increment or decrement would overflow")]
    Overflow,

    #[error("index out of range")]
    OutOfRange,

    #[error("no such key")]
    KeyNotFound,

    #[error("syntax error")]
    Syntax,

    #[error("invalid expire time in '{0}' command")]
    InvalidExpire(String),

    #[error("resulting score is not a number (NaN)")]
    NotAllowedNaN,

    #[error("Keys in request don't hash to the same shard")]
    CrossShard,

    #[error("{0}")]
    Other(String),
}

impl CommandError {
    /// The leading word of the RESP error line.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::WrongType => "WRONGTYPE",
            CommandError::CrossShard => "CROSSSLOT",
            _ => "ERR",
        }
    }

    pub fn wrong_args(command: &str) -> Self {
        CommandError::WrongArgCount(command.to_ascii_lowercase())
    }
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(format!("{} {}", err.kind(), err))
    }
}

/// Result type returned by every command handler.
pub type CommandResult = Result<RespValue, CommandError>;

/// Failures of the shard executors themselves.
#[derive(Debug, Error)]
pub enum ShardError {
    /// The shard's task is no longer receiving work.
    #[error("shard {0} is unavailable")]
    Unavailable(usize),
}
