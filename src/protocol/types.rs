//! RESP (Redis Serialization Protocol) Reply Types
//!
//! This module defines the reply values kiwi sends back to clients and
//! their wire encoding. Every reply starts with a type prefix byte:
//!
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String (`$-1` is the null bulk string)
//! - `*` Array (`*-1` is the null array)
//!
//! All header lines are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command 'foo'\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$1\r\nx\r\n$1\r\ny\r\n`

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply in the RESP protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status line, must not contain CR or LF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Error line: the kind word followed by a message.
    /// Format: `-<KIND> <message>\r\n`
    Error(String),

    /// 64-bit signed integers.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe string.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Null bulk string: `$-1\r\n`
    Null,

    /// Null array: `*-1\r\n`
    NullArray,

    /// Ordered sequence of replies.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error reply. The text should start with the error kind.
    ///
    /// # Example
    /// ```
    /// use kiwi::protocol::RespValue;
    /// let err = RespValue::error("ERR syntax error");
    /// assert!(err.is_error());
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string reply.
    ///
    /// # Example
    /// ```
    /// use kiwi::protocol::RespValue;
    /// use bytes::Bytes;
    /// let bulk = RespValue::bulk_string(Bytes::from("hello"));
    /// assert_eq!(bulk.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Bulk string holding the decimal text of a float, as score replies use.
    pub fn float(n: f64) -> Self {
        RespValue::BulkString(Bytes::from(format_float(n)))
    }

    /// Wraps an optional payload: `Some` becomes a bulk string, `None` the null bulk.
    pub fn optional(data: Option<Bytes>) -> Self {
        match data {
            Some(b) => RespValue::BulkString(b),
            None => RespValue::Null,
        }
    }

    /// Builds an array of bulk strings.
    pub fn bulk_array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        RespValue::Array(items.into_iter().map(RespValue::BulkString).collect())
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Common response for PONG
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Serializes the reply into a freshly allocated buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.encode(&mut buf);
        buf.to_vec()
    }

    /// Appends the wire encoding of this reply to `dst`.
    ///
    /// Bulk payloads are copied straight from their `Bytes` into the
    /// outbound buffer; nothing is staged in between.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => {
                dst.put_u8(prefix::SIMPLE_STRING);
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            RespValue::Error(s) => {
                dst.put_u8(prefix::ERROR);
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            RespValue::Integer(n) => {
                dst.put_u8(prefix::INTEGER);
                put_decimal(dst, *n);
            }
            RespValue::BulkString(data) => {
                dst.reserve(data.len() + 16);
                dst.put_u8(prefix::BULK_STRING);
                put_decimal(dst, data.len() as i64);
                dst.put_slice(data);
                dst.put_slice(CRLF);
            }
            RespValue::Null => dst.put_slice(b"$-1\r\n"),
            RespValue::NullArray => dst.put_slice(b"*-1\r\n"),
            RespValue::Array(values) => {
                dst.put_u8(prefix::ARRAY);
                put_decimal(dst, values.len() as i64);
                for value in values {
                    value.encode(dst);
                }
            }
        }
    }

    /// Rough size of the encoding, used to pre-size buffers.
    pub fn encoded_len_hint(&self) -> usize {
        match self {
            RespValue::SimpleString(s) | RespValue::Error(s) => s.len() + 3,
            RespValue::Integer(_) => 24,
            RespValue::BulkString(data) => data.len() + 16,
            RespValue::Null | RespValue::NullArray => 5,
            RespValue::Array(values) => {
                16 + values.iter().map(|v| v.encoded_len_hint()).sum::<usize>()
            }
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null | RespValue::NullArray)
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

/// Writes `n` followed by CRLF without going through an intermediate `String`.
fn put_decimal(dst: &mut BytesMut, n: i64) {
    let mut digits = [0u8; 20];
    let mut pos = digits.len();
    let mut rest = n.unsigned_abs();
    loop {
        pos -= 1;
        digits[pos] = b'0' + (rest % 10) as u8;
        rest /= 10;
        if rest == 0 {
            break;
        }
    }
    if n < 0 {
        dst.put_u8(b'-');
    }
    dst.put_slice(&digits[pos..]);
    dst.put_slice(CRLF);
}

/// Formats a float the way score and INCRBYFLOAT replies print it.
pub fn format_float(n: f64) -> String {
    if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            RespValue::Null | RespValue::NullArray => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            writeln!(f)?;
                        }
                        write!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_string_serialize() {
        let value = RespValue::simple_string("OK");
        assert_eq!(value.serialize(), b"+OK\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = RespValue::error("ERR unknown command 'foo'");
        assert_eq!(value.serialize(), b"-ERR unknown command 'foo'\r\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(RespValue::integer(1000).serialize(), b":1000\r\n");
        assert_eq!(RespValue::integer(0).serialize(), b":0\r\n");
        assert_eq!(RespValue::integer(-42).serialize(), b":-42\r\n");
        assert_eq!(
            RespValue::integer(i64::MIN).serialize(),
            b":-9223372036854775808\r\n"
        );
    }

    #[test]
    fn test_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::from("hello"));
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");

        let empty = RespValue::bulk_string(Bytes::new());
        assert_eq!(empty.serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_nulls_are_distinct() {
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
        assert_eq!(RespValue::NullArray.serialize(), b"*-1\r\n");
    }

    #[test]
    fn test_lrange_shaped_array() {
        let value = RespValue::bulk_array(vec![Bytes::from("x"), Bytes::from("y")]);
        assert_eq!(value.serialize(), b"*2\r\n$1\r\nx\r\n$1\r\ny\r\n");
    }

    #[test]
    fn test_nested_array_serialize() {
        let value = RespValue::array(vec![
            RespValue::integer(1),
            RespValue::array(vec![RespValue::integer(2), RespValue::Null]),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n:1\r\n*2\r\n:2\r\n$-1\r\n");
    }

    #[test]
    fn test_encode_appends() {
        let mut buf = BytesMut::new();
        RespValue::ok().encode(&mut buf);
        RespValue::pong().encode(&mut buf);
        assert_eq!(&buf[..], b"+OK\r\n+PONG\r\n");
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(3.0), "3");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
    }
}
