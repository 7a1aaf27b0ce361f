//! Resumable RESP Request Decoder
//!
//! Clients send every command as a RESP array of bulk strings:
//!
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<len bytes>\r\n      (repeated argc times)
//! ```
//!
//! ## How the Decoder Works
//!
//! TCP hands us bytes in arbitrary chunks, so a frame may show up one byte
//! at a time or together with the next ten frames. The decoder keeps a small
//! amount of state between calls:
//!
//! - how many arguments the current frame announced,
//! - the arguments completed so far,
//! - the offset of the first byte it has not looked at yet,
//! - the length of a bulk string whose header was read but whose payload
//!   has not fully arrived.
//!
//! A call returns one of:
//! - `Ok(Some(args))` - a whole frame was decoded and removed from the buffer
//! - `Ok(None)` - need more data; the caller's buffer is left untouched
//! - `Err(ProtocolError)` - malformed input, the connection must be closed
//!
//! Bytes of a partial frame stay in the caller's buffer until the frame is
//! complete, but they are never scanned twice: the next call resumes at the
//! saved offset.

use crate::protocol::types::{prefix, CRLF};
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Malformed wire input. Not recoverable mid-stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame started with something other than `*`
    #[error("expected '*', got {0:?}")]
    UnexpectedByte(char),

    /// A bulk string header did not start with `$`
    #[error("expected '$', got {0:?}")]
    ExpectedBulk(char),

    /// A length field was not a decimal integer
    #[error("invalid {0} length")]
    InvalidLength(&'static str),

    /// The request array announced no arguments
    #[error("invalid multibulk length")]
    EmptyRequest,

    /// A header line grew without ever being terminated
    #[error("too big {0} header")]
    HeaderTooLong(&'static str),

    /// A bulk string exceeds the configured limit
    #[error("invalid bulk length {size} (max: {max})")]
    BulkTooLarge { size: usize, max: usize },

    /// A bulk payload was not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,
}

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of arguments in one request
pub const MAX_ARGS: usize = 1024 * 1024;

/// Most buffer space reserved ahead of a partially received bulk string.
const BULK_RESERVE_CHUNK: usize = 64 * 1024;

/// Longest header line we accept before giving up on finding its CRLF.
/// `*`/`$` plus a 20 digit number plus CRLF fits comfortably.
const MAX_HEADER_LINE: usize = 32;

/// One decoded command invocation.
///
/// `seq` is assigned by the connection in arrival order; replies are
/// written back in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Id of the connection the request arrived on
    pub conn_id: u64,
    /// Position of this request in its connection's stream
    pub seq: u64,
    /// Command name exactly as sent (matched case-insensitively)
    pub name: Bytes,
    /// Arguments after the command name
    pub args: Vec<Bytes>,
}

impl Request {
    /// Builds a request from a decoded frame. The frame must not be empty.
    pub fn from_frame(conn_id: u64, seq: u64, mut frame: Vec<Bytes>) -> Self {
        let args = frame.split_off(1.min(frame.len()));
        let name = frame.pop().unwrap_or_default();
        Self {
            conn_id,
            seq,
            name,
            args,
        }
    }

    /// Convenience constructor used by tests and benches.
    pub fn new<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        let frame: Vec<Bytes> = parts.into_iter().map(Into::into).collect();
        Self::from_frame(0, 0, frame)
    }

    /// The command name upper-cased, for table lookups and logging.
    pub fn command_name(&self) -> String {
        String::from_utf8_lossy(&self.name).to_ascii_uppercase()
    }
}

/// Incremental decoder for multi-bulk request frames.
#[derive(Debug)]
pub struct RequestDecoder {
    /// Offset into the caller's buffer of the first unexamined byte
    pos: usize,
    /// Argument count announced by the current frame's header
    argc: Option<usize>,
    /// Length of the bulk string whose header has been read
    bulk_len: Option<usize>,
    /// Arguments completed so far
    args: Vec<Bytes>,
    /// Largest bulk string accepted
    max_bulk: usize,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::with_max_bulk(MAX_BULK_SIZE)
    }

    pub fn with_max_bulk(max_bulk: usize) -> Self {
        Self {
            pos: 0,
            argc: None,
            bulk_len: None,
            args: Vec::new(),
            max_bulk,
        }
    }

    /// Returns true if part of a frame has been examined but not yet returned.
    pub fn in_frame(&self) -> bool {
        self.argc.is_some()
    }

    /// Attempts to decode one request frame from the front of `buf`.
    ///
    /// On success the frame's bytes are removed from `buf`. When more data is
    /// needed `buf` is left as it was and the decoder remembers its progress.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        let argc = match self.argc {
            Some(argc) => argc,
            None => {
                // Stray line terminators between frames are tolerated.
                let skip = buf
                    .iter()
                    .take_while(|&&b| b == b'\r' || b == b'\n')
                    .count();
                buf.advance(skip);

                if buf.is_empty() {
                    return Ok(None);
                }
                if buf[0] != prefix::ARRAY {
                    return Err(ProtocolError::UnexpectedByte(buf[0] as char));
                }

                let line_end = match find_crlf(&buf[1..]) {
                    Some(end) => end,
                    None if buf.len() > MAX_HEADER_LINE => {
                        return Err(ProtocolError::HeaderTooLong("multibulk"))
                    }
                    None => return Ok(None),
                };

                let count = parse_length(&buf[1..1 + line_end])
                    .ok_or(ProtocolError::InvalidLength("multibulk"))?;
                if count < 1 || count as usize > MAX_ARGS {
                    return Err(ProtocolError::EmptyRequest);
                }

                let argc = count as usize;
                self.pos = 1 + line_end + 2;
                self.argc = Some(argc);
                self.args = Vec::with_capacity(argc.min(64));
                argc
            }
        };

        while self.args.len() < argc {
            let len = match self.bulk_len {
                Some(len) => len,
                None => {
                    let rest = &buf[self.pos..];
                    if rest.is_empty() {
                        return Ok(None);
                    }
                    if rest[0] != prefix::BULK_STRING {
                        return Err(ProtocolError::ExpectedBulk(rest[0] as char));
                    }

                    let line_end = match find_crlf(&rest[1..]) {
                        Some(end) => end,
                        None if rest.len() > MAX_HEADER_LINE => {
                            return Err(ProtocolError::HeaderTooLong("bulk"))
                        }
                        None => return Ok(None),
                    };

                    let len = parse_length(&rest[1..1 + line_end])
                        .ok_or(ProtocolError::InvalidLength("bulk"))?;
                    if len < 0 {
                        return Err(ProtocolError::InvalidLength("bulk"));
                    }
                    let len = len as usize;
                    if len > self.max_bulk {
                        return Err(ProtocolError::BulkTooLarge {
                            size: len,
                            max: self.max_bulk,
                        });
                    }

                    self.pos += 1 + line_end + 2;
                    self.bulk_len = Some(len);
                    len
                }
            };

            // Payload plus its CRLF
            let needed = self.pos + len + 2;
            if buf.len() < needed {
                // The length is only a claim until the bytes arrive.
                buf.reserve((needed - buf.len()).min(BULK_RESERVE_CHUNK));
                return Ok(None);
            }
            if &buf[self.pos + len..needed] != CRLF {
                return Err(ProtocolError::MissingCrlf);
            }

            // Copy out of the connection buffer so stored values never alias it.
            self.args
                .push(Bytes::copy_from_slice(&buf[self.pos..self.pos + len]));
            self.pos = needed;
            self.bulk_len = None;
        }

        buf.advance(self.pos);
        self.pos = 0;
        self.argc = None;
        Ok(Some(std::mem::take(&mut self.args)))
    }
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a signed decimal length field. Rejects empty input, signs on
/// their own, and anything that is not an ASCII digit.
fn parse_length(field: &[u8]) -> Option<i64> {
    let (negative, digits) = match field.first() {
        Some(b'-') => (true, &field[1..]),
        _ => (false, field),
    };
    if digits.is_empty() || digits.len() > 19 {
        return None;
    }

    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        n = n.checked_mul(10)?.checked_add((b - b'0') as i64)?;
    }
    Some(if negative { -n } else { n })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SET_FRAME: &[u8] = b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$4\r\nAriz\r\n";

    fn decode_all(input: &[u8]) -> Result<Vec<Vec<Bytes>>, ProtocolError> {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = decoder.decode(&mut buf)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[test]
    fn test_decode_set_command() {
        let frames = decode_all(SET_FRAME).unwrap();
        assert_eq!(
            frames,
            vec![vec![
                Bytes::from("SET"),
                Bytes::from("user:101"),
                Bytes::from("Ariz"),
            ]]
        );
    }

    #[test]
    fn test_decode_consumes_frame() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r"[..]);

        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, vec![Bytes::from("PING")]);
        assert_eq!(&buf[..], b"*1\r\n$4\r");
    }

    #[test]
    fn test_incomplete_leaves_buffer_alone() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nna"[..]);

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 19);
        assert!(decoder.in_frame());

        buf.extend_from_slice(b"me\r\n");
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, vec![Bytes::from("GET"), Bytes::from("name")]);
        assert!(buf.is_empty());
        assert!(!decoder.in_frame());
    }

    #[test]
    fn test_byte_by_byte_matches_single_delivery() {
        let whole = decode_all(SET_FRAME).unwrap();

        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for &b in SET_FRAME {
            buf.extend_from_slice(&[b]);
            if let Some(frame) = decoder.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames, whole);
    }

    #[test]
    fn test_every_split_point_matches() {
        let mut input = SET_FRAME.to_vec();
        input.extend_from_slice(b"*1\r\n$4\r\nPING\r\n");
        let whole = decode_all(&input).unwrap();

        for split in 0..input.len() {
            let mut decoder = RequestDecoder::new();
            let mut buf = BytesMut::from(&input[..split]);
            let mut frames = Vec::new();
            while let Some(frame) = decoder.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
            buf.extend_from_slice(&input[split..]);
            while let Some(frame) = decoder.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
            assert_eq!(frames, whole, "split at {}", split);
        }
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let frames = decode_all(b"*2\r\n$4\r\nECHO\r\n$5\r\nhel\x00o\r\n").unwrap();
        assert_eq!(frames[0][1], Bytes::from(&b"hel\x00o"[..]));
    }

    #[test]
    fn test_payload_may_contain_crlf() {
        let frames = decode_all(b"*2\r\n$4\r\nECHO\r\n$4\r\na\r\nb\r\n").unwrap();
        assert_eq!(frames[0][1], Bytes::from("a\r\nb"));
    }

    #[test]
    fn test_empty_bulk_string() {
        let frames = decode_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$0\r\n\r\n").unwrap();
        assert_eq!(frames[0][2], Bytes::new());
    }

    #[test]
    fn test_skips_stray_newlines() {
        let frames = decode_all(b"\r\n\r\n*1\r\n$4\r\nPING\r\n\n").unwrap();
        assert_eq!(frames, vec![vec![Bytes::from("PING")]]);
    }

    #[test]
    fn test_rejects_non_array() {
        assert_eq!(
            decode_all(b"PING\r\n"),
            Err(ProtocolError::UnexpectedByte('P'))
        );
    }

    #[test]
    fn test_rejects_empty_and_negative_arrays() {
        assert_eq!(decode_all(b"*0\r\n"), Err(ProtocolError::EmptyRequest));
        assert_eq!(decode_all(b"*-1\r\n"), Err(ProtocolError::EmptyRequest));
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert_eq!(
            decode_all(b"*x\r\n"),
            Err(ProtocolError::InvalidLength("multibulk"))
        );
        assert_eq!(
            decode_all(b"*1\r\n$-1\r\n"),
            Err(ProtocolError::InvalidLength("bulk"))
        );
        assert_eq!(
            decode_all(b"*1\r\n:1\r\n"),
            Err(ProtocolError::ExpectedBulk(':'))
        );
    }

    #[test]
    fn test_rejects_missing_trailing_crlf() {
        assert_eq!(
            decode_all(b"*1\r\n$4\r\nPINGxx"),
            Err(ProtocolError::MissingCrlf)
        );
    }

    #[test]
    fn test_rejects_unterminated_header() {
        let mut input = b"*".to_vec();
        input.extend(std::iter::repeat(b'1').take(40));
        assert_eq!(
            decode_all(&input),
            Err(ProtocolError::HeaderTooLong("multibulk"))
        );
    }

    #[test]
    fn test_bulk_limit() {
        let mut decoder = RequestDecoder::with_max_bulk(4);
        let mut buf = BytesMut::from(&b"*1\r\n$5\r\nhello\r\n"[..]);
        assert_eq!(
            decoder.decode(&mut buf),
            Err(ProtocolError::BulkTooLarge { size: 5, max: 4 })
        );
    }

    #[test]
    fn test_large_bulk_header_does_not_preallocate() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*1\r\n$500000000\r\n"[..]);
        assert_eq!(decoder.decode(&mut buf), Ok(None));
        assert!(buf.capacity() < 1024 * 1024, "capacity {}", buf.capacity());

        // Growth stays bounded per call while the payload trickles in.
        buf.extend_from_slice(&[b'x'; 1024]);
        assert_eq!(decoder.decode(&mut buf), Ok(None));
        assert!(buf.capacity() < 1024 * 1024, "capacity {}", buf.capacity());
    }

    #[test]
    fn test_request_from_frame() {
        let request = Request::from_frame(7, 3, vec![Bytes::from("get"), Bytes::from("k")]);
        assert_eq!(request.conn_id, 7);
        assert_eq!(request.seq, 3);
        assert_eq!(request.command_name(), "GET");
        assert_eq!(request.args, vec![Bytes::from("k")]);
    }
}
