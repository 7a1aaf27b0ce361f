//! RESP Protocol Implementation
//!
//! Stateless-by-contract translation between bytes and kiwi's request and
//! reply values.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` reply enum and its wire encoding
//! - `parser`: Resumable decoder for incoming multi-bulk requests
//!
//! ## Example
//!
//! ```
//! use kiwi::protocol::{RequestDecoder, RespValue};
//! use bytes::{Bytes, BytesMut};
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
//! let frame = decoder.decode(&mut buf).unwrap().unwrap();
//! assert_eq!(frame[0], Bytes::from("GET"));
//!
//! let reply = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{ProtocolError, Request, RequestDecoder, MAX_BULK_SIZE};
pub use types::{format_float, RespValue};
