//! RESP Protocol Implementation
//!
//! A binary-safe, length-prefixed wire protocol in the style of the Redis
//! Serialization Protocol. Nothing above this module touches raw bytes.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and serialization
//! - `parser`: incremental parser for incoming RESP data
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! // Parsing incoming data
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! // Creating responses
//! let response = RespValue::bulk_string(Bytes::from("ember"));
//! assert_eq!(response.serialize(), b"$5\r\nember\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
