//! Protocol Module
//!
//! The Redis wire protocol (RESP) spoken between clients and the server.
//!
//! ## Requests
//! Two framings are accepted on the same connection:
//!
//! ### Inline
//! ```text
//! LPUSH mylist "hello world"\r\n
//! ```
//! One line, arguments split on whitespace, `"..."` (with escapes) and
//! `'...'` quoting. At most `INLINE_MAX_SIZE` bytes.
//!
//! ### Multibulk
//! ```text
//! *3\r\n
//! $5\r\nLPUSH\r\n
//! $6\r\nmylist\r\n
//! $5\r\nhello\r\n
//! ```
//! At most `MAX_MULTIBULK_LEN` arguments of at most `MAX_BULK_LEN` bytes.
//!
//! ## Replies
//! ```text
//! +OK\r\n                 status
//! -ERR message\r\n        error
//! :42\r\n                 integer
//! $5\r\nhello\r\n         bulk string
//! $-1\r\n                 nil
//! *2\r\n$1\r\na\r\n$1\r\nb\r\n   array
//! ```

mod codec;
mod command;
mod response;

pub use codec::{encode_request, read_reply, RequestParser};
pub use command::{lookup_command, Command, CommandSpec, COMMAND_TABLE};
pub use response::Reply;

/// Longest inline request or header line
pub const INLINE_MAX_SIZE: usize = 64 * 1024;

/// Most arguments in one multibulk request
pub const MAX_MULTIBULK_LEN: i64 = 1024 * 1024;

/// Largest single bulk argument
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
