//! Reply definitions
//!
//! Represents replies sent to clients.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::BlinkError;

/// A reply to send to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`
    Status(String),

    /// `-ERR message`; the text carries its own prefix
    Error(String),

    /// `:n`
    Integer(i64),

    /// `$len` followed by the bytes
    Bulk(Vec<u8>),

    /// `$-1`
    Nil,

    /// `*n` followed by each element
    Array(Vec<Reply>),
}

impl Reply {
    /// Create an OK reply
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Create an ERR reply
    pub fn err(message: impl fmt::Display) -> Self {
        Reply::Error(format!("ERR {message}"))
    }

    /// Map an engine error onto the wire
    pub fn from_error(err: &BlinkError) -> Self {
        Self::err(err)
    }

    pub fn integer(n: u64) -> Self {
        Reply::Integer(n.min(i64::MAX as u64) as i64)
    }

    /// Bulk for `Some`, nil for `None`
    pub fn from_option(value: Option<Vec<u8>>) -> Self {
        match value {
            Some(value) => Reply::Bulk(value),
            None => Reply::Nil,
        }
    }

    pub fn bulk_array(values: Vec<Vec<u8>>) -> Self {
        Reply::Array(values.into_iter().map(Reply::Bulk).collect())
    }

    /// Append the wire form of this reply to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(text) => {
                buf.put_u8(b'+');
                buf.put_slice(text.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Error(text) => {
                buf.put_u8(b'-');
                buf.put_slice(text.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Integer(n) => {
                buf.put_u8(b':');
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Bulk(data) => {
                buf.reserve(data.len() + 16);
                buf.put_u8(b'$');
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Reply::Nil => buf.put_slice(b"$-1\r\n"),
            Reply::Array(items) => {
                buf.put_u8(b'*');
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.to_vec()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Reply::Status(text) => write!(f, "{text}"),
            Reply::Error(text) => write!(f, "(error) {text}"),
            Reply::Integer(n) => write!(f, "(integer) {n}"),
            Reply::Bulk(data) => write!(f, "\"{}\"", data.escape_ascii()),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Array(items) if items.is_empty() => write!(f, "(empty array)"),
            Reply::Array(items) => {
                let width = items.len().to_string().len();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                        write!(f, "{:indent$}", "")?;
                    }
                    write!(f, "{:>width$}) ", i + 1)?;
                    item.fmt_indented(f, indent + width + 2)?;
                }
                Ok(())
            }
        }
    }
}

/// redis-cli style rendering
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
