//! Protocol codec
//!
//! Incremental request parsing for the server, request encoding and reply
//! reading for the client.
//!
//! `RequestParser::parse` looks at the front of a connection buffer and
//! either consumes one complete request or leaves the buffer untouched until
//! more bytes arrive. Requests split across reads and several requests in
//! one read (pipelining) both fall out of that contract.

use std::io::{BufRead, Read};

use bytes::{Buf, BufMut, BytesMut};

use super::{Reply, INLINE_MAX_SIZE, MAX_BULK_LEN, MAX_MULTIBULK_LEN};
use crate::error::{BlinkError, Result};

/// Outcome of one parse attempt over the buffer front
enum Parsed {
    Incomplete,
    /// Bytes to drop without producing a request (blank line, `*0`)
    Skip(usize),
    Request(Vec<Vec<u8>>, usize),
}

/// Request parser for one connection
#[derive(Debug, Clone)]
pub struct RequestParser {
    inline_max: usize,
    multibulk_max: i64,
    bulk_max: i64,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            inline_max: INLINE_MAX_SIZE,
            multibulk_max: MAX_MULTIBULK_LEN,
            bulk_max: MAX_BULK_LEN,
        }
    }

    /// Parser with a custom bulk size ceiling
    pub fn with_bulk_limit(mut self, bulk_max: i64) -> Self {
        self.bulk_max = bulk_max;
        self
    }

    /// Take one complete request off the front of `buf`
    ///
    /// `Ok(None)` means more bytes are needed. A protocol error leaves the
    /// connection unusable; the caller replies and closes.
    pub fn parse(&self, buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>> {
        loop {
            if buf.is_empty() {
                return Ok(None);
            }
            let parsed = if buf[0] == b'*' {
                self.parse_multibulk(&buf[..])?
            } else {
                self.parse_inline(&buf[..])?
            };
            match parsed {
                Parsed::Incomplete => return Ok(None),
                Parsed::Skip(consumed) => buf.advance(consumed),
                Parsed::Request(argv, consumed) => {
                    buf.advance(consumed);
                    return Ok(Some(argv));
                }
            }
        }
    }

    fn parse_inline(&self, data: &[u8]) -> Result<Parsed> {
        let Some(newline) = data.iter().position(|&b| b == b'\n') else {
            if data.len() > self.inline_max {
                return Err(protocol("too big inline request"));
            }
            return Ok(Parsed::Incomplete);
        };
        if newline > self.inline_max {
            return Err(protocol("too big inline request"));
        }

        let mut line = &data[..newline];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }

        let argv = split_args(line)?;
        if argv.is_empty() {
            Ok(Parsed::Skip(newline + 1))
        } else {
            Ok(Parsed::Request(argv, newline + 1))
        }
    }

    fn parse_multibulk(&self, data: &[u8]) -> Result<Parsed> {
        let Some((count, mut pos)) = self.header_line(data, 0, "too big mbulk count string")?
        else {
            return Ok(Parsed::Incomplete);
        };
        let count = parse_length(&count[1..]).ok_or_else(|| protocol("invalid multibulk length"))?;
        if count > self.multibulk_max {
            return Err(protocol("invalid multibulk length"));
        }
        if count <= 0 {
            return Ok(Parsed::Skip(pos));
        }

        let mut argv = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let Some((header, next)) = self.header_line(data, pos, "too big bulk count string")?
            else {
                return Ok(Parsed::Incomplete);
            };
            if header.first() != Some(&b'$') {
                let got = header.first().map(|&b| b as char).unwrap_or(' ');
                return Err(protocol(&format!("expected '$', got '{got}'")));
            }
            let len = parse_length(&header[1..])
                .filter(|&len| len >= 0 && len <= self.bulk_max)
                .ok_or_else(|| protocol("invalid bulk length"))? as usize;

            let end = next + len;
            if data.len() < end + 2 {
                return Ok(Parsed::Incomplete);
            }
            if &data[end..end + 2] != b"\r\n" {
                return Err(protocol("missing CRLF after bulk string"));
            }
            argv.push(data[next..end].to_vec());
            pos = end + 2;
        }
        Ok(Parsed::Request(argv, pos))
    }

    /// The CRLF-terminated line starting at `start`, and the offset past it
    fn header_line<'d>(
        &self,
        data: &'d [u8],
        start: usize,
        too_big: &str,
    ) -> Result<Option<(&'d [u8], usize)>> {
        let rest = &data[start.min(data.len())..];
        match rest.windows(2).position(|w| w == b"\r\n") {
            Some(end) => Ok(Some((&rest[..end], start + end + 2))),
            None if rest.len() > self.inline_max => Err(protocol(too_big)),
            None => Ok(None),
        }
    }
}

fn protocol(message: &str) -> BlinkError {
    BlinkError::Protocol(message.to_string())
}

fn parse_length(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c)
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Split an inline request into arguments
///
/// Handles `"..."` with `\n \r \t \b \a \\ \" \xHH` escapes and `'...'`
/// with `\'`. A closing quote must be followed by whitespace or the end.
pub(crate) fn split_args(line: &[u8]) -> Result<Vec<Vec<u8>>> {
    let unbalanced = || protocol("unbalanced quotes in request");
    let mut args = Vec::new();
    let mut i = 0;

    loop {
        while i < line.len() && is_space(line[i]) {
            i += 1;
        }
        if i == line.len() {
            return Ok(args);
        }

        let mut current = Vec::new();
        match line[i] {
            b'"' => {
                i += 1;
                loop {
                    match line.get(i) {
                        None => return Err(unbalanced()),
                        Some(b'"') => {
                            i += 1;
                            break;
                        }
                        Some(b'\\') if i + 3 < line.len()
                            && line[i + 1] == b'x'
                            && hex_value(line[i + 2]).is_some()
                            && hex_value(line[i + 3]).is_some() =>
                        {
                            let hi = hex_value(line[i + 2]).unwrap_or(0);
                            let lo = hex_value(line[i + 3]).unwrap_or(0);
                            current.push(hi * 16 + lo);
                            i += 4;
                        }
                        Some(b'\\') if i + 1 < line.len() => {
                            current.push(match line[i + 1] {
                                b'n' => b'\n',
                                b'r' => b'\r',
                                b't' => b'\t',
                                b'b' => 0x08,
                                b'a' => 0x07,
                                other => other,
                            });
                            i += 2;
                        }
                        Some(&b) => {
                            current.push(b);
                            i += 1;
                        }
                    }
                }
                if i < line.len() && !is_space(line[i]) {
                    return Err(unbalanced());
                }
            }
            b'\'' => {
                i += 1;
                loop {
                    match line.get(i) {
                        None => return Err(unbalanced()),
                        Some(b'\'') => {
                            i += 1;
                            break;
                        }
                        Some(b'\\') if line.get(i + 1) == Some(&b'\'') => {
                            current.push(b'\'');
                            i += 2;
                        }
                        Some(&b) => {
                            current.push(b);
                            i += 1;
                        }
                    }
                }
                if i < line.len() && !is_space(line[i]) {
                    return Err(unbalanced());
                }
            }
            _ => {
                while i < line.len() && !is_space(line[i]) {
                    current.push(line[i]);
                    i += 1;
                }
            }
        }
        args.push(current);
    }
}

// =============================================================================
// Client side
// =============================================================================

/// Encode a request as a multibulk array
pub fn encode_request<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
    buf
}

/// Read one complete reply from a server stream
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let line = read_line(reader)?;
    let (&sigil, body) = line
        .split_first()
        .ok_or_else(|| protocol("empty reply line"))?;
    let text = || String::from_utf8_lossy(body).into_owned();

    match sigil {
        b'+' => Ok(Reply::Status(text())),
        b'-' => Ok(Reply::Error(text())),
        b':' => parse_length(body)
            .map(Reply::Integer)
            .ok_or_else(|| protocol("invalid integer reply")),
        b'$' => {
            let len = parse_length(body).ok_or_else(|| protocol("invalid bulk length"))?;
            if len < 0 {
                return Ok(Reply::Nil);
            }
            let mut data = vec![0u8; len as usize + 2];
            reader.read_exact(&mut data)?;
            if !data.ends_with(b"\r\n") {
                return Err(protocol("missing CRLF after bulk string"));
            }
            data.truncate(len as usize);
            Ok(Reply::Bulk(data))
        }
        b'*' => {
            let count = parse_length(body).ok_or_else(|| protocol("invalid multibulk length"))?;
            if count < 0 {
                return Ok(Reply::Nil);
            }
            let mut items = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                items.push(read_reply(reader)?);
            }
            Ok(Reply::Array(items))
        }
        other => Err(protocol(&format!("unexpected reply type '{}'", other as char))),
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line)?;
    if read == 0 {
        return Err(BlinkError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "server closed the connection",
        )));
    }
    if !line.ends_with(b"\r\n") {
        return Err(protocol("reply line not terminated by CRLF"));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}
