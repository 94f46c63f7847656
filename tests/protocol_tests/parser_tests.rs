//! Tests for the RESP request parser
//!
//! These tests verify:
//! - Multibulk and inline framing
//! - Requests split across reads and several requests in one read
//! - Inline quoting and escapes
//! - Skipped empty requests
//! - Every protocol error and size ceiling

use blinkkv::protocol::{RequestParser, INLINE_MAX_SIZE};
use blinkkv::BlinkError;
use bytes::BytesMut;

// =============================================================================
// Helper Functions
// =============================================================================

fn args(items: &[&str]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_bytes().to_vec()).collect()
}

fn parse_one(input: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut buf = BytesMut::from(input);
    RequestParser::new().parse(&mut buf).unwrap()
}

fn protocol_error(input: &[u8]) -> String {
    let mut buf = BytesMut::from(input);
    match RequestParser::new().parse(&mut buf) {
        Err(BlinkError::Protocol(message)) => message,
        other => panic!("expected protocol error, got {:?}", other),
    }
}

// =============================================================================
// Multibulk Tests
// =============================================================================

#[test]
fn test_multibulk_request() {
    let mut buf = BytesMut::from(&b"*3\r\n$5\r\nLPUSH\r\n$6\r\nmylist\r\n$5\r\nhello\r\n"[..]);
    let parser = RequestParser::new();

    assert_eq!(
        parser.parse(&mut buf).unwrap(),
        Some(args(&["LPUSH", "mylist", "hello"]))
    );
    assert!(buf.is_empty());
}

#[test]
fn test_binary_and_empty_bulks() {
    let mut buf = BytesMut::from(&b"*3\r\n$3\r\nSET\r\n$0\r\n\r\n$4\r\n\r\n\x00\xff\r\n"[..]);
    let argv = RequestParser::new().parse(&mut buf).unwrap().unwrap();

    assert_eq!(argv[1], Vec::<u8>::new());
    assert_eq!(argv[2], vec![b'\r', b'\n', 0x00, 0xff]);
}

#[test]
fn test_request_split_byte_by_byte() {
    let request = b"*2\r\n$4\r\nLLEN\r\n$3\r\nabc\r\n";
    let parser = RequestParser::new();
    let mut buf = BytesMut::new();

    for (i, &byte) in request.iter().enumerate() {
        buf.extend_from_slice(&[byte]);
        let parsed = parser.parse(&mut buf).unwrap();
        if i + 1 < request.len() {
            assert!(parsed.is_none(), "complete after {} bytes", i + 1);
            assert_eq!(buf.len(), i + 1);
        } else {
            assert_eq!(parsed, Some(args(&["LLEN", "abc"])));
        }
    }
    assert!(buf.is_empty());
}

#[test]
fn test_pipelined_requests() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"*1\r\n$4\r\nPING\r\n");
    buf.extend_from_slice(b"LLEN k\r\n");
    buf.extend_from_slice(b"*2\r\n$4\r\nLPOP\r\n$1\r\nk\r\n*1\r\n$4\r\nPI");
    let parser = RequestParser::new();

    assert_eq!(parser.parse(&mut buf).unwrap(), Some(args(&["PING"])));
    assert_eq!(parser.parse(&mut buf).unwrap(), Some(args(&["LLEN", "k"])));
    assert_eq!(parser.parse(&mut buf).unwrap(), Some(args(&["LPOP", "k"])));
    assert_eq!(parser.parse(&mut buf).unwrap(), None);
    assert_eq!(&buf[..], b"*1\r\n$4\r\nPI");
}

#[test]
fn test_empty_multibulk_skipped() {
    let mut buf = BytesMut::from(&b"*0\r\n*-1\r\n*1\r\n$4\r\nPING\r\n"[..]);
    assert_eq!(
        RequestParser::new().parse(&mut buf).unwrap(),
        Some(args(&["PING"]))
    );
}

// =============================================================================
// Inline Tests
// =============================================================================

#[test]
fn test_inline_request() {
    assert_eq!(
        parse_one(b"RPUSH  list\tone two\r\n"),
        Some(args(&["RPUSH", "list", "one", "two"]))
    );
    assert_eq!(parse_one(b"PING\n"), Some(args(&["PING"])));
    assert_eq!(parse_one(b"PING"), None);
}

#[test]
fn test_inline_quoting() {
    assert_eq!(
        parse_one(b"SET k \"hello world\"\r\n"),
        Some(args(&["SET", "k", "hello world"]))
    );
    assert_eq!(
        parse_one(b"SET k 'it\\'s'\r\n"),
        Some(args(&["SET", "k", "it's"]))
    );
    assert_eq!(parse_one(b"SET k \"\"\r\n"), Some(args(&["SET", "k", ""])));
}

#[test]
fn test_inline_escapes() {
    let argv = parse_one(b"SET k \"a\\nb\\t\\x41\\\\\\\"\"\r\n").unwrap();
    assert_eq!(argv[2], b"a\nb\tA\\\"".to_vec());
}

#[test]
fn test_blank_lines_skipped() {
    let mut buf = BytesMut::from(&b"\r\n   \r\n\nPING\r\n"[..]);
    assert_eq!(
        RequestParser::new().parse(&mut buf).unwrap(),
        Some(args(&["PING"]))
    );
    assert!(buf.is_empty());
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_unbalanced_quotes() {
    assert_eq!(protocol_error(b"SET k \"open\r\n"), "unbalanced quotes in request");
    assert_eq!(protocol_error(b"SET k 'open\r\n"), "unbalanced quotes in request");
    assert_eq!(protocol_error(b"SET k \"a\"b\r\n"), "unbalanced quotes in request");
}

#[test]
fn test_invalid_lengths() {
    assert_eq!(protocol_error(b"*abc\r\n"), "invalid multibulk length");
    assert_eq!(protocol_error(b"*2000000\r\n"), "invalid multibulk length");
    assert_eq!(protocol_error(b"*1\r\n$x\r\n"), "invalid bulk length");
    assert_eq!(protocol_error(b"*1\r\n$-5\r\n"), "invalid bulk length");
}

#[test]
fn test_expected_dollar() {
    assert_eq!(protocol_error(b"*1\r\nPING\r\n"), "expected '$', got 'P'");
}

#[test]
fn test_missing_crlf_after_bulk() {
    assert_eq!(
        protocol_error(b"*1\r\n$4\r\nPINGxx"),
        "missing CRLF after bulk string"
    );
}

#[test]
fn test_oversized_lines() {
    let mut inline = vec![b'a'; INLINE_MAX_SIZE + 1];
    assert_eq!(protocol_error(&inline), "too big inline request");
    inline.extend_from_slice(b"\r\n");
    assert_eq!(protocol_error(&inline), "too big inline request");

    let mut count = vec![b'*'];
    count.extend(std::iter::repeat(b'1').take(INLINE_MAX_SIZE + 1));
    assert_eq!(protocol_error(&count), "too big mbulk count string");

    let mut header = b"*1\r\n$".to_vec();
    header.extend(std::iter::repeat(b'1').take(INLINE_MAX_SIZE + 1));
    assert_eq!(protocol_error(&header), "too big bulk count string");
}

#[test]
fn test_bulk_limit() {
    let parser = RequestParser::new().with_bulk_limit(4);

    let mut ok = BytesMut::from(&b"*1\r\n$4\r\nabcd\r\n"[..]);
    assert_eq!(parser.parse(&mut ok).unwrap(), Some(args(&["abcd"])));

    let mut too_big = BytesMut::from(&b"*1\r\n$5\r\nabcde\r\n"[..]);
    assert!(matches!(
        parser.parse(&mut too_big),
        Err(BlinkError::Protocol(m)) if m == "invalid bulk length"
    ));
}

#[test]
fn test_protocol_error_display() {
    let mut buf = BytesMut::from(&b"*abc\r\n"[..]);
    let err = RequestParser::new().parse(&mut buf).unwrap_err();
    assert_eq!(err.to_string(), "Protocol error: invalid multibulk length");
}
