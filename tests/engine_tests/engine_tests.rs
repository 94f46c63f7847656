//! Tests for the Engine facade
//!
//! These tests verify:
//! - Scalar GET/SET with expiry
//! - DEL across scalars, lists and sets, including a failed keyspace write
//! - Command execution and the reply shape of each command family
//! - Invalid configuration rejected at open

use std::path::Path;
use std::thread;
use std::time::Duration;

use blinkkv::protocol::{Command, Reply};
use blinkkv::{BlinkError, Config, Engine};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_engine(dir: &Path) -> Engine {
    Engine::open_path(dir).unwrap()
}

fn run(engine: &Engine, args: &[&str]) -> blinkkv::Result<Reply> {
    let argv = args.iter().map(|a| a.as_bytes().to_vec()).collect();
    engine.execute(Command::parse(argv)?)
}

fn bulk(s: &str) -> Reply {
    Reply::Bulk(s.as_bytes().to_vec())
}

// =============================================================================
// Scalar Tests
// =============================================================================

#[test]
fn test_scalar_set_get() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    assert_eq!(engine.get(b"k").unwrap(), None);
    engine.set(b"k", b"v1", None).unwrap();
    engine.set(b"k", b"v2", None).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_scalar_ttl() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine
        .set(b"k", b"v", Some(Duration::from_millis(50)))
        .unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
    thread::sleep(Duration::from_millis(120));
    assert_eq!(engine.get(b"k").unwrap(), None);
}

#[test]
fn test_del_covers_every_type() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine.set(b"scalar", b"v", None).unwrap();
    engine.rpush(b"list", &[b"a".to_vec(), b"b".to_vec()]).unwrap();
    engine.sadd(b"set", &[b"m".to_vec()]).unwrap();

    let keys = vec![
        b"scalar".to_vec(),
        b"list".to_vec(),
        b"set".to_vec(),
        b"missing".to_vec(),
    ];
    assert_eq!(engine.del(&keys).unwrap(), 3);

    assert_eq!(engine.get(b"scalar").unwrap(), None);
    assert_eq!(engine.llen(b"list").unwrap(), 0);
    assert_eq!(engine.scard(b"set").unwrap(), 0);
    assert!(engine.metadata_records().is_empty());
    assert_eq!(engine.del(&keys).unwrap(), 0);
}

#[test]
fn test_del_with_failing_set_write_keeps_every_key_readable() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine.set(b"k", b"scalar", None).unwrap();
    engine.rpush(b"k", &[b"a".to_vec(), b"b".to_vec()]).unwrap();
    engine.sadd(b"k", &[b"m".to_vec()]).unwrap();

    engine.storage().set().fail_writes(true);
    assert!(matches!(
        engine.del(&[b"k".to_vec()]),
        Err(BlinkError::Io(_))
    ));

    // The list went first and is fully gone; the rest is intact
    assert_eq!(engine.llen(b"k").unwrap(), 0);
    assert!(matches!(engine.lindex(b"k", 0), Err(BlinkError::NotFound)));
    assert!(engine.sismember(b"k", b"m").unwrap());
    assert_eq!(engine.get(b"k").unwrap(), Some(b"scalar".to_vec()));

    engine.storage().set().fail_writes(false);
    assert_eq!(engine.del(&[b"k".to_vec()]).unwrap(), 1);
    assert_eq!(engine.scard(b"k").unwrap(), 0);
    assert_eq!(engine.get(b"k").unwrap(), None);
    assert!(engine.metadata_records().is_empty());
}

#[test]
fn test_del_with_failing_list_write_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine.set(b"k", b"scalar", None).unwrap();
    engine.rpush(b"k", &[b"a".to_vec()]).unwrap();
    let before = engine.metadata_records();

    engine.storage().list().fail_writes(true);
    assert!(engine.del(&[b"k".to_vec()]).is_err());

    assert_eq!(engine.metadata_records(), before);
    assert_eq!(engine.lindex(b"k", 0).unwrap(), b"a".to_vec());
    assert_eq!(engine.get(b"k").unwrap(), Some(b"scalar".to_vec()));
}

#[test]
fn test_same_name_in_each_keyspace() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine.set(b"k", b"scalar", None).unwrap();
    engine.rpush(b"k", &[b"item".to_vec()]).unwrap();
    engine.sadd(b"k", &[b"member".to_vec()]).unwrap();

    assert_eq!(engine.get(b"k").unwrap(), Some(b"scalar".to_vec()));
    assert_eq!(engine.lindex(b"k", 0).unwrap(), b"item".to_vec());
    assert!(engine.sismember(b"k", b"member").unwrap());
    assert_eq!(engine.del(&[b"k".to_vec()]).unwrap(), 1);
}

#[test]
fn test_invalid_config_rejected() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .list_block_limit(0)
        .build();

    assert!(matches!(Engine::open(config), Err(BlinkError::Config(_))));
}

// =============================================================================
// Command Execution Tests
// =============================================================================

#[test]
fn test_execute_ping_and_scalars() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    assert_eq!(run(&engine, &["PING"]).unwrap(), Reply::Status("PONG".into()));
    assert_eq!(run(&engine, &["ping", "hi"]).unwrap(), bulk("hi"));
    assert_eq!(run(&engine, &["SET", "k", "v"]).unwrap(), Reply::ok());
    assert_eq!(run(&engine, &["GET", "k"]).unwrap(), bulk("v"));
    assert_eq!(run(&engine, &["GET", "nope"]).unwrap(), Reply::Nil);
    assert_eq!(run(&engine, &["DEL", "k", "nope"]).unwrap(), Reply::Integer(1));
}

#[test]
fn test_execute_list_replies() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    assert_eq!(run(&engine, &["LPUSH", "l", "a", "b"]).unwrap(), Reply::Integer(2));
    assert_eq!(run(&engine, &["RPUSH", "l", "c"]).unwrap(), Reply::Integer(3));
    assert_eq!(run(&engine, &["LPUSHX", "none", "x"]).unwrap(), Reply::Integer(0));
    assert_eq!(run(&engine, &["LLEN", "l"]).unwrap(), Reply::Integer(3));
    assert_eq!(
        run(&engine, &["LRANGE", "l", "0", "-1"]).unwrap(),
        Reply::Array(vec![bulk("b"), bulk("a"), bulk("c")])
    );
    assert_eq!(run(&engine, &["LINDEX", "l", "-1"]).unwrap(), bulk("c"));
    assert_eq!(run(&engine, &["LINDEX", "l", "10"]).unwrap(), Reply::Nil);
    assert_eq!(run(&engine, &["LINDEX", "none", "0"]).unwrap(), Reply::Nil);
    assert_eq!(run(&engine, &["LSET", "l", "0", "B"]).unwrap(), Reply::ok());
    assert_eq!(run(&engine, &["LREM", "l", "0", "a"]).unwrap(), Reply::Integer(1));
    assert_eq!(run(&engine, &["LPOP", "l"]).unwrap(), bulk("B"));
    assert_eq!(run(&engine, &["RPOP", "l"]).unwrap(), bulk("c"));
    assert_eq!(run(&engine, &["LPOP", "l"]).unwrap(), Reply::Nil);
    assert_eq!(
        run(&engine, &["LRANGE", "l", "0", "-1"]).unwrap(),
        Reply::Array(Vec::new())
    );
}

#[test]
fn test_execute_lset_errors() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    let err = run(&engine, &["LSET", "none", "0", "x"]).unwrap_err();
    assert!(matches!(err, BlinkError::NotFound));
    assert_eq!(Reply::from_error(&err), Reply::Error("ERR no such key".into()));

    run(&engine, &["RPUSH", "l", "a"]).unwrap();
    let err = run(&engine, &["LSET", "l", "5", "x"]).unwrap_err();
    assert_eq!(
        Reply::from_error(&err),
        Reply::Error("ERR index out of range".into())
    );
}

#[test]
fn test_execute_set_replies() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    assert_eq!(run(&engine, &["SADD", "s", "b", "a", "b"]).unwrap(), Reply::Integer(2));
    assert_eq!(run(&engine, &["SCARD", "s"]).unwrap(), Reply::Integer(2));
    assert_eq!(run(&engine, &["SISMEMBER", "s", "a"]).unwrap(), Reply::Integer(1));
    assert_eq!(run(&engine, &["SISMEMBER", "s", "z"]).unwrap(), Reply::Integer(0));
    assert_eq!(
        run(&engine, &["SMEMBERS", "s"]).unwrap(),
        Reply::Array(vec![bulk("a"), bulk("b")])
    );
    assert_eq!(run(&engine, &["SREM", "s", "a", "z"]).unwrap(), Reply::Integer(1));
}

#[test]
fn test_execute_limit_error_text() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .list_element_limit(1)
        .build();
    let engine = Engine::open(config).unwrap();

    run(&engine, &["RPUSH", "l", "a"]).unwrap();
    let err = run(&engine, &["RPUSH", "l", "b"]).unwrap_err();
    assert_eq!(
        Reply::from_error(&err),
        Reply::Error("ERR Maximum element size limited: 1".into())
    );
}
