//! Command definitions
//!
//! The command table and the typed commands built from request arguments.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{BlinkError, Result};
use crate::meta::MAX_KEY_LEN;

/// One entry of the command table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Lower-case command name
    pub name: &'static str,
    /// Argument count including the name; negative means "at least -arity"
    pub arity: i32,
    /// First argument is a key subject to the length check
    pub has_key: bool,
}

impl CommandSpec {
    const fn new(name: &'static str, arity: i32, has_key: bool) -> Self {
        Self {
            name,
            arity,
            has_key,
        }
    }

    pub fn accepts(&self, argc: usize) -> bool {
        if self.arity >= 0 {
            argc == self.arity as usize
        } else {
            argc >= self.arity.unsigned_abs() as usize
        }
    }
}

pub static COMMAND_TABLE: &[CommandSpec] = &[
    CommandSpec::new("ping", -1, false),
    CommandSpec::new("quit", -1, false),
    CommandSpec::new("get", 2, true),
    CommandSpec::new("set", -3, true),
    CommandSpec::new("del", -2, true),
    CommandSpec::new("lpush", -3, true),
    CommandSpec::new("lpushx", -3, true),
    CommandSpec::new("rpush", -3, true),
    CommandSpec::new("lpop", 2, true),
    CommandSpec::new("rpop", 2, true),
    CommandSpec::new("lindex", 3, true),
    CommandSpec::new("llen", 2, true),
    CommandSpec::new("lrange", 4, true),
    CommandSpec::new("lset", 4, true),
    CommandSpec::new("lrem", 4, true),
    CommandSpec::new("sadd", -3, true),
    CommandSpec::new("scard", 2, true),
    CommandSpec::new("sismember", 3, true),
    CommandSpec::new("srem", -3, true),
    CommandSpec::new("smembers", 2, true),
];

/// Case-insensitive command table lookup
pub fn lookup_command(name: &[u8]) -> Option<&'static CommandSpec> {
    COMMAND_TABLE
        .iter()
        .find(|spec| spec.name.as_bytes().eq_ignore_ascii_case(name))
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Health check, optionally echoing a message
    Ping { message: Option<Vec<u8>> },

    /// Reply OK and close the connection
    Quit,

    Get { key: Vec<u8> },

    /// Store a scalar, optionally with `EX seconds` / `PX milliseconds`
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },

    Del { keys: Vec<Vec<u8>> },

    LPush { key: Vec<u8>, values: Vec<Vec<u8>> },
    LPushX { key: Vec<u8>, values: Vec<Vec<u8>> },
    RPush { key: Vec<u8>, values: Vec<Vec<u8>> },
    LPop { key: Vec<u8> },
    RPop { key: Vec<u8> },
    LIndex { key: Vec<u8>, index: i64 },
    LLen { key: Vec<u8> },
    LRange { key: Vec<u8>, start: i64, stop: i64 },
    LSet { key: Vec<u8>, index: i64, value: Vec<u8> },
    LRem { key: Vec<u8>, count: i64, value: Vec<u8> },

    SAdd { key: Vec<u8>, members: Vec<Vec<u8>> },
    SCard { key: Vec<u8> },
    SIsMember { key: Vec<u8>, member: Vec<u8> },
    SRem { key: Vec<u8>, members: Vec<Vec<u8>> },
    SMembers { key: Vec<u8> },
}

fn invalid(message: &str) -> BlinkError {
    BlinkError::InvalidCommand(message.to_string())
}

fn parse_int(arg: &[u8]) -> Result<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("value is not an integer or out of range"))
}

impl Command {
    /// Validate request arguments against the command table and build the command
    ///
    /// Unknown names, wrong argument counts and keys outside 1..=255 bytes
    /// are rejected here, before the engine sees anything.
    pub fn parse(argv: Vec<Vec<u8>>) -> Result<Command> {
        let name = argv.first().ok_or_else(|| invalid("empty command"))?;
        let spec = lookup_command(name).ok_or_else(|| {
            BlinkError::InvalidCommand(format!(
                "unknown command: {}",
                String::from_utf8_lossy(name).to_lowercase()
            ))
        })?;
        if !spec.accepts(argv.len()) {
            return Err(invalid("wrong number of arguments"));
        }
        if spec.has_key {
            let key_len = argv[1].len();
            if key_len == 0 || key_len > MAX_KEY_LEN {
                return Err(invalid("invalid key length"));
            }
        }

        let mut args: VecDeque<Vec<u8>> = argv.into_iter().skip(1).collect();

        let command = match spec.name {
            "ping" => Command::Ping {
                message: args.pop_front(),
            },
            "quit" => Command::Quit,
            "get" => Command::Get {
                key: take(&mut args),
            },
            "set" => {
                let key = take(&mut args);
                let value = take(&mut args);
                let ttl = parse_set_options(args)?;
                Command::Set { key, value, ttl }
            }
            "del" => Command::Del {
                keys: args.into_iter().collect(),
            },
            "lpush" => Command::LPush {
                key: take(&mut args),
                values: args.into_iter().collect(),
            },
            "lpushx" => Command::LPushX {
                key: take(&mut args),
                values: args.into_iter().collect(),
            },
            "rpush" => Command::RPush {
                key: take(&mut args),
                values: args.into_iter().collect(),
            },
            "lpop" => Command::LPop {
                key: take(&mut args),
            },
            "rpop" => Command::RPop {
                key: take(&mut args),
            },
            "lindex" => Command::LIndex {
                key: take(&mut args),
                index: parse_int(&take(&mut args))?,
            },
            "llen" => Command::LLen {
                key: take(&mut args),
            },
            "lrange" => Command::LRange {
                key: take(&mut args),
                start: parse_int(&take(&mut args))?,
                stop: parse_int(&take(&mut args))?,
            },
            "lset" => Command::LSet {
                key: take(&mut args),
                index: parse_int(&take(&mut args))?,
                value: take(&mut args),
            },
            "lrem" => Command::LRem {
                key: take(&mut args),
                count: parse_int(&take(&mut args))?,
                value: take(&mut args),
            },
            "sadd" => Command::SAdd {
                key: take(&mut args),
                members: args.into_iter().collect(),
            },
            "scard" => Command::SCard {
                key: take(&mut args),
            },
            "sismember" => Command::SIsMember {
                key: take(&mut args),
                member: take(&mut args),
            },
            "srem" => Command::SRem {
                key: take(&mut args),
                members: args.into_iter().collect(),
            },
            "smembers" => Command::SMembers {
                key: take(&mut args),
            },
            other => {
                return Err(BlinkError::InvalidCommand(format!(
                    "unknown command: {other}"
                )))
            }
        };
        Ok(command)
    }

    /// Lower-case command name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping { .. } => "ping",
            Command::Quit => "quit",
            Command::Get { .. } => "get",
            Command::Set { .. } => "set",
            Command::Del { .. } => "del",
            Command::LPush { .. } => "lpush",
            Command::LPushX { .. } => "lpushx",
            Command::RPush { .. } => "rpush",
            Command::LPop { .. } => "lpop",
            Command::RPop { .. } => "rpop",
            Command::LIndex { .. } => "lindex",
            Command::LLen { .. } => "llen",
            Command::LRange { .. } => "lrange",
            Command::LSet { .. } => "lset",
            Command::LRem { .. } => "lrem",
            Command::SAdd { .. } => "sadd",
            Command::SCard { .. } => "scard",
            Command::SIsMember { .. } => "sismember",
            Command::SRem { .. } => "srem",
            Command::SMembers { .. } => "smembers",
        }
    }
}

/// Next positional argument; arity was checked before parsing
fn take(args: &mut VecDeque<Vec<u8>>) -> Vec<u8> {
    args.pop_front().unwrap_or_default()
}

/// `[EX seconds | PX milliseconds]`
fn parse_set_options(options: VecDeque<Vec<u8>>) -> Result<Option<Duration>> {
    let (option, amount) = match options.len() {
        0 => return Ok(None),
        2 => (&options[0], &options[1]),
        _ => return Err(invalid("syntax error")),
    };
    let amount = parse_int(amount)?;
    if amount <= 0 {
        return Err(invalid("invalid expire time in set"));
    }
    if option.eq_ignore_ascii_case(b"ex") {
        Ok(Some(Duration::from_secs(amount as u64)))
    } else if option.eq_ignore_ascii_case(b"px") {
        Ok(Some(Duration::from_millis(amount as u64)))
    } else {
        Err(invalid("syntax error"))
    }
}
