//! Key and record encoding for metadata
//!
//! ## Key layout
//! ```text
//! ListMeta      'L' | len u8 | key
//! ListMetaBlock 'B' | len u8 | key | address u64 BE
//! list value    'V' | len u8 | key | address u64 BE
//! SetMeta       'S' | len u8 | key
//! set member    'M' | len u8 | key | member
//! ```
//!
//! ## Record layout (all integers big-endian)
//! ```text
//! ListMeta      'L' | len u8 | key | size | limit | block_count | block_limit
//!               | next_area | block_limit × (address, count) | "\r\n"
//! ListMetaBlock 'B' | LIST_BLOCK_SLOTS × address
//! SetMeta       'S' | len u8 | key | card
//! ```

use bytes::{Buf, BufMut};

use super::list::{BlockPtr, ListMeta, ListMetaBlock};
use super::set::SetMeta;
use super::{MetaRecord, LIST_BLOCK_SLOTS};
use crate::error::{BlinkError, Result};

/// Longest user key the one-byte length prefix can carry
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

const TAG_LIST: u8 = b'L';
const TAG_BLOCK: u8 = b'B';
const TAG_VALUE: u8 = b'V';
const TAG_SET: u8 = b'S';
const TAG_MEMBER: u8 = b'M';

const LIST_TRAILER: &[u8] = b"\r\n";

/// Decoded form of a metadata cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    List(Vec<u8>),
    Block(Vec<u8>, u64),
    Set(Vec<u8>),
}

/// Reject keys the encoding cannot represent
pub fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(BlinkError::InvalidCommand("invalid key length".to_string()));
    }
    Ok(())
}

fn tagged(tag: u8, key: &[u8], extra: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + key.len() + extra);
    buf.put_u8(tag);
    buf.put_u8(key.len() as u8);
    buf.put_slice(key);
    buf
}

pub fn encode_list_meta_key(key: &[u8]) -> Vec<u8> {
    tagged(TAG_LIST, key, 0)
}

pub fn encode_list_block_key(key: &[u8], address: u64) -> Vec<u8> {
    let mut buf = tagged(TAG_BLOCK, key, 8);
    buf.put_u64(address);
    buf
}

pub fn encode_list_value_key(key: &[u8], address: u64) -> Vec<u8> {
    let mut buf = tagged(TAG_VALUE, key, 8);
    buf.put_u64(address);
    buf
}

pub fn encode_set_meta_key(key: &[u8]) -> Vec<u8> {
    tagged(TAG_SET, key, 0)
}

/// Prefix shared by every member record of a set
pub fn set_member_prefix(key: &[u8]) -> Vec<u8> {
    tagged(TAG_MEMBER, key, 0)
}

pub fn encode_set_member_key(key: &[u8], member: &[u8]) -> Vec<u8> {
    let mut buf = tagged(TAG_MEMBER, key, member.len());
    buf.put_slice(member);
    buf
}

fn corrupt<T>(msg: impl Into<String>) -> Result<T> {
    Err(BlinkError::Corruption(msg.into()))
}

/// Read `'T' | len | key` and return the key
fn take_key(buf: &mut &[u8], tag: u8) -> Result<Vec<u8>> {
    if buf.remaining() < 2 {
        return corrupt("truncated key header");
    }
    let found = buf.get_u8();
    if found != tag {
        return corrupt(format!(
            "expected tag '{}', found 0x{found:02x}",
            tag as char
        ));
    }
    let len = buf.get_u8() as usize;
    if len == 0 || buf.remaining() < len {
        return corrupt("truncated key");
    }
    let key = buf[..len].to_vec();
    buf.advance(len);
    Ok(key)
}

pub fn decode_cache_key(raw: &[u8]) -> Result<CacheKey> {
    let mut buf = raw;
    match raw.first() {
        Some(&TAG_LIST) => {
            let key = take_key(&mut buf, TAG_LIST)?;
            if buf.has_remaining() {
                return corrupt("trailing bytes after list key");
            }
            Ok(CacheKey::List(key))
        }
        Some(&TAG_BLOCK) => {
            let key = take_key(&mut buf, TAG_BLOCK)?;
            if buf.remaining() != 8 {
                return corrupt("block key without address");
            }
            Ok(CacheKey::Block(key, buf.get_u64()))
        }
        Some(&TAG_SET) => {
            let key = take_key(&mut buf, TAG_SET)?;
            if buf.has_remaining() {
                return corrupt("trailing bytes after set key");
            }
            Ok(CacheKey::Set(key))
        }
        _ => corrupt("unknown cache key tag"),
    }
}

/// Serialize a record into its fixed layout
pub fn encode_record(record: &MetaRecord) -> Vec<u8> {
    match record {
        MetaRecord::List(meta) => {
            let pointers = meta.block_limit() as usize;
            let mut buf = tagged(TAG_LIST, meta.key(), 40 + pointers * 16 + 2);
            buf.put_u64(meta.size());
            buf.put_u64(meta.limit());
            buf.put_u64(meta.block_count());
            buf.put_u64(meta.block_limit());
            buf.put_u64(meta.next_area());
            for ptr in meta.blocks() {
                buf.put_u64(ptr.address);
                buf.put_u64(ptr.count);
            }
            let padding = pointers.saturating_sub(meta.blocks().len());
            buf.put_bytes(0, padding * 16);
            buf.put_slice(LIST_TRAILER);
            buf
        }
        MetaRecord::Block(block) => {
            let mut buf = Vec::with_capacity(1 + LIST_BLOCK_SLOTS * 8);
            buf.put_u8(TAG_BLOCK);
            for &address in block.slots() {
                buf.put_u64(address);
            }
            buf.put_bytes(0, (LIST_BLOCK_SLOTS - block.len()) * 8);
            buf
        }
        MetaRecord::Set(meta) => {
            let mut buf = tagged(TAG_SET, meta.key(), 8);
            buf.put_u64(meta.card());
            buf
        }
    }
}

/// Parse a record stored under `cache_key`
pub fn decode_record(cache_key: &[u8], raw: &[u8]) -> Result<MetaRecord> {
    match decode_cache_key(cache_key)? {
        CacheKey::List(expected) => decode_list(&expected, raw).map(MetaRecord::List),
        CacheKey::Block(..) => decode_block(raw).map(MetaRecord::Block),
        CacheKey::Set(expected) => {
            let mut buf = raw;
            let key = take_key(&mut buf, TAG_SET)?;
            if key != expected {
                return corrupt("set record key mismatch");
            }
            if buf.remaining() != 8 {
                return corrupt("set record length");
            }
            Ok(MetaRecord::Set(SetMeta::with_card(key, buf.get_u64())))
        }
    }
}

fn decode_list(expected: &[u8], raw: &[u8]) -> Result<ListMeta> {
    let mut buf = raw;
    let key = take_key(&mut buf, TAG_LIST)?;
    if key != expected {
        return corrupt("list record key mismatch");
    }
    if buf.remaining() < 40 {
        return corrupt("truncated list header");
    }
    let size = buf.get_u64();
    let limit = buf.get_u64();
    let block_count = buf.get_u64();
    let block_limit = buf.get_u64();
    let next_area = buf.get_u64();

    if block_count > block_limit {
        return corrupt(format!("block count {block_count} above limit {block_limit}"));
    }
    let expected_len = (block_limit as usize)
        .checked_mul(16)
        .and_then(|n| n.checked_add(LIST_TRAILER.len()));
    if expected_len != Some(buf.remaining()) {
        return corrupt("list record length does not match block limit");
    }

    let mut blocks = Vec::with_capacity(block_count as usize);
    for _ in 0..block_count {
        let address = buf.get_u64();
        let count = buf.get_u64();
        blocks.push(BlockPtr { address, count });
    }
    buf.advance((block_limit - block_count) as usize * 16);
    if buf.chunk() != LIST_TRAILER {
        return corrupt("missing list record trailer");
    }

    let meta = ListMeta::from_parts(key, size, limit, block_limit, next_area, blocks);
    meta.check_invariants()?;
    Ok(meta)
}

fn decode_block(raw: &[u8]) -> Result<ListMetaBlock> {
    let mut buf = raw;
    if buf.remaining() != 1 + LIST_BLOCK_SLOTS * 8 || buf.get_u8() != TAG_BLOCK {
        return corrupt("block record length");
    }
    let mut slots = Vec::new();
    let mut ended = false;
    for _ in 0..LIST_BLOCK_SLOTS {
        let address = buf.get_u64();
        if address == 0 {
            ended = true;
        } else if ended {
            return corrupt("block record has a hole");
        } else {
            slots.push(address);
        }
    }
    Ok(ListMetaBlock::from_slots(slots))
}
