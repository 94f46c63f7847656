//! Tests for metadata actions and record encoding
//!
//! These tests verify:
//! - Each action's effect on a plain record map
//! - Rejected actions leave the map untouched
//! - Block placement: head pushes, tail appends, splits, emptied blocks
//! - Replaying the same actions reproduces identical records
//! - Record and cache key encodings survive a decode

use std::collections::HashMap;

use blinkkv::meta::{
    check_key, decode_cache_key, decode_record, encode_list_block_key, encode_list_meta_key,
    encode_record, encode_set_meta_key, CacheKey, InsertPlan, ListMeta, MetaAction, MetaRecord,
    SetMeta, LIST_BLOCK_SLOTS,
};
use blinkkv::BlinkError;

type Records = HashMap<Vec<u8>, MetaRecord>;

// =============================================================================
// Helper Functions
// =============================================================================

const KEY: &[u8] = b"mylist";

fn list(records: &Records) -> ListMeta {
    records[&encode_list_meta_key(KEY)].as_list().unwrap().clone()
}

fn counts(records: &Records) -> Vec<u64> {
    list(records).blocks().iter().map(|b| b.count).collect()
}

fn apply(records: &mut Records, log: &mut Vec<MetaAction>, action: MetaAction) {
    action.apply(records).unwrap();
    log.push(action);
}

fn alloc(records: &mut Records, log: &mut Vec<MetaAction>) -> u64 {
    let address = list(records).next_area();
    apply(
        records,
        log,
        MetaAction::Alloc {
            key: KEY.to_vec(),
            next_area: address + 1,
        },
    );
    address
}

/// Insert one element at `index` the way a list push does; returns its address
fn insert(records: &mut Records, log: &mut Vec<MetaAction>, index: u64) -> u64 {
    let plan = list(records).plan_insert(index).unwrap();
    let (position, offset) = match plan {
        InsertPlan::Existing { position, offset } => (position, offset),
        InsertPlan::NewBlock { position } => {
            let address = alloc(records, log);
            apply(
                records,
                log,
                MetaAction::InsertBlock {
                    key: KEY.to_vec(),
                    position: position as u64,
                    address,
                },
            );
            (position, 0)
        }
        InsertPlan::Split { position, offset } => {
            let address = alloc(records, log);
            apply(
                records,
                log,
                MetaAction::SplitBlock {
                    key: KEY.to_vec(),
                    position: position as u64,
                    offset: offset as u64,
                    address,
                },
            );
            (position, offset)
        }
    };
    let address = alloc(records, log);
    apply(
        records,
        log,
        MetaAction::InsertSlot {
            key: KEY.to_vec(),
            position: position as u64,
            offset: offset as u64,
            address,
        },
    );
    address
}

fn new_list(limit: u64, block_limit: u64) -> (Records, Vec<MetaAction>) {
    let mut records = Records::new();
    let mut log = Vec::new();
    apply(
        &mut records,
        &mut log,
        MetaAction::Init {
            key: KEY.to_vec(),
            limit,
            block_limit,
        },
    );
    (records, log)
}

// =============================================================================
// List Action Tests
// =============================================================================

#[test]
fn test_init_creates_empty_list() {
    let (records, _) = new_list(100, 10);
    let meta = list(&records);

    assert_eq!(meta.key(), KEY);
    assert_eq!(meta.size(), 0);
    assert_eq!(meta.limit(), 100);
    assert_eq!(meta.block_limit(), 10);
    assert_eq!(meta.next_area(), 1);
    assert!(meta.blocks().is_empty());
}

#[test]
fn test_init_twice_is_corruption() {
    let (mut records, _) = new_list(100, 10);
    let again = MetaAction::Init {
        key: KEY.to_vec(),
        limit: 5,
        block_limit: 5,
    };

    assert!(matches!(again.apply(&mut records), Err(BlinkError::Corruption(_))));
    assert_eq!(list(&records).limit(), 100);
}

#[test]
fn test_alloc_never_moves_backwards() {
    let (mut records, mut log) = new_list(100, 10);
    assert_eq!(alloc(&mut records, &mut log), 1);
    assert_eq!(alloc(&mut records, &mut log), 2);

    let back = MetaAction::Alloc {
        key: KEY.to_vec(),
        next_area: 2,
    };
    assert!(back.apply(&mut records).is_err());
    assert_eq!(list(&records).next_area(), 3);
}

#[test]
fn test_head_pushes_open_new_front_blocks() {
    let (mut records, mut log) = new_list(10_000, 10);
    for _ in 0..300 {
        insert(&mut records, &mut log, 0);
    }

    assert_eq!(counts(&records), vec![44, 256]);
    assert_eq!(list(&records).size(), 300);
    list(&records).check_invariants().unwrap();
}

#[test]
fn test_tail_appends_fill_blocks_in_order() {
    let (mut records, mut log) = new_list(10_000, 10);
    for i in 0..600 {
        insert(&mut records, &mut log, i);
    }

    assert_eq!(counts(&records), vec![256, 256, 88]);
    list(&records).check_invariants().unwrap();
}

#[test]
fn test_insert_into_full_block_middle_splits() {
    let (mut records, mut log) = new_list(10_000, 10);
    let mut addresses = Vec::new();
    for i in 0..LIST_BLOCK_SLOTS as u64 {
        addresses.push(insert(&mut records, &mut log, i));
    }
    assert_eq!(counts(&records), vec![256]);

    let new_address = insert(&mut records, &mut log, 100);
    assert_eq!(counts(&records), vec![101, 156]);

    let meta = list(&records);
    let first = records[&encode_list_block_key(KEY, meta.blocks()[0].address)]
        .as_block()
        .unwrap();
    let second = records[&encode_list_block_key(KEY, meta.blocks()[1].address)]
        .as_block()
        .unwrap();
    assert_eq!(first.slot(99), Some(addresses[99]));
    assert_eq!(first.slot(100), Some(new_address));
    assert_eq!(second.slot(0), Some(addresses[100]));
    meta.check_invariants().unwrap();
}

#[test]
fn test_append_to_full_block_uses_next_block_with_room() {
    let (mut records, mut log) = new_list(10_000, 10);
    for i in 0..300 {
        insert(&mut records, &mut log, i);
    }
    assert_eq!(counts(&records), vec![256, 44]);

    // Index 256 is the boundary between the two blocks
    insert(&mut records, &mut log, 256);
    assert_eq!(counts(&records), vec![256, 45]);
}

#[test]
fn test_remove_slot_drops_emptied_block() {
    let (mut records, mut log) = new_list(10_000, 10);
    for _ in 0..257 {
        insert(&mut records, &mut log, 0);
    }
    assert_eq!(counts(&records), vec![1, 256]);
    let emptied = list(&records).blocks()[0].address;

    MetaAction::RemoveSlot {
        key: KEY.to_vec(),
        position: 0,
        offset: 0,
    }
    .apply(&mut records)
    .unwrap();

    assert_eq!(counts(&records), vec![256]);
    assert_eq!(list(&records).size(), 256);
    assert!(!records.contains_key(&encode_list_block_key(KEY, emptied)));
}

#[test]
fn test_remove_slot_out_of_range_is_rejected() {
    let (mut records, mut log) = new_list(10_000, 10);
    insert(&mut records, &mut log, 0);
    let before = records.clone();

    let bad = MetaAction::RemoveSlot {
        key: KEY.to_vec(),
        position: 0,
        offset: 5,
    };
    assert!(bad.apply(&mut records).is_err());
    assert_eq!(records, before);
}

#[test]
fn test_drop_list_removes_blocks() {
    let (mut records, mut log) = new_list(10_000, 10);
    for _ in 0..600 {
        insert(&mut records, &mut log, 0);
    }
    assert_eq!(records.len(), 4);

    MetaAction::DropList { key: KEY.to_vec() }
        .apply(&mut records)
        .unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_insert_block_beyond_limit_rejected() {
    let (mut records, mut log) = new_list(10_000, 1);
    insert(&mut records, &mut log, 0);
    let address = alloc(&mut records, &mut log);

    let extra = MetaAction::InsertBlock {
        key: KEY.to_vec(),
        position: 0,
        address,
    };
    assert!(matches!(
        extra.apply(&mut records),
        Err(BlinkError::TooManyBlocks { limit: 1 })
    ));
}

// =============================================================================
// Insert Planning Tests
// =============================================================================

#[test]
fn test_plan_insert_limits() {
    let meta = ListMeta::new(KEY.to_vec(), 10, 4);
    assert_eq!(meta.plan_insert(0).unwrap(), InsertPlan::NewBlock { position: 0 });
    assert!(matches!(meta.plan_insert(1), Err(BlinkError::IndexOutOfRange)));

    let full = ListMeta::new(KEY.to_vec(), 0, 4);
    assert!(matches!(
        full.plan_insert(0),
        Err(BlinkError::CapacityExceeded { limit: 0 })
    ));

    let no_blocks = ListMeta::new(KEY.to_vec(), 10, 0);
    assert!(matches!(
        no_blocks.plan_insert(0),
        Err(BlinkError::TooManyBlocks { limit: 0 })
    ));
}

#[test]
fn test_resolve_and_locate() {
    let (mut records, mut log) = new_list(10_000, 10);
    for i in 0..300 {
        insert(&mut records, &mut log, i);
    }
    let meta = list(&records);

    assert_eq!(meta.resolve_index(0), Some(0));
    assert_eq!(meta.resolve_index(-1), Some(299));
    assert_eq!(meta.resolve_index(-300), Some(0));
    assert_eq!(meta.resolve_index(-301), None);
    assert_eq!(meta.resolve_index(300), None);

    assert_eq!(meta.locate(255), Some((0, 255)));
    assert_eq!(meta.locate(256), Some((1, 0)));
    assert_eq!(meta.locate(300), None);
    assert_eq!(meta.locate_insert(256), Some((0, 256)));
    assert_eq!(meta.locate_insert(300), Some((1, 44)));
}

// =============================================================================
// Set Action Tests
// =============================================================================

#[test]
fn test_set_actions() {
    let mut records = Records::new();
    let key = b"myset".to_vec();
    let cache_key = encode_set_meta_key(&key);

    MetaAction::InitSet { key: key.clone() }.apply(&mut records).unwrap();
    assert_eq!(records[&cache_key].as_set().unwrap().card(), 0);

    MetaAction::SetCard {
        key: key.clone(),
        card: 7,
    }
    .apply(&mut records)
    .unwrap();
    assert_eq!(records[&cache_key].as_set().unwrap().card(), 7);

    assert!(MetaAction::InitSet { key: key.clone() }.apply(&mut records).is_err());

    MetaAction::DropSet { key: key.clone() }.apply(&mut records).unwrap();
    assert!(records.is_empty());
    assert!(MetaAction::DropSet { key }.apply(&mut records).is_err());
}

#[test]
fn test_set_card_on_unknown_set_is_corruption() {
    let mut records = Records::new();
    let result = MetaAction::SetCard {
        key: b"nope".to_vec(),
        card: 1,
    }
    .apply(&mut records);

    assert!(matches!(result, Err(BlinkError::Corruption(_))));
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_replay_reproduces_records() {
    let (mut records, mut log) = new_list(10_000, 64);
    let mut seed: u64 = 12345;
    for _ in 0..1500 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let size = list(&records).size();
        insert(&mut records, &mut log, (seed >> 33) % (size + 1));
    }
    list(&records).check_invariants().unwrap();

    let mut replayed = Records::new();
    for action in &log {
        action.apply(&mut replayed).unwrap();
    }
    assert_eq!(replayed, records);
}

#[test]
fn test_reinit_installs_encoded_records() {
    let (mut records, mut log) = new_list(10_000, 16);
    for _ in 0..400 {
        insert(&mut records, &mut log, 0);
    }

    let mut rebuilt = Records::new();
    for (cache_key, record) in &records {
        MetaAction::Reinit {
            cache_key: cache_key.clone(),
            record: encode_record(record),
        }
        .apply(&mut rebuilt)
        .unwrap();
    }
    assert_eq!(rebuilt, records);
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_list_record_is_fixed_size() {
    let (mut records, mut log) = new_list(10_000, 16);
    let empty_len = encode_record(&MetaRecord::List(list(&records))).len();
    for _ in 0..300 {
        insert(&mut records, &mut log, 0);
    }
    let encoded = encode_record(&MetaRecord::List(list(&records)));

    assert_eq!(encoded.len(), empty_len);
    assert_eq!(encoded.len(), 2 + KEY.len() + 40 + 16 * 16 + 2);
    assert!(encoded.ends_with(b"\r\n"));
}

#[test]
fn test_block_record_is_fixed_size() {
    let (mut records, mut log) = new_list(10_000, 16);
    insert(&mut records, &mut log, 0);
    let address = list(&records).blocks()[0].address;
    let block = &records[&encode_list_block_key(KEY, address)];

    assert_eq!(encode_record(block).len(), 1 + LIST_BLOCK_SLOTS * 8);
}

#[test]
fn test_set_record_round_trip() {
    let mut records = Records::new();
    MetaAction::InitSet { key: b"s".to_vec() }.apply(&mut records).unwrap();
    MetaAction::SetCard {
        key: b"s".to_vec(),
        card: 99,
    }
    .apply(&mut records)
    .unwrap();
    let cache_key = encode_set_meta_key(b"s");

    let decoded = decode_record(&cache_key, &encode_record(&records[&cache_key])).unwrap();
    assert_eq!(decoded.as_set().map(SetMeta::card), Some(99));
}

#[test]
fn test_decode_record_rejects_mismatched_key() {
    let (records, _) = new_list(10, 4);
    let encoded = encode_record(&records[&encode_list_meta_key(KEY)]);

    assert!(decode_record(&encode_list_meta_key(b"other"), &encoded).is_err());
    assert!(decode_record(&encode_list_meta_key(KEY), &encoded[..encoded.len() - 1]).is_err());
}

#[test]
fn test_cache_key_decoding() {
    assert_eq!(
        decode_cache_key(&encode_list_meta_key(b"abc")).unwrap(),
        CacheKey::List(b"abc".to_vec())
    );
    assert_eq!(
        decode_cache_key(&encode_list_block_key(b"abc", 42)).unwrap(),
        CacheKey::Block(b"abc".to_vec(), 42)
    );
    assert_eq!(
        decode_cache_key(&encode_set_meta_key(b"abc")).unwrap(),
        CacheKey::Set(b"abc".to_vec())
    );
    assert!(decode_cache_key(b"Xjunk").is_err());
    assert!(decode_cache_key(b"").is_err());
}

#[test]
fn test_check_key_bounds() {
    assert!(check_key(b"k").is_ok());
    assert!(check_key(&[b'k'; 255]).is_ok());
    assert!(matches!(check_key(b""), Err(BlinkError::InvalidCommand(_))));
    assert!(matches!(check_key(&[b'k'; 256]), Err(BlinkError::InvalidCommand(_))));
}
