//! Set operations
//!
//! Members live in the set keyspace under `'M' | len | key | member`; the
//! SetMeta record keeps the cardinality so SCARD never scans.

use std::collections::HashSet;

use super::Engine;
use crate::error::Result;
use crate::meta::{encode_set_member_key, set_member_prefix, MetaAction, SetMeta};
use crate::wal::Operation;

impl Engine {
    /// Add members; returns how many were not already present
    pub fn sadd(&self, key: &[u8], members: &[Vec<u8>]) -> Result<u64> {
        self.mutate(key, self.storage.set(), |txn, batch| {
            if members.is_empty() {
                return Ok(0);
            }
            let card = match txn.set_meta(key) {
                Some(meta) => meta.card(),
                None => {
                    txn.record(MetaAction::InitSet { key: key.to_vec() })?;
                    0
                }
            };

            let mut seen = HashSet::new();
            let mut added = 0;
            for member in members {
                if !seen.insert(member.as_slice()) {
                    continue;
                }
                let member_key = encode_set_member_key(key, member);
                if card > 0 && self.storage.set().exists(&member_key)? {
                    continue;
                }
                batch.push(Operation::Put {
                    key: member_key,
                    value: Vec::new(),
                    expire_at: 0,
                });
                added += 1;
            }

            if added > 0 {
                txn.record(MetaAction::SetCard {
                    key: key.to_vec(),
                    card: card + added,
                })?;
            }
            Ok(added)
        })
    }

    /// Number of members (0 when absent)
    pub fn scard(&self, key: &[u8]) -> Result<u64> {
        self.inspect(key, |txn| Ok(txn.set_meta(key).map(SetMeta::card).unwrap_or(0)))
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        self.inspect(key, |txn| {
            if txn.set_meta(key).is_none() {
                return Ok(false);
            }
            self.storage.set().exists(&encode_set_member_key(key, member))
        })
    }

    /// Remove members; returns how many were present
    pub fn srem(&self, key: &[u8], members: &[Vec<u8>]) -> Result<u64> {
        self.mutate(key, self.storage.set(), |txn, batch| {
            let card = match txn.set_meta(key) {
                Some(meta) => meta.card(),
                None => return Ok(0),
            };

            let mut seen = HashSet::new();
            let mut removed = 0;
            for member in members {
                if !seen.insert(member.as_slice()) {
                    continue;
                }
                let member_key = encode_set_member_key(key, member);
                if self.storage.set().exists(&member_key)? {
                    batch.push(Operation::Delete { key: member_key });
                    removed += 1;
                }
            }

            if removed == 0 {
                return Ok(0);
            }
            let card = card.saturating_sub(removed);
            let action = if card == 0 {
                MetaAction::DropSet { key: key.to_vec() }
            } else {
                MetaAction::SetCard {
                    key: key.to_vec(),
                    card,
                }
            };
            txn.record(action)?;
            Ok(removed)
        })
    }

    /// All members in byte order
    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.inspect(key, |txn| {
            if txn.set_meta(key).is_none() {
                return Ok(Vec::new());
            }
            let prefix = set_member_prefix(key);
            Ok(self
                .storage
                .set()
                .scan_prefix(&prefix)?
                .into_iter()
                .map(|(member_key, _)| member_key[prefix.len()..].to_vec())
                .collect())
        })
    }
}
