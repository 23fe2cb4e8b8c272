//! Pending-operation queue
//!
//! In-memory accumulator of mutations between two `sync()` calls. Nothing
//! here touches storage; the engine guards it with its state mutex.

use std::collections::{BTreeMap, BTreeSet};

use super::entity::CacheEntity;
use crate::data::AccountId;

/// Mutations queued since the last swap
pub struct PendingOperations<E: CacheEntity> {
    /// Group -> records in enqueue order, tagged with a global sequence number
    inserts: BTreeMap<AccountId, Vec<(u64, E::Record)>>,
    removals: BTreeSet<String>,
    group_removals: BTreeSet<AccountId>,
    field_updates: BTreeMap<(String, E::Field), String>,
    /// Keys whose queued removal was cancelled by a later insert
    file_cleanups: BTreeSet<String>,
    next_seq: u64,
}

impl<E: CacheEntity> Default for PendingOperations<E> {
    fn default() -> Self {
        Self {
            inserts: BTreeMap::new(),
            removals: BTreeSet::new(),
            group_removals: BTreeSet::new(),
            field_updates: BTreeMap::new(),
            file_cleanups: BTreeSet::new(),
            next_seq: 0,
        }
    }
}

impl<E: CacheEntity> PendingOperations<E> {
    /// Queue an insert. Duplicate natural keys are resolved by the upsert.
    ///
    /// A queued removal of the same key is cancelled, but the files of the
    /// stored row are still released.
    pub fn insert(&mut self, group: AccountId, record: E::Record) {
        let key = E::natural_key(&record);
        if self.removals.remove(key) {
            self.file_cleanups.insert(key.to_string());
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.inserts.entry(group).or_default().push((seq, record));
    }

    /// Queue removal of one row. Earlier queued inserts and field updates
    /// for the same key are dropped.
    pub fn remove(&mut self, key: String) {
        self.inserts.retain(|_, records| {
            records.retain(|(_, record)| E::natural_key(record) != key);
            !records.is_empty()
        });
        self.field_updates.retain(|(queued, _), _| *queued != key);
        self.file_cleanups.remove(&key);
        self.removals.insert(key);
    }

    /// Queue removal of every row in `group`. Inserts queued earlier for the
    /// group are dropped; inserts queued later survive the purge.
    pub fn remove_group(&mut self, group: AccountId) {
        self.inserts.remove(&group);
        self.group_removals.insert(group);
    }

    /// Queue a single-column update; last value wins per (key, field).
    pub fn update_field(&mut self, key: String, field: E::Field, value: String) {
        self.field_updates.insert((key, field), value);
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.inserts.values().map(Vec::len).sum::<usize>()
            + self.removals.len()
            + self.group_removals.len()
            + self.field_updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach everything queued so far, leaving the queue empty.
    pub fn take(&mut self) -> Snapshot<E> {
        let inserts = std::mem::take(&mut self.inserts);
        let removals = std::mem::take(&mut self.removals);
        let group_removals = std::mem::take(&mut self.group_removals);
        let field_updates = std::mem::take(&mut self.field_updates);
        let file_cleanups = std::mem::take(&mut self.file_cleanups);

        let mut ordered: Vec<(u64, E::Record)> = inserts.into_values().flatten().collect();
        ordered.sort_by_key(|(seq, _)| *seq);

        let mut by_field: BTreeMap<E::Field, Vec<(String, String)>> = BTreeMap::new();
        for ((key, field), value) in field_updates {
            by_field.entry(field).or_default().push((key, value));
        }

        Snapshot {
            group_removals: group_removals.into_iter().collect(),
            removals: removals.into_iter().collect(),
            inserts: ordered.into_iter().map(|(_, record)| record).collect(),
            field_updates: by_field,
            file_cleanups: file_cleanups.into_iter().collect(),
        }
    }
}

/// Exclusively owned copy of the queue, consumed by one write pass
pub struct Snapshot<E: CacheEntity> {
    pub group_removals: Vec<AccountId>,
    pub removals: Vec<String>,
    /// Flattened across groups, in enqueue order
    pub inserts: Vec<E::Record>,
    /// Field -> (natural key, value)
    pub field_updates: BTreeMap<E::Field, Vec<(String, String)>>,
    /// Re-inserted keys whose stored files go before the upsert
    pub file_cleanups: Vec<String>,
}

impl<E: CacheEntity> Snapshot<E> {
    pub fn len(&self) -> usize {
        self.group_removals.len()
            + self.removals.len()
            + self.inserts.len()
            + self.field_updates.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
