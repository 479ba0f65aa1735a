//! Record store abstraction and an in-memory implementation.
//!
//! The mapper never checks whether a record already exists. Deduplication is
//! the store's job: every [`RecordStore`] must accept a create with an id it
//! already holds (for that kind) as a no-op, returning
//! [`WriteOutcome::Duplicate`]. Replaying an occurrence therefore leaves
//! exactly one logical record behind.

use std::collections::HashMap;

use alloy::primitives::U256;
use commit_protocol::EventKind;

use crate::error::StoreError;
use crate::record::{Record, RecordId};

/// Result of a successful [`RecordStore::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum WriteOutcome {
    /// The record was new and is now stored.
    Created,
    /// A record with the same id and kind already existed; nothing changed.
    Duplicate,
}

/// A sink for write-once records keyed by explicit id.
pub trait RecordStore {
    /// Persist `record` under `record.id`.
    ///
    /// Precondition for implementors: if a record of the same kind with the
    /// same id is already stored, return [`WriteOutcome::Duplicate`] and leave
    /// the store unchanged. On error, nothing may have been written.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the record cannot be persisted.
    fn create(&mut self, record: Record) -> Result<WriteOutcome, StoreError>;

    /// Whether a record of `kind` with `id` is stored.
    fn contains(&self, kind: EventKind, id: &RecordId) -> bool;

    /// Number of stored records of `kind`.
    fn count(&self, kind: EventKind) -> usize;
}

/// Records held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<Record>,
    index: HashMap<(EventKind, RecordId), usize>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record by kind and id.
    #[must_use]
    pub fn get(&self, kind: EventKind, id: &RecordId) -> Option<&Record> {
        self.index
            .get(&(kind, *id))
            .and_then(|&pos| self.records.get(pos))
    }

    /// All records of `kind`, in insertion order.
    pub fn records(&self, kind: EventKind) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.kind() == kind)
    }

    /// Every record, of any kind, that references commitment `id`.
    pub fn by_commitment(&self, id: U256) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .filter(move |r| r.commitment_id() == Some(id))
    }

    /// Total number of records across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn create(&mut self, record: Record) -> Result<WriteOutcome, StoreError> {
        let key = (record.kind(), record.id);
        if self.index.contains_key(&key) {
            return Ok(WriteOutcome::Duplicate);
        }
        self.index.insert(key, self.records.len());
        self.records.push(record);
        Ok(WriteOutcome::Created)
    }

    fn contains(&self, kind: EventKind, id: &RecordId) -> bool {
        self.index.contains_key(&(kind, *id))
    }

    fn count(&self, kind: EventKind) -> usize {
        self.index.keys().filter(|(k, _)| *k == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256};

    use super::*;
    use crate::record::{
        AccountFields, CommitmentCreatedFields, CommitmentJoinedFields, CommitmentRefFields,
        RecordBody, RewardsClaimedFields,
    };

    fn record(tx: u8, log_index: u64, body: RecordBody) -> Record {
        let hash = B256::repeat_byte(tx);
        Record {
            id: RecordId::new(hash, log_index).expect("id"),
            block_number: 100,
            block_timestamp: 1_700_000_000,
            transaction_hash: hash,
            body,
        }
    }

    fn cancelled(id: u64) -> RecordBody {
        RecordBody::CommitmentCancelled(CommitmentRefFields {
            commitment_id: U256::from(id),
        })
    }

    #[test]
    fn duplicate_create_is_a_no_op() {
        let mut store = MemoryStore::new();
        let first = record(1, 0, cancelled(1));

        assert_eq!(store.create(first.clone()).expect("create"), WriteOutcome::Created, "first");
        assert_eq!(store.create(first.clone()).expect("create"), WriteOutcome::Duplicate, "replay");
        assert_eq!(store.count(EventKind::CommitmentCancelled), 1, "one logical record");
        assert_eq!(
            store.get(EventKind::CommitmentCancelled, &first.id),
            Some(&first),
            "original kept"
        );
    }

    #[test]
    fn same_id_different_kind_is_distinct() {
        let mut store = MemoryStore::new();
        let paused = record(
            1,
            0,
            RecordBody::Paused(AccountFields {
                account: Address::ZERO,
            }),
        );
        let cancelled = record(1, 0, cancelled(1));

        assert_eq!(store.create(paused).expect("create"), WriteOutcome::Created, "paused");
        assert_eq!(store.create(cancelled).expect("create"), WriteOutcome::Created, "cancelled");
        assert_eq!(store.len(), 2, "ids are unique per kind");
    }

    #[test]
    fn by_commitment_crosses_kinds() {
        let mut store = MemoryStore::new();
        let account = Address::repeat_byte(0xaa);
        let bodies = [
            RecordBody::CommitmentCreated(CommitmentCreatedFields {
                commitment_id: U256::from(7),
                creator: account,
                client: Address::ZERO,
                token_address: Address::repeat_byte(0xcc),
                stake_amount: U256::from(100),
                join_fee: U256::ZERO,
                creator_share: 0,
                description: "Read 20 pages".to_owned(),
            }),
            RecordBody::CommitmentJoined(CommitmentJoinedFields {
                commitment_id: U256::from(7),
                participant: account,
            }),
            cancelled(8),
            RecordBody::Paused(AccountFields { account }),
            RecordBody::RewardsClaimed(RewardsClaimedFields {
                commitment_id: U256::from(7),
                user: account,
                token: Address::repeat_byte(0xcc),
                amount: U256::from(100),
            }),
        ];
        for (tx, body) in (1u8..).zip(bodies) {
            let _ = store.create(record(tx, 0, body)).expect("create");
        }

        let kinds: Vec<_> = store.by_commitment(U256::from(7)).map(Record::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::CommitmentCreated,
                EventKind::CommitmentJoined,
                EventKind::RewardsClaimed
            ],
            "every kind referencing commitment 7, in insertion order"
        );
        assert!(
            store.by_commitment(U256::from(7)).all(|r| r.kind() != EventKind::Paused),
            "contract-level records carry no commitment"
        );
    }
}
