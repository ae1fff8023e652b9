//! # redb-backed Fact Store
//!
//! An embedded, on-disk implementation of `StoreClient` using redb.
//!
//! It gives a single-site deployment (or a test) a store with the same
//! atomicity the engine relies on from a remote repository:
//! - ACID write transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! ## Layout
//!
//! Facts are kept twice: in insertion order (`FACTS`, postcard-encoded) so
//! scans return facts in the order they were written, and in an exact-match
//! index (`FACT_INDEX`) for membership checks. A conditioned update checks
//! its preconditions and applies its changes inside one write transaction,
//! which is aborted when a precondition fails.

use crate::store::{
    Bindings, GraphPattern, StoreClient, UpdateReceipt, evaluate, fact_matches, require_bound,
};
use crate::{ConveyorError, Triple};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for facts in insertion order: seq(u64) -> serialized Triple bytes
const FACTS: TableDefinition<u64, &[u8]> = TableDefinition::new("facts");

/// Table for membership: (subject, predicate, object) -> seq
const FACT_INDEX: TableDefinition<(&str, &str, &str), u64> = TableDefinition::new("fact_index");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_SEQ: &str = "next_seq";

fn io_err(e: impl std::fmt::Display) -> ConveyorError {
    ConveyorError::Io(e.to_string())
}

fn index_key(triple: &Triple) -> (&str, &str, &str) {
    (
        triple.subject.as_str(),
        triple.predicate.as_str(),
        triple.object.as_str(),
    )
}

/// A disk-backed fact store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a fact database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConveyorError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(FACTS).map_err(io_err)?;
            let _ = write_txn.open_table(FACT_INDEX).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        Ok(Self { db })
    }

    /// Number of facts held.
    pub fn len(&self) -> Result<u64, ConveyorError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(FACT_INDEX).map_err(io_err)?;
        table.len().map_err(io_err)
    }

    pub fn is_empty(&self) -> Result<bool, ConveyorError> {
        Ok(self.len()? == 0)
    }

    /// Every fact matching the optional terms, in insertion order.
    fn scan(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Result<Vec<Triple>, ConveyorError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(FACTS).map_err(io_err)?;

        let mut matches = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let triple: Triple = postcard::from_bytes(value.value())
                .map_err(|e| ConveyorError::Serialization(e.to_string()))?;
            if fact_matches(&triple, subject, predicate, object) {
                matches.push(triple);
            }
        }
        Ok(matches)
    }

    /// Remove `old` and insert `new` in one write transaction.
    ///
    /// With `check_exist`, the transaction is aborted when any member of
    /// `old` is missing.
    fn apply(
        &self,
        old: &[Triple],
        new: &[Triple],
        check_exist: bool,
    ) -> Result<UpdateReceipt, ConveyorError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let mut missing = Vec::new();

        let receipt = {
            let mut facts = write_txn.open_table(FACTS).map_err(io_err)?;
            let mut index = write_txn.open_table(FACT_INDEX).map_err(io_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;

            if check_exist {
                for triple in old {
                    if index.get(index_key(triple)).map_err(io_err)?.is_none() {
                        missing.push(triple.clone());
                    }
                }
            }

            if missing.is_empty() {
                let mut receipt = UpdateReceipt::default();

                for triple in old {
                    let seq = index
                        .remove(index_key(triple))
                        .map_err(io_err)?
                        .map(|guard| guard.value());
                    if let Some(seq) = seq {
                        facts.remove(seq).map_err(io_err)?;
                        receipt.removed += 1;
                    }
                }

                let mut next_seq = meta
                    .get(NEXT_SEQ)
                    .map_err(io_err)?
                    .map(|v| v.value())
                    .unwrap_or(0);

                for triple in new {
                    if index.get(index_key(triple)).map_err(io_err)?.is_some() {
                        continue;
                    }
                    let bytes = postcard::to_allocvec(triple)
                        .map_err(|e| ConveyorError::Serialization(e.to_string()))?;
                    facts
                        .insert(next_seq, bytes.as_slice())
                        .map_err(io_err)?;
                    index
                        .insert(index_key(triple), next_seq)
                        .map_err(io_err)?;
                    next_seq = next_seq.saturating_add(1);
                    receipt.inserted += 1;
                }

                meta.insert(NEXT_SEQ, next_seq).map_err(io_err)?;
                Some(receipt)
            } else {
                None
            }
        };

        match receipt {
            Some(receipt) => {
                write_txn.commit().map_err(io_err)?;
                Ok(receipt)
            }
            None => {
                write_txn.abort().map_err(io_err)?;
                Err(ConveyorError::PreconditionFailed { missing })
            }
        }
    }
}

impl StoreClient for RedbStore {
    fn query(&self, pattern: &GraphPattern) -> Result<Vec<Bindings>, ConveyorError> {
        evaluate(pattern, |s, p, o| self.scan(s, p, o))
    }

    fn facts_get(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Result<Vec<Triple>, ConveyorError> {
        require_bound(subject, predicate, object)?;
        self.scan(subject, predicate, object)
    }

    fn facts_add(&self, triples: &[Triple]) -> Result<(), ConveyorError> {
        self.apply(&[], triples, false).map(|_| ())
    }

    fn facts_delete(&self, triples: &[Triple]) -> Result<(), ConveyorError> {
        self.apply(triples, &[], false).map(|_| ())
    }

    fn facts_update(
        &self,
        old: &[Triple],
        new: &[Triple],
        check_exist: bool,
    ) -> Result<UpdateReceipt, ConveyorError> {
        self.apply(old, new, check_exist)
    }
}

// =============================================================================
// TESTS
// =============================================================================
