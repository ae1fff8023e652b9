//! # In-Memory Store
//!
//! A fact set held in memory, in insertion order.
//!
//! Used by tests and by embedders that seed a system from a layout file.
//! Conditioned updates check and apply under a single write lock.

use super::{
    Bindings, GraphPattern, StoreClient, UpdateReceipt, evaluate, fact_matches, require_bound,
};
use crate::{ConveyorError, Triple};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory triple store with set semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    facts: RwLock<Vec<Triple>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given facts (duplicates collapse).
    #[must_use]
    pub fn with_facts(facts: impl IntoIterator<Item = Triple>) -> Self {
        let mut unique: Vec<Triple> = Vec::new();
        for fact in facts {
            if !unique.contains(&fact) {
                unique.push(fact);
            }
        }
        Self {
            facts: RwLock::new(unique),
        }
    }

    /// Number of facts held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Check whether the exact fact is present.
    #[must_use]
    pub fn contains(&self, triple: &Triple) -> bool {
        self.read().contains(triple)
    }

    /// Copy of every fact, in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Triple> {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Triple>> {
        self.facts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Triple>> {
        self.facts.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn scan(
    facts: &[Triple],
    subject: Option<&str>,
    predicate: Option<&str>,
    object: Option<&str>,
) -> Vec<Triple> {
    facts
        .iter()
        .filter(|t| fact_matches(t, subject, predicate, object))
        .cloned()
        .collect()
}

/// Insert facts not yet present, returning how many were new.
fn insert_all(facts: &mut Vec<Triple>, triples: &[Triple]) -> usize {
    let mut inserted = 0;
    for triple in triples {
        if !facts.contains(triple) {
            facts.push(triple.clone());
            inserted += 1;
        }
    }
    inserted
}

/// Remove the given facts, returning how many were present.
fn remove_all(facts: &mut Vec<Triple>, triples: &[Triple]) -> usize {
    let before = facts.len();
    facts.retain(|fact| !triples.contains(fact));
    before - facts.len()
}

impl StoreClient for MemoryStore {
    fn query(&self, pattern: &GraphPattern) -> Result<Vec<Bindings>, ConveyorError> {
        let facts = self.read();
        evaluate(pattern, |s, p, o| Ok(scan(&facts, s, p, o)))
    }

    fn facts_get(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Result<Vec<Triple>, ConveyorError> {
        require_bound(subject, predicate, object)?;
        Ok(scan(&self.read(), subject, predicate, object))
    }

    fn facts_add(&self, triples: &[Triple]) -> Result<(), ConveyorError> {
        insert_all(&mut self.write(), triples);
        Ok(())
    }

    fn facts_delete(&self, triples: &[Triple]) -> Result<(), ConveyorError> {
        remove_all(&mut self.write(), triples);
        Ok(())
    }

    fn facts_update(
        &self,
        old: &[Triple],
        new: &[Triple],
        check_exist: bool,
    ) -> Result<UpdateReceipt, ConveyorError> {
        let mut facts = self.write();
        if check_exist {
            let missing: Vec<Triple> = old
                .iter()
                .filter(|fact| !facts.contains(fact))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(ConveyorError::PreconditionFailed { missing });
            }
        }
        let removed = remove_all(&mut facts, old);
        let inserted = insert_all(&mut facts, new);
        Ok(UpdateReceipt { removed, inserted })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::with_facts([
            Triple::new("m1", "hasPossession", "p1"),
            Triple::new("p1", "isPossessedBy", "m1"),
            Triple::new("p1", "hasDestination", "m3"),
        ])
    }

    #[test]
    fn add_has_set_semantics() {
        let store = store();
        store
            .facts_add(&[Triple::new("m1", "hasPossession", "p1")])
            .expect("add");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn facts_get_filters_by_bound_terms() {
        let store = store();
        let by_subject = store.facts_get(Some("p1"), None, None).expect("get");
        assert_eq!(by_subject.len(), 2);
        let by_object = store.facts_get(None, None, Some("p1")).expect("get");
        assert_eq!(by_object, vec![Triple::new("m1", "hasPossession", "p1")]);
    }

    #[test]
    fn facts_get_requires_a_bound_term() {
        assert!(matches!(
            store().facts_get(None, None, None),
            Err(ConveyorError::UnboundPattern)
        ));
    }

    #[test]
    fn conditioned_update_replaces_facts() {
        let store = store();
        let old = [
            Triple::new("m1", "hasPossession", "p1"),
            Triple::new("p1", "isPossessedBy", "m1"),
        ];
        let new = [
            Triple::new("m2", "hasPossession", "p1"),
            Triple::new("p1", "isPossessedBy", "m2"),
        ];
        let receipt = store.facts_update(&old, &new, true).expect("update");
        assert_eq!(receipt, UpdateReceipt { removed: 2, inserted: 2 });
        assert!(store.contains(&new[0]));
        assert!(!store.contains(&old[0]));
    }

    #[test]
    fn stale_precondition_leaves_store_unchanged() {
        let store = store();
        let before = store.snapshot();
        let old = [
            Triple::new("m1", "hasPossession", "p1"),
            Triple::new("p1", "isPossessedBy", "m9"),
        ];
        let new = [Triple::new("m2", "hasPossession", "p1")];

        let result = store.facts_update(&old, &new, true);
        match result {
            Err(ConveyorError::PreconditionFailed { missing }) => {
                assert_eq!(missing, vec![Triple::new("p1", "isPossessedBy", "m9")]);
            }
            other => unreachable!("expected precondition failure, got {other:?}"),
        }
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn unconditioned_update_ignores_missing_facts() {
        let store = store();
        let receipt = store
            .facts_update(
                &[Triple::new("x", "y", "z")],
                &[Triple::new("a", "b", "c")],
                false,
            )
            .expect("update");
        assert_eq!(receipt, UpdateReceipt { removed: 0, inserted: 1 });
    }
}
