//! # Parcel Lifecycle
//!
//! Creating and deleting parcel records.
//!
//! A parcel exists exactly as long as facts about it exist. Creation writes
//! its type tags, optional destination and both possession facts in one
//! batch; deletion removes every fact that mentions it.
//!
//! ## Identifier minting
//!
//! Parcel identifiers are `{namespace}parcel{n}`. Two strategies exist:
//!
//! | Strategy | Next ordinal | Known limitation |
//! |----------|--------------|------------------|
//! | `SessionCounter` | local counter seeded from the first sync | collides or skips when other writers add or remove parcels |
//! | `StoreMaximum` | largest ordinal in the store + 1 (one extra query per add) | two writers adding at the same time can still pick the same id |
//!
//! Whatever the strategy proposes, an ordinal whose identifier already has
//! facts in the store is skipped, so an add never merges into a live parcel.

use crate::observer::{ConveyorEvent, Observer};
use crate::store::{GraphPattern, StoreClient, Term};
use crate::topology::Topology;
use crate::vocabulary::{OWL_NAMED_INDIVIDUAL, RDF_TYPE, Vocabulary};
use crate::{ConveyorError, ModuleId, ParcelId, Triple};
use serde::{Deserialize, Serialize};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// How new parcel ordinals are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Count up from the number of parcels seen when the engine started.
    #[default]
    SessionCounter,
    /// Ask the store for the highest ordinal before every add.
    StoreMaximum,
}

/// Mints parcel identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParcelCounter {
    strategy: IdStrategy,
    /// Last ordinal handed out (or the seed).
    last: u64,
}

impl ParcelCounter {
    /// Seed the counter with the number of parcels observed at startup.
    #[must_use]
    pub fn seeded(strategy: IdStrategy, observed: usize) -> Self {
        Self {
            strategy,
            last: observed as u64,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> IdStrategy {
        self.strategy
    }

    /// The last ordinal handed out.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.last
    }

    /// The ordinal the next parcel would get. Nothing is reserved.
    pub fn peek<S: StoreClient + ?Sized>(
        &self,
        store: &S,
        vocab: &Vocabulary,
    ) -> Result<u64, ConveyorError> {
        let base = match self.strategy {
            IdStrategy::SessionCounter => self.last,
            IdStrategy::StoreMaximum => highest_ordinal(store, vocab)?,
        };
        Ok(base.saturating_add(1))
    }

    /// Record that `ordinal` was written to the store.
    pub fn commit(&mut self, ordinal: u64) {
        self.last = self.last.max(ordinal);
    }
}

/// Whether any fact names `parcel`, as subject or object.
fn is_live<S: StoreClient + ?Sized>(store: &S, parcel: &ParcelId) -> Result<bool, ConveyorError> {
    Ok(!store.facts_get(Some(parcel.as_str()), None, None)?.is_empty()
        || !store.facts_get(None, None, Some(parcel.as_str()))?.is_empty())
}

/// First ordinal from `proposed` on whose identifier is unused in the store.
fn free_ordinal<S: StoreClient + ?Sized>(
    store: &S,
    vocab: &Vocabulary,
    proposed: u64,
) -> Result<(u64, ParcelId), ConveyorError> {
    let mut ordinal = proposed;
    loop {
        let parcel = vocab.parcel_iri(ordinal);
        if !is_live(store, &parcel)? {
            return Ok((ordinal, parcel));
        }
        ordinal = ordinal.checked_add(1).ok_or_else(|| {
            ConveyorError::InvalidIdentifier("parcel ordinals exhausted".to_string())
        })?;
    }
}

/// The largest ordinal among parcels typed `Parcel` in the store, or 0.
fn highest_ordinal<S: StoreClient + ?Sized>(
    store: &S,
    vocab: &Vocabulary,
) -> Result<u64, ConveyorError> {
    let rows = store.query(&GraphPattern::single(
        Term::var("parcel"),
        Term::iri(RDF_TYPE),
        Term::iri(vocab.parcel_class()),
    ))?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("parcel"))
        .filter_map(|iri| vocab.parcel_ordinal(&ParcelId::new(iri.as_str())))
        .max()
        .unwrap_or(0))
}

// =============================================================================
// ADD / DELETE
// =============================================================================

/// Facts describing a new parcel at `start`.
#[must_use]
pub fn parcel_facts(
    vocab: &Vocabulary,
    parcel: &ParcelId,
    start: &ModuleId,
    destination: Option<&ModuleId>,
) -> Vec<Triple> {
    let p = parcel.as_str();
    let mut facts = vec![
        Triple::new(p, RDF_TYPE, vocab.parcel_class()),
        Triple::new(p, RDF_TYPE, OWL_NAMED_INDIVIDUAL),
    ];
    if let Some(destination) = destination {
        facts.push(Triple::new(p, vocab.has_destination(), destination.as_str()));
    }
    facts.push(Triple::new(p, vocab.is_possessed_by(), start.as_str()));
    facts.push(Triple::new(start.as_str(), vocab.has_possession(), p));
    facts
}

/// Create a parcel at `start`, optionally heading for `destination`.
///
/// Both modules must belong to the topology, and `start` must not already
/// hold a parcel. Ordinals already used in the store are skipped. The
/// counter only advances once the insert succeeded.
pub fn add_parcel<S: StoreClient + ?Sized>(
    store: &S,
    topology: &Topology,
    vocab: &Vocabulary,
    counter: &mut ParcelCounter,
    destination: Option<&ModuleId>,
    start: &ModuleId,
    observer: &dyn Observer,
) -> Result<ParcelId, ConveyorError> {
    if !topology.contains(start) {
        return Err(ConveyorError::UnknownModule(start.clone()));
    }
    if let Some(unknown) = destination.filter(|d| !topology.contains(d)) {
        return Err(ConveyorError::UnknownModule(unknown.clone()));
    }

    let occupant = store
        .facts_get(Some(start.as_str()), Some(vocab.has_possession()), None)?
        .into_iter()
        .next();
    if let Some(fact) = occupant {
        return Err(ConveyorError::ModuleOccupied {
            module: start.clone(),
            parcel: ParcelId::new(fact.object),
        });
    }

    let (ordinal, parcel) = free_ordinal(store, vocab, counter.peek(store, vocab)?)?;
    store.facts_add(&parcel_facts(vocab, &parcel, start, destination))?;
    counter.commit(ordinal);

    observer.record(&ConveyorEvent::ParcelAdded {
        parcel: parcel.clone(),
        start: start.clone(),
        destination: destination.cloned(),
    });
    Ok(parcel)
}

/// Delete every fact mentioning `parcel`, as subject or object.
///
/// Returns the number of facts removed. Fails with `ParcelNotFound`, without
/// touching the store, when no fact mentions the parcel.
pub fn delete_parcel<S: StoreClient + ?Sized>(
    store: &S,
    parcel: &ParcelId,
    observer: &dyn Observer,
) -> Result<usize, ConveyorError> {
    let mut facts = store.facts_get(Some(parcel.as_str()), None, None)?;
    for fact in store.facts_get(None, None, Some(parcel.as_str()))? {
        // A self-referencing fact appears in both lookups.
        if !facts.contains(&fact) {
            facts.push(fact);
        }
    }

    if facts.is_empty() {
        return Err(ConveyorError::ParcelNotFound(parcel.clone()));
    }

    store.facts_delete(&facts)?;
    observer.record(&ConveyorEvent::ParcelDeleted {
        parcel: parcel.clone(),
        facts: facts.len(),
    });
    Ok(facts.len())
}

// =============================================================================
// TESTS
// =============================================================================
