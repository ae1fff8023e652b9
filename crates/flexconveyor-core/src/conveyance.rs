//! # Conveyance Engine
//!
//! Moves the parcel held by one module to an adjacent module.
//!
//! A move is validated against the adjacency model and the store before
//! anything is written, then sent as one conditioned update that swaps the
//! two possession facts. The update only applies if the old facts are still
//! present, which makes it the synchronization point between concurrent
//! writers: of two moves racing for the same parcel, one fails with
//! `PreconditionFailed` and must resync before deciding again.

use crate::observer::{ConveyorEvent, Observer};
use crate::store::{StoreClient, UpdateReceipt};
use crate::topology::Topology;
use crate::vocabulary::Vocabulary;
use crate::{ConveyorError, Direction, ModuleId, ParcelId, Triple};
use serde::Serialize;
use std::fmt;

/// A completed move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conveyance {
    pub parcel: ParcelId,
    pub from: ModuleId,
    pub to: ModuleId,
    pub direction: Direction,
    /// What the store reported for the update.
    pub receipt: UpdateReceipt,
}

impl fmt::Display for Conveyance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conveying {} into {} direction ({} -> {}).",
            self.parcel.short(),
            self.direction,
            self.from.short(),
            self.to.short()
        )
    }
}

/// The two facts that say `module` holds `parcel`.
fn possession(vocab: &Vocabulary, module: &ModuleId, parcel: &ParcelId) -> [Triple; 2] {
    [
        Triple::new(module.as_str(), vocab.has_possession(), parcel.as_str()),
        Triple::new(parcel.as_str(), vocab.is_possessed_by(), module.as_str()),
    ]
}

/// Move the parcel held by `from` to `to`.
///
/// Checked in order, nothing is written unless all pass:
/// 1. `from` is a module of the topology (`UnknownModule`)
/// 2. the edge `from -> to` exists (`InvalidMove`)
/// 3. `from` holds a parcel (`EmptyModule`)
pub fn convey<S: StoreClient + ?Sized>(
    store: &S,
    topology: &Topology,
    vocab: &Vocabulary,
    from: &ModuleId,
    to: &ModuleId,
    observer: &dyn Observer,
) -> Result<Conveyance, ConveyorError> {
    let result = try_convey(store, topology, vocab, from, to);
    match &result {
        Ok(conveyance) => observer.record(&ConveyorEvent::Conveyed {
            parcel: conveyance.parcel.clone(),
            from: from.clone(),
            to: to.clone(),
            direction: conveyance.direction,
        }),
        Err(e) => observer.record(&ConveyorEvent::ConveyRejected {
            from: from.clone(),
            to: to.clone(),
            reason: e.to_string(),
        }),
    }
    result
}

fn try_convey<S: StoreClient + ?Sized>(
    store: &S,
    topology: &Topology,
    vocab: &Vocabulary,
    from: &ModuleId,
    to: &ModuleId,
) -> Result<Conveyance, ConveyorError> {
    if !topology.contains(from) {
        return Err(ConveyorError::UnknownModule(from.clone()));
    }

    let direction = topology
        .direction_between(from, to)
        .ok_or_else(|| ConveyorError::InvalidMove {
            from: from.clone(),
            to: to.clone(),
        })?;

    let parcel = store
        .facts_get(Some(from.as_str()), Some(vocab.has_possession()), None)?
        .into_iter()
        .next()
        .map(|fact| ParcelId::new(fact.object))
        .ok_or_else(|| ConveyorError::EmptyModule(from.clone()))?;

    let old = possession(vocab, from, &parcel);
    let new = possession(vocab, to, &parcel);
    let receipt = store.facts_update(&old, &new, true)?;

    Ok(Conveyance {
        parcel,
        from: from.clone(),
        to: to.clone(),
        direction,
        receipt,
    })
}

// =============================================================================
// TESTS
// =============================================================================
