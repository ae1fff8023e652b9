//! # Store Capability
//!
//! The contract between the engine and the graph data store that owns the
//! conveyor topology and every parcel fact.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `store::memory` | In-memory, for tests and embedding |
//! | `RedbStore` | `storage::redb_store` | Embedded, ACID, on-disk |
//! | `SparqlStore` | `flexconveyor` app | Remote RDF4J/GraphDB repository |
//!
//! All methods take `&self`; implementations synchronise internally so one
//! store can be shared by several engine instances, which is how concurrent
//! writers are modelled.

pub mod memory;

pub use memory::MemoryStore;

use crate::{ConveyorError, Triple};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// PATTERNS
// =============================================================================

/// One variable assignment produced by a query.
pub type Bindings = BTreeMap<String, String>;

/// A position in a triple pattern: a fixed identifier or a named variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Iri(String),
    Var(String),
}

impl Term {
    #[must_use]
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// The concrete value of this term under `row`, if it has one.
    fn resolve<'a>(&'a self, row: &'a Bindings) -> Option<&'a str> {
        match self {
            Self::Iri(iri) => Some(iri),
            Self::Var(name) => row.get(name).map(String::as_str),
        }
    }

    /// Unify this term with `value`, extending `row` for unbound variables.
    fn unify(&self, value: &str, row: &mut Bindings) -> bool {
        match self {
            Self::Iri(iri) => iri == value,
            Self::Var(name) => match row.get(name) {
                Some(bound) => bound == value,
                None => {
                    row.insert(name.clone(), value.to_string());
                    true
                }
            },
        }
    }
}

/// A single `subject predicate object` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl TriplePattern {
    #[must_use]
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    fn bind(&self, triple: &Triple, row: &Bindings) -> Option<Bindings> {
        let mut extended = row.clone();
        let matched = self.subject.unify(&triple.subject, &mut extended)
            && self.predicate.unify(&triple.predicate, &mut extended)
            && self.object.unify(&triple.object, &mut extended);
        matched.then_some(extended)
    }
}

/// A conjunction of triple patterns (a basic graph pattern).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphPattern {
    patterns: Vec<TriplePattern>,
}

impl GraphPattern {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern to the conjunction.
    #[must_use]
    pub fn with(mut self, pattern: TriplePattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Shorthand for a one-pattern query.
    #[must_use]
    pub fn single(subject: Term, predicate: Term, object: Term) -> Self {
        Self::new().with(TriplePattern::new(subject, predicate, object))
    }

    #[must_use]
    pub fn patterns(&self) -> &[TriplePattern] {
        &self.patterns
    }
}

/// Evaluate `pattern` against a store exposed as a fact scanner.
///
/// Patterns are joined left to right; each step only scans for facts that
/// match the terms already bound. Result order follows scan order.
pub(crate) fn evaluate<F>(
    pattern: &GraphPattern,
    mut scan: F,
) -> Result<Vec<Bindings>, ConveyorError>
where
    F: FnMut(Option<&str>, Option<&str>, Option<&str>) -> Result<Vec<Triple>, ConveyorError>,
{
    let mut rows = vec![Bindings::new()];
    for step in pattern.patterns() {
        let mut next = Vec::new();
        for row in &rows {
            let facts = scan(
                step.subject.resolve(row),
                step.predicate.resolve(row),
                step.object.resolve(row),
            )?;
            next.extend(facts.iter().filter_map(|fact| step.bind(fact, row)));
        }
        rows = next;
        if rows.is_empty() {
            break;
        }
    }
    Ok(rows)
}

/// Check whether `triple` matches the optional terms.
pub(crate) fn fact_matches(
    triple: &Triple,
    subject: Option<&str>,
    predicate: Option<&str>,
    object: Option<&str>,
) -> bool {
    subject.is_none_or(|s| triple.subject == s)
        && predicate.is_none_or(|p| triple.predicate == p)
        && object.is_none_or(|o| triple.object == o)
}

/// Reject fact lookups that bind nothing.
pub fn require_bound(
    subject: Option<&str>,
    predicate: Option<&str>,
    object: Option<&str>,
) -> Result<(), ConveyorError> {
    if subject.is_none() && predicate.is_none() && object.is_none() {
        return Err(ConveyorError::UnboundPattern);
    }
    Ok(())
}

// =============================================================================
// STORE CLIENT TRAIT
// =============================================================================

/// What a conditioned or unconditioned update changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UpdateReceipt {
    /// Facts removed by the update.
    pub removed: usize,
    /// Facts newly present after the update.
    pub inserted: usize,
}

/// The store capability the engine consumes.
///
/// Every method is a blocking round trip. Timeouts and transport failures
/// are reported as `ConveyorError::Connectivity`.
pub trait StoreClient {
    /// Run a graph pattern query. No match is an empty result, not an error.
    fn query(&self, pattern: &GraphPattern) -> Result<Vec<Bindings>, ConveyorError>;

    /// Fetch the facts matching the bound terms. At least one must be bound.
    fn facts_get(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Result<Vec<Triple>, ConveyorError>;

    /// Insert a batch of facts.
    fn facts_add(&self, triples: &[Triple]) -> Result<(), ConveyorError>;

    /// Delete a batch of facts.
    fn facts_delete(&self, triples: &[Triple]) -> Result<(), ConveyorError>;

    /// Atomically replace `old` with `new`.
    ///
    /// With `check_exist`, fails with `ConveyorError::PreconditionFailed` when
    /// any member of `old` is absent, leaving the store unchanged.
    fn facts_update(
        &self,
        old: &[Triple],
        new: &[Triple],
        check_exist: bool,
    ) -> Result<UpdateReceipt, ConveyorError>;
}

macro_rules! forward_store_client {
    ($($wrapper:ty),+ $(,)?) => {
        $(
            impl<S: StoreClient + ?Sized> StoreClient for $wrapper {
                fn query(&self, pattern: &GraphPattern) -> Result<Vec<Bindings>, ConveyorError> {
                    (**self).query(pattern)
                }

                fn facts_get(
                    &self,
                    subject: Option<&str>,
                    predicate: Option<&str>,
                    object: Option<&str>,
                ) -> Result<Vec<Triple>, ConveyorError> {
                    (**self).facts_get(subject, predicate, object)
                }

                fn facts_add(&self, triples: &[Triple]) -> Result<(), ConveyorError> {
                    (**self).facts_add(triples)
                }

                fn facts_delete(&self, triples: &[Triple]) -> Result<(), ConveyorError> {
                    (**self).facts_delete(triples)
                }

                fn facts_update(
                    &self,
                    old: &[Triple],
                    new: &[Triple],
                    check_exist: bool,
                ) -> Result<UpdateReceipt, ConveyorError> {
                    (**self).facts_update(old, new, check_exist)
                }
            }
        )+
    };
}

forward_store_client!(&S, Box<S>, Arc<S>);

// =============================================================================
// TESTS
// =============================================================================
