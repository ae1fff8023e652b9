//! # Protocol Vocabulary
//!
//! The relation and class identifiers the engine reads and writes.
//!
//! These are protocol constants shared with every other client of the store.
//! Only the namespace is configurable; local names are fixed.

use crate::{Direction, ModuleId, ParcelId, SystemId};

/// Default FlexConveyor ontology namespace.
pub const DEFAULT_NAMESPACE: &str = "https://www.sfb1574.kit.edu/ontologies/FlexConveyor#";

/// `rdf:type`.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// `owl:NamedIndividual`.
pub const OWL_NAMED_INDIVIDUAL: &str = "http://www.w3.org/2002/07/owl#NamedIndividual";

/// Local name prefix of minted parcel identifiers (`parcel1`, `parcel2`, ...).
pub const PARCEL_LOCAL_PREFIX: &str = "parcel";

/// Relation and class identifiers under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    namespace: String,
    contains_module: String,
    connections: [String; 4],
    has_possession: String,
    is_possessed_by: String,
    has_destination: String,
    parcel_class: String,
    module_class: String,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }
}

impl Vocabulary {
    /// Build the vocabulary under the given namespace.
    ///
    /// The namespace is used verbatim as a prefix, so it should end in
    /// `#` or `/`.
    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let term = |local: &str| format!("{namespace}{local}");
        Self {
            contains_module: term("containsFlexConveyorModule"),
            connections: [
                term("hasNorthConnection"),
                term("hasEastConnection"),
                term("hasSouthConnection"),
                term("hasWestConnection"),
            ],
            has_possession: term("hasPossession"),
            is_possessed_by: term("isPossessedBy"),
            has_destination: term("hasDestination"),
            parcel_class: term("Parcel"),
            module_class: term("FlexConveyorModule"),
            namespace,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// system → module containment.
    #[must_use]
    pub fn contains_module(&self) -> &str {
        &self.contains_module
    }

    /// module → module connection in the given direction.
    #[must_use]
    pub fn connection(&self, direction: Direction) -> &str {
        &self.connections[direction.index()]
    }

    /// module → parcel possession.
    #[must_use]
    pub fn has_possession(&self) -> &str {
        &self.has_possession
    }

    /// parcel → module possession (inverse of `has_possession`).
    #[must_use]
    pub fn is_possessed_by(&self) -> &str {
        &self.is_possessed_by
    }

    /// parcel → module destination.
    #[must_use]
    pub fn has_destination(&self) -> &str {
        &self.has_destination
    }

    /// Class tag of parcels.
    #[must_use]
    pub fn parcel_class(&self) -> &str {
        &self.parcel_class
    }

    /// Class tag of modules.
    #[must_use]
    pub fn module_class(&self) -> &str {
        &self.module_class
    }

    /// Mint the parcel identifier with the given ordinal.
    #[must_use]
    pub fn parcel_iri(&self, ordinal: u64) -> ParcelId {
        ParcelId(format!("{}{PARCEL_LOCAL_PREFIX}{ordinal}", self.namespace))
    }

    /// Recover the ordinal of a parcel identifier minted by `parcel_iri`.
    ///
    /// Returns `None` for identifiers minted elsewhere.
    #[must_use]
    pub fn parcel_ordinal(&self, parcel: &ParcelId) -> Option<u64> {
        parcel
            .as_str()
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix(PARCEL_LOCAL_PREFIX)?
            .parse()
            .ok()
    }

    /// Turn an operator-typed name into a full identifier.
    ///
    /// Absolute identifiers (`scheme:...`) pass through unchanged; bare local
    /// names are placed in the namespace.
    #[must_use]
    pub fn expand(&self, name: &str) -> String {
        if is_absolute(name) {
            name.to_string()
        } else {
            format!("{}{name}", self.namespace)
        }
    }

    #[must_use]
    pub fn module(&self, name: &str) -> ModuleId {
        ModuleId(self.expand(name))
    }

    #[must_use]
    pub fn system(&self, name: &str) -> SystemId {
        SystemId(self.expand(name))
    }

    #[must_use]
    pub fn parcel(&self, name: &str) -> ParcelId {
        ParcelId(self.expand(name))
    }
}

/// `scheme:rest` where scheme is an ASCII letter followed by letters,
/// digits, `+`, `-` or `.`.
fn is_absolute(name: &str) -> bool {
    let Some((scheme, _)) = name.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_namespace_terms() {
        let vocab = Vocabulary::default();
        assert_eq!(
            vocab.connection(Direction::East),
            "https://www.sfb1574.kit.edu/ontologies/FlexConveyor#hasEastConnection"
        );
        assert_eq!(
            vocab.has_possession(),
            "https://www.sfb1574.kit.edu/ontologies/FlexConveyor#hasPossession"
        );
    }

    #[test]
    fn parcel_ordinal_inverts_minting() {
        let vocab = Vocabulary::default();
        let parcel = vocab.parcel_iri(42);
        assert_eq!(parcel.short(), "parcel42");
        assert_eq!(vocab.parcel_ordinal(&parcel), Some(42));
        assert_eq!(vocab.parcel_ordinal(&ParcelId::new("urn:x:parcel7")), None);
    }

    #[test]
    fn expand_leaves_absolute_identifiers_alone() {
        let vocab = Vocabulary::with_namespace("http://plant.example/ns#");
        assert_eq!(vocab.expand("module1"), "http://plant.example/ns#module1");
        assert_eq!(
            vocab.expand("http://other.example/m#module1"),
            "http://other.example/m#module1"
        );
        assert_eq!(vocab.expand("urn:plant:module1"), "urn:plant:module1");
    }
}
