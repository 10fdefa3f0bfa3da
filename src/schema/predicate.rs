use serde::{Deserialize, Serialize};

use super::feature::FeatureType;

/// Handle to a predicate inside a `PredicateCatalog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PredicateId(pub usize);

/// Labels the engine attaches behavior to. Catalog entries with other
/// labels are still generated, just without filter or propagation rules.
pub mod labels {
    pub const RESIDENT: &str = "resident";
    pub const RESIDENCE: &str = "residence";
    pub const RULER: &str = "ruler";
    pub const RULES: &str = "rules";
    pub const PARTNER: &str = "partner";
    pub const PARENT: &str = "parent";
    pub const CHILD: &str = "child";
    pub const SIBLING: &str = "sibling";
    pub const KILLER: &str = "killer";
    pub const KILLED: &str = "killed";
    pub const TRADES: &str = "trades";
    pub const RIVAL: &str = "rival";
}

/// One directed relation kind, as loaded from the predicate table.
///
/// The label names what the subject *is* to the object: an NPC holding
/// `parent` is the parent of the object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub id: PredicateId,
    pub subject_type: FeatureType,
    pub label: String,
    pub object_type: FeatureType,
    pub bidirectional: bool,
    pub weight: u32,
    pub opposite_label: String,
    /// Resolved during the second load pass; bidirectional predicates
    /// point at themselves.
    pub opposite: PredicateId,
}

/// Resolves predicate handles to their labels.
pub trait PredicateLookup {
    fn label(&self, id: PredicateId) -> Option<&str>;
}
