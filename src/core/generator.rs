//! Relationship generator: picks a predicate for a subject and searches
//! the world for a compatible object.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::trace;

use crate::core::catalog::PredicateCatalog;
use crate::core::compat::CompatibilityRules;
use crate::core::config::GenerationConfig;
use crate::core::names::NameError;
use crate::core::weighted::choose_weighted;
use crate::schema::feature::FeatureId;
use crate::schema::predicate::PredicateId;
use crate::schema::relationship::{Relationship, RelationshipError, RelationshipId};
use crate::schema::world::World;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// A feature or relationship could not be produced under the current
    /// constraints.
    #[error("generation failure: {0}")]
    Failure(String),
    #[error("relationship error: {0}")]
    Relationship(#[from] RelationshipError),
    /// Propagation failed under strict propagation; the run is aborted.
    #[error("propagation of {relationship:?} failed: {source}")]
    Propagation {
        relationship: RelationshipId,
        source: Box<GenerationError>,
    },
}

impl From<NameError> for GenerationError {
    fn from(err: NameError) -> Self {
        Self::Failure(err.to_string())
    }
}

impl GenerationError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    /// Fatal errors abort the run; everything else is recovered by
    /// skipping the current attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Propagation { .. })
    }
}

pub struct RelationshipGenerator<'a> {
    catalog: &'a PredicateCatalog,
    rules: &'a CompatibilityRules<'a>,
    config: &'a GenerationConfig,
}

impl<'a> RelationshipGenerator<'a> {
    pub fn new(
        catalog: &'a PredicateCatalog,
        rules: &'a CompatibilityRules<'a>,
        config: &'a GenerationConfig,
    ) -> Self {
        Self {
            catalog,
            rules,
            config,
        }
    }

    /// Try to produce one relationship for `subject`.
    ///
    /// Returns `None` when nothing is generated this round: no admissible
    /// predicate, the decline slot won, or the catalog is inconsistent.
    /// A returned relationship is either complete or pending.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        world: &World,
        subject: FeatureId,
        rng: &mut R,
    ) -> Option<Relationship> {
        let feature = world.feature(subject)?;
        let predicates = self
            .rules
            .filter_predicates(feature, self.catalog.for_subject(feature.feature_type()));
        if predicates.is_empty() {
            trace!(?subject, "no admissible predicates");
            return None;
        }

        // More relationships means a heavier decline slot.
        let decline = self
            .config
            .decline_weight
            .saturating_mul(u32::try_from(feature.relationship_count()).unwrap_or(u32::MAX));
        let mut weights: Vec<u32> = predicates.iter().map(|p| p.weight).collect();
        weights.push(decline);

        let choice = choose_weighted(&weights, rng)?;
        let Some(predicate) = predicates.get(choice) else {
            trace!(?subject, "declined");
            return None;
        };
        self.generate_for_predicate(world, subject, predicate.id, rng)
    }

    /// Search for an object of `predicate` for `subject`, skipping the
    /// weighted choice. No compatible object yields a pending relationship.
    pub fn generate_for_predicate<R: Rng + ?Sized>(
        &self,
        world: &World,
        subject: FeatureId,
        predicate: PredicateId,
        rng: &mut R,
    ) -> Option<Relationship> {
        let feature = world.feature(subject)?;
        let predicate = self.catalog.get(predicate)?;
        let opposite = self.catalog.opposite(predicate)?;

        let pool = self.rules.filter_candidates(
            world,
            &opposite.label,
            feature,
            world.features_of_type(predicate.object_type),
        );

        match pool.choose(rng) {
            Some(object) => {
                trace!(?subject, ?object, label = %predicate.label, "complete");
                Relationship::complete(subject, *object, predicate.id, opposite.id).ok()
            }
            None => {
                trace!(?subject, label = %predicate.label, "pending");
                Some(Relationship::pending(
                    subject,
                    predicate.id,
                    opposite.id,
                    self.config.pending_attempts,
                ))
            }
        }
    }
}
