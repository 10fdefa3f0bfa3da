//! Deferred resolution of pending relationships.
//!
//! Each round every pending relationship gets one chance to have its
//! object materialized. Relationships whose subject can no longer hold the
//! predicate are dropped; the rest spend one round of their countdown on
//! every miss and are dropped when it runs out.

use rand::Rng;
use tracing::debug;

use crate::core::catalog::PredicateCatalog;
use crate::core::compat::CompatibilityRules;
use crate::core::config::GenerationConfig;
use crate::core::generator::GenerationError;
use crate::core::propagation::Propagator;
use crate::core::spawn::FeatureFactory;
use crate::schema::feature::FeatureId;
use crate::schema::relationship::Relationship;
use crate::schema::world::World;

/// What one resolver round did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub completed: usize,
    /// Features created to complete relationships, in creation order.
    pub materialized: Vec<FeatureId>,
    pub requeued: usize,
    pub dropped: usize,
}

enum Attempt {
    Completed(FeatureId),
    Retry,
    Drop,
}

pub struct DeferredResolver<'a> {
    catalog: &'a PredicateCatalog,
    rules: &'a CompatibilityRules<'a>,
    factory: &'a FeatureFactory<'a>,
    propagator: &'a Propagator<'a>,
    config: &'a GenerationConfig,
}

impl<'a> DeferredResolver<'a> {
    pub fn new(
        catalog: &'a PredicateCatalog,
        rules: &'a CompatibilityRules<'a>,
        factory: &'a FeatureFactory<'a>,
        propagator: &'a Propagator<'a>,
        config: &'a GenerationConfig,
    ) -> Self {
        Self {
            catalog,
            rules,
            factory,
            propagator,
            config,
        }
    }

    /// Run one round over the pending registry.
    ///
    /// Only fatal errors are returned; the registry may then be left
    /// partially drained.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        rng: &mut R,
    ) -> Result<ResolveReport, GenerationError> {
        let mut report = ResolveReport::default();
        for mut relationship in world.take_pending() {
            let attempt = match self.attempt(world, &relationship, rng) {
                Ok(attempt) => attempt,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(subject = ?relationship.subject, error = %err, "materialization failed");
                    Attempt::Retry
                }
            };
            match attempt {
                Attempt::Completed(object) => {
                    report.completed += 1;
                    report.materialized.push(object);
                }
                Attempt::Drop => report.dropped += 1,
                Attempt::Retry => {
                    if relationship.tick() == 0 {
                        debug!(subject = ?relationship.subject, "pending relationship expired");
                        report.dropped += 1;
                    } else {
                        world.queue_pending(relationship);
                        report.requeued += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    fn attempt<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        relationship: &Relationship,
        rng: &mut R,
    ) -> Result<Attempt, GenerationError> {
        let Some(subject) = world.feature(relationship.subject) else {
            return Ok(Attempt::Drop);
        };
        let (Some(predicate), Some(opposite)) = (
            relationship.subject_predicate.and_then(|id| self.catalog.get(id)),
            relationship.object_predicate.and_then(|id| self.catalog.get(id)),
        ) else {
            return Ok(Attempt::Drop);
        };
        if !self.rules.subject_allows(subject, &predicate.label) {
            return Ok(Attempt::Drop);
        }
        if !rng.gen_bool(self.config.materialize_probability) {
            return Ok(Attempt::Retry);
        }

        let candidate =
            self.factory
                .materialize(world, subject, &opposite.label, predicate.object_type, rng)?;
        if !self
            .rules
            .object_allows(world, &opposite.label, subject, &candidate)
        {
            return Ok(Attempt::Retry);
        }

        let mut resolved = relationship.clone();
        resolved.bind(world.next_feature_id())?;
        resolved.lock()?;
        let object = world.add_feature(candidate);
        self.propagator.commit(world, resolved, rng)?;
        Ok(Attempt::Completed(object))
    }
}
