//! Post-commit propagation.
//!
//! Committing some relationships implies others: a ruler lives where they
//! rule, a parent of one child is a parent of all its siblings, siblings
//! of siblings are siblings, and a killed ruler no longer rules. Every
//! implied relationship is committed through [`Propagator::link`], which
//! propagates in turn; each step checks for an existing link first, so
//! the recursion stops once the closure is reached.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::core::catalog::PredicateCatalog;
use crate::core::config::GenerationConfig;
use crate::core::generator::GenerationError;
use crate::schema::feature::{Feature, FeatureId};
use crate::schema::predicate::labels;
use crate::schema::relationship::{Relationship, RelationshipError, RelationshipId};
use crate::schema::world::World;

pub struct Propagator<'a> {
    catalog: &'a PredicateCatalog,
    config: &'a GenerationConfig,
}

impl<'a> Propagator<'a> {
    pub fn new(catalog: &'a PredicateCatalog, config: &'a GenerationConfig) -> Self {
        Self { catalog, config }
    }

    /// Commit `relationship` and propagate its consequences.
    ///
    /// A failed propagation leaves the committed relationship in place and
    /// comes back as [`GenerationError::Propagation`]. With
    /// `strict_propagation` unset it is only logged.
    pub fn commit<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        relationship: Relationship,
        rng: &mut R,
    ) -> Result<RelationshipId, GenerationError> {
        let id = world.commit(relationship, self.catalog)?;
        if let Err(err) = self.propagate(world, id, rng) {
            if self.config.strict_propagation {
                return Err(GenerationError::Propagation {
                    relationship: id,
                    source: Box::new(err),
                });
            }
            warn!(relationship = ?id, error = %err, "propagation failed");
        }
        Ok(id)
    }

    /// Apply the rules triggered by committed relationship `id`. Returns the
    /// number of relationships added.
    pub fn propagate<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        id: RelationshipId,
        rng: &mut R,
    ) -> Result<usize, GenerationError> {
        let relationship = world
            .relationship(id)
            .ok_or(RelationshipError::NotFound(id))?;
        let subject = relationship.subject;
        let object = relationship.object.ok_or(RelationshipError::Incomplete)?;
        let predicate_id = relationship
            .subject_predicate
            .ok_or(RelationshipError::Incomplete)?;
        let label = self
            .catalog
            .get(predicate_id)
            .ok_or(RelationshipError::MissingPredicate(predicate_id))?
            .label
            .clone();

        match label.as_str() {
            labels::RULER => self.house_ruler(world, subject, object, rng),
            labels::RULES => self.house_ruler(world, object, subject, rng),
            labels::PARENT => self.after_parent(world, subject, object, rng),
            labels::CHILD => self.after_parent(world, object, subject, rng),
            labels::SIBLING => self.after_sibling(world, subject, object, rng),
            labels::KILLER => self.after_kill(world, object),
            labels::KILLED => self.after_kill(world, subject),
            _ => Ok(0),
        }
    }

    /// Commit `subject --label--> object` and propagate it.
    fn link<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        subject: FeatureId,
        label: &str,
        object: FeatureId,
        rng: &mut R,
    ) -> Result<usize, GenerationError> {
        let predicate = self
            .catalog
            .by_label(label)
            .ok_or_else(|| GenerationError::failure(format!("no predicate '{}'", label)))?;
        let relationship = Relationship::complete(subject, object, predicate.id, predicate.opposite)?;
        let id = world.commit(relationship, self.catalog)?;
        debug!(?subject, ?object, label, "propagated");
        Ok(1 + self.propagate(world, id, rng)?)
    }

    fn feature<'w>(world: &'w World, id: FeatureId) -> Result<&'w Feature, GenerationError> {
        world
            .feature(id)
            .ok_or(GenerationError::Relationship(RelationshipError::MissingFeature(id)))
    }

    fn house_ruler<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        ruler: FeatureId,
        settlement: FeatureId,
        rng: &mut R,
    ) -> Result<usize, GenerationError> {
        match Self::feature(world, ruler)?.first_related(labels::RESIDENCE) {
            Some(home) if home == settlement => Ok(0),
            Some(_) => Err(GenerationError::failure(
                "ruler resides outside the settlement they rule",
            )),
            None => self.link(world, ruler, labels::RESIDENT, settlement, rng),
        }
    }

    fn after_parent<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        parent: FeatureId,
        child: FeatureId,
        rng: &mut R,
    ) -> Result<usize, GenerationError> {
        let child_feature = Self::feature(world, child)?;
        let mut cohort = vec![child];
        cohort.extend(child_feature.related(labels::SIBLING));
        let parents: Vec<FeatureId> = child_feature.related(labels::PARENT).collect();

        // The cohort carries one parent's family name.
        let family_names: Vec<String> = parents
            .iter()
            .filter_map(|id| world.feature(*id))
            .filter_map(Feature::as_npc)
            .filter_map(|npc| npc.family_name.clone())
            .collect();
        if let Some(family_name) = family_names.choose(rng) {
            for member in &cohort {
                world.rename_family(*member, family_name);
            }
        }

        let mut added = 0;
        for sibling in cohort.iter().skip(1) {
            if !Self::feature(world, parent)?.is_linked(labels::CHILD, *sibling) {
                added += self.link(world, parent, labels::PARENT, *sibling, rng)?;
            }
        }

        if let [first, second] = parents.as_slice() {
            let other = if *first == parent { *second } else { *first };
            if rng.gen_bool(self.config.partner_after_parent_probability)
                && self.may_partner(world, parent, other)?
            {
                added += self.link(world, parent, labels::PARTNER, other, rng)?;
            }
        }
        Ok(added)
    }

    fn after_sibling<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        a: FeatureId,
        b: FeatureId,
        rng: &mut R,
    ) -> Result<usize, GenerationError> {
        let side_a = Self::feature(world, a)?;
        let side_b = Self::feature(world, b)?;
        let parents_a: Vec<FeatureId> = side_a.related(labels::PARENT).collect();
        let parents_b: Vec<FeatureId> = side_b.related(labels::PARENT).collect();

        let mut cohort = vec![a];
        for id in side_a
            .related(labels::SIBLING)
            .chain([b])
            .chain(side_b.related(labels::SIBLING))
        {
            if !cohort.contains(&id) {
                cohort.push(id);
            }
        }

        let mut added = 0;
        for (i, first) in cohort.iter().enumerate() {
            for second in &cohort[i + 1..] {
                if !Self::feature(world, *first)?.is_linked(labels::SIBLING, *second) {
                    added += self.link(world, *first, labels::SIBLING, *second, rng)?;
                }
            }
        }

        let mut parents = parents_a.clone();
        for parent in &parents_b {
            if !parents.contains(parent) {
                parents.push(*parent);
            }
        }
        for parent in &parents {
            for member in &cohort {
                if !Self::feature(world, *parent)?.is_linked(labels::CHILD, *member) {
                    added += self.link(world, *parent, labels::PARENT, *member, rng)?;
                }
            }
        }

        // Each side brought one parent: they are now co-parents.
        if let ([left], [right]) = (parents_a.as_slice(), parents_b.as_slice()) {
            if left != right && self.may_partner(world, *left, *right)? {
                added += self.link(world, *left, labels::PARTNER, *right, rng)?;
            }
        }
        Ok(added)
    }

    fn may_partner(&self, world: &World, a: FeatureId, b: FeatureId) -> Result<bool, GenerationError> {
        let first = Self::feature(world, a)?;
        let second = Self::feature(world, b)?;
        Ok(first.is_adult()
            && second.is_adult()
            && !first.has_role(labels::PARTNER)
            && !second.has_role(labels::PARTNER)
            && !world.family_of(first).contains(&b))
    }

    fn after_kill(&self, world: &mut World, victim: FeatureId) -> Result<usize, GenerationError> {
        let feature = world
            .feature_mut(victim)
            .ok_or(RelationshipError::MissingFeature(victim))?;
        if let Some(npc) = feature.as_npc_mut() {
            npc.alive = false;
        }
        let ruled: Vec<RelationshipId> = feature
            .relationships
            .iter()
            .filter(|entry| entry.role == labels::RULES)
            .map(|entry| entry.relationship)
            .collect();
        for id in ruled {
            world.destroy(id)?;
            debug!(?victim, relationship = ?id, "killed ruler deposed");
        }
        Ok(0)
    }
}
