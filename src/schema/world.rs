//! The world arena: every feature ever created plus the committed and
//! pending relationship registries.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

use super::feature::{Feature, FeatureId, FeatureType, Gender, RelationshipEntry};
use super::predicate::{labels, PredicateLookup};
use super::relationship::{Relationship, RelationshipError, RelationshipId};

/// Coverage and size figures used by the stopping criteria.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldStats {
    pub npcs: usize,
    pub settlements: usize,
    pub relationships: usize,
    pub pending: usize,
    /// Fraction of NPCs with a residence.
    pub residence_coverage: f64,
    /// Fraction of NPCs whose household (blood family, partner, self)
    /// has more than two members.
    pub family_coverage: f64,
    pub ruled_settlements: usize,
}

impl WorldStats {
    pub fn all_settlements_ruled(&self) -> bool {
        self.ruled_settlements == self.settlements
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    features: Vec<Feature>,
    relationships: BTreeMap<RelationshipId, Relationship>,
    pending: Vec<Relationship>,
    next_relationship: u64,
    names: FxHashMap<String, u32>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    // --- features ---

    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(id.0)
    }

    pub fn feature_mut(&mut self, id: FeatureId) -> Option<&mut Feature> {
        self.features.get_mut(id.0)
    }

    /// All features in creation order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn feature_ids(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.features.iter().map(|feature| feature.id)
    }

    pub fn features_of_type(&self, feature_type: FeatureType) -> impl Iterator<Item = &Feature> {
        self.features
            .iter()
            .filter(move |feature| feature.feature_type() == feature_type)
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn npc_count(&self) -> usize {
        self.features_of_type(FeatureType::Npc).count()
    }

    pub fn settlement_count(&self) -> usize {
        self.features_of_type(FeatureType::Settlement).count()
    }

    /// The id the next added feature will receive.
    pub fn next_feature_id(&self) -> FeatureId {
        FeatureId(self.features.len())
    }

    /// Persist a feature. Its id is reassigned to its arena slot.
    pub fn add_feature(&mut self, mut feature: Feature) -> FeatureId {
        let id = self.next_feature_id();
        feature.id = id;
        *self.names.entry(feature.name()).or_insert(0) += 1;
        self.features.push(feature);
        id
    }

    pub fn name_in_use(&self, name: &str) -> bool {
        self.names.get(name).is_some_and(|count| *count > 0)
    }

    /// Change an NPC's family name, keeping the name index current.
    ///
    /// A child taking a parent's name may end up sharing a full name with
    /// another NPC. The index counts holders, so the name stays in use until
    /// the last of them gives it up.
    pub fn rename_family(&mut self, id: FeatureId, family_name: &str) {
        let Some(feature) = self.features.get_mut(id.0) else {
            return;
        };
        let old_name = feature.name();
        let Some(npc) = feature.as_npc_mut() else {
            return;
        };
        if npc.family_name.as_deref() == Some(family_name) {
            return;
        }
        npc.family_name = Some(family_name.to_string());
        let new_name = npc.full_name();
        if let Some(count) = self.names.get_mut(&old_name) {
            *count = count.saturating_sub(1);
        }
        *self.names.entry(new_name).or_insert(0) += 1;
    }

    // --- relationships ---

    pub fn relationship(&self, id: RelationshipId) -> Option<&Relationship> {
        self.relationships.get(&id)
    }

    /// Committed relationships in commit order.
    pub fn relationships(&self) -> impl Iterator<Item = (RelationshipId, &Relationship)> {
        self.relationships.iter().map(|(id, rel)| (*id, rel))
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Commit a locked relationship into both endpoints' lists.
    ///
    /// Nothing is mutated unless every check passes.
    pub fn commit(
        &mut self,
        relationship: Relationship,
        predicates: &impl PredicateLookup,
    ) -> Result<RelationshipId, RelationshipError> {
        if !relationship.is_locked() {
            return Err(RelationshipError::Incomplete);
        }
        let subject = relationship.subject;
        let object = relationship.object.ok_or(RelationshipError::Incomplete)?;
        if subject == object {
            return Err(RelationshipError::SelfRelation(subject));
        }
        for id in [subject, object] {
            if self.feature(id).is_none() {
                return Err(RelationshipError::MissingFeature(id));
            }
        }
        let subject_predicate = relationship
            .subject_predicate
            .ok_or(RelationshipError::Incomplete)?;
        let object_predicate = relationship
            .object_predicate
            .ok_or(RelationshipError::Incomplete)?;
        let subject_label = predicates
            .label(subject_predicate)
            .ok_or(RelationshipError::MissingPredicate(subject_predicate))?
            .to_string();
        let object_label = predicates
            .label(object_predicate)
            .ok_or(RelationshipError::MissingPredicate(object_predicate))?
            .to_string();

        let id = RelationshipId(self.next_relationship);
        self.next_relationship += 1;

        // Each side records what the other end is to it.
        self.features[subject.0].relationships.push(RelationshipEntry {
            role: object_label,
            other: object,
            relationship: id,
        });
        self.features[object.0].relationships.push(RelationshipEntry {
            role: subject_label,
            other: subject,
            relationship: id,
        });
        self.relationships.insert(id, relationship);
        Ok(id)
    }

    /// Remove a committed relationship from the registry and from both
    /// endpoints.
    pub fn destroy(&mut self, id: RelationshipId) -> Result<Relationship, RelationshipError> {
        let relationship = self
            .relationships
            .remove(&id)
            .ok_or(RelationshipError::NotFound(id))?;
        let endpoints = [Some(relationship.subject), relationship.object];
        for feature_id in endpoints.into_iter().flatten() {
            if let Some(feature) = self.features.get_mut(feature_id.0) {
                feature.relationships.retain(|entry| entry.relationship != id);
            }
        }
        Ok(relationship)
    }

    // --- pending registry ---

    pub fn pending(&self) -> &[Relationship] {
        &self.pending
    }

    pub fn queue_pending(&mut self, relationship: Relationship) {
        self.pending.push(relationship);
    }

    pub fn take_pending(&mut self) -> Vec<Relationship> {
        std::mem::take(&mut self.pending)
    }

    /// Drop every pending relationship. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    // --- kinship ---

    fn entries_for<'a>(&'a self, origin: &'a Feature, id: FeatureId) -> &'a [RelationshipEntry] {
        if id == origin.id {
            &origin.relationships
        } else {
            self.features
                .get(id.0)
                .map(|feature| feature.relationships.as_slice())
                .unwrap_or(&[])
        }
    }

    /// Blood relatives of `feature`: everything reachable by walking up
    /// through parents and siblings, then back down through children and
    /// siblings. `feature` itself is excluded.
    ///
    /// `feature` need not be in the world yet.
    pub fn family_of(&self, feature: &Feature) -> FxHashSet<FeatureId> {
        let mut roots = FxHashSet::default();
        roots.insert(feature.id);
        let mut stack = vec![feature.id];
        while let Some(id) = stack.pop() {
            for entry in self.entries_for(feature, id) {
                if (entry.role == labels::PARENT || entry.role == labels::SIBLING)
                    && roots.insert(entry.other)
                {
                    stack.push(entry.other);
                }
            }
        }

        let mut family = roots.clone();
        let mut stack: Vec<FeatureId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            for entry in self.entries_for(feature, id) {
                if (entry.role == labels::CHILD || entry.role == labels::SIBLING)
                    && family.insert(entry.other)
                {
                    stack.push(entry.other);
                }
            }
        }

        family.remove(&feature.id);
        family
    }

    pub fn family(&self, id: FeatureId) -> FxHashSet<FeatureId> {
        self.feature(id)
            .map(|feature| self.family_of(feature))
            .unwrap_or_default()
    }

    pub fn are_family(&self, a: FeatureId, b: FeatureId) -> bool {
        self.family(a).contains(&b)
    }

    /// Household size used by the family coverage criterion.
    fn household_size(&self, feature: &Feature) -> usize {
        let mut household = self.family_of(feature);
        household.insert(feature.id);
        household.extend(feature.related(labels::PARTNER));
        household.len()
    }

    // --- presentation ---

    /// Display label for a relationship entry, gendered after the other end.
    pub fn role_label<'a>(&self, entry: &'a RelationshipEntry) -> Cow<'a, str> {
        let gender = self
            .feature(entry.other)
            .and_then(|feature| feature.as_npc())
            .map(|npc| npc.gender);
        let gendered = match (entry.role.as_str(), gender) {
            (labels::PARENT, Some(Gender::Female)) => "mother",
            (labels::PARENT, Some(Gender::Male)) => "father",
            (labels::CHILD, Some(Gender::Female)) => "daughter",
            (labels::CHILD, Some(Gender::Male)) => "son",
            (labels::SIBLING, Some(Gender::Female)) => "sister",
            (labels::SIBLING, Some(Gender::Male)) => "brother",
            (labels::PARTNER, Some(Gender::Female)) => "wife",
            (labels::PARTNER, Some(Gender::Male)) => "husband",
            _ => return Cow::Borrowed(entry.role.as_str()),
        };
        Cow::Borrowed(gendered)
    }

    pub fn stats(&self) -> WorldStats {
        let mut stats = WorldStats {
            relationships: self.relationships.len(),
            pending: self.pending.len(),
            ..WorldStats::default()
        };
        let mut housed = 0usize;
        let mut in_family = 0usize;
        for feature in &self.features {
            match feature.feature_type() {
                FeatureType::Npc => {
                    stats.npcs += 1;
                    if feature.has_role(labels::RESIDENCE) {
                        housed += 1;
                    }
                    if self.household_size(feature) > 2 {
                        in_family += 1;
                    }
                }
                FeatureType::Settlement => {
                    stats.settlements += 1;
                    if feature.has_role(labels::RULER) {
                        stats.ruled_settlements += 1;
                    }
                }
            }
        }
        if stats.npcs > 0 {
            stats.residence_coverage = housed as f64 / stats.npcs as f64;
            stats.family_coverage = in_family as f64 / stats.npcs as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::PredicateCatalog;
    use crate::schema::feature::{AgeGroup, Npc, SizeClass, Settlement};
    use crate::schema::predicate::PredicateId;

    fn npc(world: &mut World, name: &str, gender: Gender, age: u32) -> FeatureId {
        world.add_feature(Feature::npc(
            FeatureId(0),
            Npc {
                given_name: name.to_string(),
                family_name: Some("Thorne".to_string()),
                race: "human".to_string(),
                gender,
                age_group: if age >= 18 { AgeGroup::Adult } else { AgeGroup::Child },
                age,
                alive: true,
            },
        ))
    }

    fn link(world: &mut World, catalog: &PredicateCatalog, subject: FeatureId, label: &str, object: FeatureId) -> RelationshipId {
        let predicate = catalog.by_label(label).unwrap();
        let rel = Relationship::complete(subject, object, predicate.id, predicate.opposite).unwrap();
        world.commit(rel, catalog).unwrap()
    }

    #[test]
    fn commit_records_both_sides() {
        let catalog = PredicateCatalog::builtin().unwrap();
        let mut world = World::new();
        let parent = npc(&mut world, "Bram", Gender::Male, 50);
        let child = npc(&mut world, "Edda", Gender::Female, 20);

        let id = link(&mut world, &catalog, child, labels::CHILD, parent);

        let child_feature = world.feature(child).unwrap();
        let parent_feature = world.feature(parent).unwrap();
        assert!(child_feature.is_linked(labels::PARENT, parent));
        assert!(parent_feature.is_linked(labels::CHILD, child));
        assert_eq!(child_feature.relationships[0].relationship, id);
        assert_eq!(world.relationship_count(), 1);
        assert_eq!(world.role_label(&child_feature.relationships[0]), "father");
        assert_eq!(world.role_label(&parent_feature.relationships[0]), "daughter");
    }

    #[test]
    fn commit_rejects_unlocked_and_missing() {
        let catalog = PredicateCatalog::builtin().unwrap();
        let mut world = World::new();
        let a = npc(&mut world, "Bram", Gender::Male, 50);
        let partner = catalog.by_label(labels::PARTNER).unwrap();

        let pending = Relationship::pending(a, partner.id, partner.id, 3);
        assert!(matches!(world.commit(pending, &catalog), Err(RelationshipError::Incomplete)));

        let dangling = Relationship::complete(a, FeatureId(99), partner.id, partner.id).unwrap();
        assert!(matches!(
            world.commit(dangling, &catalog),
            Err(RelationshipError::MissingFeature(FeatureId(99)))
        ));
        assert!(world.feature(a).unwrap().relationships.is_empty());
    }

    #[test]
    fn destroy_removes_both_entries() {
        let catalog = PredicateCatalog::builtin().unwrap();
        let mut world = World::new();
        let ruler = npc(&mut world, "Bram", Gender::Male, 50);
        let town = world.add_feature(Feature::settlement(
            FeatureId(0),
            Settlement {
                name: "Oakford".to_string(),
                settlement_type: "village".to_string(),
                size: SizeClass::Small,
                population: 120,
                max_residents: 4,
            },
        ));
        let id = link(&mut world, &catalog, ruler, labels::RULER, town);
        assert!(world.feature(town).unwrap().has_role(labels::RULER));

        world.destroy(id).unwrap();
        assert!(world.feature(town).unwrap().relationships.is_empty());
        assert!(world.feature(ruler).unwrap().relationships.is_empty());
        assert!(world.relationship(id).is_none());
        assert!(matches!(world.destroy(id), Err(RelationshipError::NotFound(_))));
    }

    #[test]
    fn family_excludes_co_parents() {
        let catalog = PredicateCatalog::builtin().unwrap();
        let mut world = World::new();
        let mother = npc(&mut world, "Edda", Gender::Female, 45);
        let father = npc(&mut world, "Bram", Gender::Male, 47);
        let child = npc(&mut world, "Ivo", Gender::Male, 10);
        let sibling = npc(&mut world, "Wynne", Gender::Female, 8);
        link(&mut world, &catalog, mother, labels::PARENT, child);
        link(&mut world, &catalog, father, labels::PARENT, child);
        link(&mut world, &catalog, child, labels::SIBLING, sibling);

        assert!(world.are_family(mother, child));
        assert!(world.are_family(child, father));
        assert!(world.are_family(sibling, mother));
        assert!(!world.are_family(mother, father));
        assert!(!world.family(child).contains(&child));
    }

    #[test]
    fn family_reaches_cousins() {
        let catalog = PredicateCatalog::builtin().unwrap();
        let mut world = World::new();
        let grandparent = npc(&mut world, "Osric", Gender::Male, 80);
        let aunt = npc(&mut world, "Hilde", Gender::Female, 50);
        let father = npc(&mut world, "Bram", Gender::Male, 52);
        let cousin = npc(&mut world, "Petra", Gender::Female, 20);
        let me = npc(&mut world, "Ivo", Gender::Male, 22);
        link(&mut world, &catalog, grandparent, labels::PARENT, aunt);
        link(&mut world, &catalog, grandparent, labels::PARENT, father);
        link(&mut world, &catalog, aunt, labels::PARENT, cousin);
        link(&mut world, &catalog, father, labels::PARENT, me);

        assert!(world.are_family(me, cousin));
        assert!(world.are_family(cousin, me));
    }

    #[test]
    fn rename_updates_name_index() {
        let mut world = World::new();
        let id = npc(&mut world, "Edda", Gender::Female, 30);
        assert!(world.name_in_use("Edda Thorne"));
        world.rename_family(id, "Greaves");
        assert!(!world.name_in_use("Edda Thorne"));
        assert!(world.name_in_use("Edda Greaves"));
    }

    #[test]
    fn shared_names_stay_in_use_until_the_last_holder_leaves() {
        let mut world = World::new();
        let first = npc(&mut world, "Edda", Gender::Female, 30);
        let second = npc(&mut world, "Edda", Gender::Female, 12);
        world.rename_family(second, "Greaves");
        world.rename_family(second, "Thorne");
        assert_eq!(world.feature(first).unwrap().name(), world.feature(second).unwrap().name());

        world.rename_family(first, "Ashdown");
        assert!(world.name_in_use("Edda Thorne"));
        world.rename_family(second, "Ashdown");
        assert!(!world.name_in_use("Edda Thorne"));
        assert!(world.name_in_use("Edda Ashdown"));
    }

    struct Labels(Vec<&'static str>);

    impl PredicateLookup for Labels {
        fn label(&self, id: PredicateId) -> Option<&str> {
            self.0.get(id.0).copied()
        }
    }

    #[test]
    fn commit_only_needs_a_label_lookup() {
        let labels_by_id = Labels(vec![labels::PARENT, labels::CHILD]);
        let mut world = World::new();
        let parent = npc(&mut world, "Bram", Gender::Male, 50);
        let child = npc(&mut world, "Edda", Gender::Female, 20);

        let rel = Relationship::complete(parent, child, PredicateId(0), PredicateId(1)).unwrap();
        world.commit(rel, &labels_by_id).unwrap();
        assert!(world.feature(child).unwrap().is_linked(labels::PARENT, parent));
        assert!(world.feature(parent).unwrap().is_linked(labels::CHILD, child));

        let unknown = Relationship::complete(parent, child, PredicateId(0), PredicateId(7)).unwrap();
        assert!(matches!(
            world.commit(unknown, &labels_by_id),
            Err(RelationshipError::MissingPredicate(PredicateId(7)))
        ));
    }

    #[test]
    fn stats_on_empty_world() {
        let stats = World::new().stats();
        assert_eq!(stats.npcs, 0);
        assert_eq!(stats.residence_coverage, 0.0);
        assert!(stats.all_settlements_ruled());
    }
}
