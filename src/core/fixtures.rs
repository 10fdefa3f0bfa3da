//! Hand-built worlds shared by unit tests.

use crate::core::catalog::PredicateCatalog;
use crate::core::tables::GenerationData;
use crate::schema::feature::{Feature, FeatureId, Gender, Npc, Settlement, SizeClass};
use crate::schema::relationship::{Relationship, RelationshipId};
use crate::schema::world::World;

pub struct Fixture {
    pub world: World,
    pub catalog: PredicateCatalog,
    pub data: GenerationData,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            catalog: PredicateCatalog::builtin().unwrap(),
            data: GenerationData::builtin().unwrap(),
        }
    }

    pub fn npc(&mut self, name: &str, race: &str, gender: Gender, age: u32) -> FeatureId {
        let age_group = self
            .data
            .races
            .get(race)
            .and_then(|r| r.age_group_for(age))
            .unwrap();
        let (given, family) = match name.split_once(' ') {
            Some((given, family)) => (given.to_string(), Some(family.to_string())),
            None => (name.to_string(), None),
        };
        self.world.add_feature(Feature::npc(
            FeatureId(0),
            Npc {
                given_name: given,
                family_name: family,
                race: race.to_string(),
                gender,
                age_group,
                age,
                alive: true,
            },
        ))
    }

    pub fn human(&mut self, name: &str, gender: Gender, age: u32) -> FeatureId {
        self.npc(name, "human", gender, age)
    }

    pub fn settlement(&mut self, name: &str, max_residents: usize) -> FeatureId {
        self.world.add_feature(Feature::settlement(
            FeatureId(0),
            Settlement {
                name: name.to_string(),
                settlement_type: "village".to_string(),
                size: SizeClass::Small,
                population: 100,
                max_residents,
            },
        ))
    }

    /// Commit `subject --label--> object` without propagation.
    pub fn link(&mut self, subject: FeatureId, label: &str, object: FeatureId) -> RelationshipId {
        let predicate = self.catalog.by_label(label).unwrap();
        let rel = Relationship::complete(subject, object, predicate.id, predicate.opposite).unwrap();
        self.world.commit(rel, &self.catalog).unwrap()
    }

    pub fn feature(&self, id: FeatureId) -> &Feature {
        self.world.feature(id).unwrap()
    }
}
