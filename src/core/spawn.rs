//! Feature factory: random NPCs and settlements, plus objects materialized
//! to fit the open end of a pending relationship.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::compat::{age_groups_compatible, CompatibilityRules, MAX_PARENTS};
use crate::core::config::GenerationConfig;
use crate::core::generator::GenerationError;
use crate::core::names::NameGenerator;
use crate::core::tables::{GenerationData, Race};
use crate::core::weighted::choose_weighted;
use crate::schema::feature::{
    AgeGroup, Feature, FeatureId, FeatureType, Gender, Npc, Settlement, SizeClass,
};
use crate::schema::predicate::labels;
use crate::schema::world::World;

/// Chance that a materialized partner shares the subject's race.
const SAME_RACE_PARTNER: f64 = 0.6;
/// Chance that a settlement with size bands is small.
const SMALL_SETTLEMENT: f64 = 0.7;

fn gender_weight(gender: Gender) -> u32 {
    match gender {
        Gender::Female | Gender::Male => 45,
        Gender::NonBinary => 10,
    }
}

fn age_group_weight(group: AgeGroup) -> u32 {
    match group {
        AgeGroup::Child => 15,
        AgeGroup::Adolescent => 10,
        AgeGroup::Adult => 50,
        AgeGroup::Elderly => 25,
    }
}

/// Constraints on a new NPC. Unset fields are drawn at random.
#[derive(Debug, Clone, Default)]
pub struct NpcTemplate {
    pub race: Option<String>,
    pub gender: Option<Gender>,
    pub excluded_genders: Vec<Gender>,
    /// Allowed age groups; `None` allows all of them.
    pub age_groups: Option<Vec<AgeGroup>>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub family_name: Option<String>,
}

impl NpcTemplate {
    /// An adult or elderly NPC of any race.
    pub fn grown() -> Self {
        Self {
            age_groups: Some(vec![AgeGroup::Adult, AgeGroup::Elderly]),
            ..Self::default()
        }
    }
}

pub struct FeatureFactory<'a> {
    data: &'a GenerationData,
    config: &'a GenerationConfig,
    rules: CompatibilityRules<'a>,
    names: NameGenerator<'a>,
}

impl<'a> FeatureFactory<'a> {
    pub fn new(data: &'a GenerationData, config: &'a GenerationConfig) -> Self {
        Self {
            data,
            config,
            rules: CompatibilityRules::new(&data.races, config),
            names: NameGenerator::new(&data.names, config.max_name_attempts),
        }
    }

    /// Create and persist a random NPC.
    pub fn spawn_npc<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        rng: &mut R,
    ) -> Result<FeatureId, GenerationError> {
        let feature = self.npc(world, &NpcTemplate::default(), rng)?;
        Ok(world.add_feature(feature))
    }

    /// Create and persist a random settlement.
    pub fn spawn_settlement<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        rng: &mut R,
    ) -> Result<FeatureId, GenerationError> {
        let feature = self.settlement(world, rng)?;
        Ok(world.add_feature(feature))
    }

    /// Build an NPC matching `template`. The feature is not persisted; its
    /// id is the one `world` will assign next.
    pub fn npc<R: Rng + ?Sized>(
        &self,
        world: &World,
        template: &NpcTemplate,
        rng: &mut R,
    ) -> Result<Feature, GenerationError> {
        let race = match &template.race {
            Some(key) => self
                .data
                .races
                .get(key)
                .ok_or_else(|| GenerationError::failure(format!("unknown race '{}'", key)))?,
            None => self
                .data
                .races
                .races()
                .choose(rng)
                .ok_or_else(|| GenerationError::failure("race table is empty"))?,
        };

        let gender = match template.gender {
            Some(gender) => gender,
            None => {
                let allowed: Vec<Gender> = Gender::ALL
                    .into_iter()
                    .filter(|g| !template.excluded_genders.contains(g))
                    .collect();
                let weights: Vec<u32> = allowed.iter().map(|g| gender_weight(*g)).collect();
                choose_weighted(&weights, rng)
                    .and_then(|index| allowed.get(index).copied())
                    .ok_or_else(|| GenerationError::failure("every gender is excluded"))?
            }
        };

        let (age_group, age) = self.draw_age(race, template, rng)?;
        let (given_name, family_name) =
            self.names
                .npc_name(world, gender, template.family_name.as_deref(), rng)?;

        Ok(Feature::npc(
            world.next_feature_id(),
            Npc {
                given_name,
                family_name,
                race: race.key.clone(),
                gender,
                age_group,
                age,
                alive: true,
            },
        ))
    }

    fn draw_age<R: Rng + ?Sized>(
        &self,
        race: &Race,
        template: &NpcTemplate,
        rng: &mut R,
    ) -> Result<(AgeGroup, u32), GenerationError> {
        let groups = template
            .age_groups
            .as_deref()
            .unwrap_or(&AgeGroup::ALL);
        let min_age = template.min_age.unwrap_or(0);
        let max_age = template.max_age.unwrap_or(u32::MAX);

        let options: Vec<(AgeGroup, u32, u32)> = groups
            .iter()
            .filter_map(|group| {
                let (lower, upper) = race.bounds(*group);
                let lower = lower.max(min_age);
                let upper = upper.min(max_age);
                (lower <= upper).then_some((*group, lower, upper))
            })
            .collect();
        let weights: Vec<u32> = options.iter().map(|(g, _, _)| age_group_weight(*g)).collect();
        let (group, lower, upper) = choose_weighted(&weights, rng)
            .and_then(|index| options.get(index).copied())
            .ok_or_else(|| {
                GenerationError::failure(format!(
                    "no {} age between {} and {}",
                    race.key, min_age, max_age
                ))
            })?;
        Ok((group, rng.gen_range(lower..=upper)))
    }

    /// Build a random settlement. Not persisted.
    pub fn settlement<R: Rng + ?Sized>(
        &self,
        world: &World,
        rng: &mut R,
    ) -> Result<Feature, GenerationError> {
        let kind = self
            .data
            .settlement_types
            .types()
            .choose(rng)
            .ok_or_else(|| GenerationError::failure("settlement type table is empty"))?;

        let (size, population) = if !kind.has_size_bands() {
            (SizeClass::NotApplicable, 0)
        } else if rng.gen_bool(SMALL_SETTLEMENT) {
            (
                SizeClass::Small,
                rng.gen_range(kind.small_lower..=kind.small_upper.max(kind.small_lower)),
            )
        } else {
            (
                SizeClass::Large,
                rng.gen_range(kind.small_upper..=kind.large_upper.max(kind.small_upper)),
            )
        };

        let per_resident = self.config.population_per_resident.max(1);
        let max_residents = usize::try_from(population / per_resident)
            .unwrap_or(usize::MAX)
            .clamp(self.config.min_residents, self.config.max_residents.max(self.config.min_residents));

        Ok(Feature::settlement(
            world.next_feature_id(),
            Settlement {
                name: self.names.settlement_name(world, rng)?,
                settlement_type: kind.key.clone(),
                size,
                population,
                max_residents,
            },
        ))
    }

    /// Build a feature that can take the role `label` opposite `subject`.
    ///
    /// Family roles are shaped by the subject's kin: race, age and family
    /// name follow the cohort. The result is not persisted and still has
    /// to pass the object-side filter.
    pub fn materialize<R: Rng + ?Sized>(
        &self,
        world: &World,
        subject: &Feature,
        label: &str,
        object_type: FeatureType,
        rng: &mut R,
    ) -> Result<Feature, GenerationError> {
        let Some(npc) = subject.as_npc() else {
            return self.generic(world, label, object_type, rng);
        };
        match label {
            labels::PARENT => self.parent_for(world, subject, rng),
            labels::CHILD => self.child_for(world, subject, npc, rng),
            labels::SIBLING => self.sibling_for(world, subject, npc, rng),
            labels::PARTNER => self.partner_for(world, npc, rng),
            _ => self.generic(world, label, object_type, rng),
        }
    }

    fn generic<R: Rng + ?Sized>(
        &self,
        world: &World,
        label: &str,
        object_type: FeatureType,
        rng: &mut R,
    ) -> Result<Feature, GenerationError> {
        match (object_type, label) {
            (FeatureType::Settlement, _) => self.settlement(world, rng),
            (FeatureType::Npc, labels::KILLER | labels::KILLED | labels::RULER) => {
                self.npc(world, &NpcTemplate::grown(), rng)
            }
            (FeatureType::Npc, _) => self.npc(world, &NpcTemplate::default(), rng),
        }
    }

    /// A new parent for `child` and its siblings.
    fn parent_for<R: Rng + ?Sized>(
        &self,
        world: &World,
        child: &Feature,
        rng: &mut R,
    ) -> Result<Feature, GenerationError> {
        let cohort = self.rules.cohort(world, child);
        let cohort_npcs: Vec<&Npc> = cohort.iter().filter_map(|member| member.as_npc()).collect();
        let existing: Vec<&Npc> = self
            .rules
            .cohort_parents(&cohort)
            .into_iter()
            .filter_map(|id| world.feature(id).and_then(Feature::as_npc))
            .collect();
        if existing.len() >= MAX_PARENTS {
            return Err(GenerationError::failure("cohort already has two parents"));
        }

        let mut uncovered: Vec<&str> = Vec::new();
        for npc in &cohort_npcs {
            let race = npc.race.as_str();
            if !uncovered.contains(&race) && !existing.iter().any(|p| p.race == race) {
                uncovered.push(race);
            }
        }
        let race = match (existing.is_empty(), uncovered.as_slice()) {
            (true, _) => uncovered.choose(rng).copied(),
            (false, []) => cohort_npcs.first().map(|npc| npc.race.as_str()),
            (false, [only]) => Some(*only),
            (false, _) => None,
        }
        .ok_or_else(|| GenerationError::failure("no race fits the cohort"))?;

        let excluded_genders = existing
            .iter()
            .filter(|p| !p.gender.is_neutral())
            .map(|p| p.gender)
            .collect();
        let oldest = cohort_npcs.iter().map(|npc| npc.age).max().unwrap_or(0);
        let min_age = oldest.saturating_add(self.data.races.adulthood(race));
        let family_name = cohort_npcs.first().and_then(|npc| npc.family_name.clone());

        let template = NpcTemplate {
            race: Some(race.to_string()),
            excluded_genders,
            age_groups: Some(vec![AgeGroup::Adult, AgeGroup::Elderly]),
            min_age: Some(min_age),
            max_age: Some(min_age.saturating_add(self.config.parent_age_spread)),
            family_name,
            ..NpcTemplate::default()
        };
        self.npc(world, &template, rng)
    }

    /// A new child of `parent`, possibly taking after the parent's partner.
    fn child_for<R: Rng + ?Sized>(
        &self,
        world: &World,
        parent: &Feature,
        npc: &Npc,
        rng: &mut R,
    ) -> Result<Feature, GenerationError> {
        let mut races = vec![npc.race.as_str()];
        if let Some(partner) = parent
            .first_related(labels::PARTNER)
            .and_then(|id| world.feature(id))
            .and_then(Feature::as_npc)
        {
            if partner.race != npc.race {
                races.push(partner.race.as_str());
            }
        }
        let race = races.choose(rng).copied().unwrap_or(npc.race.as_str());

        let max_age = npc
            .age
            .checked_sub(self.data.races.adulthood(&npc.race))
            .ok_or_else(|| GenerationError::failure("parent too young for a child"))?;
        let template = NpcTemplate {
            race: Some(race.to_string()),
            max_age: Some(max_age),
            family_name: npc.family_name.clone(),
            ..NpcTemplate::default()
        };
        self.npc(world, &template, rng)
    }

    /// A new sibling who fits the cohort's ages and parents.
    fn sibling_for<R: Rng + ?Sized>(
        &self,
        world: &World,
        sibling: &Feature,
        npc: &Npc,
        rng: &mut R,
    ) -> Result<Feature, GenerationError> {
        let cohort = self.rules.cohort(world, sibling);
        let cohort_groups: Vec<AgeGroup> = cohort
            .iter()
            .filter_map(|member| member.as_npc())
            .map(|member| member.age_group)
            .collect();
        let age_groups: Vec<AgeGroup> = AgeGroup::ALL
            .into_iter()
            .filter(|group| age_groups_compatible(cohort_groups.iter().copied().chain([*group])))
            .collect();

        let mut max_age = None;
        for id in self.rules.cohort_parents(&cohort) {
            let Some(parent) = world.feature(id).and_then(Feature::as_npc) else {
                continue;
            };
            let limit = parent
                .age
                .checked_sub(self.data.races.adulthood(&parent.race))
                .ok_or_else(|| GenerationError::failure("parent too young for a sibling"))?;
            max_age = Some(max_age.map_or(limit, |current: u32| current.min(limit)));
        }

        let template = NpcTemplate {
            race: Some(npc.race.clone()),
            age_groups: Some(age_groups),
            max_age,
            family_name: npc.family_name.clone(),
            ..NpcTemplate::default()
        };
        self.npc(world, &template, rng)
    }

    fn partner_for<R: Rng + ?Sized>(
        &self,
        world: &World,
        npc: &Npc,
        rng: &mut R,
    ) -> Result<Feature, GenerationError> {
        let race = rng
            .gen_bool(SAME_RACE_PARTNER)
            .then(|| npc.race.clone());
        let template = NpcTemplate {
            race,
            ..NpcTemplate::grown()
        };
        self.npc(world, &template, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::Fixture;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn spawned_npc_age_matches_group() {
        let fx = Fixture::new();
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let mut world = World::new();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..50 {
            let id = factory.spawn_npc(&mut world, &mut rng).unwrap();
            let npc = world.feature(id).unwrap().as_npc().unwrap().clone();
            let race = fx.data.races.get(&npc.race).unwrap();
            assert_eq!(race.age_group_for(npc.age), Some(npc.age_group));
            assert!(npc.alive);
            assert!(npc.family_name.is_some());
        }
        assert_eq!(world.npc_count(), 50);
    }

    #[test]
    fn spawned_names_are_unique() {
        let fx = Fixture::new();
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let mut world = World::new();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..40 {
            factory.spawn_npc(&mut world, &mut rng).unwrap();
        }
        for _ in 0..10 {
            factory.spawn_settlement(&mut world, &mut rng).unwrap();
        }
        let mut names: Vec<String> = world.features().map(Feature::name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 50);
    }

    #[test]
    fn settlement_capacity_follows_population() {
        let fx = Fixture::new();
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let world = World::new();
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..40 {
            let feature = factory.settlement(&world, &mut rng).unwrap();
            let settlement = feature.as_settlement().unwrap();
            let kind = fx.data.settlement_types.get(&settlement.settlement_type).unwrap();
            if kind.has_size_bands() {
                assert_ne!(settlement.size, SizeClass::NotApplicable);
                assert!(settlement.population >= kind.small_lower);
                assert!(settlement.population <= kind.large_upper);
            } else {
                assert_eq!(settlement.size, SizeClass::NotApplicable);
            }
            assert!(settlement.max_residents >= config.min_residents);
            assert!(settlement.max_residents <= config.max_residents);
        }
    }

    #[test]
    fn default_settlements_have_room_for_households() {
        let fx = Fixture::new();
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let world = World::new();
        let mut rng = StdRng::seed_from_u64(8);

        let capacities: Vec<usize> = (0..40)
            .map(|_| {
                let feature = factory.settlement(&world, &mut rng).unwrap();
                feature.as_settlement().unwrap().max_residents
            })
            .collect();
        assert!(capacities.iter().all(|capacity| *capacity >= 4));
        assert!(capacities.iter().sum::<usize>() >= 6 * capacities.len());
    }

    #[test]
    fn template_restricts_gender_and_age() {
        let fx = Fixture::new();
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let world = World::new();
        let mut rng = StdRng::seed_from_u64(8);
        let template = NpcTemplate {
            race: Some("dwarf".to_string()),
            excluded_genders: vec![Gender::Female, Gender::NonBinary],
            min_age: Some(100),
            max_age: Some(120),
            ..NpcTemplate::default()
        };
        for _ in 0..20 {
            let feature = factory.npc(&world, &template, &mut rng).unwrap();
            let npc = feature.as_npc().unwrap();
            assert_eq!(npc.gender, Gender::Male);
            assert_eq!(npc.race, "dwarf");
            assert!((100..=120).contains(&npc.age));
        }
    }

    #[test]
    fn impossible_template_fails() {
        let fx = Fixture::new();
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let mut rng = StdRng::seed_from_u64(8);
        let template = NpcTemplate {
            race: Some("orc".to_string()),
            min_age: Some(500),
            ..NpcTemplate::default()
        };
        assert!(matches!(
            factory.npc(&World::new(), &template, &mut rng),
            Err(GenerationError::Failure(_))
        ));
    }

    #[test]
    fn materialized_parent_fits_the_child() {
        let mut fx = Fixture::new();
        let child = fx.npc("Ivo Thorne", "elf", Gender::Male, 30);
        let mother = fx.npc("Edda Greaves", "human", Gender::Female, 75);
        fx.link(mother, labels::PARENT, child);
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let rules = CompatibilityRules::new(&fx.data.races, &config);
        let mut rng = StdRng::seed_from_u64(21);

        for _ in 0..20 {
            let parent = factory
                .materialize(&fx.world, fx.feature(child), labels::PARENT, FeatureType::Npc, &mut rng)
                .unwrap();
            let npc = parent.as_npc().unwrap();
            assert_eq!(npc.race, "elf");
            assert_ne!(npc.gender, Gender::Female);
            assert_eq!(npc.family_name.as_deref(), Some("Thorne"));
            assert!(rules.object_allows(&fx.world, labels::PARENT, fx.feature(child), &parent));
        }
    }

    #[test]
    fn materialized_child_is_young_enough() {
        let mut fx = Fixture::new();
        let parent = fx.human("Edda Thorne", Gender::Female, 40);
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let rules = CompatibilityRules::new(&fx.data.races, &config);
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..20 {
            let child = factory
                .materialize(&fx.world, fx.feature(parent), labels::CHILD, FeatureType::Npc, &mut rng)
                .unwrap();
            let npc = child.as_npc().unwrap();
            assert!(npc.age <= 22);
            assert_eq!(npc.family_name.as_deref(), Some("Thorne"));
            assert!(rules.object_allows(&fx.world, labels::CHILD, fx.feature(parent), &child));
        }
    }

    #[test]
    fn materialized_sibling_joins_the_cohort() {
        let mut fx = Fixture::new();
        let kid = fx.human("Ivo Thorne", Gender::Male, 9);
        let mother = fx.human("Edda Thorne", Gender::Female, 35);
        fx.link(mother, labels::PARENT, kid);
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let rules = CompatibilityRules::new(&fx.data.races, &config);
        let mut rng = StdRng::seed_from_u64(4);

        for _ in 0..20 {
            let sibling = factory
                .materialize(&fx.world, fx.feature(kid), labels::SIBLING, FeatureType::Npc, &mut rng)
                .unwrap();
            let npc = sibling.as_npc().unwrap();
            assert!(npc.age <= 17);
            assert!(!npc.age_group.is_grown());
            assert!(rules.object_allows(&fx.world, labels::SIBLING, fx.feature(kid), &sibling));
        }
    }

    #[test]
    fn settlement_roles_materialize_settlements() {
        let mut fx = Fixture::new();
        let npc = fx.human("Edda Thorne", Gender::Female, 35);
        let config = GenerationConfig::default();
        let factory = FeatureFactory::new(&fx.data, &config);
        let mut rng = StdRng::seed_from_u64(4);
        let home = factory
            .materialize(&fx.world, fx.feature(npc), labels::RESIDENCE, FeatureType::Settlement, &mut rng)
            .unwrap();
        assert_eq!(home.feature_type(), FeatureType::Settlement);
        assert_eq!(home.id, fx.world.next_feature_id());
    }
}
