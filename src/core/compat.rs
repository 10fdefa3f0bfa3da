//! Compatibility filter bank.
//!
//! Subject-side rules decide which predicates a feature can currently take
//! on. Object-side rules decide which existing (or freshly materialized)
//! features may fill the other end without breaking a global invariant:
//! single partners and residences, parent and sibling caps, no
//! genealogical loops, consistent race/age/gender across families, and
//! settlement capacity.

use rustc_hash::FxHashSet;

use crate::core::config::GenerationConfig;
use crate::core::tables::RaceTable;
use crate::schema::feature::{AgeGroup, Feature, FeatureId, FeatureKind, Npc};
use crate::schema::predicate::{labels, Predicate};
use crate::schema::world::World;

/// Most parents any NPC can have.
pub const MAX_PARENTS: usize = 2;

/// True if the age groups could all be siblings of one set of parents.
///
/// Order does not matter: a child never sits beside an adult or elderly
/// sibling, and an adolescent never beside an elderly one.
pub fn age_groups_compatible<I>(groups: I) -> bool
where
    I: IntoIterator<Item = AgeGroup>,
{
    let mut seen = FxHashSet::default();
    for group in groups {
        let conflict = match group {
            AgeGroup::Child => {
                seen.contains(&AgeGroup::Adult) || seen.contains(&AgeGroup::Elderly)
            }
            AgeGroup::Adolescent => seen.contains(&AgeGroup::Elderly),
            AgeGroup::Adult => seen.contains(&AgeGroup::Child),
            AgeGroup::Elderly => {
                seen.contains(&AgeGroup::Child) || seen.contains(&AgeGroup::Adolescent)
            }
        };
        if conflict {
            return false;
        }
        seen.insert(group);
    }
    true
}

/// Race consistency between a sibling cohort and its parents.
///
/// At most two races may appear across cohort and parents together, and
/// once both parents are known they must account for every cohort race.
pub fn races_compatible(cohort_races: &[&str], parent_races: &[&str], parent_count: usize) -> bool {
    let mut union: Vec<&str> = Vec::new();
    for race in cohort_races.iter().chain(parent_races) {
        if !union.contains(race) {
            union.push(race);
        }
    }
    if union.len() > 2 {
        return false;
    }
    parent_count < MAX_PARENTS || cohort_races.iter().all(|race| parent_races.contains(race))
}

fn genders_clash(a: &Npc, b: &Npc) -> bool {
    a.gender == b.gender && !a.gender.is_neutral()
}

/// `roots` plus everything below them through child and sibling edges.
fn lineage<'w>(world: &'w World, roots: &[&'w Feature]) -> Vec<&'w Feature> {
    let mut seen: FxHashSet<FeatureId> = roots.iter().map(|root| root.id).collect();
    let mut lineage = roots.to_vec();
    let mut next = 0;
    while let Some(current) = lineage.get(next).copied() {
        next += 1;
        for id in current
            .related(labels::CHILD)
            .chain(current.related(labels::SIBLING))
        {
            if seen.insert(id) {
                if let Some(feature) = world.feature(id) {
                    lineage.push(feature);
                }
            }
        }
    }
    lineage
}

/// True if making `upper` blood kin above `lower` would turn an existing
/// partnership into a family one: some partner of `lower`'s lineage is a
/// blood relative of `upper`.
fn joins_partners(world: &World, lower: &[&Feature], upper: &[&Feature]) -> bool {
    let mut relatives = FxHashSet::default();
    for feature in upper {
        relatives.insert(feature.id);
        relatives.extend(world.family_of(feature));
    }
    lineage(world, lower).iter().any(|member| {
        member
            .related(labels::PARTNER)
            .any(|partner| relatives.contains(&partner))
    })
}

/// Append `ids` to `into`, skipping duplicates, keeping first-seen order.
fn extend_unique(into: &mut Vec<FeatureId>, ids: impl IntoIterator<Item = FeatureId>) {
    for id in ids {
        if !into.contains(&id) {
            into.push(id);
        }
    }
}

pub struct CompatibilityRules<'a> {
    races: &'a RaceTable,
    config: &'a GenerationConfig,
}

impl<'a> CompatibilityRules<'a> {
    pub fn new(races: &'a RaceTable, config: &'a GenerationConfig) -> Self {
        Self { races, config }
    }

    pub fn races(&self) -> &'a RaceTable {
        self.races
    }

    // --- subject side ---

    /// Can `subject` currently take on a predicate labelled `label`?
    pub fn subject_allows(&self, subject: &Feature, label: &str) -> bool {
        match &subject.kind {
            FeatureKind::Npc(npc) => match label {
                labels::RESIDENT => !subject.has_role(labels::RESIDENCE),
                labels::RULER => npc.alive && npc.is_adult() && !subject.has_role(labels::RULES),
                labels::PARTNER => npc.is_adult() && !subject.has_role(labels::PARTNER),
                labels::PARENT => {
                    npc.is_adult() && subject.count_role(labels::CHILD) < self.config.child_cap
                }
                labels::CHILD => subject.count_role(labels::PARENT) < MAX_PARENTS,
                labels::SIBLING => subject.count_role(labels::SIBLING) < self.config.sibling_cap,
                labels::KILLED => npc.is_adult() && npc.alive,
                labels::KILLER => npc.is_adult(),
                _ => true,
            },
            FeatureKind::Settlement(settlement) => match label {
                labels::RESIDENCE => {
                    subject.count_role(labels::RESIDENT) < settlement.max_residents
                }
                labels::RULES => !subject.has_role(labels::RULER),
                labels::TRADES => subject.count_role(labels::TRADES) < self.config.trade_cap,
                labels::RIVAL => subject.count_role(labels::RIVAL) < self.config.rival_cap,
                _ => true,
            },
        }
    }

    /// Drop the predicates `subject` cannot currently hold.
    pub fn filter_predicates<'p, I>(&self, subject: &Feature, predicates: I) -> Vec<&'p Predicate>
    where
        I: IntoIterator<Item = &'p Predicate>,
    {
        predicates
            .into_iter()
            .filter(|predicate| self.subject_allows(subject, &predicate.label))
            .collect()
    }

    // --- object side ---

    /// Keep the candidates that may take the role `label` opposite `subject`.
    pub fn filter_candidates<'f, I>(
        &self,
        world: &World,
        label: &str,
        subject: &Feature,
        candidates: I,
    ) -> Vec<FeatureId>
    where
        I: IntoIterator<Item = &'f Feature>,
    {
        candidates
            .into_iter()
            .filter(|candidate| self.object_allows(world, label, subject, candidate))
            .map(|candidate| candidate.id)
            .collect()
    }

    /// Can `candidate` take the role `label` opposite `subject`?
    ///
    /// `candidate` need not be in the world yet; rules only read its own
    /// relationship list and the world around it.
    pub fn object_allows(&self, world: &World, label: &str, subject: &Feature, candidate: &Feature) -> bool {
        if candidate.id == subject.id {
            return false;
        }
        match label {
            labels::PARTNER => self.partner_ok(world, subject, candidate),
            labels::PARENT => {
                let cohort = self.cohort(world, subject);
                self.parent_ok(world, &cohort, candidate)
            }
            labels::CHILD => {
                let cohort = self.cohort(world, candidate);
                self.parent_ok(world, &cohort, subject)
            }
            labels::SIBLING => self.siblings_ok(world, subject, candidate),
            labels::KILLER => candidate.is_adult(),
            labels::KILLED => candidate.is_adult() && candidate.is_alive(),
            labels::RESIDENCE => self.residence_ok(subject, candidate),
            labels::RULES => self.ruled_ok(subject, candidate),
            labels::RESIDENT => self.resident_ok(subject, candidate),
            labels::RULER => self.ruler_ok(subject, candidate),
            labels::TRADES => self.exchange_ok(
                subject,
                candidate,
                labels::TRADES,
                labels::RIVAL,
                self.config.trade_cap,
            ),
            labels::RIVAL => self.exchange_ok(
                subject,
                candidate,
                labels::RIVAL,
                labels::TRADES,
                self.config.rival_cap,
            ),
            _ => true,
        }
    }

    /// `feature` followed by its siblings.
    pub fn cohort<'w>(&self, world: &'w World, feature: &'w Feature) -> Vec<&'w Feature> {
        let mut cohort = vec![feature];
        for id in feature.related(labels::SIBLING) {
            if let Some(sibling) = world.feature(id) {
                cohort.push(sibling);
            }
        }
        cohort
    }

    /// Parents of any cohort member, deduplicated.
    pub fn cohort_parents(&self, cohort: &[&Feature]) -> Vec<FeatureId> {
        let mut parents = Vec::new();
        for member in cohort {
            extend_unique(&mut parents, member.related(labels::PARENT));
        }
        parents
    }

    fn partner_ok(&self, world: &World, subject: &Feature, candidate: &Feature) -> bool {
        subject.as_npc().is_some()
            && candidate.is_adult()
            && !candidate.has_role(labels::PARTNER)
            && !world.family_of(subject).contains(&candidate.id)
    }

    /// Can `parent` become a parent of every member of `cohort`?
    fn parent_ok(&self, world: &World, cohort: &[&Feature], parent: &Feature) -> bool {
        let Some(parent_npc) = parent.as_npc() else {
            return false;
        };
        let Some(first) = cohort.first() else {
            return false;
        };
        if !parent_npc.is_adult() || cohort.iter().any(|member| member.id == parent.id) {
            return false;
        }
        let cohort_npcs: Vec<&Npc> = cohort.iter().filter_map(|member| member.as_npc()).collect();
        if cohort_npcs.len() != cohort.len() {
            return false;
        }
        if world.family_of(first).contains(&parent.id) {
            return false;
        }
        if joins_partners(world, cohort, &[parent]) {
            return false;
        }

        let existing = self.cohort_parents(cohort);
        if existing.contains(&parent.id) || existing.len() >= MAX_PARENTS {
            return false;
        }

        let new_children = cohort
            .iter()
            .filter(|member| !parent.is_linked(labels::CHILD, member.id))
            .count();
        if parent.count_role(labels::CHILD) + new_children > self.config.child_cap {
            return false;
        }

        let mut parent_races = vec![parent_npc.race.as_str()];
        for id in &existing {
            let Some(other) = world.feature(*id) else {
                return false;
            };
            let Some(other_npc) = other.as_npc() else {
                return false;
            };
            if genders_clash(parent_npc, other_npc) || world.family_of(other).contains(&parent.id) {
                return false;
            }
            parent_races.push(other_npc.race.as_str());
        }

        let cohort_races: Vec<&str> = cohort_npcs.iter().map(|npc| npc.race.as_str()).collect();
        if !races_compatible(&cohort_races, &parent_races, existing.len() + 1) {
            return false;
        }

        let oldest = cohort_npcs.iter().map(|npc| npc.age).max().unwrap_or(0);
        old_enough(self.races, parent_npc, oldest)
    }

    /// Can `subject` and `candidate` (with their existing siblings) form a
    /// single sibling cohort?
    fn siblings_ok(&self, world: &World, subject: &Feature, candidate: &Feature) -> bool {
        if subject.as_npc().is_none() || candidate.as_npc().is_none() {
            return false;
        }
        if subject.is_linked(labels::SIBLING, candidate.id)
            || world.family_of(subject).contains(&candidate.id)
        {
            return false;
        }

        let subject_side = self.cohort(world, subject);
        let candidate_side = self.cohort(world, candidate);
        let mut members: Vec<&Feature> = subject_side.clone();
        for member in &candidate_side {
            if !members.iter().any(|m| m.id == member.id) {
                members.push(member);
            }
        }
        if members.len() - 1 > self.config.sibling_cap {
            return false;
        }
        let Some(member_npcs) = members
            .iter()
            .map(|member| member.as_npc())
            .collect::<Option<Vec<&Npc>>>()
        else {
            return false;
        };

        let mut parents = self.cohort_parents(&subject_side);
        extend_unique(&mut parents, self.cohort_parents(&candidate_side));
        if parents.len() > MAX_PARENTS {
            return false;
        }
        if parents.iter().any(|p| members.iter().any(|m| m.id == *p)) {
            return false;
        }
        let Some(parent_features) = parents
            .iter()
            .map(|id| world.feature(*id))
            .collect::<Option<Vec<&Feature>>>()
        else {
            return false;
        };
        let Some(parent_npcs) = parent_features
            .iter()
            .map(|parent| parent.as_npc())
            .collect::<Option<Vec<&Npc>>>()
        else {
            return false;
        };

        // No partnerships inside the cohort or between a member and a parent.
        for member in &members {
            let partnered_inside = members
                .iter()
                .any(|other| member.is_linked(labels::PARTNER, other.id))
                || parents
                    .iter()
                    .any(|parent| member.is_linked(labels::PARTNER, *parent));
            if partnered_inside {
                return false;
            }
        }

        if joins_partners(world, &subject_side, &candidate_side)
            || joins_partners(world, &candidate_side, &subject_side)
        {
            return false;
        }

        if let [first, second] = parent_features.as_slice() {
            if world.family_of(first).contains(&second.id)
                || genders_clash(parent_npcs[0], parent_npcs[1])
            {
                return false;
            }
        }

        for parent in &parent_features {
            let new_children = members
                .iter()
                .filter(|member| !parent.is_linked(labels::CHILD, member.id))
                .count();
            if parent.count_role(labels::CHILD) + new_children > self.config.child_cap {
                return false;
            }
        }

        if !age_groups_compatible(member_npcs.iter().map(|npc| npc.age_group)) {
            return false;
        }

        let cohort_races: Vec<&str> = member_npcs.iter().map(|npc| npc.race.as_str()).collect();
        let parent_races: Vec<&str> = parent_npcs.iter().map(|npc| npc.race.as_str()).collect();
        if !races_compatible(&cohort_races, &parent_races, parents.len()) {
            return false;
        }

        let oldest = member_npcs.iter().map(|npc| npc.age).max().unwrap_or(0);
        parent_npcs
            .iter()
            .all(|parent| old_enough(self.races, parent, oldest))
    }

    fn residence_ok(&self, subject: &Feature, candidate: &Feature) -> bool {
        let Some(settlement) = candidate.as_settlement() else {
            return false;
        };
        if candidate.count_role(labels::RESIDENT) >= settlement.max_residents {
            return false;
        }
        // Rulers live where they rule.
        subject
            .first_related(labels::RULES)
            .map_or(true, |ruled| ruled == candidate.id)
    }

    fn ruled_ok(&self, subject: &Feature, candidate: &Feature) -> bool {
        let Some(settlement) = candidate.as_settlement() else {
            return false;
        };
        if candidate.has_role(labels::RULER) {
            return false;
        }
        match subject.first_related(labels::RESIDENCE) {
            Some(home) => home == candidate.id,
            // Ruler propagation will move the ruler in.
            None => candidate.count_role(labels::RESIDENT) < settlement.max_residents,
        }
    }

    fn resident_ok(&self, subject: &Feature, candidate: &Feature) -> bool {
        candidate.as_npc().is_some()
            && !candidate.has_role(labels::RESIDENCE)
            && candidate
                .first_related(labels::RULES)
                .map_or(true, |ruled| ruled == subject.id)
    }

    fn ruler_ok(&self, subject: &Feature, candidate: &Feature) -> bool {
        let (Some(npc), Some(settlement)) = (candidate.as_npc(), subject.as_settlement()) else {
            return false;
        };
        if !npc.alive || !npc.is_adult() || candidate.has_role(labels::RULES) {
            return false;
        }
        match candidate.first_related(labels::RESIDENCE) {
            Some(home) => home == subject.id,
            None => subject.count_role(labels::RESIDENT) < settlement.max_residents,
        }
    }

    fn exchange_ok(
        &self,
        subject: &Feature,
        candidate: &Feature,
        label: &str,
        exclusive: &str,
        cap: usize,
    ) -> bool {
        candidate.as_settlement().is_some()
            && !subject.is_linked(label, candidate.id)
            && !subject.is_linked(exclusive, candidate.id)
            && candidate.count_role(label) < cap
    }
}

/// Was `parent` at least an adult of its race when a child of age
/// `oldest_child` was born?
pub fn old_enough(races: &RaceTable, parent: &Npc, oldest_child: u32) -> bool {
    let adulthood = races.adulthood(&parent.race);
    oldest_child
        .checked_add(adulthood)
        .is_some_and(|needed| parent.age >= needed)
}
