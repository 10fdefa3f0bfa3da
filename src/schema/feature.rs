//! Features: the NPCs and settlements that make up a generated world.

use serde::{Deserialize, Serialize};

use super::relationship::RelationshipId;

/// Stable handle to a feature in the world arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureId(pub usize);

/// The closed set of feature kinds a predicate can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureType {
    Npc,
    Settlement,
}

impl FeatureType {
    /// Parse a table key such as `NPC` or `Settlement` (case-insensitive).
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "npc" => Some(Self::Npc),
            "settlement" => Some(Self::Settlement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
    NonBinary,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Female, Gender::Male, Gender::NonBinary];

    /// Female and male are exclusive between two parents; non-binary is not.
    pub fn is_neutral(&self) -> bool {
        matches!(self, Self::NonBinary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    Child,
    Adolescent,
    Adult,
    Elderly,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 4] = [
        AgeGroup::Child,
        AgeGroup::Adolescent,
        AgeGroup::Adult,
        AgeGroup::Elderly,
    ];

    /// Adults and elderly NPCs are grown; children and adolescents are minors.
    pub fn is_grown(&self) -> bool {
        matches!(self, Self::Adult | Self::Elderly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    Small,
    Large,
    NotApplicable,
}

/// A generated person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub given_name: String,
    pub family_name: Option<String>,
    /// Key into the race table.
    pub race: String,
    pub gender: Gender,
    pub age_group: AgeGroup,
    pub age: u32,
    pub alive: bool,
}

impl Npc {
    pub fn full_name(&self) -> String {
        match &self.family_name {
            Some(family) => format!("{} {}", self.given_name, family),
            None => self.given_name.clone(),
        }
    }

    pub fn is_adult(&self) -> bool {
        self.age_group.is_grown()
    }
}

/// A generated place people live in and rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub name: String,
    /// Key into the settlement-type table.
    pub settlement_type: String,
    pub size: SizeClass,
    pub population: u32,
    pub max_residents: usize,
}

/// Variant-specific feature data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeatureKind {
    Npc(Npc),
    Settlement(Settlement),
}

/// One row of a feature's relationship list.
///
/// `role` is the predicate held by `other`, i.e. what `other` is to the
/// owning feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEntry {
    pub role: String,
    pub other: FeatureId,
    pub relationship: RelationshipId,
}

/// Any entity that participates in relationships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub kind: FeatureKind,
    pub relationships: Vec<RelationshipEntry>,
}

impl Feature {
    pub fn npc(id: FeatureId, npc: Npc) -> Self {
        Self {
            id,
            kind: FeatureKind::Npc(npc),
            relationships: Vec::new(),
        }
    }

    pub fn settlement(id: FeatureId, settlement: Settlement) -> Self {
        Self {
            id,
            kind: FeatureKind::Settlement(settlement),
            relationships: Vec::new(),
        }
    }

    pub fn feature_type(&self) -> FeatureType {
        match self.kind {
            FeatureKind::Npc(_) => FeatureType::Npc,
            FeatureKind::Settlement(_) => FeatureType::Settlement,
        }
    }

    pub fn name(&self) -> String {
        match &self.kind {
            FeatureKind::Npc(npc) => npc.full_name(),
            FeatureKind::Settlement(settlement) => settlement.name.clone(),
        }
    }

    pub fn as_npc(&self) -> Option<&Npc> {
        match &self.kind {
            FeatureKind::Npc(npc) => Some(npc),
            FeatureKind::Settlement(_) => None,
        }
    }

    pub fn as_npc_mut(&mut self) -> Option<&mut Npc> {
        match &mut self.kind {
            FeatureKind::Npc(npc) => Some(npc),
            FeatureKind::Settlement(_) => None,
        }
    }

    pub fn as_settlement(&self) -> Option<&Settlement> {
        match &self.kind {
            FeatureKind::Settlement(settlement) => Some(settlement),
            FeatureKind::Npc(_) => None,
        }
    }

    /// Number of relationships this feature takes part in.
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Features related to this one through `role`, in commit order.
    pub fn related<'a>(&'a self, role: &'a str) -> impl Iterator<Item = FeatureId> + 'a {
        self.relationships
            .iter()
            .filter(move |entry| entry.role == role)
            .map(|entry| entry.other)
    }

    pub fn first_related(&self, role: &str) -> Option<FeatureId> {
        self.related(role).next()
    }

    pub fn count_role(&self, role: &str) -> usize {
        self.related(role).count()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.related(role).next().is_some()
    }

    /// True if `other` already plays `role` for this feature.
    pub fn is_linked(&self, role: &str, other: FeatureId) -> bool {
        self.related(role).any(|id| id == other)
    }

    pub fn is_alive(&self) -> bool {
        self.as_npc().is_some_and(|npc| npc.alive)
    }

    pub fn is_adult(&self) -> bool {
        self.as_npc().is_some_and(Npc::is_adult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_npc(family: Option<&str>) -> Npc {
        Npc {
            given_name: "Maren".to_string(),
            family_name: family.map(str::to_string),
            race: "human".to_string(),
            gender: Gender::Female,
            age_group: AgeGroup::Adult,
            age: 34,
            alive: true,
        }
    }

    #[test]
    fn full_name_with_and_without_family() {
        assert_eq!(make_npc(Some("Thorne")).full_name(), "Maren Thorne");
        assert_eq!(make_npc(None).full_name(), "Maren");
    }

    #[test]
    fn feature_type_keys() {
        assert_eq!(FeatureType::from_key("NPC"), Some(FeatureType::Npc));
        assert_eq!(FeatureType::from_key("settlement"), Some(FeatureType::Settlement));
        assert_eq!(FeatureType::from_key("castle"), None);
    }

    #[test]
    fn role_queries() {
        let mut feature = Feature::npc(FeatureId(0), make_npc(None));
        feature.relationships.push(RelationshipEntry {
            role: "parent".to_string(),
            other: FeatureId(4),
            relationship: RelationshipId(0),
        });
        feature.relationships.push(RelationshipEntry {
            role: "parent".to_string(),
            other: FeatureId(7),
            relationship: RelationshipId(1),
        });

        assert_eq!(feature.count_role("parent"), 2);
        assert!(feature.is_linked("parent", FeatureId(7)));
        assert!(!feature.is_linked("child", FeatureId(7)));
        assert!(!feature.has_role("partner"));
        assert_eq!(feature.first_related("parent"), Some(FeatureId(4)));
    }

    #[test]
    fn grown_age_groups() {
        assert!(!AgeGroup::Child.is_grown());
        assert!(!AgeGroup::Adolescent.is_grown());
        assert!(AgeGroup::Adult.is_grown());
        assert!(AgeGroup::Elderly.is_grown());
    }
}
