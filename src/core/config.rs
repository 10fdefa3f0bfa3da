//! Tunable constants for a generation run, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    // Population
    pub seed_npcs: usize,
    pub seed_settlements: usize,
    /// NPCs spawned when an iterative round finds no seeds.
    pub batch_npcs: usize,
    pub batch_settlements: usize,
    pub max_npcs: usize,
    pub max_settlements: usize,
    /// Hard bound on iterative rounds, independent of coverage.
    pub max_rounds: usize,

    // Caps
    pub sibling_cap: usize,
    pub child_cap: usize,
    pub trade_cap: usize,
    pub rival_cap: usize,

    // Generation pacing
    /// Decline weight added per existing relationship of the subject.
    pub decline_weight: u32,
    /// Resolver rounds a pending relationship survives.
    pub pending_attempts: u32,
    /// Chance per round that the resolver tries to materialize an object.
    pub materialize_probability: f64,
    /// Chance that two parents of the same child become partners.
    pub partner_after_parent_probability: f64,

    // Stopping criteria
    pub residence_coverage: f64,
    pub family_coverage: f64,

    // Final phase
    pub final_min_relationships: usize,
    pub final_attempts: usize,

    // Feature factory
    pub max_name_attempts: usize,
    /// Inhabitants represented by one resident NPC.
    pub population_per_resident: u32,
    pub min_residents: usize,
    pub max_residents: usize,
    /// Widest age gap above the minimum when materializing a parent.
    pub parent_age_spread: u32,

    /// Abort the whole run when propagation fails. When unset, the failure
    /// is logged and generation continues with the next relationship.
    pub strict_propagation: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed_npcs: 12,
            seed_settlements: 3,
            batch_npcs: 6,
            batch_settlements: 1,
            max_npcs: 250,
            max_settlements: 25,
            max_rounds: 200,
            sibling_cap: 6,
            child_cap: 6,
            trade_cap: 3,
            rival_cap: 2,
            decline_weight: 10,
            pending_attempts: 3,
            materialize_probability: 0.5,
            partner_after_parent_probability: 0.6,
            residence_coverage: 0.9,
            family_coverage: 0.95,
            final_min_relationships: 2,
            final_attempts: 3,
            max_name_attempts: 64,
            population_per_resident: 10,
            min_residents: 4,
            max_residents: 40,
            parent_age_spread: 25,
            strict_propagation: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl GenerationConfig {
    pub fn load_from_ron(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a RON config. Omitted fields keep their defaults.
    pub fn parse_ron(input: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every probability and coverage threshold lies in [0, 1].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fractions = [
            ("materialize_probability", self.materialize_probability),
            ("partner_after_parent_probability", self.partner_after_parent_probability),
            ("residence_coverage", self.residence_coverage),
            ("family_coverage", self.family_coverage),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_ron_keeps_defaults() {
        let config = GenerationConfig::parse_ron("(seed_npcs: 4, sibling_cap: 3)").unwrap();
        assert_eq!(config.seed_npcs, 4);
        assert_eq!(config.sibling_cap, 3);
        assert_eq!(config.child_cap, GenerationConfig::default().child_cap);
    }

    #[test]
    fn ron_round_trip() {
        let config = GenerationConfig {
            strict_propagation: false,
            ..GenerationConfig::default()
        };
        let serialized = ron::to_string(&config).unwrap();
        assert_eq!(GenerationConfig::parse_ron(&serialized).unwrap(), config);
    }

    #[test]
    fn malformed_ron_errors() {
        assert!(matches!(
            GenerationConfig::parse_ron("(seed_npcs: \"many\")"),
            Err(ConfigError::Ron(_))
        ));
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let result = GenerationConfig::parse_ron("(materialize_probability: 1.5)");
        match result {
            Err(ConfigError::Invalid(message)) => assert!(message.contains("materialize_probability")),
            other => panic!("expected an invalid config, got {:?}", other),
        }
    }

    #[test]
    fn coverage_thresholds_are_fractions() {
        let config = GenerationConfig {
            family_coverage: -0.1,
            ..GenerationConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = GenerationConfig {
            partner_after_parent_probability: f64::NAN,
            ..GenerationConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(GenerationConfig::default().validate().is_ok());
    }

    #[test]
    fn defaults_propagate_strictly() {
        assert!(GenerationConfig::default().strict_propagation);
    }
}
