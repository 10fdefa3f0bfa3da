//! Unique name generation for NPCs and settlements.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::core::tables::NamePools;
use crate::schema::feature::Gender;
use crate::schema::world::World;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("no unused {kind} name found after {attempts} attempts")]
    NoMoreNames { kind: &'static str, attempts: usize },
}

/// Draws names from the pools, retrying until one is unused in the world.
pub struct NameGenerator<'a> {
    pools: &'a NamePools,
    max_attempts: usize,
}

impl<'a> NameGenerator<'a> {
    pub fn new(pools: &'a NamePools, max_attempts: usize) -> Self {
        Self {
            pools,
            max_attempts,
        }
    }

    /// A `(given, family)` pair whose full name is unused. `family` pins
    /// the family name when the NPC inherits one.
    pub fn npc_name<R: Rng + ?Sized>(
        &self,
        world: &World,
        gender: Gender,
        family: Option<&str>,
        rng: &mut R,
    ) -> Result<(String, Option<String>), NameError> {
        let given_pool = self.pools.given_names(gender);
        for _ in 0..self.max_attempts {
            let Some(given) = given_pool.choose(rng) else {
                break;
            };
            let family_name = match family {
                Some(family) => Some(family.to_string()),
                None => self.pools.family.choose(rng).cloned(),
            };
            let full = match &family_name {
                Some(family) => format!("{} {}", given, family),
                None => given.to_string(),
            };
            if !world.name_in_use(&full) {
                return Ok((given.to_string(), family_name));
            }
        }
        Err(NameError::NoMoreNames {
            kind: "npc",
            attempts: self.max_attempts,
        })
    }

    /// An unused settlement name: either a whole name or prefix + suffix.
    pub fn settlement_name<R: Rng + ?Sized>(
        &self,
        world: &World,
        rng: &mut R,
    ) -> Result<String, NameError> {
        let compound = !self.pools.settlement_prefix.is_empty()
            && !self.pools.settlement_suffix.is_empty();
        for _ in 0..self.max_attempts {
            let use_single = !self.pools.settlement_single.is_empty()
                && (!compound || rng.gen_bool(0.3));
            let candidate = if use_single {
                self.pools.settlement_single.choose(rng).cloned()
            } else if compound {
                match (
                    self.pools.settlement_prefix.choose(rng),
                    self.pools.settlement_suffix.choose(rng),
                ) {
                    (Some(prefix), Some(suffix)) => Some(format!("{}{}", prefix, suffix)),
                    _ => None,
                }
            } else {
                None
            };
            let Some(name) = candidate else {
                break;
            };
            if !world.name_in_use(&name) {
                return Ok(name);
            }
        }
        Err(NameError::NoMoreNames {
            kind: "settlement",
            attempts: self.max_attempts,
        })
    }
}
