//! World orchestration: seed population, iterative rounds until the
//! stopping criteria hold, then a final pass for under-connected features.
//!
//! Built via `WorldGenerator::builder()`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::catalog::{CatalogError, PredicateCatalog};
use crate::core::compat::CompatibilityRules;
use crate::core::config::{ConfigError, GenerationConfig};
use crate::core::generator::{GenerationError, RelationshipGenerator};
use crate::core::propagation::Propagator;
use crate::core::resolver::DeferredResolver;
use crate::core::spawn::FeatureFactory;
use crate::core::tables::{DataError, GenerationData};
use crate::schema::feature::FeatureId;
use crate::schema::relationship::Relationship;
use crate::schema::world::{World, WorldStats};

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("generation aborted: {0}")]
    Generation(#[from] GenerationError),
}

/// Generates whole worlds from a fixed catalog, data set and config.
pub struct WorldGenerator {
    catalog: PredicateCatalog,
    data: GenerationData,
    config: GenerationConfig,
    seed: u64,
}

/// Builder for constructing a `WorldGenerator`.
pub struct WorldGeneratorBuilder {
    seed: u64,
    config_path: Option<String>,
    data_dir: Option<String>,
    /// Directly provided config (takes precedence over `config_path`).
    config: Option<GenerationConfig>,
    /// Directly provided catalog (for testing without files).
    catalog: Option<PredicateCatalog>,
    /// Directly provided tables (for testing without files).
    data: Option<GenerationData>,
}

/// Engine components borrowed for the length of one run.
struct Run<'a> {
    config: &'a GenerationConfig,
    generator: RelationshipGenerator<'a>,
    factory: &'a FeatureFactory<'a>,
    propagator: &'a Propagator<'a>,
    resolver: DeferredResolver<'a>,
}

impl WorldGenerator {
    pub fn builder() -> WorldGeneratorBuilder {
        WorldGeneratorBuilder {
            seed: 0,
            config_path: None,
            data_dir: None,
            config: None,
            catalog: None,
            data: None,
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn catalog(&self) -> &PredicateCatalog {
        &self.catalog
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate one world. The same seed, config and tables always produce
    /// the same world.
    pub fn generate_world(&self) -> Result<World, WorldError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut world = World::new();

        let rules = CompatibilityRules::new(&self.data.races, &self.config);
        let factory = FeatureFactory::new(&self.data, &self.config);
        let propagator = Propagator::new(&self.catalog, &self.config);
        let run = Run {
            config: &self.config,
            generator: RelationshipGenerator::new(&self.catalog, &rules, &self.config),
            factory: &factory,
            propagator: &propagator,
            resolver: DeferredResolver::new(
                &self.catalog,
                &rules,
                &factory,
                &propagator,
                &self.config,
            ),
        };

        info!(seed = self.seed, "initial generation");
        let seeds = run.spawn_batch(
            &mut world,
            self.config.seed_npcs,
            self.config.seed_settlements,
            &mut rng,
        );
        run.attempt_all(&mut world, &seeds, &mut rng)?;
        let mut materialized = run.resolver.resolve(&mut world, &mut rng)?.materialized;

        info!("iterative generation");
        let mut rounds = 0;
        loop {
            if rounds >= self.config.max_rounds {
                warn!(rounds, "round limit reached before stopping criteria");
                break;
            }
            rounds += 1;

            let seeds = run.round_seeds(&mut world, &materialized, &mut rng);
            run.attempt_all(&mut world, &seeds, &mut rng)?;
            let report = run.resolver.resolve(&mut world, &mut rng)?;
            materialized = report.materialized;

            let stats = world.stats();
            debug!(
                round = rounds,
                seeds = seeds.len(),
                npcs = stats.npcs,
                settlements = stats.settlements,
                relationships = stats.relationships,
                pending = stats.pending,
                "round complete"
            );
            if run.should_stop(&stats) {
                info!(round = rounds, ?stats, "stopping criteria met");
                break;
            }
        }

        info!("final generation");
        let dropped = world.discard_pending();
        debug!(dropped, "discarded pending relationships");
        let attempts = run.final_pass(&mut world, &mut rng)?;
        debug!(attempts, "final pass complete");

        info!(stats = ?world.stats(), "world generated");
        Ok(world)
    }
}

impl Run<'_> {
    /// Spawn fresh NPCs and settlements. Features that cannot be built are
    /// skipped.
    fn spawn_batch<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        npcs: usize,
        settlements: usize,
        rng: &mut R,
    ) -> Vec<FeatureId> {
        let mut spawned = Vec::with_capacity(npcs + settlements);
        for _ in 0..npcs {
            match self.factory.spawn_npc(world, rng) {
                Ok(id) => spawned.push(id),
                Err(err) => warn!(error = %err, "could not spawn npc"),
            }
        }
        for _ in 0..settlements {
            match self.factory.spawn_settlement(world, rng) {
                Ok(id) => spawned.push(id),
                Err(err) => warn!(error = %err, "could not spawn settlement"),
            }
        }
        spawned
    }

    /// Features without relationships plus those materialized last round.
    /// An empty set is replaced by a fresh batch.
    fn round_seeds<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        materialized: &[FeatureId],
        rng: &mut R,
    ) -> Vec<FeatureId> {
        let mut seeds: Vec<FeatureId> = world
            .features()
            .filter(|feature| feature.relationship_count() == 0)
            .map(|feature| feature.id)
            .collect();
        for id in materialized {
            if !seeds.contains(id) {
                seeds.push(*id);
            }
        }
        if seeds.is_empty() {
            debug!("no seeds left, spawning a batch");
            seeds = self.spawn_batch(
                world,
                self.config.batch_npcs,
                self.config.batch_settlements,
                rng,
            );
        }
        seeds
    }

    /// One `generate` call per seed. Complete relationships are committed,
    /// pending ones queued for the resolver.
    fn attempt_all<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        seeds: &[FeatureId],
        rng: &mut R,
    ) -> Result<(), GenerationError> {
        for id in seeds {
            let Some(relationship) = self.generator.generate(world, *id, rng) else {
                continue;
            };
            if relationship.is_locked() {
                self.commit(world, relationship, rng)?;
            } else {
                world.queue_pending(relationship);
            }
        }
        Ok(())
    }

    fn commit<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        relationship: Relationship,
        rng: &mut R,
    ) -> Result<(), GenerationError> {
        match self.propagator.commit(world, relationship, rng) {
            Ok(_) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(error = %err, "relationship skipped");
                Ok(())
            }
        }
    }

    /// Extra direct attempts for features below the relationship threshold.
    /// Nothing is deferred any more. Returns the number of attempts made.
    fn final_pass<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        rng: &mut R,
    ) -> Result<usize, GenerationError> {
        let sparse: Vec<FeatureId> = world
            .features()
            .filter(|feature| feature.relationship_count() < self.config.final_min_relationships)
            .map(|feature| feature.id)
            .collect();
        debug!(features = sparse.len(), "final pass");

        let mut attempts = 0;
        for id in sparse {
            for _ in 0..self.config.final_attempts {
                let below = world
                    .feature(id)
                    .is_some_and(|f| f.relationship_count() < self.config.final_min_relationships);
                if !below {
                    break;
                }
                attempts += 1;
                match self.generator.generate(world, id, rng) {
                    Some(relationship) if relationship.is_locked() => {
                        self.commit(world, relationship, rng)?;
                    }
                    _ => {}
                }
            }
        }
        Ok(attempts)
    }

    fn should_stop(&self, stats: &WorldStats) -> bool {
        if stats.npcs > self.config.max_npcs || stats.settlements > self.config.max_settlements {
            return true;
        }
        stats.residence_coverage >= self.config.residence_coverage
            && stats.family_coverage >= self.config.family_coverage
            && stats.all_settlements_ruled()
    }
}

impl WorldGeneratorBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn config(mut self, config: GenerationConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the config from a RON file at build time.
    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Load `predicates.tsv` (if present), `races.tsv`,
    /// `settlement_types.tsv` and `names/` from `dir`.
    pub fn data_dir(mut self, dir: &str) -> Self {
        self.data_dir = Some(dir.to_string());
        self
    }

    /// Provide the catalog directly (for testing without files).
    pub fn with_catalog(mut self, catalog: PredicateCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Provide the tables directly (for testing without files).
    pub fn with_data(mut self, data: GenerationData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn build(self) -> Result<WorldGenerator, WorldError> {
        let config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => GenerationConfig::load_from_ron(Path::new(path))?,
            (None, None) => GenerationConfig::default(),
        };
        config.validate()?;

        let dir = self.data_dir.as_deref().map(Path::new);
        let catalog = match (self.catalog, dir) {
            (Some(catalog), _) => catalog,
            (None, Some(dir)) if dir.join("predicates.tsv").exists() => {
                PredicateCatalog::load_from_file(&dir.join("predicates.tsv"))?
            }
            (None, _) => PredicateCatalog::builtin()?,
        };
        let data = match (self.data, dir) {
            (Some(data), _) => data,
            (None, Some(dir)) => GenerationData::load_from_dir(dir)?,
            (None, None) => GenerationData::builtin()?,
        };

        Ok(WorldGenerator {
            catalog,
            data,
            config,
            seed: self.seed,
        })
    }
}
