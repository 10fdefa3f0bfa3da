//! Social Graph Engine: procedural generation of people, settlements and
//! the relationships between them.
//!
//! A world grows round by round from a small seed population. Every
//! relationship passes a bank of compatibility rules (single partners and
//! residences, capped families, no genealogical loops, consistent race and
//! age across kin, settlement capacity) and its consequences are
//! propagated before the next one is considered. Runs are deterministic
//! for a given seed.
//!
//! ```no_run
//! use social_graph_engine::core::orchestrator::WorldGenerator;
//!
//! let world = WorldGenerator::builder().seed(42).build()?.generate_world()?;
//! println!("{} features", world.feature_count());
//! # Ok::<(), social_graph_engine::core::orchestrator::WorldError>(())
//! ```

pub mod core;
pub mod schema;
