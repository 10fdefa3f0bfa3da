pub mod catalog;
pub mod compat;
pub mod config;
pub mod generator;
pub mod names;
pub mod orchestrator;
pub mod propagation;
pub mod resolver;
pub mod spawn;
pub mod tables;
pub mod weighted;

#[cfg(test)]
pub(crate) mod fixtures;
