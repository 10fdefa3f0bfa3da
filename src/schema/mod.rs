pub mod feature;
pub mod predicate;
pub mod relationship;
pub mod world;
