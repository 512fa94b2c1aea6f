pub mod matcher;

pub use matcher::{GeoMatcher, Match};
