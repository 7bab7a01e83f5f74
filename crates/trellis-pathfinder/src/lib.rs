//! Pathfinder — bounded connectivity search over instance graphs

pub mod config;
pub mod counter;
pub mod pathfinder;


pub use config::PathfinderConfig;
pub use counter::{render_counters, Counter};
pub use pathfinder::{Path, PathError, Pathfinder};
