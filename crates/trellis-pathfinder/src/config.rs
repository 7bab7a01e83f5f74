//! Search ceilings and weak-link naming

use serde::{Deserialize, Serialize};

pub const ENV_MAX_PATHS: &str = "TRELLIS_MAX_PATHS";
pub const ENV_MAX_PATHS_NO_NEW_WEAK: &str = "TRELLIS_MAX_PATHS_NO_NEW_WEAK";
pub const ENV_MAX_PATHS_NO_WEAK: &str = "TRELLIS_MAX_PATHS_NO_WEAK";
pub const ENV_LOG: &str = "PATHFINDER_LOG";

/// `[pathfinder]` table of `trellis.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    /// Candidate paths examined before the search stops outright.
    pub max_paths: usize,
    /// After this many candidates no path may take on another weak link.
    pub max_paths_no_new_weak: usize,
    /// After this many candidates paths holding any weak link are dropped.
    pub max_paths_no_weak: usize,
    /// Connection names treated as weak. Pointer edges are always weak.
    pub weak_links: Vec<String>,
    /// Log the stage counters after every search.
    pub log: bool,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        PathfinderConfig {
            max_paths: 10_000_000,
            max_paths_no_new_weak: 1_000,
            max_paths_no_weak: 10_000,
            weak_links: vec!["pull".to_string(), "buffer".to_string()],
            log: false,
        }
    }
}

impl PathfinderConfig {
    /// Apply `TRELLIS_MAX_PATHS*` and `PATHFINDER_LOG` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unparseable numbers are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());
        if let Some(v) = number(ENV_MAX_PATHS) {
            self.max_paths = v;
        }
        if let Some(v) = number(ENV_MAX_PATHS_NO_NEW_WEAK) {
            self.max_paths_no_new_weak = v;
        }
        if let Some(v) = number(ENV_MAX_PATHS_NO_WEAK) {
            self.max_paths_no_weak = v;
        }
        if let Some(v) = lookup(ENV_LOG) {
            let v = v.trim();
            self.log = !v.is_empty() && v != "0";
        }
        self
    }

    pub fn is_weak_name(&self, name: &str) -> bool {
        self.weak_links.iter().any(|w| w == name)
    }
}
