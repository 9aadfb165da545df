//! Kernel configuration, read once before any entity exists.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::pathfinding::PathLimits;
use crate::pool::PoolCapacities;

/// Everything fixed at simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Seed for the simulation's random stream.
    pub seed: u64,
    /// Pool size per entity category.
    pub capacities: PoolCapacities,
    /// Pathfinder bounds.
    pub pathfinding: PathLimits,
}

impl KernelConfig {
    /// Default configuration with a specific seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Parse a RON document. Missing fields take their defaults.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|err| KernelError::ConfigParse {
            path: "<string>".to_string(),
            message: err.to_string(),
        })
    }

    /// Load a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        ron::from_str(&contents).map_err(|err| KernelError::ConfigParse {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = KernelConfig::from_ron_str("(seed: 99, capacities: (projectiles: 8))").unwrap();
        assert_eq!(config.seed, 99);
        assert_eq!(config.capacities.projectiles, 8);
        assert_eq!(config.capacities.infantry, 500);
        assert_eq!(config.pathfinding, PathLimits::default());
    }

    #[test]
    fn test_empty_document() {
        let config = KernelConfig::from_ron_str("()").unwrap();
        assert_eq!(config, KernelConfig::default());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = KernelConfig::from_ron_str("(seed: \"nope\")").unwrap_err();
        assert!(matches!(err, KernelError::ConfigParse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.ron");
        std::fs::write(&path, "(seed: 7, pathfinding: (max_iterations: 50))").unwrap();
        let config = KernelConfig::load(&path).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.pathfinding.max_iterations, 50);
        assert_eq!(config.pathfinding.max_path_length, 128);
    }
}
