//! Pipeline configuration
//!
//! Loaded from an optional YAML file; every field has a default so a partial
//! file (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Community detection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityStrategy {
    #[default]
    Louvain,
    Greedy,
}

/// What to do with catalog sections that no transition touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolatedSectionPolicy {
    /// Leave them without a community
    #[default]
    Unassigned,
    /// One community per isolated section, numbered after the graph's communities
    Singleton,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    pub strategy: CommunityStrategy,
    pub resolution: f64,
    pub isolated_sections: IsolatedSectionPolicy,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            strategy: CommunityStrategy::Louvain,
            resolution: 1.0,
            isolated_sections: IsolatedSectionPolicy::Unassigned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub min_clusters: usize,
    pub max_clusters: usize,
    /// Skip silhouette selection and always use this many clusters
    pub fixed_clusters: Option<usize>,
    pub n_init: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub basket_min_sections: usize,
    pub basket_max_sections: usize,
    pub min_items_per_section: usize,
    pub max_items_per_section: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_clusters: 3,
            max_clusters: 10,
            fixed_clusters: None,
            n_init: 10,
            max_iterations: 300,
            tolerance: 1e-4,
            basket_min_sections: 3,
            basket_max_sections: 5,
            min_items_per_section: 1,
            max_items_per_section: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub same_cluster_affinity: f64,
    pub cross_cluster_affinity: f64,
    /// Products each section can hold
    pub section_capacity: usize,
    /// Cluster peers named in a rationale before "+N others"
    pub rationale_peers: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            same_cluster_affinity: 10.0,
            cross_cluster_affinity: 0.1,
            section_capacity: 1,
            rationale_peers: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_path: PathBuf,
    pub seed: u64,
    pub communities: CommunityConfig,
    pub clustering: ClusteringConfig,
    pub layout: LayoutConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./shelfwise_data"),
            seed: 42,
            communities: CommunityConfig::default(),
            clustering: ClusteringConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as unit, not as an empty map
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.clustering;
        let l = &self.layout;

        if !(self.communities.resolution > 0.0 && self.communities.resolution.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "communities.resolution must be positive, got {}",
                self.communities.resolution
            )));
        }
        if c.min_clusters == 0 || c.min_clusters > c.max_clusters {
            return Err(ConfigError::Invalid(format!(
                "clustering range {}..={} is empty or starts at zero",
                c.min_clusters, c.max_clusters
            )));
        }
        if c.fixed_clusters == Some(0) {
            return Err(ConfigError::Invalid("clustering.fixed_clusters must be at least 1".into()));
        }
        if c.n_init == 0 || c.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "clustering.n_init and clustering.max_iterations must be at least 1".into(),
            ));
        }
        if !(c.tolerance >= 0.0) {
            return Err(ConfigError::Invalid("clustering.tolerance must be non-negative".into()));
        }
        if c.basket_min_sections == 0 || c.basket_min_sections > c.basket_max_sections {
            return Err(ConfigError::Invalid(format!(
                "basket window {}..={} is empty or starts at zero",
                c.basket_min_sections, c.basket_max_sections
            )));
        }
        if c.min_items_per_section == 0 || c.min_items_per_section > c.max_items_per_section {
            return Err(ConfigError::Invalid(format!(
                "items per section {}..={} is empty or starts at zero",
                c.min_items_per_section, c.max_items_per_section
            )));
        }
        if !(l.same_cluster_affinity >= 0.0 && l.cross_cluster_affinity >= 0.0) {
            return Err(ConfigError::Invalid("layout affinities must be non-negative".into()));
        }
        if l.section_capacity == 0 {
            return Err(ConfigError::Invalid("layout.section_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.clustering.min_clusters, 3);
        assert_eq!(config.clustering.max_clusters, 10);
        assert_eq!(config.layout.same_cluster_affinity, 10.0);
        assert_eq!(config.communities.strategy, CommunityStrategy::Louvain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::load(&temp_dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
seed: 7
communities:
  strategy: greedy
  isolated_sections: singleton
layout:
  section_capacity: 4
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.communities.strategy, CommunityStrategy::Greedy);
        assert_eq!(config.communities.isolated_sections, IsolatedSectionPolicy::Singleton);
        assert_eq!(config.communities.resolution, 1.0);
        assert_eq!(config.layout.section_capacity, 4);
        assert_eq!(config.clustering, ClusteringConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shelfwise.yaml");
        std::fs::write(&path, "clustering:\n  fixed_clusters: 2\n").unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.clustering.fixed_clusters, Some(2));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut config = PipelineConfig::default();
        config.clustering.min_clusters = 6;
        config.clustering.max_clusters = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = PipelineConfig::default();
        config.layout.section_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.communities.resolution = 0.0;
        assert!(config.validate().is_err());
    }
}
