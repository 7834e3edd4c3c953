use crate::cluster::Init;
use crate::error::{Result, SegmentationError};
use crate::preprocessing::Normalization;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Parameters of one pipeline run.
///
/// Every field has a default, so a JSON config file only needs the keys it
/// overrides:
///
/// ```json
/// { "n_clusters": 4, "normalization": "z-score", "seed": 7 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of clusters (k)
    pub n_clusters: usize,
    /// Feature scaling strategy
    pub normalization: Normalization,
    /// Centroid initialization method
    pub init: Init,
    /// Seed of the first K-Means restart
    pub seed: u64,
    /// Lloyd iteration cap per restart
    pub max_iter: usize,
    /// Number of seeded K-Means restarts
    pub n_init: usize,
    /// How many labeled customers the run report carries
    pub sample_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_clusters: 5,
            normalization: Normalization::MinMax,
            init: Init::KMeansPlusPlus,
            seed: 42,
            max_iter: 300,
            n_init: 10,
            sample_size: 20,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters;
        self
    }

    pub fn normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Checks parameters that do not depend on the data. The upper bound on
    /// `n_clusters` is checked against the dataset by K-Means itself.
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(SegmentationError::Config("n_clusters must be > 0".to_string()));
        }
        if self.max_iter == 0 {
            return Err(SegmentationError::Config("max_iter must be > 0".to_string()));
        }
        if self.n_init == 0 {
            return Err(SegmentationError::Config("n_init must be > 0".to_string()));
        }
        Ok(())
    }
}
