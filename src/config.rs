// Configuration for a natural-experiment analysis
//
// Every knob the pipeline exposes lives here so that one TOML file can pin an
// analysis down completely (seed included). Command-line flags override the
// file field by field.

use crate::effect::{ValidityFilter, ValidityMode};
use crate::reorder::{ReorderOptions, MAX_EXACT_LIMIT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Seed used when none is configured
pub const DEFAULT_SEED: u64 = 1234567890;

/// Configuration for natural-experiment analysis
///
/// # Example
/// ```
/// use vaine::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.alpha, 0.05);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Significance level: clusters with p <= alpha are valid
    pub alpha: f64,

    /// How p-values across several outcomes combine
    pub mode: ValidityMode,

    /// Clusters always treated as valid
    pub include: Vec<i64>,

    /// Clusters never treated as valid (wins over `include`)
    pub exclude: Vec<i64>,

    /// Number of strata for the default k-means clusterer
    pub n_clusters: usize,

    /// Random state passed to the embedder and clusterer
    pub seed: u64,

    /// Standardize covariates before embedding
    pub standardize: bool,

    /// Longest nearest-neighbor edge kept as a pair (None = all)
    pub pair_threshold: Option<f64>,

    /// Smallest |treatment delta| for an interesting pair
    pub min_treatment_delta: f64,

    /// Smallest |outcome delta| for an interesting pair
    pub min_outcome_delta: f64,

    /// Interesting pairs reported per outcome
    pub annotate: usize,

    /// Controlled covariates reported at most
    pub max_controlled: usize,

    pub reorder: ReorderOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            mode: ValidityMode::Any,
            include: Vec::new(),
            exclude: Vec::new(),
            n_clusters: 8,
            seed: DEFAULT_SEED,
            standardize: true,
            pair_threshold: None,
            min_treatment_delta: 0.0,
            min_outcome_delta: 0.0,
            annotate: 1,
            max_controlled: 15,
            reorder: ReorderOptions::default(),
        }
    }
}

impl AnalysisConfig {
    /// 99% confidence, every outcome must agree
    pub fn strict() -> Self {
        Self {
            alpha: 0.01,
            mode: ValidityMode::All,
            ..Self::default()
        }
    }

    /// 90% confidence, any outcome suffices
    pub fn permissive() -> Self {
        Self {
            alpha: 0.10,
            mode: ValidityMode::Any,
            ..Self::default()
        }
    }

    /// Load from a TOML file; missing keys take their defaults
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).context("Failed to parse TOML analysis configuration")?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid analysis configuration: {}", e))?;
        Ok(config)
    }

    /// Validity query matching this configuration
    pub fn validity_filter(&self) -> ValidityFilter {
        ValidityFilter::with_alpha(self.alpha)
            .mode(self.mode)
            .include(self.include.iter().copied())
            .exclude(self.exclude.iter().copied())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(format!("alpha must be in [0, 1], got {}", self.alpha));
        }

        if self.n_clusters == 0 {
            return Err("n_clusters must be at least 1".to_string());
        }

        if let Some(t) = self.pair_threshold {
            if t.is_nan() || t < 0.0 {
                return Err(format!("pair_threshold must be non-negative, got {}", t));
            }
        }

        if self.min_treatment_delta < 0.0 || self.min_outcome_delta < 0.0 {
            return Err(format!(
                "minimum deltas must be non-negative, got {} and {}",
                self.min_treatment_delta, self.min_outcome_delta
            ));
        }

        if self.reorder.exact_limit > MAX_EXACT_LIMIT {
            return Err(format!(
                "reorder.exact_limit must be <= {}, got {}",
                MAX_EXACT_LIMIT, self.reorder.exact_limit
            ));
        }

        Ok(())
    }
}
