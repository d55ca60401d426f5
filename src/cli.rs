//! CLI argument parsing for vaine

use crate::config::AnalysisConfig;
use crate::effect::ValidityMode;
use crate::table::ColumnSelector;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the analysis report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

/// How p-values across outcomes combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// A cluster is valid if any outcome is significant
    Any,
    /// A cluster is valid only if every outcome is significant
    All,
}

impl From<Mode> for ValidityMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Any => ValidityMode::Any,
            Mode::All => ValidityMode::All,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "vaine")]
#[command(version)]
#[command(about = "Stratified treatment-effect estimation for natural experiments", long_about = None)]
pub struct Cli {
    /// Input table as JSON in split orientation ({"index", "columns", "data"})
    #[arg(short, long, value_name = "FILE")]
    pub data: PathBuf,

    /// Treatment column
    #[arg(
        short,
        long,
        value_name = "COLUMN",
        required_unless_present = "treatments",
        conflicts_with = "treatments"
    )]
    pub treatment: Option<String>,

    /// Analyse every treatment matching this pattern, one report each; the
    /// other matched treatments are left out of the covariates
    #[arg(long, value_name = "PATTERN")]
    pub treatments: Option<String>,

    /// Outcome columns: regex matched at the start of column names
    #[arg(short, long, value_name = "PATTERN")]
    pub outcomes: String,

    /// Columns to leave out of the covariates (regex, start-anchored)
    #[arg(short, long, value_name = "PATTERN")]
    pub ignore: Option<String>,

    /// Analysis configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Significance level for cluster validity (overrides config)
    #[arg(long, value_name = "ALPHA")]
    pub alpha: Option<f64>,

    /// Combine outcomes with any/all (overrides config)
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Number of k-means clusters (overrides config)
    #[arg(short = 'k', long = "clusters", value_name = "K")]
    pub clusters: Option<usize>,

    /// Random seed for embedding and clustering (overrides config)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Drop nearest-neighbor pairs longer than this distance
    #[arg(long = "pair-threshold", value_name = "DIST")]
    pub pair_threshold: Option<f64>,

    /// Precomputed cluster labels (JSON array of integers, one per row)
    #[arg(long, value_name = "FILE")]
    pub labels: Option<PathBuf>,

    /// Hierarchical merges (JSON array of [left, right] pairs) to flatten
    #[arg(long, value_name = "FILE")]
    pub merges: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug tracing output to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Treatment columns to analyse, as a selector over the table
    pub fn treatment_selector(&self) -> ColumnSelector {
        match (&self.treatment, &self.treatments) {
            (Some(column), _) => ColumnSelector::List(vec![column.clone()]),
            (None, Some(pattern)) => ColumnSelector::Pattern(pattern.clone()),
            (None, None) => ColumnSelector::List(Vec::new()),
        }
    }

    /// Apply command-line overrides on top of `config`
    pub fn apply_overrides(&self, mut config: AnalysisConfig) -> AnalysisConfig {
        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
        }
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(k) = self.clusters {
            config.n_clusters = k;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(threshold) = self.pair_threshold {
            config.pair_threshold = Some(threshold);
        }
        config
    }
}
