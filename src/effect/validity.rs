// Validity filtering of clusters by regression p-value
//
// A cluster is valid for a set of outcomes when its p-values fall inside
// [min_p, max_p], combined across outcomes with "any" or "all". Clusters
// with no regression for an outcome never qualify through that outcome.

use super::regression::ClusterStatsTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label emitted by density-based clustering for unclustered units
pub const NOISE_LABEL: i64 = -1;

/// How p-values across several outcomes are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidityMode {
    /// At least one outcome qualifies
    #[default]
    Any,
    /// Every outcome qualifies
    All,
}

/// Query parameters for [`valid_clusters`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidityFilter {
    /// Lower p-value bound (inclusive)
    pub min_p: f64,
    /// Upper p-value bound (inclusive), the significance level
    pub max_p: f64,
    pub mode: ValidityMode,
    /// Clusters forced into the result
    pub include: BTreeSet<i64>,
    /// Clusters removed from the result, applied after `include`
    pub exclude: BTreeSet<i64>,
}

impl Default for ValidityFilter {
    fn default() -> Self {
        Self {
            min_p: 0.0,
            max_p: 0.05,
            mode: ValidityMode::Any,
            include: BTreeSet::new(),
            exclude: BTreeSet::new(),
        }
    }
}

impl ValidityFilter {
    /// Two-sided test at significance level `alpha`
    pub fn with_alpha(alpha: f64) -> Self {
        Self {
            max_p: alpha,
            ..Self::default()
        }
    }

    pub fn mode(mut self, mode: ValidityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn include(mut self, clusters: impl IntoIterator<Item = i64>) -> Self {
        self.include.extend(clusters);
        self
    }

    pub fn exclude(mut self, clusters: impl IntoIterator<Item = i64>) -> Self {
        self.exclude.extend(clusters);
        self
    }

    fn admits(&self, pvalue: f64) -> bool {
        pvalue >= self.min_p && pvalue <= self.max_p
    }
}

/// Clusters whose p-values for `outcomes` pass `filter`
///
/// The noise label is never selected by p-value; it can only enter through
/// `filter.include`. Included clusters bypass the p-value test but still need
/// a regression for at least one of `outcomes`. An empty outcome list selects
/// nothing.
pub fn valid_clusters<S: AsRef<str>>(
    stats: &ClusterStatsTable,
    outcomes: &[S],
    filter: &ValidityFilter,
) -> BTreeSet<i64> {
    let mut valid = BTreeSet::new();

    if !outcomes.is_empty() {
        for cluster in stats.clusters() {
            if cluster == NOISE_LABEL {
                continue;
            }

            let mut passes = outcomes.iter().map(|o| {
                stats
                    .get(cluster, o.as_ref())
                    .is_some_and(|s| filter.admits(s.pvalue))
            });

            let qualifies = match filter.mode {
                ValidityMode::Any => passes.any(|p| p),
                ValidityMode::All => passes.all(|p| p),
            };
            if qualifies {
                valid.insert(cluster);
            }
        }
    }

    valid.extend(filter.include.iter().copied().filter(|&cluster| {
        outcomes
            .iter()
            .any(|o| stats.get(cluster, o.as_ref()).is_some())
    }));
    valid.retain(|c| !filter.exclude.contains(c));
    valid
}

/// Conventional significance stars for a p-value
pub fn significance_stars(pvalue: f64) -> &'static str {
    match pvalue {
        p if p <= 0.001 => "***",
        p if p <= 0.01 => "**",
        p if p <= 0.05 => "*",
        _ => "",
    }
}
