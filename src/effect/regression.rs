// Per-cluster ordinary least squares of outcome on treatment
//
// Every (cluster, outcome) pair gets one regression, provided both columns
// vary inside the cluster. Pairs without variance are left out of the table
// entirely so that "no estimate" never masquerades as a zero slope.
//
// P-values follow the usual two-sided t-test on the correlation coefficient
// with n - 2 degrees of freedom (Student's t from statrs).

use crate::error::{Result, VaineError};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::{BTreeMap, BTreeSet};

/// Keeps the t statistic finite when |r| == 1
const TINY: f64 = 1.0e-20;

/// Regression of one outcome on the treatment within one cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation, clipped to [-1, 1]
    pub rvalue: f64,
    /// Two-sided p-value for a zero slope
    pub pvalue: f64,
    /// Standard error of the slope
    pub stderr: f64,
}

/// One flattened entry of a [`ClusterStatsTable`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatsRow {
    pub cluster: i64,
    pub outcome: String,
    #[serde(flatten)]
    pub stats: ClusterStats,
}

/// Regression results keyed by (cluster, outcome)
///
/// A missing key means the cluster had no variance in the treatment or the
/// outcome; see [`has_variance`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterStatsTable {
    entries: BTreeMap<(i64, String), ClusterStats>,
}

impl ClusterStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cluster: i64, outcome: &str, stats: ClusterStats) {
        self.entries.insert((cluster, outcome.to_string()), stats);
    }

    pub fn get(&self, cluster: i64, outcome: &str) -> Option<&ClusterStats> {
        self.entries.get(&(cluster, outcome.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clusters with at least one entry, ascending
    pub fn clusters(&self) -> BTreeSet<i64> {
        self.entries.keys().map(|(c, _)| *c).collect()
    }

    /// Entries for one outcome, ordered by cluster
    pub fn for_outcome<'a>(
        &'a self,
        outcome: &'a str,
    ) -> impl Iterator<Item = (i64, &'a ClusterStats)> + 'a {
        self.entries
            .iter()
            .filter(move |((_, o), _)| o == outcome)
            .map(|((c, _), s)| (*c, s))
    }

    /// Flattened rows, ordered by cluster then outcome
    pub fn rows(&self) -> Vec<ClusterStatsRow> {
        self.entries
            .iter()
            .map(|((cluster, outcome), stats)| ClusterStatsRow {
                cluster: *cluster,
                outcome: outcome.clone(),
                stats: *stats,
            })
            .collect()
    }
}

/// Whether `column` restricted to `rows` can support a regression
///
/// Requires at least two rows, only finite values, and at least two distinct
/// values. This is the single precondition shared by fitting and filtering.
pub fn has_variance(column: &[f64], rows: &[usize]) -> bool {
    if rows.len() < 2 {
        return false;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &i in rows {
        let Some(&v) = column.get(i) else {
            return false;
        };
        if !v.is_finite() {
            return false;
        }
        min = min.min(v);
        max = max.max(v);
    }

    max > min
}

/// Least-squares fit of `y` on `x`
///
/// Returns `None` when either side lacks variance or lengths differ.
pub fn linregress(x: &[f64], y: &[f64]) -> Option<ClusterStats> {
    if x.len() != y.len() {
        return None;
    }
    let all: Vec<usize> = (0..x.len()).collect();
    if !has_variance(x, &all) || !has_variance(y, &all) {
        return None;
    }

    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;

    let (mut ssx, mut ssy, mut sxy) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ssx += dx * dx;
        ssy += dy * dy;
        sxy += dx * dy;
    }

    let rvalue = (sxy / (ssx * ssy).sqrt()).clamp(-1.0, 1.0);
    let slope = sxy / ssx;
    let intercept = y_mean - slope * x_mean;

    let (pvalue, stderr) = if x.len() == 2 {
        // A line through two distinct points is exact
        (0.0, 0.0)
    } else {
        let df = n - 2.0;
        let t = rvalue * (df / ((1.0 - rvalue + TINY) * (1.0 + rvalue + TINY))).sqrt();
        let dist = StudentsT::new(0.0, 1.0, df).ok()?;
        let pvalue = (2.0 * dist.cdf(-t.abs())).min(1.0);
        let stderr = ((1.0 - rvalue * rvalue).max(0.0) * ssy / ssx / df).sqrt();
        (pvalue, stderr)
    };

    Some(ClusterStats {
        slope,
        intercept,
        rvalue,
        pvalue,
        stderr,
    })
}

/// Row positions of each cluster, ordered by label
pub fn group_rows(labels: &[i64]) -> BTreeMap<i64, Vec<usize>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(i);
    }
    groups
}

/// Fit one regression per (cluster, outcome)
///
/// # Arguments
/// * `treatment` - Treatment value per unit
/// * `outcomes` - Named outcome columns, each aligned with `treatment`
/// * `labels` - Cluster label per unit
///
/// # Errors
/// `InsufficientData` for an empty treatment column, `ShapeMismatch` when an
/// outcome or the labels are not aligned with the treatment.
pub fn fit_cluster_stats(
    treatment: &[f64],
    outcomes: &[(&str, &[f64])],
    labels: &[i64],
) -> Result<ClusterStatsTable> {
    if treatment.is_empty() {
        return Err(VaineError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if labels.len() != treatment.len() {
        return Err(VaineError::ShapeMismatch {
            expected: treatment.len(),
            actual: labels.len(),
        });
    }
    for (_, column) in outcomes {
        if column.len() != treatment.len() {
            return Err(VaineError::ShapeMismatch {
                expected: treatment.len(),
                actual: column.len(),
            });
        }
    }

    let mut table = ClusterStatsTable::new();
    for (cluster, rows) in group_rows(labels) {
        if !has_variance(treatment, &rows) {
            tracing::debug!(
                "cluster {} omitted: no treatment variance across {} units",
                cluster,
                rows.len()
            );
            continue;
        }
        let x: Vec<f64> = rows.iter().map(|&i| treatment[i]).collect();

        for (name, column) in outcomes {
            if !has_variance(column, &rows) {
                tracing::debug!("cluster {} omitted for {}: no outcome variance", cluster, name);
                continue;
            }
            let y: Vec<f64> = rows.iter().map(|&i| column[i]).collect();
            if let Some(stats) = linregress(&x, &y) {
                table.insert(cluster, name, stats);
            }
        }
    }

    Ok(table)
}
