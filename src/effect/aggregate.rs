// Aggregation of per-cluster estimates
//
// The average treatment effect is the size-weighted mean of the slopes of
// the valid clusters: sum(slope_c * n_c) / sum(n_c).

use super::regression::{group_rows, ClusterStatsTable};
use crate::error::{Result, VaineError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Mean embedding coordinate and member count of one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub coords: Vec<f64>,
    pub n: usize,
}

/// Centroid of every cluster in `labels`
///
/// # Errors
/// `ShapeMismatch` when `embedding` and `labels` differ in length or the
/// embedding rows are ragged.
pub fn centroids(embedding: &[Vec<f64>], labels: &[i64]) -> Result<BTreeMap<i64, Centroid>> {
    if embedding.len() != labels.len() {
        return Err(VaineError::ShapeMismatch {
            expected: labels.len(),
            actual: embedding.len(),
        });
    }
    let dims = embedding.first().map(Vec::len).unwrap_or(0);
    if let Some(row) = embedding.iter().find(|r| r.len() != dims) {
        return Err(VaineError::ShapeMismatch {
            expected: dims,
            actual: row.len(),
        });
    }

    let mut out = BTreeMap::new();
    for (cluster, rows) in group_rows(labels) {
        let coords = (0..dims)
            .map(|d| rows.iter().map(|&i| embedding[i][d]).sum::<f64>() / rows.len() as f64)
            .collect();
        out.insert(
            cluster,
            Centroid {
                coords,
                n: rows.len(),
            },
        );
    }
    Ok(out)
}

/// Cluster-size weighted mean slope over `valid` clusters
///
/// Valid clusters without a regression for `outcome` or without a centroid
/// carry no weight.
///
/// # Errors
/// `NoValidClusters` when no valid cluster contributes. Callers usually map
/// this to "no estimate" rather than aborting.
pub fn average_treatment_effect(
    stats: &ClusterStatsTable,
    centroids: &BTreeMap<i64, Centroid>,
    outcome: &str,
    valid: &BTreeSet<i64>,
) -> Result<f64> {
    let weighted: Vec<(f64, usize)> = valid
        .iter()
        .filter_map(|&c| {
            let slope = stats.get(c, outcome)?.slope;
            let n = centroids.get(&c)?.n;
            Some((slope, n))
        })
        .filter(|&(_, n)| n > 0)
        .collect();

    let total: usize = weighted.iter().map(|&(_, n)| n).sum();
    if total == 0 {
        return Err(VaineError::NoValidClusters {
            outcome: outcome.to_string(),
        });
    }

    Ok(weighted
        .iter()
        .map(|&(slope, n)| slope * (n as f64 / total as f64))
        .sum())
}

/// Sample standard deviation (n - 1); `None` below two finite values
pub fn sample_std(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    Some((ss / (n - 1.0)).sqrt())
}

/// How tightly each cluster holds each covariate fixed
///
/// `ratios[cluster][j]` is the within-cluster standard deviation of
/// covariate `j` divided by its overall standard deviation. Values well
/// below 1 mean the cluster controls for that covariate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllingFor {
    pub covariates: Vec<String>,
    /// `None` for singleton clusters or covariates with no overall spread
    pub ratios: BTreeMap<i64, Vec<Option<f64>>>,
}

impl ControllingFor {
    /// Compute ratios for row-major `covariates` (`n_rows x names.len()`)
    pub fn compute(names: &[String], covariates: &[Vec<f64>], labels: &[i64]) -> Result<Self> {
        if covariates.len() != labels.len() {
            return Err(VaineError::ShapeMismatch {
                expected: labels.len(),
                actual: covariates.len(),
            });
        }
        if let Some(row) = covariates.iter().find(|r| r.len() != names.len()) {
            return Err(VaineError::ShapeMismatch {
                expected: names.len(),
                actual: row.len(),
            });
        }

        let overall: Vec<Option<f64>> = (0..names.len())
            .map(|j| sample_std(covariates.iter().map(|r| r[j])).filter(|s| *s > 0.0))
            .collect();

        let ratios: BTreeMap<i64, Vec<Option<f64>>> = group_rows(labels)
            .into_iter()
            .map(|(cluster, rows)| {
                let per_covariate: Vec<Option<f64>> = (0..names.len())
                    .map(|j| {
                        let within = sample_std(rows.iter().map(|&i| covariates[i][j]))?;
                        Some(within / overall[j]?)
                    })
                    .collect();
                (cluster, per_covariate)
            })
            .collect();

        Ok(Self {
            covariates: names.to_vec(),
            ratios,
        })
    }

    /// Mean ratio of each covariate across clusters, skipping missing values
    pub fn mean_ratios(&self) -> Vec<Option<f64>> {
        (0..self.covariates.len())
            .map(|j| {
                let values: Vec<f64> = self.ratios.values().filter_map(|r| r[j]).collect();
                if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
            })
            .collect()
    }

    /// Covariates held below their overall spread on average
    ///
    /// Sorted by ascending mean ratio; only the last `max_cols` (those closest
    /// to 1) are kept, which are the covariates a parallel-coordinates view
    /// still has room to show.
    pub fn controlled_covariates(&self, max_cols: usize) -> Vec<String> {
        let mut controlled: Vec<(f64, &String)> = self
            .mean_ratios()
            .into_iter()
            .zip(&self.covariates)
            .filter_map(|(r, name)| r.filter(|r| *r < 1.0).map(|r| (r, name)))
            .collect();
        controlled.sort_by(|a, b| a.0.total_cmp(&b.0));

        let skip = controlled.len().saturating_sub(max_cols);
        controlled
            .into_iter()
            .skip(skip)
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::ClusterStats;

    fn stats(slope: f64) -> ClusterStats {
        ClusterStats {
            slope,
            intercept: 0.0,
            rvalue: 0.9,
            pvalue: 0.01,
            stderr: 0.1,
        }
    }

    fn centroid(n: usize) -> Centroid {
        Centroid {
            coords: vec![0.0, 0.0],
            n,
        }
    }

    #[test]
    fn test_centroids() {
        let embedding = vec![
            vec![0.0, 0.0],
            vec![2.0, 2.0],
            vec![10.0, -4.0],
        ];
        let result = centroids(&embedding, &[5, 5, 9]).unwrap();
        assert_eq!(result[&5].n, 2);
        assert_eq!(result[&5].coords, vec![1.0, 1.0]);
        assert_eq!(result[&9].coords, vec![10.0, -4.0]);
    }

    #[test]
    fn test_centroids_keep_f64_precision() {
        let embedding = vec![vec![0.15, -2.7], vec![0.15, -2.7]];
        let result = centroids(&embedding, &[0, 0]).unwrap();
        assert_eq!(result[&0].coords, vec![0.15, -2.7]);
    }

    #[test]
    fn test_centroids_shape_mismatch() {
        assert!(matches!(
            centroids(&[vec![0.0, 0.0]], &[0, 1]),
            Err(VaineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_ate_weighted_by_size() {
        let mut table = ClusterStatsTable::new();
        table.insert(0, "y", stats(1.0));
        table.insert(1, "y", stats(4.0));
        let cents = BTreeMap::from([(0, centroid(3)), (1, centroid(1))]);

        let ate = average_treatment_effect(&table, &cents, "y", &BTreeSet::from([0, 1])).unwrap();
        assert!((ate - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_ate_single_cluster_is_its_slope() {
        let mut table = ClusterStatsTable::new();
        table.insert(3, "y", stats(0.1));
        for n in [1, 3, 7, 1000] {
            let cents = BTreeMap::from([(3, centroid(n))]);
            let ate = average_treatment_effect(&table, &cents, "y", &BTreeSet::from([3])).unwrap();
            assert_eq!(ate, 0.1);
        }
    }

    #[test]
    fn test_ate_no_valid_clusters() {
        let table = ClusterStatsTable::new();
        let result = average_treatment_effect(&table, &BTreeMap::new(), "y", &BTreeSet::new());
        assert_eq!(
            result,
            Err(VaineError::NoValidClusters {
                outcome: "y".to_string()
            })
        );
    }

    #[test]
    fn test_ate_ignores_clusters_without_stats() {
        let mut table = ClusterStatsTable::new();
        table.insert(0, "y", stats(2.0));
        let cents = BTreeMap::from([(0, centroid(2)), (1, centroid(50))]);
        let ate = average_treatment_effect(&table, &cents, "y", &BTreeSet::from([0, 1])).unwrap();
        assert_eq!(ate, 2.0);
    }

    #[test]
    fn test_sample_std() {
        assert_eq!(sample_std([1.0]), None);
        let s = sample_std([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((s - 2.138089935299395).abs() < 1e-12);
    }

    #[test]
    fn test_controlling_for_ratios() {
        let names = vec!["age".to_string(), "flat".to_string()];
        let rows = vec![
            vec![10.0, 1.0],
            vec![11.0, 1.0],
            vec![50.0, 1.0],
            vec![51.0, 1.0],
        ];
        let cf = ControllingFor::compute(&names, &rows, &[0, 0, 1, 1]).unwrap();

        let age0 = cf.ratios[&0][0].unwrap();
        assert!(age0 < 0.1);
        // Constant covariate has no overall spread
        assert_eq!(cf.ratios[&0][1], None);

        assert_eq!(cf.controlled_covariates(10), vec!["age".to_string()]);
    }
}
