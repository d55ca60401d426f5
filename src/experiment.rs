//! Natural-experiment orchestration
//!
//! [`NaturalExperiment`] wires the pieces together for one treatment:
//!
//! 1. drop ignored columns (never the treatment)
//! 2. build the feature matrix from the covariates, standardized unless a
//!    latent representation is supplied
//! 3. embed the features and cluster the embedding (unless labels are given)
//! 4. fit per-cluster regressions and centroids
//! 5. pair every unit with its nearest neighbor in feature space
//!
//! The result is an immutable snapshot; every query below is a pure function
//! of it.

use crate::config::{AnalysisConfig, DEFAULT_SEED};
use crate::effect::{
    self, average_treatment_effect, centroids, fit_cluster_stats, pair_deltas, top_interesting,
    Centroid, ClusterStatsRow, ClusterStatsTable, ControllingFor, PairDelta, ValidityFilter,
};
use crate::embedding::{standardize, Clusterer, Embedder, KMeansClusterer, PcaEmbedder};
use crate::error::{Result, VaineError};
use crate::hierarchy::flatten;
use crate::pairs::{Pair, PairFinder};
use crate::reorder::{reorder, ReorderOptions, Reordered};
use crate::table::{resolve_columns, ColumnSelector, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Builder for [`NaturalExperiment`]
pub struct NaturalExperimentBuilder {
    table: Table,
    treatment: String,
    outcomes: ColumnSelector,
    ignore: Option<ColumnSelector>,
    latent: Option<Vec<Vec<f64>>>,
    clusters: Option<Vec<i64>>,
    embedder: Box<dyn Embedder>,
    clusterer: Box<dyn Clusterer>,
    seed: u64,
    standardize: bool,
}

impl NaturalExperimentBuilder {
    pub fn new(
        table: Table,
        treatment: impl Into<String>,
        outcomes: impl Into<ColumnSelector>,
    ) -> Self {
        Self {
            table,
            treatment: treatment.into(),
            outcomes: outcomes.into(),
            ignore: None,
            latent: None,
            clusters: None,
            embedder: Box::new(PcaEmbedder::default()),
            clusterer: Box::new(KMeansClusterer::default()),
            seed: DEFAULT_SEED,
            standardize: true,
        }
    }

    /// Columns left out of the analysis; the treatment is always kept
    pub fn ignore(mut self, selector: impl Into<ColumnSelector>) -> Self {
        self.ignore = Some(selector.into());
        self
    }

    /// Use these rows as the feature matrix instead of the covariates
    pub fn latent_representation(mut self, rows: Vec<Vec<f64>>) -> Self {
        self.latent = Some(rows);
        self
    }

    /// Use precomputed cluster labels instead of running the clusterer
    pub fn clusters(mut self, labels: Vec<i64>) -> Self {
        self.clusters = Some(labels);
        self
    }

    pub fn embedder(mut self, embedder: impl Embedder + 'static) -> Self {
        self.embedder = Box::new(embedder);
        self
    }

    pub fn clusterer(mut self, clusterer: impl Clusterer + 'static) -> Self {
        self.clusterer = Box::new(clusterer);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    /// Apply the clustering and seed settings of a configuration
    pub fn config(self, config: &AnalysisConfig) -> Self {
        self.clusterer(KMeansClusterer {
            n_clusters: config.n_clusters,
        })
        .seed(config.seed)
        .standardize(config.standardize)
    }

    /// Run the pipeline
    ///
    /// # Errors
    /// * `UnknownColumn` when the treatment is missing
    /// * column resolution errors for `outcomes` and `ignore`
    /// * `InvalidTable` when no covariates remain and no latent
    ///   representation was supplied
    /// * `ShapeMismatch` when supplied latent rows or labels do not match
    ///   the table
    /// * embedding, clustering and pairing errors
    pub fn build(self) -> Result<NaturalExperiment> {
        let treatment = self.treatment;
        if !self.table.has_column(&treatment) {
            return Err(VaineError::UnknownColumn(treatment));
        }

        let ignored: Vec<String> = match &self.ignore {
            Some(ColumnSelector::List(list)) if list.is_empty() => Vec::new(),
            Some(selector) => resolve_columns(selector, self.table.columns())?
                .into_iter()
                .filter(|c| *c != treatment)
                .collect(),
            None => Vec::new(),
        };
        let data = self.table.drop_columns(&ignored);

        let outcomes: Vec<String> = match &self.outcomes {
            ColumnSelector::List(list) if list.is_empty() => Vec::new(),
            selector => resolve_columns(selector, data.columns())?
                .into_iter()
                .filter(|c| *c != treatment)
                .collect(),
        };
        if outcomes.is_empty() {
            tracing::warn!("No outcomes were passed");
        }

        let covariates: Vec<String> = data
            .columns()
            .iter()
            .filter(|c| **c != treatment && !outcomes.contains(*c))
            .cloned()
            .collect();

        let n_rows = data.n_rows();
        let features = match self.latent {
            Some(rows) => {
                if rows.len() != n_rows {
                    return Err(VaineError::ShapeMismatch {
                        expected: n_rows,
                        actual: rows.len(),
                    });
                }
                rows
            }
            None => {
                if covariates.is_empty() {
                    return Err(VaineError::InvalidTable(
                        "no covariate columns remain after removing treatment, outcomes and ignored columns"
                            .to_string(),
                    ));
                }
                let rows = data.rows(&covariates)?;
                if self.standardize {
                    standardize(&rows)?
                } else {
                    rows
                }
            }
        };

        let embedding = self.embedder.fit_transform(&features, self.seed)?;
        if embedding.len() != n_rows {
            return Err(VaineError::EmbeddingError(format!(
                "embedder returned {} rows for {} units",
                embedding.len(),
                n_rows
            )));
        }

        let labels = match self.clusters {
            Some(labels) => labels,
            None => self.clusterer.fit_predict(&embedding, self.seed)?,
        };
        if labels.len() != n_rows {
            return Err(VaineError::ShapeMismatch {
                expected: n_rows,
                actual: labels.len(),
            });
        }

        let outcome_columns = outcomes
            .iter()
            .map(|o| Ok((o.as_str(), data.column(o)?)))
            .collect::<Result<Vec<_>>>()?;
        let stats = fit_cluster_stats(data.column(&treatment)?, &outcome_columns, &labels)?;
        let centroids = centroids(&embedding, &labels)?;
        let pairs = PairFinder::build(&features)?;

        tracing::debug!(
            "natural experiment for {}: {} units, {} covariates, {} clusters, {} pairs",
            treatment,
            n_rows,
            covariates.len(),
            centroids.len(),
            pairs.edges(None).len()
        );

        Ok(NaturalExperiment {
            data,
            treatment,
            outcomes,
            covariates,
            features,
            embedding,
            labels,
            stats,
            centroids,
            pairs,
        })
    }
}

/// Snapshot of one stratified analysis
#[derive(Debug, Clone)]
pub struct NaturalExperiment {
    data: Table,
    treatment: String,
    outcomes: Vec<String>,
    covariates: Vec<String>,
    features: Vec<Vec<f64>>,
    embedding: Vec<Vec<f64>>,
    labels: Vec<i64>,
    stats: ClusterStatsTable,
    centroids: BTreeMap<i64, Centroid>,
    pairs: PairFinder,
}

impl NaturalExperiment {
    pub fn builder(
        table: Table,
        treatment: impl Into<String>,
        outcomes: impl Into<ColumnSelector>,
    ) -> NaturalExperimentBuilder {
        NaturalExperimentBuilder::new(table, treatment, outcomes)
    }

    pub fn treatment(&self) -> &str {
        &self.treatment
    }

    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    pub fn covariates(&self) -> &[String] {
        &self.covariates
    }

    /// The table after ignored columns were dropped
    pub fn data(&self) -> &Table {
        &self.data
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn embedding(&self) -> &[Vec<f64>] {
        &self.embedding
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn stats(&self) -> &ClusterStatsTable {
        &self.stats
    }

    pub fn centroids(&self) -> &BTreeMap<i64, Centroid> {
        &self.centroids
    }

    fn check_outcome(&self, outcome: &str) -> Result<()> {
        if self.outcomes.iter().any(|o| o == outcome) {
            Ok(())
        } else {
            Err(VaineError::UnknownColumn(outcome.to_string()))
        }
    }

    /// Valid clusters across `outcomes`
    pub fn valid_clusters<S: AsRef<str>>(
        &self,
        outcomes: &[S],
        filter: &ValidityFilter,
    ) -> BTreeSet<i64> {
        effect::valid_clusters(&self.stats, outcomes, filter)
    }

    /// Valid clusters across every outcome
    pub fn valid_clusters_all(&self, filter: &ValidityFilter) -> BTreeSet<i64> {
        self.valid_clusters(self.outcomes.as_slice(), filter)
    }

    /// Weighted ATE for `outcome`; `None` when no cluster is valid
    ///
    /// # Errors
    /// `UnknownColumn` when `outcome` is not one of the analysed outcomes.
    pub fn average_treatment_effect(
        &self,
        outcome: &str,
        filter: &ValidityFilter,
    ) -> Result<Option<f64>> {
        self.check_outcome(outcome)?;
        let valid = self.valid_clusters(&[outcome], filter);

        match average_treatment_effect(&self.stats, &self.centroids, outcome, &valid) {
            Ok(ate) => Ok(Some(ate)),
            Err(VaineError::NoValidClusters { .. }) => {
                tracing::warn!(
                    "No clusters are valid for {}. Consider increasing alpha or un-excluding clusters",
                    outcome
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Nearest-neighbor pairs no longer than `threshold`
    pub fn pairs(&self, threshold: Option<f64>) -> Vec<Pair> {
        self.pairs.edges(threshold)
    }

    /// Every nearest-neighbor distance
    pub fn distances(&self) -> Vec<f64> {
        self.pairs.distances()
    }

    /// Treatment and outcome deltas across `pairs`
    ///
    /// # Errors
    /// `UnknownColumn` for an outcome that was not analysed.
    pub fn describe_pairs(
        &self,
        pairs: &[Pair],
        outcome: &str,
        min_treatment_delta: f64,
        min_outcome_delta: f64,
    ) -> Result<Vec<PairDelta>> {
        self.check_outcome(outcome)?;
        pair_deltas(
            pairs,
            self.data.column(&self.treatment)?,
            self.data.column(outcome)?,
            min_treatment_delta,
            min_outcome_delta,
        )
    }

    /// Within-cluster spread of each covariate relative to its overall spread
    pub fn controlling_for(&self) -> Result<ControllingFor> {
        let rows = self.data.rows(&self.covariates)?;
        ControllingFor::compute(&self.covariates, &rows, &self.labels)
    }

    /// Covariates ordered so correlated ones are adjacent
    pub fn reorder_covariates(&self, options: &ReorderOptions) -> Result<Reordered> {
        reorder(&self.data.select(&self.covariates)?, options)
    }

    /// Everything the analysis knows, for every outcome
    pub fn report(&self, config: &AnalysisConfig) -> Result<Report> {
        let filter = config.validity_filter();
        let everything = ValidityFilter::with_alpha(1.0);
        let pairs = self.pairs(config.pair_threshold);

        let mut outcomes = Vec::with_capacity(self.outcomes.len());
        for outcome in &self.outcomes {
            let deltas = self.describe_pairs(
                &pairs,
                outcome,
                config.min_treatment_delta,
                config.min_outcome_delta,
            )?;

            outcomes.push(OutcomeReport {
                outcome: outcome.clone(),
                stats: self
                    .stats
                    .rows()
                    .into_iter()
                    .filter(|r| r.outcome == *outcome)
                    .collect(),
                valid_clusters: self.valid_clusters(&[outcome], &filter).into_iter().collect(),
                ate: self.average_treatment_effect(outcome, &filter)?,
                ate_all_clusters: self.average_treatment_effect(outcome, &everything)?,
                interesting_pairs: deltas.iter().filter(|d| d.interesting).count(),
                top_pairs: top_interesting(&deltas, config.annotate)
                    .into_iter()
                    .map(|delta| AnnotatedPair {
                        source_id: self.data.index()[delta.source].clone(),
                        target_id: self.data.index()[delta.target].clone(),
                        delta,
                    })
                    .collect(),
            });
        }

        let covariate_order = if self.covariates.is_empty() {
            Vec::new()
        } else {
            self.reorder_covariates(&config.reorder)?.columns().to_vec()
        };
        let controlled_covariates = if self.covariates.is_empty() {
            Vec::new()
        } else {
            self.controlling_for()?
                .controlled_covariates(config.max_controlled)
        };

        Ok(Report {
            treatment: self.treatment.clone(),
            n_units: self.data.n_rows(),
            n_clusters: self.centroids.len(),
            n_pairs: pairs.len(),
            centroids: self.centroids.clone(),
            outcomes,
            covariate_order,
            controlled_covariates,
            projection: None,
        })
    }
}

/// Per-outcome section of a [`Report`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub outcome: String,
    pub stats: Vec<ClusterStatsRow>,
    pub valid_clusters: Vec<i64>,
    /// `null` when no cluster is valid
    pub ate: Option<f64>,
    /// ATE over every cluster with a regression (alpha = 1)
    pub ate_all_clusters: Option<f64>,
    pub interesting_pairs: usize,
    /// Most striking interesting pairs, largest outcome change last
    pub top_pairs: Vec<AnnotatedPair>,
}

/// A pair delta labelled with the unit identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedPair {
    pub source_id: String,
    pub target_id: String,
    #[serde(flatten)]
    pub delta: PairDelta,
}

/// Serializable summary of a [`NaturalExperiment`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub treatment: String,
    pub n_units: usize,
    pub n_clusters: usize,
    pub n_pairs: usize,
    pub centroids: BTreeMap<i64, Centroid>,
    pub outcomes: Vec<OutcomeReport>,
    pub covariate_order: Vec<String>,
    pub controlled_covariates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
}

/// 2-D points plus a parent-pointer hierarchy over the same units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub points: Vec<Vec<f64>>,
    pub parents: Vec<usize>,
}

/// Project `features` to 2-D and attach the hierarchy given by `merges`
///
/// Features no wider than two columns are used as the points directly.
///
/// # Errors
/// Embedding errors, or `MalformedTree` when `merges` does not describe a
/// binary tree over the rows of `features`.
pub fn project_and_cluster(
    features: &[Vec<f64>],
    embedder: &dyn Embedder,
    merges: &[(usize, usize)],
    seed: u64,
) -> Result<Projection> {
    let parents = flatten(merges, features.len())?;
    let points = if features.first().map_or(0, Vec::len) > 2 {
        embedder.fit_transform(features, seed)?
    } else {
        features.to_vec()
    };
    Ok(Projection { points, parents })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::PassthroughEmbedder;

    fn table() -> Table {
        Table::from_columns(vec![
            ("age".to_string(), vec![1.0, 1.1, 1.2, 5.0, 5.1, 5.2]),
            ("Treatment".to_string(), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]),
            ("Outcome.a".to_string(), vec![2.0, 4.1, 5.9, 3.0, 2.0, 1.1]),
            ("Outcome.b".to_string(), vec![1.0, 1.0, 1.0, 0.0, 0.5, 2.0]),
            ("id".to_string(), vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0]),
        ])
        .unwrap()
    }

    fn experiment() -> NaturalExperiment {
        NaturalExperiment::builder(table(), "Treatment", "Outcome")
            .ignore(vec!["id".to_string(), "Treatment".to_string()])
            .embedder(PassthroughEmbedder)
            .clusters(vec![0, 0, 0, 1, 1, 1])
            .build()
            .unwrap()
    }

    #[test]
    fn test_columns_are_partitioned() {
        let ne = experiment();
        assert_eq!(ne.treatment(), "Treatment");
        assert_eq!(ne.outcomes(), &["Outcome.a".to_string(), "Outcome.b".to_string()]);
        assert_eq!(ne.covariates(), &["age".to_string()]);
        assert!(ne.data().has_column("Treatment"));
        assert!(!ne.data().has_column("id"));
    }

    #[test]
    fn test_flat_outcome_cluster_is_omitted() {
        let ne = experiment();
        assert!(ne.stats().get(0, "Outcome.b").is_none());
        assert!(ne.stats().get(1, "Outcome.b").is_some());
        assert_eq!(ne.centroids()[&0].n, 3);
    }

    #[test]
    fn test_unknown_outcome_is_rejected() {
        let ne = experiment();
        let result = ne.average_treatment_effect("age", &ValidityFilter::default());
        assert!(matches!(result, Err(VaineError::UnknownColumn(_))));
    }

    #[test]
    fn test_missing_treatment() {
        let result = NaturalExperiment::builder(table(), "Dose", "Outcome").build();
        assert_eq!(
            result.unwrap_err(),
            VaineError::UnknownColumn("Dose".to_string())
        );
    }

    #[test]
    fn test_latent_shape_is_checked() {
        let result = NaturalExperiment::builder(table(), "Treatment", "Outcome")
            .latent_representation(vec![vec![0.0]; 2])
            .build();
        assert!(matches!(result, Err(VaineError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_no_outcomes_still_builds() {
        let ne = NaturalExperiment::builder(table(), "Treatment", Vec::<String>::new())
            .embedder(PassthroughEmbedder)
            .clusters(vec![0; 6])
            .build()
            .unwrap();
        assert!(ne.outcomes().is_empty());
        assert!(ne.stats().is_empty());
        assert!(ne.valid_clusters_all(&ValidityFilter::default()).is_empty());
    }

    #[test]
    fn test_project_and_cluster_narrow_features() {
        let features = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0]];
        let projection =
            project_and_cluster(&features, &PassthroughEmbedder, &[(0, 1), (2, 3)], 0).unwrap();
        assert_eq!(projection.points, features);
        assert_eq!(projection.parents, vec![3, 3, 4, 4, 4]);
    }

    #[test]
    fn test_project_and_cluster_rejects_bad_tree() {
        let features = vec![vec![0.0], vec![1.0], vec![2.0]];
        let result = project_and_cluster(&features, &PassthroughEmbedder, &[(0, 1)], 0);
        assert!(matches!(result, Err(VaineError::MalformedTree(_))));
    }
}
