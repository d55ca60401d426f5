// Stratified treatment-effect estimation
//
// Units are grouped by cluster label; within each cluster the outcome is
// regressed on the treatment. Clusters whose association is significant are
// kept, and their slopes are averaged with cluster-size weights into an
// average treatment effect (ATE).
//
// Implementation:
// - Regression statistics are computed in f64; p-values come from statrs'
//   Student's t distribution
// - Centroid means stay in f64 so reported coordinates match the embedding
// - `has_variance` is the one precondition deciding whether a cluster can be
//   regressed at all; clusters failing it are omitted, not zero-filled

mod aggregate;
mod deltas;
mod regression;
mod validity;

pub use aggregate::{average_treatment_effect, centroids, sample_std, Centroid, ControllingFor};
pub use deltas::{pair_deltas, top_interesting, PairDelta, PairSign};
pub use regression::{
    fit_cluster_stats, group_rows, has_variance, linregress, ClusterStats, ClusterStatsRow,
    ClusterStatsTable,
};
pub use validity::{
    significance_stars, valid_clusters, ValidityFilter, ValidityMode, NOISE_LABEL,
};
