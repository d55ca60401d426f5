//! Property-based tests for the core algorithms
//!
//! Covers:
//! 1. Merge-tree flattening and cutting
//! 2. Correlation reordering (stability, NaN-free correlations)
//! 3. Effect aggregation and validity bounds
//! 4. Nearest-neighbor pairing

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use vaine::effect::{
    average_treatment_effect, fit_cluster_stats, valid_clusters, Centroid, ClusterStats,
    ClusterStatsTable, ValidityFilter,
};
use vaine::hierarchy::{cut_tree, depth_to_root, flatten};
use vaine::pairs::PairFinder;
use vaine::reorder::{adjacent_score, correlation_matrix, reorder, ReorderOptions, SearchStrategy};
use vaine::table::Table;

/// Random valid merge list: repeatedly join two of the currently active nodes
fn merge_tree() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..40).prop_flat_map(|n| {
        let picks = prop::collection::vec((any::<prop::sample::Index>(), any::<prop::sample::Index>()), n - 1);
        (Just(n), picks)
    })
    .prop_map(|(n, picks)| {
        let mut active: Vec<usize> = (0..n).collect();
        let mut merges = Vec::with_capacity(n - 1);
        for (i, (a, b)) in picks.into_iter().enumerate() {
            let left = active.swap_remove(a.index(active.len()));
            let right = active.swap_remove(b.index(active.len()));
            merges.push((left, right));
            active.push(n + i);
        }
        (n, merges)
    })
}

fn columns(n_cols: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-100.0f64..100.0, 8), n_cols)
}

fn table_from(cols: Vec<Vec<f64>>) -> Table {
    Table::from_columns(
        cols.into_iter()
            .enumerate()
            .map(|(i, c)| (format!("c{}", i), c))
            .collect(),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_flatten_is_a_tree((n, merges) in merge_tree()) {
        let parents = flatten(&merges, n).unwrap();
        prop_assert_eq!(parents.len(), 2 * n - 1);

        // Only the root points to itself
        let roots: Vec<usize> = (0..parents.len()).filter(|&i| parents[i] == i).collect();
        prop_assert_eq!(roots, vec![2 * n - 2]);

        // Every internal node has exactly two children
        let mut children = vec![0usize; parents.len()];
        for (i, &p) in parents.iter().enumerate() {
            if p != i {
                children[p] += 1;
            }
        }
        for node in n..parents.len() {
            prop_assert_eq!(children[node], 2);
        }

        for leaf in 0..n {
            prop_assert!(depth_to_root(&parents, leaf).unwrap() <= n - 1);
        }
    }

    #[test]
    fn prop_cut_tree_yields_k_clusters((n, merges) in merge_tree(), k in 1usize..40) {
        prop_assume!(k <= n);
        let parents = flatten(&merges, n).unwrap();
        let cut = cut_tree(&parents, k).unwrap();

        prop_assert_eq!(cut.by_point.len(), n);
        prop_assert_eq!(cut.n_clusters(), k);
        let members: usize = cut.by_group.values().map(Vec::len).sum();
        prop_assert_eq!(members, n);
    }

    #[test]
    fn prop_flatten_rejects_truncated_merges((n, merges) in merge_tree()) {
        prop_assume!(n > 1);
        prop_assert!(flatten(&merges[..merges.len() - 1], n).is_err());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_reorder_absolute_is_stable(cols in (2usize..6).prop_flat_map(columns)) {
        let options = ReorderOptions { absolute: true, ..ReorderOptions::default() };
        let first = reorder(&table_from(cols), &options).unwrap();
        let second = reorder(&first.table, &options).unwrap();
        prop_assert!((first.score - second.score).abs() < 1e-9);
    }

    #[test]
    fn prop_spectral_reorder_absolute_is_stable(cols in (7usize..10).prop_flat_map(columns)) {
        let options = ReorderOptions { absolute: true, ..ReorderOptions::default() };
        let first = reorder(&table_from(cols), &options).unwrap();
        prop_assert_eq!(first.strategy, SearchStrategy::Spectral);
        let second = reorder(&first.table, &options).unwrap();
        prop_assert!((first.score - second.score).abs() < 1e-9);
    }

    #[test]
    fn prop_reorder_is_a_permutation(cols in (1usize..10).prop_flat_map(columns), approx in any::<bool>()) {
        let k = cols.len();
        let options = ReorderOptions { approx, ..ReorderOptions::default() };
        let result = reorder(&table_from(cols), &options).unwrap();

        let mut order = result.order.clone();
        order.sort_unstable();
        prop_assert_eq!(order, (0..k).collect::<Vec<_>>());
        prop_assert_eq!(result.correlation.len(), k);
    }

    #[test]
    fn prop_exhaustive_beats_identity(cols in (2usize..6).prop_flat_map(columns), split in any::<bool>()) {
        let refs: Vec<&[f64]> = cols.iter().map(Vec::as_slice).collect();
        let matrix = correlation_matrix(&refs);
        let identity: Vec<usize> = (0..cols.len()).collect();

        let options = ReorderOptions { split, ..ReorderOptions::default() };
        let result = reorder(&table_from(cols), &options).unwrap();
        prop_assert!(result.score >= adjacent_score(&matrix, &identity, split) - 1e-12);
    }

    #[test]
    fn prop_constant_columns_correlate_to_zero(
        varying in prop::collection::vec(-10.0f64..10.0, 8),
        constant in -10.0f64..10.0,
    ) {
        let flat = vec![constant; 8];
        let matrix = correlation_matrix(&[&varying, &flat, &flat]);
        for row in &matrix {
            for &r in row {
                prop_assert!(!r.is_nan());
            }
        }
        prop_assert_eq!(matrix[0][1], 0.0);
        prop_assert_eq!(matrix[1][2], 0.0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_single_cluster_ate_is_its_slope(slope in -50.0f64..50.0, n in 1usize..10_000, label in -5i64..50) {
        let mut stats = ClusterStatsTable::new();
        stats.insert(label, "y", ClusterStats {
            slope,
            intercept: 0.0,
            rvalue: 0.5,
            pvalue: 0.01,
            stderr: 0.1,
        });
        let centroids = BTreeMap::from([(label, Centroid { coords: vec![0.0, 0.0], n })]);
        let ate = average_treatment_effect(&stats, &centroids, "y", &BTreeSet::from([label])).unwrap();
        prop_assert_eq!(ate, slope);
    }

    #[test]
    fn prop_alpha_bounds(
        treatment in prop::collection::vec(-10.0f64..10.0, 12..40),
        seed in any::<u64>(),
    ) {
        let n = treatment.len();
        let outcome: Vec<f64> = treatment
            .iter()
            .enumerate()
            .map(|(i, t)| t * 0.5 + ((seed.wrapping_add(i as u64) % 7) as f64))
            .collect();
        let labels: Vec<i64> = (0..n).map(|i| (i % 3) as i64).collect();

        let stats = fit_cluster_stats(&treatment, &[("y", &outcome)], &labels).unwrap();
        let everything = valid_clusters(&stats, &["y"], &ValidityFilter::with_alpha(1.0));
        prop_assert_eq!(everything, stats.clusters());

        let smallest = stats.for_outcome("y").map(|(_, s)| s.pvalue).fold(f64::INFINITY, f64::min);
        if smallest > 0.0 {
            let below = ValidityFilter::with_alpha(smallest / 2.0);
            prop_assert!(valid_clusters(&stats, &["y"], &below).is_empty());
        }
    }

    #[test]
    fn prop_pairs_cover_every_unit(points in prop::collection::vec((-100.0f64..100.0, -100.0f64..100.0), 2..60)) {
        let features: Vec<Vec<f64>> = points.iter().map(|&(x, y)| vec![x, y]).collect();
        let finder = PairFinder::build(&features).unwrap();
        let edges = finder.edges(None);

        prop_assert!(edges.len() < features.len());
        prop_assert!(edges.len() >= features.len() / 2);

        let mut touched = vec![false; features.len()];
        for e in &edges {
            prop_assert!(e.source < e.target);
            touched[e.source] = true;
            touched[e.target] = true;
        }
        prop_assert!(touched.into_iter().all(|t| t));
    }
}
