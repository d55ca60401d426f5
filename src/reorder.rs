//! Correlation-driven covariate ordering
//!
//! Reorders the columns of a table so that strongly correlated covariates sit
//! next to each other, which keeps parallel-coordinate and heatmap views
//! readable.
//!
//! # Strategy
//!
//! - **Exhaustive** (k <= `exact_limit`): every permutation is scored by the
//!   sum of correlations between neighbouring columns. Permutations are
//!   enumerated in lexicographic order and the first maximizer wins.
//! - **Spectral** (k > `exact_limit`, or `approx`): columns are nodes of a
//!   graph weighted by the (thresholded) correlation matrix. Each connected
//!   component is sorted by the Fiedler vector of its Laplacian `L = D - W`.
//!
//! The exhaustive search costs O(k!) so `exact_limit` is capped at
//! [`MAX_EXACT_LIMIT`].

use crate::error::{Result, VaineError};
use crate::table::Table;
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Largest accepted `exact_limit` (10! = 3,628,800 permutations)
pub const MAX_EXACT_LIMIT: usize = 10;

/// Entries below this magnitude are treated as zero in the Fiedler vector
const FIEDLER_EPS: f64 = 1.0e-12;

const EIGEN_MAX_ITER: usize = 10_000;

/// Options for [`reorder`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReorderOptions {
    /// Score with |r| so that strong negative correlations also attract
    pub absolute: bool,
    /// Correlations below this value are zeroed before scoring
    pub threshold: f64,
    /// Largest column count searched exhaustively
    pub exact_limit: usize,
    /// Score a linear chain (true) or a cycle that also joins last and first (false)
    pub split: bool,
    /// Always use the spectral ordering
    pub approx: bool,
}

impl Default for ReorderOptions {
    fn default() -> Self {
        Self {
            absolute: false,
            threshold: 0.0,
            exact_limit: 6,
            split: true,
            approx: false,
        }
    }
}

/// Which search produced an ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Exhaustive,
    Spectral,
}

/// Result of [`reorder`]
#[derive(Debug, Clone)]
pub struct Reordered {
    /// Input table with its columns permuted
    pub table: Table,
    /// Positions of the new columns in the input table
    pub order: Vec<usize>,
    /// Unmodified Pearson correlations, rows and columns in the new order
    pub correlation: Vec<Vec<f64>>,
    /// Adjacent-correlation score of the new order (thresholded matrix)
    pub score: f64,
    pub strategy: SearchStrategy,
}

impl Reordered {
    pub fn columns(&self) -> &[String] {
        self.table.columns()
    }
}

// Exact check: a rounded mean would leave tiny residuals and a spurious r
fn is_constant(values: &[f64]) -> bool {
    values.iter().all(|&v| v == values[0])
}

/// Pearson correlation; 0 when undefined (constant or non-finite input)
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() < 2 || is_constant(a) || is_constant(b) {
        return 0.0;
    }
    let n = a.len() as f64;
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;

    let (mut saa, mut sbb, mut sab) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        saa += dx * dx;
        sbb += dy * dy;
        sab += dx * dy;
    }

    let r = sab / (saa * sbb).sqrt();
    if r.is_finite() {
        r.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Pairwise Pearson matrix of `columns`, never containing NaN
///
/// The diagonal is 1 for columns that vary and 0 for constant ones.
pub fn correlation_matrix(columns: &[&[f64]]) -> Vec<Vec<f64>> {
    let k = columns.len();
    let mut matrix = vec![vec![0.0; k]; k];
    for i in 0..k {
        matrix[i][i] = pearson(columns[i], columns[i]);
        for j in (i + 1)..k {
            let r = pearson(columns[i], columns[j]);
            matrix[i][j] = r;
            matrix[j][i] = r;
        }
    }
    matrix
}

/// Sum of `matrix` entries between neighbouring positions of `order`
///
/// With `split == false` the last and first positions are neighbours too.
pub fn adjacent_score(matrix: &[Vec<f64>], order: &[usize], split: bool) -> f64 {
    let linear: f64 = order.windows(2).map(|w| matrix[w[1]][w[0]]).sum();
    if !split && order.len() > 1 {
        linear + matrix[order[0]][order[order.len() - 1]]
    } else {
        linear
    }
}

/// Rearrange `perm` into the next permutation in lexicographic order
fn next_permutation(perm: &mut [usize]) -> bool {
    if perm.len() < 2 {
        return false;
    }
    let mut i = perm.len() - 1;
    while i > 0 && perm[i - 1] >= perm[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    let mut j = perm.len() - 1;
    while perm[j] <= perm[i - 1] {
        j -= 1;
    }
    perm.swap(i - 1, j);
    perm[i..].reverse();
    true
}

/// Highest-scoring permutation, first in lexicographic order on ties
pub fn exhaustive_order(matrix: &[Vec<f64>], split: bool) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..matrix.len()).collect();
    let mut best = perm.clone();
    let mut best_score = adjacent_score(matrix, &perm, split);

    while next_permutation(&mut perm) {
        let score = adjacent_score(matrix, &perm, split);
        if score > best_score {
            best_score = score;
            best.clone_from(&perm);
        }
    }
    best
}

/// Connected components over non-zero off-diagonal weights
///
/// Components are ordered by their smallest member; members ascend.
fn connected_components(matrix: &[Vec<f64>]) -> Vec<Vec<usize>> {
    let k = matrix.len();
    let mut seen = vec![false; k];
    let mut components = Vec::new();

    for start in 0..k {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut stack = vec![start];
        let mut members = Vec::new();
        while let Some(node) = stack.pop() {
            members.push(node);
            for (next, &w) in matrix[node].iter().enumerate() {
                if next != node && w != 0.0 && !seen[next] {
                    seen[next] = true;
                    stack.push(next);
                }
            }
        }
        members.sort_unstable();
        components.push(members);
    }
    components
}

/// Fiedler vector of the Laplacian restricted to `members`
fn fiedler_vector(matrix: &[Vec<f64>], members: &[usize]) -> Option<Vec<f64>> {
    let m = members.len();
    let laplacian = DMatrix::from_fn(m, m, |a, b| {
        if a == b {
            members
                .iter()
                .filter(|&&other| other != members[a])
                .map(|&other| matrix[members[a]][other])
                .sum::<f64>()
        } else {
            -matrix[members[a]][members[b]]
        }
    });

    let eigen = SymmetricEigen::try_new(laplacian, f64::EPSILON, EIGEN_MAX_ITER)?;

    let mut by_value: Vec<usize> = (0..m).collect();
    by_value.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let column = by_value.get(1).copied()?;

    let mut fiedler: Vec<f64> = eigen.eigenvectors.column(column).iter().copied().collect();
    if fiedler
        .iter()
        .find(|v| v.abs() > FIEDLER_EPS)
        .is_some_and(|&v| v > 0.0)
    {
        fiedler.iter_mut().for_each(|v| *v = -*v);
    }
    Some(fiedler)
}

/// Spectral ordering of the columns of a weighted adjacency matrix
pub fn spectral_order(matrix: &[Vec<f64>]) -> Vec<usize> {
    let mut order = Vec::with_capacity(matrix.len());

    for members in connected_components(matrix) {
        if members.len() <= 2 {
            order.extend(members);
            continue;
        }

        match fiedler_vector(matrix, &members) {
            Some(fiedler) => {
                let mut ranked: Vec<(f64, usize)> = fiedler.into_iter().zip(members).collect();
                ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                order.extend(ranked.into_iter().map(|(_, c)| c));
            }
            None => {
                tracing::warn!(
                    "eigensolver did not converge for {} columns; keeping input order",
                    members.len()
                );
                order.extend(members);
            }
        }
    }
    order
}

/// Reorder the columns of `table` to maximise adjacent correlation
///
/// # Errors
/// `InvalidConfig` when `exact_limit` exceeds [`MAX_EXACT_LIMIT`].
pub fn reorder(table: &Table, options: &ReorderOptions) -> Result<Reordered> {
    if options.exact_limit > MAX_EXACT_LIMIT {
        return Err(VaineError::InvalidConfig(format!(
            "exact_limit must be <= {}, got {}",
            MAX_EXACT_LIMIT, options.exact_limit
        )));
    }

    let names = table.columns();
    let columns = names
        .iter()
        .map(|n| table.column(n))
        .collect::<Result<Vec<_>>>()?;
    let correlation = correlation_matrix(&columns);

    let modified: Vec<Vec<f64>> = correlation
        .iter()
        .map(|row| {
            row.iter()
                .map(|&r| if options.absolute { r.abs() } else { r })
                .map(|r| if r >= options.threshold { r } else { 0.0 })
                .collect()
        })
        .collect();

    let (order, strategy) = if options.approx || names.len() > options.exact_limit {
        if !options.approx {
            tracing::debug!(
                "{} columns exceed exact_limit {}; using spectral ordering",
                names.len(),
                options.exact_limit
            );
        }
        (spectral_order(&modified), SearchStrategy::Spectral)
    } else {
        (
            exhaustive_order(&modified, options.split),
            SearchStrategy::Exhaustive,
        )
    };

    let score = adjacent_score(&modified, &order, options.split);
    let new_names: Vec<String> = order.iter().map(|&i| names[i].clone()).collect();
    let permuted = order
        .iter()
        .map(|&i| order.iter().map(|&j| correlation[i][j]).collect())
        .collect();

    Ok(Reordered {
        table: table.select(&new_names)?,
        order,
        correlation: permuted,
        score,
        strategy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: Vec<(&str, Vec<f64>)>) -> Table {
        Table::from_columns(
            columns
                .into_iter()
                .map(|(n, v)| (n.to_string(), v))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_pearson_basic() {
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), 1.0);
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), -1.0);
    }

    #[test]
    fn test_pearson_zero_variance_is_zero() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(pearson(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(pearson(&[1.0, f64::NAN], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_correlation_matrix_constant_column() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let flat = [5.0, 5.0, 5.0, 5.0];
        let matrix = correlation_matrix(&[&a, &flat]);
        assert_eq!(matrix, vec![vec![1.0, 0.0], vec![0.0, 0.0]]);
    }

    #[test]
    fn test_next_permutation_lexicographic() {
        let mut perm = vec![0, 1, 2];
        let mut seen = vec![perm.clone()];
        while next_permutation(&mut perm) {
            seen.push(perm.clone());
        }
        assert_eq!(
            seen,
            vec![
                vec![0, 1, 2],
                vec![0, 2, 1],
                vec![1, 0, 2],
                vec![1, 2, 0],
                vec![2, 0, 1],
                vec![2, 1, 0],
            ]
        );
    }

    #[test]
    fn test_adjacent_score_linear_and_cyclic() {
        let m = vec![
            vec![0.0, 0.5, 0.1],
            vec![0.5, 0.0, 0.3],
            vec![0.1, 0.3, 0.0],
        ];
        assert!((adjacent_score(&m, &[0, 1, 2], true) - 0.8).abs() < 1e-12);
        assert!((adjacent_score(&m, &[0, 1, 2], false) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_exhaustive_places_correlated_columns_together() {
        let m = vec![
            vec![1.0, 0.0, 0.9, 0.0],
            vec![0.0, 1.0, 0.0, 0.8],
            vec![0.9, 0.0, 1.0, 0.7],
            vec![0.0, 0.8, 0.7, 1.0],
        ];
        let order = exhaustive_order(&m, true);
        // Best chain is 0-2-3-1 (0.9 + 0.7 + 0.8); its reverse ties, lexicographic first wins
        assert_eq!(order, vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_exhaustive_all_zero_keeps_identity() {
        let m = vec![vec![0.0; 4]; 4];
        assert_eq!(exhaustive_order(&m, false), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_spectral_recovers_chain() {
        // Path graph 0-3-1-4-2 with equal weights
        let mut m = vec![vec![0.0; 5]; 5];
        for (a, b) in [(0, 3), (3, 1), (1, 4), (4, 2)] {
            m[a][b] = 1.0;
            m[b][a] = 1.0;
        }
        let order = spectral_order(&m);
        let forward = vec![0, 3, 1, 4, 2];
        let backward: Vec<usize> = forward.iter().rev().copied().collect();
        assert!(order == forward || order == backward, "got {:?}", order);
    }

    #[test]
    fn test_spectral_disconnected_components() {
        // {0, 2} and {1} and {3, 4, 5} as a triangle
        let mut m = vec![vec![0.0; 6]; 6];
        m[0][2] = 0.5;
        m[2][0] = 0.5;
        for (a, b) in [(3, 4), (4, 5), (3, 5)] {
            m[a][b] = 0.9;
            m[b][a] = 0.9;
        }
        let order = spectral_order(&m);
        assert_eq!(&order[..3], &[0, 2, 1]);
        let mut tail = order[3..].to_vec();
        tail.sort_unstable();
        assert_eq!(tail, vec![3, 4, 5]);
    }

    #[test]
    fn test_reorder_small_table_is_exhaustive() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let t = table(vec![
            ("a", x.clone()),
            ("noise", vec![1.0, -1.0, 1.0, -1.0, 1.0]),
            ("b", x.iter().map(|v| v * 2.0 + 1.0).collect()),
        ]);
        let result = reorder(&t, &ReorderOptions::default()).unwrap();

        assert_eq!(result.strategy, SearchStrategy::Exhaustive);
        let cols = result.columns();
        let a = cols.iter().position(|c| c == "a").unwrap();
        let b = cols.iter().position(|c| c == "b").unwrap();
        assert_eq!(a.abs_diff(b), 1);
        assert_eq!(result.correlation[a][b], 1.0);
        assert_eq!(result.table.n_rows(), 5);
    }

    #[test]
    fn test_reorder_large_table_is_spectral() {
        let columns: Vec<(String, Vec<f64>)> = (0..8)
            .map(|i| {
                let values = (0..10).map(|r| ((r * (i + 1)) % 7) as f64).collect();
                (format!("c{}", i), values)
            })
            .collect();
        let t = Table::from_columns(columns).unwrap();
        let result = reorder(&t, &ReorderOptions::default()).unwrap();

        assert_eq!(result.strategy, SearchStrategy::Spectral);
        let mut order = result.order.clone();
        order.sort_unstable();
        assert_eq!(order, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_reorder_rejects_unbounded_search() {
        let t = table(vec![("a", vec![1.0, 2.0])]);
        let options = ReorderOptions {
            exact_limit: 11,
            ..ReorderOptions::default()
        };
        assert!(matches!(
            reorder(&t, &options),
            Err(VaineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_reorder_empty_and_single_column() {
        let empty = Table::from_columns(vec![]).unwrap();
        assert!(reorder(&empty, &ReorderOptions::default())
            .unwrap()
            .order
            .is_empty());

        let single = table(vec![("only", vec![1.0, 2.0, 3.0])]);
        let result = reorder(&single, &ReorderOptions::default()).unwrap();
        assert_eq!(result.columns(), &["only".to_string()]);
        assert_eq!(result.score, 0.0);
    }
}
