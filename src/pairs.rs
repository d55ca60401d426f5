//! Nearest-neighbor pairing of units
//!
//! Every unit is joined to its single nearest neighbor by Euclidean distance.
//! The resulting graph is undirected: when two units are each other's nearest
//! neighbor the edge is stored once.
//!
//! # Determinism
//!
//! Ties are broken by input order: the lowest-indexed candidate at the
//! minimal distance wins. Edges are stored as `(min, max)` and sorted, so
//! identical input always yields identical output.
//!
//! # Example
//!
//! ```
//! use vaine::pairs::PairFinder;
//!
//! # fn main() -> vaine::error::Result<()> {
//! let features = vec![vec![0.0], vec![1.0], vec![2.0], vec![10.0]];
//! let finder = PairFinder::build(&features)?;
//!
//! assert_eq!(finder.edges(None).len(), 3);
//! assert_eq!(finder.edges(Some(5.0)).len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::error::{check_finite, Result, VaineError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An edge between two units (row positions) and its length
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub source: usize,
    pub target: usize,
    pub distance: f64,
}

/// Undirected 1-nearest-neighbor graph over a feature matrix
#[derive(Debug, Clone)]
pub struct PairFinder {
    n_units: usize,
    /// Sorted by (source, target), source < target
    edges: Vec<Pair>,
}

impl PairFinder {
    /// Build the graph from row-major features
    ///
    /// # Errors
    /// * `InsufficientData` with fewer than two rows
    /// * `ShapeMismatch` when rows differ in width
    /// * `NonFiniteFeature` for a NaN or infinite coordinate
    pub fn build(features: &[Vec<f64>]) -> Result<Self> {
        if features.len() < 2 {
            return Err(VaineError::InsufficientData {
                required: 2,
                actual: features.len(),
            });
        }
        let width = features[0].len();
        if let Some(row) = features.iter().find(|r| r.len() != width) {
            return Err(VaineError::ShapeMismatch {
                expected: width,
                actual: row.len(),
            });
        }
        check_finite(features)?;

        let mut unique: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (i, row) in features.iter().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for (j, other) in features.iter().enumerate() {
                if i == j {
                    continue;
                }
                let d = euclidean(row, other);
                // Strict comparison keeps the first candidate on ties
                if best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((j, d));
                }
            }

            if let Some((j, d)) = best {
                unique.entry((i.min(j), i.max(j))).or_insert(d);
            }
        }

        let edges = unique
            .into_iter()
            .map(|((source, target), distance)| Pair {
                source,
                target,
                distance,
            })
            .collect();

        Ok(Self {
            n_units: features.len(),
            edges,
        })
    }

    pub fn n_units(&self) -> usize {
        self.n_units
    }

    /// Edges no longer than `threshold` (all edges for `None`)
    pub fn edges(&self, threshold: Option<f64>) -> Vec<Pair> {
        self.edges
            .iter()
            .filter(|p| threshold.map_or(true, |t| p.distance <= t))
            .copied()
            .collect()
    }

    /// Every edge length, in edge order
    pub fn distances(&self) -> Vec<f64> {
        self.edges.iter().map(|p| p.distance).collect()
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
