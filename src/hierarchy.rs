//! Merge-tree flattening and cutting
//!
//! Agglomerative clustering reports its hierarchy as a list of merges: merge
//! `i` joins two existing nodes into the new internal node `n + i`, where `n`
//! is the number of leaves. Presentation code wants the same tree as a flat
//! array of parent pointers instead, which is what [`flatten`] produces.
//!
//! [`cut_tree`] then removes the top `k - 1` merges to obtain `k` flat
//! clusters without re-running the clustering.

use crate::error::{Result, VaineError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Convert a merge list into a parent-pointer array of length `2n - 1`
///
/// Leaves are `0..n`, merge `i` creates node `n + i`, and the root (the last
/// node) points to itself.
///
/// # Errors
///
/// Returns `MalformedTree` if:
/// - `n_leaves` is zero
/// - there are not exactly `n_leaves - 1` merges
/// - a merge refers to a node that does not exist yet
/// - a merge joins a node with itself
/// - a node is merged twice
pub fn flatten(merges: &[(usize, usize)], n_leaves: usize) -> Result<Vec<usize>> {
    if n_leaves == 0 {
        return Err(VaineError::MalformedTree(
            "tree must have at least one leaf".to_string(),
        ));
    }
    if merges.len() != n_leaves - 1 {
        return Err(VaineError::MalformedTree(format!(
            "{} leaves need {} merges, got {}",
            n_leaves,
            n_leaves - 1,
            merges.len()
        )));
    }

    let size = 2 * n_leaves - 1;
    let mut parents: Vec<usize> = (0..size).collect();
    let mut assigned = vec![false; size];

    for (i, &(left, right)) in merges.iter().enumerate() {
        let node = n_leaves + i;
        if left == right {
            return Err(VaineError::MalformedTree(format!(
                "merge {} joins node {} with itself",
                i, left
            )));
        }
        for child in [left, right] {
            if child >= node {
                return Err(VaineError::MalformedTree(format!(
                    "merge {} refers to node {} which does not exist yet",
                    i, child
                )));
            }
            if assigned[child] {
                return Err(VaineError::MalformedTree(format!(
                    "node {} is merged more than once",
                    child
                )));
            }
            assigned[child] = true;
            parents[child] = node;
        }
    }

    Ok(parents)
}

/// Number of steps from `node` to the root
///
/// # Errors
/// `MalformedTree` when `node` is out of range or the pointers never reach a
/// self-pointing root.
pub fn depth_to_root(parents: &[usize], node: usize) -> Result<usize> {
    if node >= parents.len() {
        return Err(VaineError::MalformedTree(format!(
            "node {} out of range for {} nodes",
            node,
            parents.len()
        )));
    }

    let mut current = node;
    for depth in 0..parents.len() {
        let parent = parents[current];
        if parent == current {
            return Ok(depth);
        }
        if parent >= parents.len() {
            return Err(VaineError::MalformedTree(format!(
                "node {} points to missing node {}",
                current, parent
            )));
        }
        current = parent;
    }
    Err(VaineError::MalformedTree(format!(
        "node {} never reaches the root",
        node
    )))
}

/// Flat clusters obtained from a parent-pointer tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCut {
    /// Cluster label of every leaf; labels are node ids of the sub-tree roots
    pub by_point: Vec<usize>,
    /// Leaves of each cluster, ascending
    pub by_group: BTreeMap<usize, Vec<usize>>,
}

impl ClusterCut {
    pub fn n_clusters(&self) -> usize {
        self.by_group.len()
    }
}

/// Split a parent-pointer tree into `n_clusters` sub-trees
///
/// Children of the last `n_clusters - 1` internal nodes become cluster roots;
/// every other node takes the cluster of its parent.
///
/// # Errors
/// `MalformedTree` when `parents` is not a tree in merge order (even length,
/// a parent id not above its child, a root that does not point to itself) or
/// `n_clusters` is outside `1..=n_leaves`.
pub fn cut_tree(parents: &[usize], n_clusters: usize) -> Result<ClusterCut> {
    let len = parents.len();
    if len % 2 == 0 {
        return Err(VaineError::MalformedTree(format!(
            "parent array must have odd length, got {}",
            len
        )));
    }
    let n_leaves = (len + 1) / 2;
    if n_clusters == 0 || n_clusters > n_leaves {
        return Err(VaineError::MalformedTree(format!(
            "cannot cut {} leaves into {} clusters",
            n_leaves, n_clusters
        )));
    }
    if parents[len - 1] != len - 1 {
        return Err(VaineError::MalformedTree(
            "root must point to itself".to_string(),
        ));
    }
    if let Some(node) = (0..len - 1).find(|&i| parents[i] <= i || parents[i] >= len) {
        return Err(VaineError::MalformedTree(format!(
            "node {} has parent {} which is not above it",
            node, parents[node]
        )));
    }

    let max_root = len - n_clusters;
    let mut clusters = parents.to_vec();
    for i in (0..len).rev() {
        let parent = clusters[i];
        clusters[i] = if parent > max_root {
            i
        } else {
            clusters[parent]
        };
    }

    clusters.truncate(n_leaves);
    let mut by_group: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (leaf, &label) in clusters.iter().enumerate() {
        by_group.entry(label).or_default().push(leaf);
    }

    Ok(ClusterCut {
        by_point: clusters,
        by_group,
    })
}
