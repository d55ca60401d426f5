#![no_main]

use libfuzzer_sys::fuzz_target;
use vaine::hierarchy::{cut_tree, depth_to_root, flatten};

fuzz_target!(|data: &[u8]| {
    // First byte is the leaf count, the rest are (left, right) merge pairs
    let Some((&n, rest)) = data.split_first() else {
        return;
    };
    let n_leaves = n as usize;
    let merges: Vec<(usize, usize)> = rest
        .chunks_exact(2)
        .map(|pair| (pair[0] as usize, pair[1] as usize))
        .collect();

    // Arbitrary merge lists must be rejected, never panic
    if let Ok(parents) = flatten(&merges, n_leaves) {
        assert_eq!(parents.len(), 2 * n_leaves - 1);
        for leaf in 0..n_leaves {
            assert!(depth_to_root(&parents, leaf).is_ok());
        }
        let cut = cut_tree(&parents, 1).expect("single cluster cut");
        assert_eq!(cut.n_clusters(), 1);
    }
});
