// Within-pair treatment and outcome differences
//
// For a nearest-neighbor pair the deltas are target minus source. A pair is
// "interesting" when both deltas reach the caller's minimum magnitudes, and
// its sign category is the product of the two deltas' signs.

use crate::error::{Result, VaineError};
use crate::pairs::Pair;
use serde::{Deserialize, Serialize};

/// Direction of co-movement between treatment and outcome within a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairSign {
    /// Treatment and outcome change in the same direction
    ConcordantPositive,
    /// At least one of the two deltas is exactly zero
    Discordant,
    /// Treatment and outcome change in opposite directions
    ConcordantNegative,
}

impl PairSign {
    /// Category for a treatment delta and an outcome delta
    pub fn classify(treatment_delta: f64, outcome_delta: f64) -> Self {
        match sign(treatment_delta) * sign(outcome_delta) {
            1 => PairSign::ConcordantPositive,
            -1 => PairSign::ConcordantNegative,
            _ => PairSign::Discordant,
        }
    }
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Differences across one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairDelta {
    pub source: usize,
    pub target: usize,
    pub treatment_delta: f64,
    pub outcome_delta: f64,
    pub interesting: bool,
    pub sign: PairSign,
}

/// Deltas for every pair
///
/// `min_treatment_delta` and `min_outcome_delta` are inclusive lower bounds on
/// the absolute deltas for a pair to count as interesting.
///
/// # Errors
/// `ShapeMismatch` when a pair refers to a row outside the columns, or the
/// two columns differ in length.
pub fn pair_deltas(
    pairs: &[Pair],
    treatment: &[f64],
    outcome: &[f64],
    min_treatment_delta: f64,
    min_outcome_delta: f64,
) -> Result<Vec<PairDelta>> {
    if treatment.len() != outcome.len() {
        return Err(VaineError::ShapeMismatch {
            expected: treatment.len(),
            actual: outcome.len(),
        });
    }

    pairs
        .iter()
        .map(|p| {
            let furthest = p.source.max(p.target);
            if furthest >= treatment.len() {
                return Err(VaineError::ShapeMismatch {
                    expected: treatment.len(),
                    actual: furthest + 1,
                });
            }

            let treatment_delta = treatment[p.target] - treatment[p.source];
            let outcome_delta = outcome[p.target] - outcome[p.source];
            Ok(PairDelta {
                source: p.source,
                target: p.target,
                treatment_delta,
                outcome_delta,
                interesting: treatment_delta.abs() >= min_treatment_delta
                    && outcome_delta.abs() >= min_outcome_delta,
                sign: PairSign::classify(treatment_delta, outcome_delta),
            })
        })
        .collect()
}

/// The `k` interesting deltas with the largest absolute outcome change
///
/// Returned in ascending order of |outcome delta|, so the most striking pair
/// is last. Ties keep their input order.
pub fn top_interesting(deltas: &[PairDelta], k: usize) -> Vec<PairDelta> {
    let mut interesting: Vec<&PairDelta> = deltas.iter().filter(|d| d.interesting).collect();
    interesting.sort_by(|a, b| a.outcome_delta.abs().total_cmp(&b.outcome_delta.abs()));

    let skip = interesting.len().saturating_sub(k);
    interesting.into_iter().skip(skip).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(source: usize, target: usize) -> Pair {
        Pair {
            source,
            target,
            distance: 1.0,
        }
    }

    #[test]
    fn test_classify_signs() {
        assert_eq!(PairSign::classify(1.0, 2.0), PairSign::ConcordantPositive);
        assert_eq!(PairSign::classify(-1.0, -2.0), PairSign::ConcordantPositive);
        assert_eq!(PairSign::classify(1.0, -2.0), PairSign::ConcordantNegative);
        assert_eq!(PairSign::classify(-0.5, 3.0), PairSign::ConcordantNegative);
    }

    #[test]
    fn test_classify_zero_delta_is_discordant() {
        assert_eq!(PairSign::classify(0.0, 2.0), PairSign::Discordant);
        assert_eq!(PairSign::classify(1.0, 0.0), PairSign::Discordant);
        assert_eq!(PairSign::classify(0.0, 0.0), PairSign::Discordant);
        assert_eq!(PairSign::classify(-0.0, 1.0), PairSign::Discordant);
    }

    #[test]
    fn test_pair_deltas() {
        let treatment = [1.0, 3.0, 3.0];
        let outcome = [10.0, 4.0, 4.5];
        let deltas = pair_deltas(&[pair(0, 1), pair(1, 2)], &treatment, &outcome, 1.0, 1.0).unwrap();

        assert_eq!(deltas[0].treatment_delta, 2.0);
        assert_eq!(deltas[0].outcome_delta, -6.0);
        assert!(deltas[0].interesting);
        assert_eq!(deltas[0].sign, PairSign::ConcordantNegative);

        assert_eq!(deltas[1].treatment_delta, 0.0);
        assert!(!deltas[1].interesting);
        assert_eq!(deltas[1].sign, PairSign::Discordant);
    }

    #[test]
    fn test_interesting_bounds_are_inclusive() {
        let deltas = pair_deltas(&[pair(0, 1)], &[0.0, 1.0], &[0.0, 2.0], 1.0, 2.0).unwrap();
        assert!(deltas[0].interesting);
    }

    #[test]
    fn test_pair_out_of_range() {
        let result = pair_deltas(&[pair(0, 5)], &[0.0, 1.0], &[0.0, 1.0], 0.0, 0.0);
        assert!(matches!(result, Err(VaineError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_top_interesting() {
        let treatment = [0.0, 1.0, 2.0, 3.0];
        let outcome = [0.0, 5.0, 4.0, 4.5];
        let pairs = [pair(0, 1), pair(1, 2), pair(2, 3)];
        let deltas = pair_deltas(&pairs, &treatment, &outcome, 0.0, 0.0).unwrap();

        let top = top_interesting(&deltas, 2);
        assert_eq!(top.len(), 2);
        assert_eq!((top[0].source, top[0].target), (1, 2));
        assert_eq!((top[1].source, top[1].target), (0, 1));

        assert!(top_interesting(&deltas, 0).is_empty());
    }
}
