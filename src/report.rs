//! Plain-text rendering of an analysis report

use crate::effect::significance_stars;
use crate::experiment::{OutcomeReport, Report};

fn format_estimate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "n/a".to_string(),
    }
}

fn format_outcome(outcome: &OutcomeReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("\n--- Outcome: {} ---\n", outcome.outcome));
    output.push_str(&format!(
        "ATE = {} ({} over all clusters)\n",
        format_estimate(outcome.ate),
        format_estimate(outcome.ate_all_clusters)
    ));

    if outcome.valid_clusters.is_empty() {
        output.push_str("No clusters are valid. Consider increasing alpha or un-excluding clusters\n");
    } else {
        let ids: Vec<String> = outcome.valid_clusters.iter().map(|c| c.to_string()).collect();
        output.push_str(&format!("Valid clusters: {}\n", ids.join(", ")));
    }

    if !outcome.stats.is_empty() {
        output.push_str(&format!(
            "\n{:>8} {:>10} {:>10} {:>8} {:>10} {:>10}\n",
            "cluster", "slope", "intercept", "r", "p", "stderr"
        ));
        for row in &outcome.stats {
            let s = &row.stats;
            let marker = if outcome.valid_clusters.contains(&row.cluster) {
                " <"
            } else {
                ""
            };
            output.push_str(&format!(
                "{:>8} {:>10.4} {:>10.4} {:>8.3} {:>10.4} {:>10.4} {:<3}{}\n",
                row.cluster,
                s.slope,
                s.intercept,
                s.rvalue,
                s.pvalue,
                s.stderr,
                significance_stars(s.pvalue),
                marker
            ));
        }
    }

    output.push_str(&format!("\nInteresting pairs: {}\n", outcome.interesting_pairs));
    for pair in outcome.top_pairs.iter().rev() {
        output.push_str(&format!(
            "  {} -> {}: treatment {:+.3}, outcome {:+.3}\n",
            pair.source_id, pair.target_id, pair.delta.treatment_delta, pair.delta.outcome_delta
        ));
    }

    output
}

/// Human-readable summary for the terminal
pub fn format_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str(&format!("\n=== Natural Experiment: {} ===\n", report.treatment));
    output.push_str(&format!("Units: {}\n", report.n_units));
    output.push_str(&format!("Clusters: {}\n", report.n_clusters));
    output.push_str(&format!("Nearest-neighbor pairs: {}\n", report.n_pairs));

    if !report.covariate_order.is_empty() {
        output.push_str(&format!(
            "Covariate order: {}\n",
            report.covariate_order.join(", ")
        ));
    }
    if !report.controlled_covariates.is_empty() {
        output.push_str(&format!(
            "Controlled covariates: {}\n",
            report.controlled_covariates.join(", ")
        ));
    }

    for outcome in &report.outcomes {
        output.push_str(&format_outcome(outcome));
    }

    if let Some(projection) = &report.projection {
        output.push_str(&format!(
            "\nProjection: {} points, {} tree nodes\n",
            projection.points.len(),
            projection.parents.len()
        ));
    }

    output
}
