use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use vaine::cli::{Cli, OutputFormat};
use vaine::config::AnalysisConfig;
use vaine::embedding::PcaEmbedder;
use vaine::experiment::{project_and_cluster, NaturalExperiment};
use vaine::report::format_report;
use vaine::table::{resolve_columns, ColumnSelector, Table};

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file: {}", what, path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} file: {}", what, path.display()))
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let base = match &args.config {
        Some(path) => AnalysisConfig::from_toml(path)?,
        None => AnalysisConfig::default(),
    };
    let config = args.apply_overrides(base);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid analysis configuration: {}", e))?;

    let content = fs::read_to_string(&args.data)
        .with_context(|| format!("Failed to read data file: {}", args.data.display()))?;
    let table = Table::from_json_str(&content)
        .with_context(|| format!("Failed to load table: {}", args.data.display()))?;

    let available = table.columns().to_vec();
    let treatments = resolve_columns(&args.treatment_selector(), &available)
        .context("Failed to resolve treatment columns")?;
    let mut ignored = match &args.ignore {
        Some(pattern) => resolve_columns(&ColumnSelector::Pattern(pattern.clone()), &available)
            .context("Failed to resolve ignored columns")?,
        None => Vec::new(),
    };
    // Sibling treatments are never covariates of one another
    if args.treatments.is_some() {
        for treatment in &treatments {
            if !ignored.contains(treatment) {
                ignored.push(treatment.clone());
            }
        }
    }
    let labels: Option<Vec<i64>> = match &args.labels {
        Some(path) => Some(read_json(path, "labels")?),
        None => None,
    };
    let merges: Option<Vec<(usize, usize)>> = match &args.merges {
        Some(path) => Some(read_json(path, "merges")?),
        None => None,
    };

    let mut reports = Vec::with_capacity(treatments.len());
    for treatment in &treatments {
        tracing::info!("Analysing treatment {}", treatment);
        let mut builder = NaturalExperiment::builder(
            table.clone(),
            treatment.clone(),
            ColumnSelector::Pattern(args.outcomes.clone()),
        )
        .config(&config)
        .ignore(ColumnSelector::List(ignored.clone()));
        if let Some(labels) = &labels {
            builder = builder.clusters(labels.clone());
        }

        let experiment = builder
            .build()
            .with_context(|| format!("Failed to run natural experiment for {}", treatment))?;
        let mut report = experiment.report(&config)?;

        if let Some(merges) = &merges {
            let projection = project_and_cluster(
                experiment.features(),
                &PcaEmbedder::default(),
                merges,
                config.seed,
            )
            .context("Failed to flatten merge tree")?;
            report.projection = Some(projection);
        }
        reports.push(report);
    }

    match (args.format, args.treatments.is_some()) {
        (OutputFormat::Text, _) => {
            for report in &reports {
                print!("{}", format_report(report));
            }
        }
        (OutputFormat::Json, true) => println!("{}", serde_json::to_string_pretty(&reports)?),
        (OutputFormat::Json, false) => {
            for report in &reports {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
        }
    }

    Ok(())
}
