//! Vaine - stratified treatment-effect estimation for natural experiments
//!
//! Units are embedded, clustered into similar strata, and within each stratum
//! the outcome is regressed on the treatment. Strata with a significant
//! association are combined into a size-weighted average treatment effect.
//!
//! Alongside the estimator the library provides nearest-neighbor pairing of
//! units, correlation-driven ordering of covariates, and conversion of
//! hierarchical-clustering merge lists into parent-pointer trees.

pub mod cli;
pub mod config;
pub mod effect;
pub mod embedding;
pub mod error;
pub mod experiment;
pub mod hierarchy;
pub mod pairs;
pub mod reorder;
pub mod report;
pub mod table;

pub use error::{Result, VaineError};
pub use experiment::{NaturalExperiment, NaturalExperimentBuilder, Report};
