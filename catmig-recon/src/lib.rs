//! # catmig-recon
//!
//! Reconciles local bibliographic records against an external authority catalog:
//! - identifier extraction from primary and secondary identifier fields
//! - authority lookup, live with retry or from a SQLite cache
//! - title verification with exact or token-sorted similarity scoring
//! - rule-driven field substitution with an audit trail
//! - institution policy hooks and per-outcome output routing

pub mod audit;
pub mod authority;
pub mod config;
pub mod error;
pub mod identifier;
pub mod output;
pub mod pipeline;
pub mod policy;
pub mod statistics;
pub mod substitution;
pub mod tasks;
pub mod title;

pub use error::{ReconError, ReconResult};
pub use output::Outcome;
pub use pipeline::{PipelineOptions, ReconciliationPipeline};
pub use statistics::RunStatistics;
