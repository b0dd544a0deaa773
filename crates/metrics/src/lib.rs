//! Metrics collection and export for herald.
//!
//! Metric names live in one place so dashboards and the code agree. Crates
//! emit through the `metrics` facade macros re-exported here; nothing is
//! recorded until [`init_metrics`] installs a recorder.
//!
//! ```rust,ignore
//! use herald_metrics::{counter, modules, labels};
//!
//! counter!(modules::UPDATES_TOTAL, labels::MODULE => "players").increment(1);
//! ```
//!
//! # Features
//!
//! - `prometheus`: install a Prometheus recorder and render its text format

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
