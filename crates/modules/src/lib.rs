//! Update units ("modules"), their runners and the host that wires them to
//! the event bus.
//!
//! A [`Module`] holds business logic. A [`ModuleRunner`] wraps it with the
//! lifecycle state machine, single-flight execution, burst debouncing and
//! failure containment. The [`Host`] owns the bus, the accumulator, the
//! configuration handle and every runner.

pub mod host;
pub mod module;
pub mod runner;
pub mod stats;

pub use {
    host::Host,
    module::{Lifecycle, Module},
    runner::ModuleRunner,
    stats::{ModuleStats, StatsSnapshot},
};
