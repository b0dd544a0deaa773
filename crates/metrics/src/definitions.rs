//! Metric name and label definitions.

/// Module dispatch metrics
pub mod modules {
    /// Update passes executed (labelled by module)
    pub const UPDATES_TOTAL: &str = "herald_module_updates_total";
    /// Update passes that returned an error or panicked
    pub const UPDATE_ERRORS_TOTAL: &str = "herald_module_update_errors_total";
    /// Duration of one `update_internal` call in seconds
    pub const UPDATE_DURATION_SECONDS: &str = "herald_module_update_duration_seconds";
    /// Events swallowed because a debounce timer was already armed
    pub const DEBOUNCE_COALESCED_TOTAL: &str = "herald_module_debounce_coalesced_total";
    /// Number of modules currently in the Running state
    pub const RUNNING: &str = "herald_modules_running";
}

/// Event bus metrics
pub mod bus {
    /// Events published on the bus (labelled by kind)
    pub const EVENTS_PUBLISHED_TOTAL: &str = "herald_bus_events_published_total";
    /// Events that reached no subscriber
    pub const EVENTS_UNROUTED_TOTAL: &str = "herald_bus_events_unrouted_total";
}

/// Micro-batch accumulator metrics
pub mod accumulator {
    /// Raw payloads appended to a bucket
    pub const EVENTS_TOTAL: &str = "herald_accumulator_events_total";
    /// Non-empty flushes that produced an aggregated event
    pub const FLUSHES_TOTAL: &str = "herald_accumulator_flushes_total";
    /// Number of buckets per flush
    pub const BUCKETS_PER_FLUSH: &str = "herald_accumulator_buckets_per_flush";
    /// Aggregated events that could not be delivered
    pub const DELIVERY_FAILURES_TOTAL: &str = "herald_accumulator_delivery_failures_total";
}

/// Display reconciliation metrics
pub mod reconciler {
    /// Reconciliation passes run
    pub const PASSES_TOTAL: &str = "herald_reconciler_passes_total";
    /// Discover() runs (labelled by result)
    pub const DISCOVERIES_TOTAL: &str = "herald_reconciler_discoveries_total";
    /// Remote calls issued (labelled by operation)
    pub const REMOTE_CALLS_TOTAL: &str = "herald_reconciler_remote_calls_total";
    /// Remote calls that failed (labelled by operation and error type)
    pub const REMOTE_ERRORS_TOTAL: &str = "herald_reconciler_remote_errors_total";
    /// Targets aborted mid-pass
    pub const TARGETS_ABORTED_TOTAL: &str = "herald_reconciler_targets_aborted_total";
}

/// Config loading metrics
pub mod config {
    /// Config reloads applied
    pub const RELOADS_TOTAL: &str = "herald_config_reloads_total";
    /// Config parse errors by format
    pub const PARSE_ERRORS_TOTAL: &str = "herald_config_parse_errors_total";
}

/// Common label keys used across metrics
pub mod labels {
    pub const MODULE: &str = "module";
    pub const KIND: &str = "kind";
    pub const OPERATION: &str = "operation";
    pub const RESULT: &str = "result";
    pub const ERROR_TYPE: &str = "error_type";
    pub const FORMAT: &str = "format";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Update pass duration buckets (in seconds)
    /// Covers 1ms to 2 minutes; passes include several rate-limited remote calls
    pub static UPDATE_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
        ]
    });

    /// Bucket count per accumulator flush
    pub static BUCKET_COUNT: Lazy<Vec<f64>> =
        Lazy::new(|| vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]);
}
