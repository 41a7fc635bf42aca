use prometheus::{CounterVec, HistogramOpts, HistogramVec, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Driver metrics collector
pub struct DriverMetrics {
    /// Total lifecycle operations
    pub operations_total: CounterVec,
    /// Lifecycle operation duration in seconds
    pub operation_duration: HistogramVec,
    /// Lifecycle operation errors
    pub operation_errors: CounterVec,
    /// Transient snapshots left behind by a failed clone or deferred destroy
    pub leaked_snapshots: IntCounter,
}

impl DriverMetrics {
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let operations_total = CounterVec::new(
            Opts::new("zfsdriver_operations_total", "Total lifecycle operations"),
            &["operation"],
        )?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "zfsdriver_operation_duration_seconds",
                "Lifecycle operation duration in seconds",
            ),
            &["operation"],
        )?;

        let operation_errors = CounterVec::new(
            Opts::new("zfsdriver_operation_errors_total", "Lifecycle operation errors"),
            &["operation"],
        )?;

        let leaked_snapshots = IntCounter::new(
            "zfsdriver_leaked_snapshots_total",
            "Transient snapshots that could not be released",
        )?;

        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(operation_duration.clone()))?;
        registry.register(Box::new(operation_errors.clone()))?;
        registry.register(Box::new(leaked_snapshots.clone()))?;

        Ok(Self { operations_total, operation_duration, operation_errors, leaked_snapshots })
    }

    /// Record an operation
    pub fn record_operation(&self, operation: &str, duration_secs: f64, success: bool) {
        self.operations_total.with_label_values(&[operation]).inc();
        self.operation_duration.with_label_values(&[operation]).observe(duration_secs);
        if !success {
            self.operation_errors.with_label_values(&[operation]).inc();
        }
    }
}
