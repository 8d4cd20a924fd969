// Metrics for the analysis channel
//
// Counters, gauges, and histograms for:
// - Submissions and their outcomes (completed, script fault, channel fault)
// - Worker lifecycle (boots, boot failures, forced terminations)
// - Boot latency and execution duration

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::types::ExecutionResult;

/// Counter metric (monotonically increasing)
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Gauge metric (can go up or down)
#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturate at zero: a forced stop can race a completed run.
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Histogram bucket for latency tracking
#[derive(Debug)]
pub struct HistogramBucket {
    pub le: f64, // upper bound in seconds
    pub count: AtomicU64,
}

/// Histogram metric for latency/duration tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
    sum: AtomicU64, // microseconds
    count: AtomicU64,
}

impl Histogram {
    /// Histogram with latency buckets from 1ms to 60s
    pub fn new_latency() -> Self {
        let bucket_bounds = vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ];

        let buckets = bucket_bounds
            .into_iter()
            .map(|le| HistogramBucket {
                le,
                count: AtomicU64::new(0),
            })
            .collect();

        Self {
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: Duration) {
        let seconds = value.as_secs_f64();
        let micros = value.as_micros() as u64;

        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for bucket in &self.buckets {
            if seconds <= bucket.le {
                bucket.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn get_bucket_count(&self, le: f64) -> u64 {
        self.buckets
            .iter()
            .find(|b| (b.le - le).abs() < 0.0001)
            .map(|b| b.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn export(&self, name: &str, help: &str, output: &mut String) {
        output.push_str(&format!("# HELP {name} {help}\n"));
        output.push_str(&format!("# TYPE {name} histogram\n"));
        for bucket in &self.buckets {
            output.push_str(&format!(
                "{name}_bucket{{le=\"{}\"}} {}\n",
                bucket.le,
                bucket.count.load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!(
            "{name}_bucket{{le=\"+Inf\"}} {}\n",
            self.get_count()
        ));
        output.push_str(&format!(
            "{name}_sum {}\n",
            self.get_sum_micros() as f64 / 1_000_000.0
        ));
        output.push_str(&format!("{name}_count {}\n", self.get_count()));
    }
}

/// Global metrics registry
#[derive(Debug)]
pub struct MetricsRegistry {
    // Submission outcomes
    pub submissions_total: Counter,
    pub results_completed: Counter,
    pub results_script_fault: Counter,
    pub results_output_truncated: Counter,
    pub channel_faults: Counter,

    // Worker lifecycle
    pub boots_total: Counter,
    pub boot_failures: Counter,
    pub terminations: Counter,

    // Aggregated measurements
    pub ops_total: Counter,
    pub active_runs: Gauge,

    // Latency histograms
    pub boot_latency: Histogram,
    pub execution_duration: Histogram,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            submissions_total: Counter::new(),
            results_completed: Counter::new(),
            results_script_fault: Counter::new(),
            results_output_truncated: Counter::new(),
            channel_faults: Counter::new(),

            boots_total: Counter::new(),
            boot_failures: Counter::new(),
            terminations: Counter::new(),

            ops_total: Counter::new(),
            active_runs: Gauge::new(),

            boot_latency: Histogram::new_latency(),
            execution_duration: Histogram::new_latency(),
        }
    }

    /// Record a delivered result
    pub fn record_result(&self, result: &ExecutionResult) {
        self.results_completed.inc();
        if result.error.is_some() {
            self.results_script_fault.inc();
        }
        if result.is_truncated() {
            self.results_output_truncated.inc();
        }
        self.ops_total.add(result.ops);
        self.execution_duration
            .observe(Duration::try_from_secs_f64(result.duration_sec).unwrap_or(Duration::ZERO));
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP greenbox_submissions_total Scripts submitted to the sandbox\n");
        output.push_str("# TYPE greenbox_submissions_total counter\n");
        output.push_str(&format!(
            "greenbox_submissions_total {}\n",
            self.submissions_total.get()
        ));

        output.push_str("# HELP greenbox_results_total Results delivered by outcome\n");
        output.push_str("# TYPE greenbox_results_total counter\n");
        output.push_str(&format!(
            "greenbox_results_total{{outcome=\"completed\"}} {}\n",
            self.results_completed.get()
        ));
        output.push_str(&format!(
            "greenbox_results_total{{outcome=\"script_fault\"}} {}\n",
            self.results_script_fault.get()
        ));
        output.push_str(&format!(
            "greenbox_results_total{{outcome=\"output_truncated\"}} {}\n",
            self.results_output_truncated.get()
        ));

        output.push_str("# HELP greenbox_channel_faults_total Boot failures and crashes\n");
        output.push_str("# TYPE greenbox_channel_faults_total counter\n");
        output.push_str(&format!(
            "greenbox_channel_faults_total {}\n",
            self.channel_faults.get()
        ));

        output.push_str("# HELP greenbox_worker_lifecycle_total Worker boots and kills\n");
        output.push_str("# TYPE greenbox_worker_lifecycle_total counter\n");
        output.push_str(&format!(
            "greenbox_worker_lifecycle_total{{event=\"boot\"}} {}\n",
            self.boots_total.get()
        ));
        output.push_str(&format!(
            "greenbox_worker_lifecycle_total{{event=\"boot_failure\"}} {}\n",
            self.boot_failures.get()
        ));
        output.push_str(&format!(
            "greenbox_worker_lifecycle_total{{event=\"terminate\"}} {}\n",
            self.terminations.get()
        ));

        output.push_str("# HELP greenbox_ops_total Operations counted across all results\n");
        output.push_str("# TYPE greenbox_ops_total counter\n");
        output.push_str(&format!("greenbox_ops_total {}\n", self.ops_total.get()));

        output.push_str("# HELP greenbox_active_runs Submissions awaiting a result\n");
        output.push_str("# TYPE greenbox_active_runs gauge\n");
        output.push_str(&format!("greenbox_active_runs {}\n", self.active_runs.get()));

        self.boot_latency.export(
            "greenbox_boot_latency_seconds",
            "Time from worker spawn to ready",
            &mut output,
        );
        self.execution_duration.export(
            "greenbox_execution_duration_seconds",
            "Script wall time reported by the harness",
            &mut output,
        );

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
static METRICS: once_cell::sync::Lazy<Arc<MetricsRegistry>> =
    once_cell::sync::Lazy::new(|| Arc::new(MetricsRegistry::new()));

/// Get global metrics registry
pub fn get_metrics() -> Arc<MetricsRegistry> {
    Arc::clone(&METRICS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::OutputIntegrity;

    fn result(error: Option<&str>, ops: u64, integrity: OutputIntegrity) -> ExecutionResult {
        ExecutionResult {
            request_id: None,
            output: String::new(),
            output_integrity: integrity,
            error: error.map(str::to_string),
            ops,
            memory_peak_bytes: 0,
            duration_sec: 0.02,
        }
    }

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc();
        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge_saturates_at_zero() {
        let gauge = Gauge::new();
        gauge.dec();
        assert_eq!(gauge.get(), 0);
        gauge.inc();
        gauge.inc();
        gauge.dec();
        assert_eq!(gauge.get(), 1);
    }

    #[test]
    fn test_histogram() {
        let histogram = Histogram::new_latency();

        histogram.observe(Duration::from_millis(50));
        histogram.observe(Duration::from_millis(150));
        histogram.observe(Duration::from_secs(20));

        assert_eq!(histogram.get_count(), 3);
        assert_eq!(histogram.get_bucket_count(0.1), 1);
        assert_eq!(histogram.get_bucket_count(0.25), 2);
        assert_eq!(histogram.get_bucket_count(10.0), 2);
        assert_eq!(histogram.get_bucket_count(30.0), 3);
    }

    #[test]
    fn test_record_result() {
        let metrics = MetricsRegistry::new();

        metrics.record_result(&result(None, 10, OutputIntegrity::Complete));
        metrics.record_result(&result(
            Some("ZeroDivisionError: division by zero"),
            3,
            OutputIntegrity::TruncatedByLimit,
        ));

        assert_eq!(metrics.results_completed.get(), 2);
        assert_eq!(metrics.results_script_fault.get(), 1);
        assert_eq!(metrics.results_output_truncated.get(), 1);
        assert_eq!(metrics.ops_total.get(), 13);
        assert_eq!(metrics.execution_duration.get_count(), 2);
    }

    #[test]
    fn test_out_of_range_duration_is_recorded_as_zero() {
        let metrics = MetricsRegistry::new();
        let mut huge = result(None, 1, OutputIntegrity::Complete);
        huge.duration_sec = 1e30;
        metrics.record_result(&huge);

        assert_eq!(metrics.execution_duration.get_count(), 1);
        assert_eq!(metrics.execution_duration.get_sum_micros(), 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = MetricsRegistry::new();
        metrics.submissions_total.inc();
        metrics.record_result(&result(None, 4, OutputIntegrity::Complete));
        metrics.terminations.inc();

        let output = metrics.export_prometheus();

        assert!(output.contains("greenbox_submissions_total 1"));
        assert!(output.contains("greenbox_results_total{outcome=\"completed\"} 1"));
        assert!(output.contains("greenbox_worker_lifecycle_total{event=\"terminate\"} 1"));
        assert!(output.contains("greenbox_ops_total 4"));
        assert!(output.contains("greenbox_execution_duration_seconds_count 1"));
    }

    #[test]
    fn test_global_metrics() {
        let metrics1 = get_metrics();
        let metrics2 = get_metrics();
        assert!(Arc::ptr_eq(&metrics1, &metrics2));
    }
}
