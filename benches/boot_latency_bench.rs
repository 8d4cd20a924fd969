// Latency benchmark for the analysis pipeline
// Measures rewrite cost, cold worker boot, and warm submission round trips
// Target: rewrite p95 < 1ms for a 200-line script, warm round trip p50 < 50ms

use greenbox::config::types::AnalyzerConfig;
use greenbox::core::types::ChannelEvent;
use greenbox::core::SandboxChannel;
use greenbox::engine::registry::adapter_for;
use greenbox::instrument::instrument;
use std::process::Command;
use std::time::{Duration, Instant};

/// Benchmark configuration
const ITERATIONS: usize = 50;
const WARMUP_ITERATIONS: usize = 5;
const BOOT_ITERATIONS: usize = 10;

/// Latency percentiles
struct LatencyStats {
    p50: Duration,
    p95: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();

        let p50_idx = (len as f64 * 0.50) as usize;
        let p95_idx = ((len as f64 * 0.95) as usize).min(len - 1);

        let sum: Duration = samples.iter().sum();
        let mean = sum / len as u32;

        Self {
            p50: samples[p50_idx],
            p95: samples[p95_idx],
            min: samples[0],
            max: samples[len - 1],
            mean,
        }
    }

    fn print(&self, label: &str) {
        println!("\n{}", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

/// Benchmark result
struct BenchmarkResult {
    scenario: String,
    stats: LatencyStats,
    passed: bool,
    reason: Option<String>,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        self.stats.print("Latency");

        match &self.reason {
            None => println!("✅ PASS"),
            Some(reason) => println!("❌ FAIL: {}", reason),
        }
    }
}

fn sample_script(lines: usize) -> String {
    let mut source = String::new();
    for i in 0..lines / 4 {
        source.push_str(&format!("def f{i}(n):\n"));
        source.push_str(&format!("    data = [n, {i}, n * {i}]\n"));
        source.push_str("    for x in data:\n");
        source.push_str("        n += x\n");
    }
    source
}

/// Rewriting a 200-line script
fn benchmark_rewrite() -> BenchmarkResult {
    let source = sample_script(200);
    let mut samples = Vec::new();

    for _ in 0..WARMUP_ITERATIONS {
        let _ = instrument(&source);
    }

    for _ in 0..ITERATIONS * 10 {
        let start = Instant::now();
        let script = instrument(&source);
        samples.push(start.elapsed());
        assert!(script.injected_counters() > 0);
    }

    let stats = LatencyStats::from_samples(samples);
    let passed = stats.p95 < Duration::from_millis(1);
    let reason = (!passed).then(|| format!("p95={:?} (target <1ms)", stats.p95));

    BenchmarkResult {
        scenario: "Rewrite 200 lines".to_string(),
        stats,
        passed,
        reason,
    }
}

fn new_channel() -> SandboxChannel {
    let config = AnalyzerConfig::default();
    let adapter = adapter_for(&config.interpreter.language).expect("python adapter");
    SandboxChannel::new(config, adapter)
}

/// Spawn to ready for a fresh worker
fn benchmark_cold_boot() -> BenchmarkResult {
    let mut samples = Vec::new();

    for _ in 0..BOOT_ITERATIONS {
        let mut channel = new_channel();
        let start = Instant::now();
        channel.boot();
        if channel.wait_ready(Duration::from_secs(30)).is_ok() {
            samples.push(start.elapsed());
        }
    }

    if samples.is_empty() {
        samples.push(Duration::MAX / 2);
    }
    let stats = LatencyStats::from_samples(samples);
    let passed = stats.p50 < Duration::from_millis(500);
    let reason = (!passed).then(|| format!("p50={:?} (target <500ms)", stats.p50));

    BenchmarkResult {
        scenario: "Cold worker boot".to_string(),
        stats,
        passed,
        reason,
    }
}

/// Submit-to-result on an already booted worker
fn benchmark_warm_round_trip() -> BenchmarkResult {
    let source = "x = [1, 2, 3]\nfor i in range(100):\n    x.append(i)\nprint(len(x))";
    let script = instrument(source).text();
    let mut channel = new_channel();
    channel.boot();
    let mut samples = Vec::new();

    if channel.wait_ready(Duration::from_secs(30)).is_ok() {
        for i in 0..WARMUP_ITERATIONS + ITERATIONS {
            let start = Instant::now();
            if channel.submit(&script).is_err() {
                break;
            }
            match channel.recv_timeout(Duration::from_secs(10)) {
                Ok(Some(ChannelEvent::Result(_))) => {
                    if i >= WARMUP_ITERATIONS {
                        samples.push(start.elapsed());
                    }
                }
                _ => break,
            }
        }
    }

    if samples.is_empty() {
        samples.push(Duration::MAX / 2);
    }
    let stats = LatencyStats::from_samples(samples);
    let passed = stats.p50 < Duration::from_millis(50);
    let reason = (!passed).then(|| format!("p50={:?} (target <50ms)", stats.p50));

    BenchmarkResult {
        scenario: "Warm round trip".to_string(),
        stats,
        passed,
        reason,
    }
}

fn main() {
    println!("=== greenbox latency benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let mut results = vec![benchmark_rewrite()];

    let python = Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if python {
        results.push(benchmark_cold_boot());
        results.push(benchmark_warm_round_trip());
    } else {
        println!("\npython3 not found, skipping worker benchmarks");
    }

    for result in &results {
        result.print();
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    println!("\n=== Summary: {}/{} passed ===", results.len() - failed, results.len());
    if failed > 0 {
        std::process::exit(1);
    }
}
