use crate::config::types::AnalyzerConfig;
use crate::energy::{estimate, EnergyReport};
use crate::engine::registry::adapter_for;
use crate::observability::metrics::get_metrics;
use crate::session::store::JsonLinesStore;
use crate::session::{AnalysisReport, RunOutcome, SessionController};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./greenbox.json when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Instrument a script, run it in the sandbox and estimate its energy
    Analyze {
        /// Script file; reads stdin when omitted or "-"
        file: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Append the result to a JSON-lines file
        #[arg(long, value_name = "PATH")]
        record: Option<PathBuf>,
        /// Kill the run after this many seconds
        #[arg(long, value_name = "SECONDS")]
        wall_time: Option<f64>,
        /// Interpreter binary override
        #[arg(long, value_name = "PATH")]
        interpreter: Option<PathBuf>,
        /// Print Prometheus metrics to stderr after the run
        #[arg(long)]
        metrics: bool,
    },
    /// Print the instrumented form of a script without running it
    Instrument {
        /// Script file; reads stdin when omitted or "-"
        file: Option<PathBuf>,
        /// Prepend the measurement library, as the sandbox does
        #[arg(long)]
        with_library: bool,
    },
    /// Compute the energy estimate for given counters
    Estimate {
        #[arg(long, default_value_t = 0)]
        ops: u64,
        /// Peak memory in bytes
        #[arg(long, default_value_t = 0)]
        memory: u64,
        /// Duration in seconds
        #[arg(long, default_value_t = 0.0)]
        duration: f64,
        #[arg(long)]
        json: bool,
    },
    /// Check that the configured interpreter is installed
    CheckDeps {
        /// Verbose output showing detailed version information
        #[arg(long)]
        verbose: bool,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = match cli.config.as_deref() {
        Some(path) => AnalyzerConfig::load_from_file(path)?,
        None => AnalyzerConfig::load_default()?,
    };

    match cli.command {
        Commands::Analyze {
            file,
            json,
            record,
            wall_time,
            interpreter,
            metrics,
        } => {
            if let Some(binary) = interpreter {
                config.interpreter.binary = binary;
            }
            config.validate()?;

            let wall_time = wall_time
                .map(|secs| {
                    Duration::try_from_secs_f64(secs)
                        .map_err(|e| anyhow::anyhow!("invalid --wall-time {}: {}", secs, e))
                })
                .transpose()?;

            let source = read_source(file.as_deref())?;
            let outcome = analyze(config, &source, record.as_deref(), wall_time);

            if metrics {
                eprint!("{}", get_metrics().export_prometheus());
            }

            match outcome? {
                RunOutcome::Completed(report) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_report(&report);
                    }
                    Ok(())
                }
                RunOutcome::ChannelFault(message) => Err(anyhow::anyhow!(message)),
                RunOutcome::TimedOut(limit) => Err(anyhow::anyhow!(
                    "run killed after exceeding wall time limit of {:.3}s",
                    limit.as_secs_f64()
                )),
                RunOutcome::Terminated => Err(anyhow::anyhow!("run terminated")),
            }
        }
        Commands::Instrument { file, with_library } => {
            config.validate()?;
            let source = read_source(file.as_deref())?;
            let script = crate::instrument::LineRewriter::new(config.indent_unit).rewrite(&source);
            if with_library {
                println!("{}", crate::runtime::prelude::library_source());
            }
            println!("{}", script);
            log::info!(
                "{} lines in, {} lines out, fingerprint {}",
                script.original_lines(),
                script.len(),
                script.fingerprint()
            );
            Ok(())
        }
        Commands::Estimate {
            ops,
            memory,
            duration,
            json,
        } => {
            if !duration.is_finite() || duration < 0.0 {
                return Err(anyhow::anyhow!(
                    "--duration must be a non-negative number of seconds"
                ));
            }
            let report = estimate(ops, memory, duration);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_energy(&report);
            }
            Ok(())
        }
        Commands::CheckDeps { verbose } => check_interpreter(&config, verbose),
    }
}

fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e)),
        _ => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .map_err(|e| anyhow::anyhow!("failed to read script from stdin: {}", e))?;
            Ok(source)
        }
    }
}

fn analyze(
    config: AnalyzerConfig,
    source: &str,
    record: Option<&Path>,
    wall_time: Option<Duration>,
) -> Result<RunOutcome> {
    let adapter = adapter_for(&config.interpreter.language)?;
    let mut session = SessionController::new(config, adapter).with_wall_time_limit(wall_time);
    if let Some(path) = record {
        let store = JsonLinesStore::open(path)?;
        log::info!("Recording results to {}", store.path().display());
        session = session.with_store(Box::new(store));
    }

    session.start()?;
    Ok(session.run(source)?)
}

fn print_report(report: &AnalysisReport) {
    let result = &report.result;
    print!("{}", result.output);
    if !result.output.is_empty() && !result.output.ends_with('\n') {
        println!();
    }

    eprintln!();
    eprintln!("--- analysis ---");
    if let Some(error) = &result.error {
        eprintln!("error:        {}", error);
    }
    if result.is_truncated() {
        eprintln!("output:       {}", result.output_integrity);
    }
    eprintln!("ops:          {}", result.ops);
    eprintln!("memory peak:  {} bytes", result.memory_peak_bytes);
    eprintln!("duration:     {:.6} s", result.duration_sec);
    eprintln!(
        "instrumented: {} counters, {} tracked literals",
        report.injected_counters, report.tracked_literals
    );
    eprintln!(
        "energy:       {:.6e} J ({:.6e} kWh)",
        report.energy.energy_joules, report.energy.energy_kwh
    );
}

fn print_energy(report: &EnergyReport) {
    println!("energy_joules: {:e}", report.energy_joules);
    println!("energy_kwh:    {:e}", report.energy_kwh);
}

fn check_interpreter(config: &AnalyzerConfig, verbose: bool) -> Result<()> {
    use std::process::Command;

    println!("🔍 Checking interpreter dependencies...");
    println!();

    let adapter = adapter_for(&config.interpreter.language)?;
    let argv = adapter.version_command(config);
    let Some((program, args)) = argv.split_first() else {
        return Err(anyhow::anyhow!(
            "{} adapter has no version command",
            adapter.language()
        ));
    };

    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            let version_info = if !output.stdout.is_empty() {
                String::from_utf8_lossy(&output.stdout)
            } else {
                String::from_utf8_lossy(&output.stderr)
            }
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string();

            println!("✅ {} - OK", adapter.language());
            if verbose {
                println!("  {} -> {}", program, version_info);
                println!();
                println!("💡 Usage examples:");
                println!("  greenbox analyze script.py");
                println!("  greenbox analyze --json --record results.jsonl script.py");
            }
            Ok(())
        }
        Ok(output) => {
            println!("❌ {} - FAILED", adapter.language());
            if verbose {
                println!("  {} -> exit {}", program, output.status);
            }
            std::process::exit(1);
        }
        Err(e) => {
            println!("❌ {} - MISSING", adapter.language());
            if verbose {
                println!("  {} -> NOT FOUND ({})", program, e);
            }
            println!();
            println!("🔧 Install it with e.g. `sudo apt install python3`, or point");
            println!("   interpreter.binary in greenbox.json at an existing binary.");
            std::process::exit(1);
        }
    }
}
