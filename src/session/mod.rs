//! Session controller.
//!
//! Drives one analysis at a time through the pipeline: instrument, submit to
//! the sandbox channel, wait for the outcome, estimate energy, persist.

pub mod store;

use crate::config::types::{AnalyzerConfig, GreenboxError, Result};
use crate::core::channel::SandboxChannel;
use crate::core::types::{ChannelEvent, ChannelState, ExecutionResult, KillReport};
use crate::energy::{estimate, EnergyReport};
use crate::engine::adapter::InterpreterAdapter;
use crate::instrument::{InstrumentedScript, LineRewriter};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use store::{NullStore, PersistedResult, ResultStore};
use uuid::Uuid;

/// Whether a submission is outstanding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Ready,
    Running,
}

/// Everything known about one completed analysis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub result: ExecutionResult,
    pub energy: EnergyReport,
    pub script_fingerprint: String,
    pub original_lines: usize,
    pub injected_counters: usize,
    pub tracked_literals: usize,
}

/// How a run ended.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Completed(AnalysisReport),
    /// Boot failure or worker crash, formatted for display.
    ChannelFault(String),
    /// The run was force-stopped.
    Terminated,
    /// The controller's wall-time limit expired and the worker was killed.
    TimedOut(Duration),
}

struct PendingRun {
    request_id: Uuid,
    script: InstrumentedScript,
    submitted_at: Instant,
}

pub struct SessionController {
    channel: SandboxChannel,
    rewriter: LineRewriter,
    store: Box<dyn ResultStore>,
    wall_time_limit: Option<Duration>,
    pending: Option<PendingRun>,
}

impl SessionController {
    pub fn new(config: AnalyzerConfig, adapter: Box<dyn InterpreterAdapter>) -> Self {
        let rewriter = LineRewriter::new(config.indent_unit.clone());
        Self {
            channel: SandboxChannel::new(config, adapter),
            rewriter,
            store: Box::new(NullStore),
            wall_time_limit: None,
            pending: None,
        }
    }

    pub fn with_store(mut self, store: Box<dyn ResultStore>) -> Self {
        self.store = store;
        self
    }

    /// Kill the worker if a run exceeds `limit` of wall time.
    pub fn with_wall_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.wall_time_limit = limit;
        self
    }

    pub fn run_state(&self) -> RunState {
        if self.pending.is_some() {
            RunState::Running
        } else {
            RunState::Ready
        }
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn channel(&self) -> &SandboxChannel {
        &self.channel
    }

    /// Boot the worker and wait for it.
    pub fn start(&mut self) -> Result<()> {
        self.channel.boot();
        self.wait_ready()
    }

    /// Block until the channel is ready, or fail if it faults.
    pub fn wait_ready(&mut self) -> Result<()> {
        let timeout = self.channel.config().boot_timeout;
        self.channel.wait_ready(timeout)
    }

    /// Instrument `source` and hand it to the channel.
    ///
    /// A faulted channel is rebooted first.
    pub fn submit(&mut self, source: &str) -> Result<Uuid> {
        match self.channel.state() {
            ChannelState::Faulted => {
                log::warn!(
                    "channel faulted ({}), reinitialising",
                    self.channel.last_error().unwrap_or_default()
                );
                self.start()?;
            }
            ChannelState::Booting if self.channel.generation() == 0 => self.start()?,
            ChannelState::Booting => self.wait_ready()?,
            ChannelState::Ready | ChannelState::Running => {}
        }

        let script = self.rewriter.rewrite(source);
        log::info!(
            "instrumented {} lines: {} counters, {} tracked literals",
            script.original_lines(),
            script.injected_counters(),
            script.tracked_literals()
        );

        let request_id = self.channel.submit(&script.text())?;
        self.pending = Some(PendingRun {
            request_id,
            script,
            submitted_at: Instant::now(),
        });
        Ok(request_id)
    }

    /// Wait for the outstanding run to finish.
    pub fn wait(&mut self) -> Result<RunOutcome> {
        let Some(pending) = self.pending.as_ref() else {
            return Err(GreenboxError::Channel("no run in progress".to_string()));
        };
        let deadline = self.wall_time_limit.map(|limit| (limit, pending.submitted_at + limit));

        loop {
            let event = match deadline {
                Some((limit, at)) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    match self.channel.recv_timeout(remaining) {
                        Ok(Some(event)) => event,
                        Ok(None) => {
                            log::warn!("run exceeded wall time limit of {:?}", limit);
                            self.force_stop();
                            return Ok(RunOutcome::TimedOut(limit));
                        }
                        Err(e) => {
                            self.pending = None;
                            return Err(e);
                        }
                    }
                }
                None => match self.channel.recv() {
                    Ok(event) => event,
                    Err(e) => {
                        self.pending = None;
                        return Err(e);
                    }
                },
            };

            match event {
                ChannelEvent::Result(result) => return Ok(self.complete(result)),
                ChannelEvent::Error(message) => {
                    self.pending = None;
                    return Ok(RunOutcome::ChannelFault(message));
                }
                ChannelEvent::Ready => continue,
            }
        }
    }

    /// Kill the worker, drop any in-flight run, and reboot.
    pub fn force_stop(&mut self) -> KillReport {
        if let Some(pending) = self.pending.take() {
            log::info!("force stopping run {}", pending.request_id);
        }
        self.channel.terminate()
    }

    /// One full analysis. While a run is outstanding this is a force stop.
    pub fn run(&mut self, source: &str) -> Result<RunOutcome> {
        if self.run_state() == RunState::Running {
            self.force_stop();
            return Ok(RunOutcome::Terminated);
        }
        self.submit(source)?;
        self.wait()
    }

    fn complete(&mut self, result: ExecutionResult) -> RunOutcome {
        let script = self.pending.take().map(|pending| pending.script);
        let energy = estimate(result.ops, result.memory_peak_bytes, result.duration_sec);
        let fingerprint = script
            .as_ref()
            .map(InstrumentedScript::fingerprint)
            .unwrap_or_default();

        let record = PersistedResult::new(
            result.ops,
            result.memory_peak_bytes,
            &energy,
            fingerprint.clone(),
        );
        if let Err(e) = self.store.save(&record) {
            log::warn!("failed to persist result to {} store: {}", self.store.name(), e);
        }

        RunOutcome::Completed(AnalysisReport {
            result,
            energy,
            script_fingerprint: fingerprint,
            original_lines: script.as_ref().map_or(0, |s| s.original_lines()),
            injected_counters: script.as_ref().map_or(0, |s| s.injected_counters()),
            tracked_literals: script.as_ref().map_or(0, |s| s.tracked_literals()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::languages::python::PythonAdapter;
    use std::path::PathBuf;

    fn unbootable() -> SessionController {
        let mut config = AnalyzerConfig::default();
        config.interpreter.binary = PathBuf::from("/nonexistent/greenbox-python");
        config.boot_timeout = Duration::from_millis(200);
        SessionController::new(config, Box::new(PythonAdapter))
    }

    #[test]
    fn fresh_session_is_ready_with_no_run() {
        let session = unbootable();
        assert_eq!(session.run_state(), RunState::Ready);
    }

    #[test]
    fn start_reports_boot_failure() {
        let mut session = unbootable();
        let err = session.start().unwrap_err();
        assert!(err.to_string().contains("Boot Failed"));
        assert_eq!(session.channel_state(), ChannelState::Faulted);
    }

    #[test]
    fn run_on_unbootable_interpreter_fails_without_running() {
        let mut session = unbootable();
        assert!(session.run("print(1)").is_err());
        assert_eq!(session.run_state(), RunState::Ready);
    }

    #[test]
    fn wait_without_submission_is_an_error() {
        let mut session = unbootable();
        assert!(session.wait().is_err());
    }
}
