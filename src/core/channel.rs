//! Sandbox execution channel.
//!
//! One worker process per generation. The host writes request lines to the
//! worker's stdin; a reader thread decodes its stdout and forwards events.
//! Every event is stamped with the generation that produced it, and
//! `terminate()` bumps the generation before killing, so a response from a
//! killed worker can never reach the consumer.

use crate::config::types::{AnalyzerConfig, GreenboxError, OutputIntegrity, Result};
use crate::core::protocol::{decode_worker_message, encode_request};
use crate::core::types::{
    ChannelEvent, ChannelState, ExecutionRequest, ExecutionResult, KillReport, WorkerMessage,
};
use crate::engine::adapter::InterpreterAdapter;
use crate::observability::metrics::get_metrics;
use crate::utils::output::{read_line_bounded, OutputLimits};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

const BOOT_FAILED: &str = "Boot Failed";
const CRITICAL_FAILURE: &str = "CRITICAL FAILURE";

#[derive(Debug)]
struct Shared {
    state: ChannelState,
    generation: u64,
    in_flight: Option<Uuid>,
    last_error: Option<String>,
    stderr_tail: Option<String>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct Envelope {
    generation: u64,
    event: ChannelEvent,
}

struct Worker {
    child: Child,
    stdin: Option<ChildStdin>,
    generation: u64,
}

impl Worker {
    fn pid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }
}

/// SIGKILL the worker and reap it.
fn kill_worker(worker: &mut Worker) -> KillReport {
    let mut report = KillReport {
        pid: Some(worker.pid().as_raw()),
        ..KillReport::default()
    };
    let start = Instant::now();

    // Close our end first so a worker blocked on read sees EOF.
    worker.stdin.take();

    match kill(worker.pid(), Signal::SIGKILL) {
        Ok(()) => report.kill_sent = true,
        Err(Errno::ESRCH) => report.notes.push("worker already exited".to_string()),
        Err(e) => report.notes.push(format!("SIGKILL failed: {e}")),
    }

    match worker.child.wait() {
        Ok(status) => {
            report.reaped = true;
            report.notes.push(format!("worker status: {status}"));
        }
        Err(e) => report.notes.push(format!("wait failed: {e}")),
    }

    report.waited_ms = start.elapsed().as_millis() as u64;
    report
}

/// Per-generation state owned by the stdout reader thread.
struct ReaderContext {
    shared: Arc<Mutex<Shared>>,
    events: Sender<Envelope>,
    generation: u64,
    pid: Pid,
    limits: OutputLimits,
    spawned_at: Instant,
}

impl ReaderContext {
    fn run<R: BufRead>(self, mut stdout: R) {
        loop {
            match read_line_bounded(&mut stdout, self.limits.max_line_bytes) {
                Ok(Some((line, _))) if line.iter().all(u8::is_ascii_whitespace) => continue,
                Ok(Some((_, OutputIntegrity::TruncatedByLimit))) => {
                    self.fault_and_kill(format!(
                        "{CRITICAL_FAILURE}: worker line exceeded {} bytes",
                        self.limits.max_line_bytes
                    ));
                    return;
                }
                Ok(Some((line, _))) => match decode_worker_message(&line) {
                    Ok(message) => self.handle(message),
                    Err(e) => {
                        self.fault_and_kill(format!("{CRITICAL_FAILURE}: {e}"));
                        return;
                    }
                },
                Ok(None) => {
                    self.on_exit();
                    return;
                }
                Err(e) => {
                    self.fault(format!("{CRITICAL_FAILURE}: worker stdout: {e}"));
                    return;
                }
            }
        }
    }

    fn fault_and_kill(&self, message: String) {
        // Only the current generation's worker is still unreaped.
        if self.fault(message) {
            let _ = kill(self.pid, Signal::SIGKILL);
        }
    }

    fn handle(&self, message: WorkerMessage) {
        let metrics = get_metrics();
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation {
            return;
        }

        match message {
            WorkerMessage::Ready => {
                if shared.state != ChannelState::Booting {
                    log::warn!("ignoring ready line in state {}", shared.state);
                    return;
                }
                shared.state = ChannelState::Ready;
                drop(shared);
                let elapsed = self.spawned_at.elapsed();
                metrics.boot_latency.observe(elapsed);
                log::info!(
                    "worker generation {} ready after {} ms",
                    self.generation,
                    elapsed.as_millis()
                );
                self.send(ChannelEvent::Ready);
            }
            WorkerMessage::Result { id, data } => {
                if shared.state != ChannelState::Running {
                    log::warn!("ignoring unsolicited result in state {}", shared.state);
                    return;
                }
                if let (Some(got), Some(expected)) = (id, shared.in_flight) {
                    if got != expected {
                        log::warn!("ignoring result for {got}, waiting on {expected}");
                        return;
                    }
                }
                let request_id = shared.in_flight.take();
                shared.state = ChannelState::Ready;
                drop(shared);

                let result =
                    ExecutionResult::from_response(request_id, data, self.limits.max_output_chars);
                metrics.active_runs.dec();
                metrics.record_result(&result);
                log::debug!(
                    "result for {:?}: ops={} peak={}B duration={:.6}s error={:?}",
                    request_id,
                    result.ops,
                    result.memory_peak_bytes,
                    result.duration_sec,
                    result.error
                );
                self.send(ChannelEvent::Result(result));
            }
        }
    }

    fn on_exit(&self) {
        let shared = lock(&self.shared);
        if shared.generation != self.generation {
            return;
        }
        let detail = shared
            .stderr_tail
            .as_ref()
            .map(|tail| format!(" ({tail})"))
            .unwrap_or_default();
        let message = if shared.state == ChannelState::Booting {
            format!("{BOOT_FAILED}: worker exited before signalling ready{detail}")
        } else {
            format!("{CRITICAL_FAILURE}: worker exited unexpectedly{detail}")
        };
        drop(shared);
        self.fault(message);
    }

    fn fault(&self, message: String) -> bool {
        fault_generation(&self.shared, &self.events, self.generation, message)
    }

    fn send(&self, event: ChannelEvent) {
        let _ = self.events.send(Envelope {
            generation: self.generation,
            event,
        });
    }
}

/// Move `generation` to `Faulted` and emit one error event. Returns false,
/// doing nothing, when the generation is stale or already faulted.
fn fault_generation(
    shared: &Mutex<Shared>,
    events: &Sender<Envelope>,
    generation: u64,
    message: String,
) -> bool {
    let metrics = get_metrics();
    let mut guard = lock(shared);
    if guard.generation != generation || guard.state == ChannelState::Faulted {
        return false;
    }
    if guard.state == ChannelState::Booting {
        metrics.boot_failures.inc();
    }
    if guard.in_flight.take().is_some() {
        metrics.active_runs.dec();
    }
    guard.state = ChannelState::Faulted;
    guard.last_error = Some(message.clone());
    drop(guard);

    metrics.channel_faults.inc();
    log::error!("channel generation {generation} faulted: {message}");
    let _ = events.send(Envelope {
        generation,
        event: ChannelEvent::Error(message),
    });
    true
}

fn spawn_stderr_drain(
    stderr: impl std::io::Read + Send + 'static,
    shared: Arc<Mutex<Shared>>,
    generation: u64,
) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        while let Ok(Some((line, _))) = read_line_bounded(&mut reader, 4096) {
            let text = String::from_utf8_lossy(&line).trim_end().to_string();
            if text.is_empty() {
                continue;
            }
            log::debug!("worker[{generation}] stderr: {text}");
            let mut guard = lock(&shared);
            if guard.generation == generation {
                guard.stderr_tail = Some(text);
            }
        }
    });
}

/// Asynchronous request/response channel to a supervised interpreter worker.
pub struct SandboxChannel {
    config: AnalyzerConfig,
    adapter: Box<dyn InterpreterAdapter>,
    limits: OutputLimits,
    shared: Arc<Mutex<Shared>>,
    worker: Option<Worker>,
    events_tx: Sender<Envelope>,
    events_rx: Receiver<Envelope>,
}

impl SandboxChannel {
    /// Create a channel. No worker is started until `boot()`.
    pub fn new(config: AnalyzerConfig, adapter: Box<dyn InterpreterAdapter>) -> Self {
        let (events_tx, events_rx) = unbounded();
        let limits = OutputLimits::for_output_chars(config.max_output_chars);
        Self {
            config,
            adapter,
            limits,
            shared: Arc::new(Mutex::new(Shared {
                state: ChannelState::Booting,
                generation: 0,
                in_flight: None,
                last_error: None,
                stderr_tail: None,
            })),
            worker: None,
            events_tx,
            events_rx,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.shared).state
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    /// Message of the most recent fault, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared).last_error.clone()
    }

    /// Start a fresh worker generation.
    ///
    /// Any existing worker is killed first. Spawn failures are not returned:
    /// they surface as a `Boot Failed` error event and a `Faulted` state.
    pub fn boot(&mut self) {
        let generation = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.state = ChannelState::Booting;
            if shared.in_flight.take().is_some() {
                get_metrics().active_runs.dec();
            }
            shared.stderr_tail = None;
            shared.generation
        };
        get_metrics().boots_total.inc();

        if let Some(mut old) = self.worker.take() {
            let report = kill_worker(&mut old);
            log::debug!("retired worker generation {}: {:?}", old.generation, report);
        }

        let argv = self.adapter.worker_command(&self.config);
        let Some((program, args)) = argv.split_first() else {
            fault_generation(
                &self.shared,
                &self.events_tx,
                generation,
                format!("{BOOT_FAILED}: empty worker command"),
            );
            return;
        };

        log::info!(
            "booting {} worker generation {generation}: {program}",
            self.adapter.language()
        );
        let spawned_at = Instant::now();
        let spawned = Command::new(program)
            .args(args)
            .env_clear()
            .envs(self.adapter.worker_environment(&self.config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                fault_generation(
                    &self.shared,
                    &self.events_tx,
                    generation,
                    format!("{BOOT_FAILED}: cannot start {program}: {e}"),
                );
                return;
            }
        };

        let stdin = child.stdin.take();
        let stdout: Option<ChildStdout> = child.stdout.take();
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_drain(stderr, Arc::clone(&self.shared), generation);
        }

        let mut worker = Worker {
            child,
            stdin,
            generation,
        };

        let Some(stdout) = stdout else {
            kill_worker(&mut worker);
            fault_generation(
                &self.shared,
                &self.events_tx,
                generation,
                format!("{BOOT_FAILED}: worker stdout unavailable"),
            );
            return;
        };

        let context = ReaderContext {
            shared: Arc::clone(&self.shared),
            events: self.events_tx.clone(),
            generation,
            pid: worker.pid(),
            limits: self.limits.clone(),
            spawned_at,
        };
        let spawned_reader = thread::Builder::new()
            .name(format!("greenbox-reader-{generation}"))
            .spawn(move || context.run(BufReader::new(stdout)));

        if let Err(e) = spawned_reader {
            kill_worker(&mut worker);
            fault_generation(
                &self.shared,
                &self.events_tx,
                generation,
                format!("{BOOT_FAILED}: cannot start reader thread: {e}"),
            );
            return;
        }

        self.worker = Some(worker);
    }

    /// Block until the current generation is ready.
    ///
    /// On timeout the worker is killed and the channel is left `Faulted`.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state() {
                ChannelState::Ready | ChannelState::Running => return Ok(()),
                ChannelState::Faulted => {
                    return Err(GreenboxError::Boot(
                        self.last_error()
                            .unwrap_or_else(|| "channel faulted".to_string()),
                    ))
                }
                ChannelState::Booting => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let generation = self.generation();
                fault_generation(
                    &self.shared,
                    &self.events_tx,
                    generation,
                    format!(
                        "{BOOT_FAILED}: no ready signal within {:.1}s",
                        timeout.as_secs_f64()
                    ),
                );
                if let Some(mut worker) = self.worker.take() {
                    kill_worker(&mut worker);
                }
                continue;
            }

            // Events only wake us; the state is authoritative.
            let _ = self.recv_timeout(remaining.min(Duration::from_millis(50)))?;
        }
    }

    /// Send a script to the worker. Only accepted in `Ready`.
    pub fn submit(&mut self, code: &str) -> Result<Uuid> {
        let request = ExecutionRequest::new(code);
        let generation = {
            let mut shared = lock(&self.shared);
            if shared.state != ChannelState::Ready {
                return Err(GreenboxError::Channel(format!(
                    "cannot submit while channel is {}",
                    shared.state
                )));
            }
            shared.state = ChannelState::Running;
            shared.in_flight = Some(request.id);
            shared.generation
        };

        let metrics = get_metrics();
        metrics.submissions_total.inc();
        metrics.active_runs.inc();

        let written = match self.worker.as_mut().and_then(|w| w.stdin.as_mut()) {
            Some(stdin) => encode_request(stdin, &request),
            None => Err(GreenboxError::Channel("worker stdin closed".to_string())),
        };

        if let Err(e) = written {
            let message = format!("{CRITICAL_FAILURE}: cannot send request: {e}");
            fault_generation(&self.shared, &self.events_tx, generation, message.clone());
            return Err(GreenboxError::Channel(message));
        }

        log::debug!(
            "submitted {} ({} bytes) to generation {generation}",
            request.id,
            request.code.len()
        );
        Ok(request.id)
    }

    /// Kill the worker regardless of state and boot a replacement.
    ///
    /// Any in-flight response is discarded.
    pub fn terminate(&mut self) -> KillReport {
        get_metrics().terminations.inc();
        {
            // Retire the generation before the kill so the dying worker's
            // reader cannot publish anything.
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            if shared.in_flight.take().is_some() {
                get_metrics().active_runs.dec();
            }
        }

        let report = match self.worker.take() {
            Some(mut worker) => kill_worker(&mut worker),
            None => KillReport {
                notes: vec!["no live worker".to_string()],
                ..KillReport::default()
            },
        };
        log::info!("terminated worker: {:?}", report);

        self.boot();
        report
    }

    /// Next event of the current generation. Blocks.
    pub fn recv(&self) -> Result<ChannelEvent> {
        loop {
            let envelope = self
                .events_rx
                .recv()
                .map_err(|e| GreenboxError::Channel(format!("event stream closed: {e}")))?;
            if let Some(event) = self.accept(envelope) {
                return Ok(event);
            }
        }
    }

    /// Next event of the current generation, or `None` after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ChannelEvent>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(envelope) => {
                    if let Some(event) = self.accept(envelope) {
                        return Ok(Some(event));
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(GreenboxError::Channel("event stream closed".to_string()))
                }
            }
        }
    }

    pub fn try_recv(&self) -> Option<ChannelEvent> {
        loop {
            match self.events_rx.try_recv() {
                Ok(envelope) => {
                    if let Some(event) = self.accept(envelope) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    fn accept(&self, envelope: Envelope) -> Option<ChannelEvent> {
        let current = self.generation();
        if envelope.generation == current {
            Some(envelope.event)
        } else {
            log::debug!(
                "dropping stale event from generation {} (current {current}): {:?}",
                envelope.generation,
                envelope.event
            );
            None
        }
    }
}

impl Drop for SandboxChannel {
    fn drop(&mut self) {
        {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            if shared.in_flight.take().is_some() {
                get_metrics().active_runs.dec();
            }
        }
        if let Some(mut worker) = self.worker.take() {
            let report = kill_worker(&mut worker);
            log::debug!("channel dropped, worker killed: {:?}", report);
        }
    }
}
