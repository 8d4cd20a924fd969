use crate::config::types::OutputIntegrity;
use crate::utils::output::bound_output;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a sandbox channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Worker spawned, ready line not yet seen.
    Booting,
    Ready,
    /// One submission outstanding.
    Running,
    /// Boot failed or the worker died; needs `boot()` or `terminate()`.
    Faulted,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Booting => write!(f, "booting"),
            ChannelState::Ready => write!(f, "ready"),
            ChannelState::Running => write!(f, "running"),
            ChannelState::Faulted => write!(f, "faulted"),
        }
    }
}

/// Host->worker request line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub id: Uuid,
    pub code: String,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
        }
    }
}

/// Result record exactly as the harness reports it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RawResponse {
    pub output: String,
    /// Set by the harness when it already cut the output.
    #[serde(default)]
    pub output_truncated: bool,
    /// Empty or absent when the script finished cleanly.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub ops: u64,
    #[serde(default)]
    pub memory_peak_bytes: u64,
    #[serde(default)]
    pub duration_sec: f64,
}

/// Worker->host message line.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Ready,
    Result {
        #[serde(default)]
        id: Option<Uuid>,
        data: RawResponse,
    },
}

/// Decoded result of one submission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub request_id: Option<Uuid>,
    pub output: String,
    pub output_integrity: OutputIntegrity,
    /// `"Type: message"` of the exception that stopped the script, if any.
    pub error: Option<String>,
    pub ops: u64,
    pub memory_peak_bytes: u64,
    pub duration_sec: f64,
}

impl ExecutionResult {
    /// Normalise a harness record: re-apply the output cap to the output and
    /// the error text, fold an empty error string into `None`, and clamp a
    /// nonsensical duration to zero.
    pub fn from_response(request_id: Option<Uuid>, resp: RawResponse, max_chars: usize) -> Self {
        let (output, mut output_integrity) = bound_output(resp.output, max_chars);
        if resp.output_truncated {
            output_integrity = OutputIntegrity::TruncatedByLimit;
        }
        let error = resp
            .error
            .filter(|e| !e.is_empty())
            .map(|e| bound_output(e, max_chars).0);
        let duration_sec = if resp.duration_sec.is_finite() && resp.duration_sec > 0.0 {
            resp.duration_sec
        } else {
            0.0
        };

        Self {
            request_id,
            output,
            output_integrity,
            error,
            ops: resp.ops,
            memory_peak_bytes: resp.memory_peak_bytes,
            duration_sec,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.output_integrity == OutputIntegrity::TruncatedByLimit
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Event delivered to the channel's consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// Worker finished booting.
    Ready,
    /// Exactly one per accepted submission, unless `Error` is sent instead.
    Result(ExecutionResult),
    /// Boot failure or crash, already formatted for display.
    Error(String),
}

/// Report of a forced worker kill.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    pub pid: Option<i32>,
    pub kill_sent: bool,
    pub reaped: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_messages_decode() {
        let ready: WorkerMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, WorkerMessage::Ready);

        let result: WorkerMessage = serde_json::from_str(
            r#"{"type":"result","data":{"output":"hi\n","error":"","ops":3,"memory_peak_bytes":80,"duration_sec":0.5}}"#,
        )
        .unwrap();
        match result {
            WorkerMessage::Result { id, data } => {
                assert_eq!(id, None);
                assert_eq!(data.ops, 3);
                assert_eq!(data.memory_peak_bytes, 80);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn empty_error_string_means_success() {
        let resp = RawResponse {
            output: "ok".to_string(),
            error: Some(String::new()),
            ..RawResponse::default()
        };
        let result = ExecutionResult::from_response(None, resp, 100);
        assert!(result.succeeded());
        assert_eq!(result.output_integrity, OutputIntegrity::Complete);
    }

    #[test]
    fn host_reapplies_output_cap() {
        let resp = RawResponse {
            output: "x".repeat(20),
            error: Some("ZeroDivisionError: division by zero".to_string()),
            ops: 1,
            duration_sec: f64::NAN,
            ..RawResponse::default()
        };
        let result = ExecutionResult::from_response(None, resp, 10);
        assert_eq!(result.output.len(), 10);
        assert!(result.is_truncated());
        assert!(!result.succeeded());
        assert_eq!(result.duration_sec, 0.0);
        assert_eq!(result.error.as_deref(), Some("ZeroDivisi"));
    }

    #[test]
    fn harness_truncation_flag_is_kept() {
        let resp = RawResponse {
            output: "x".repeat(5),
            output_truncated: true,
            ..RawResponse::default()
        };
        let result = ExecutionResult::from_response(None, resp, 5);
        assert_eq!(result.output.len(), 5);
        assert!(result.is_truncated());
    }

    #[test]
    fn channel_state_display() {
        assert_eq!(ChannelState::Faulted.to_string(), "faulted");
        assert_eq!(ChannelState::Running.to_string(), "running");
    }
}
