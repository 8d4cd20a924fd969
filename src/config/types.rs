/// Core types shared across greenbox: configuration, errors, result alias
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Interpreter launch configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InterpreterConfig {
    /// Adapter name resolved through `engine::registry::adapter_for`
    pub language: String,
    /// Interpreter binary (looked up on PATH when relative)
    pub binary: PathBuf,
    /// Extra arguments placed before the harness arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Environment passed to the worker; everything else is cleared
    #[serde(default)]
    pub environment: Vec<(String, String)>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            language: "python".to_string(),
            binary: PathBuf::from("python3"),
            extra_args: Vec::new(),
            environment: Vec::new(),
        }
    }
}

/// Answers given to `input()` calls made by a running script
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InputStubConfig {
    /// Value returned for the first `limit` calls
    pub placeholder: String,
    /// Value returned once `limit` calls have been answered
    pub sentinel: String,
    pub limit: u32,
}

impl Default for InputStubConfig {
    fn default() -> Self {
        Self {
            placeholder: "Rock".to_string(),
            sentinel: "End".to_string(),
            limit: 50,
        }
    }
}

/// Full analyzer configuration (greenbox.json)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    /// Indent unit used when the body indentation cannot be observed
    #[serde(default = "default_indent_unit")]
    pub indent_unit: String,
    /// Captured stdout cap, in characters
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    #[serde(default)]
    pub input_stub: InputStubConfig,
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: u32,
    /// How long the channel waits for the worker's ready line
    #[serde(default = "default_boot_timeout", with = "duration_secs")]
    pub boot_timeout: Duration,
}

fn default_indent_unit() -> String {
    "    ".to_string()
}

fn default_max_output_chars() -> usize {
    50_000
}

fn default_recursion_limit() -> u32 {
    5000
}

fn default_boot_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|e| {
            serde::de::Error::custom(format!(
                "boot_timeout must be a non-negative number of seconds, got {secs}: {e}"
            ))
        })
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            interpreter: InterpreterConfig::default(),
            indent_unit: default_indent_unit(),
            max_output_chars: default_max_output_chars(),
            input_stub: InputStubConfig::default(),
            recursion_limit: default_recursion_limit(),
            boot_timeout: default_boot_timeout(),
        }
    }
}

/// Output integrity classification for captured script output
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputIntegrity {
    #[default]
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "truncated_by_limit")]
    TruncatedByLimit,
}

impl std::fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::TruncatedByLimit => write!(f, "truncated_by_limit"),
        }
    }
}

/// Custom error types for greenbox
#[derive(Error, Debug)]
pub enum GreenboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Boot error: {0}")]
    Boot(String),

    #[error("Result store error: {0}")]
    Store(String),
}

/// Result type alias for greenbox operations
pub type Result<T> = std::result::Result<T, GreenboxError>;

impl From<nix::errno::Errno> for GreenboxError {
    fn from(err: nix::errno::Errno) -> Self {
        GreenboxError::Channel(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.max_output_chars, 50_000);
        assert_eq!(config.indent_unit, "    ");
        assert_eq!(config.input_stub.limit, 50);
        assert_eq!(config.input_stub.placeholder, "Rock");
        assert_eq!(config.input_stub.sentinel, "End");
        assert_eq!(config.recursion_limit, 5000);
        assert_eq!(config.interpreter.binary, PathBuf::from("python3"));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AnalyzerConfig =
            serde_json::from_str(r#"{"max_output_chars": 10, "boot_timeout": 2.5}"#).unwrap();
        assert_eq!(config.max_output_chars, 10);
        assert_eq!(config.boot_timeout, Duration::from_millis(2500));
        assert_eq!(config.interpreter, InterpreterConfig::default());
    }

    #[test]
    fn negative_boot_timeout_is_rejected() {
        let parsed = serde_json::from_str::<AnalyzerConfig>(r#"{"boot_timeout": -1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn oversized_boot_timeout_is_rejected() {
        let parsed = serde_json::from_str::<AnalyzerConfig>(r#"{"boot_timeout": 1e30}"#);
        let err = parsed.unwrap_err().to_string();
        assert!(err.contains("boot_timeout"), "{err}");
    }

    #[test]
    fn output_integrity_display() {
        assert_eq!(format!("{}", OutputIntegrity::Complete), "complete");
        assert_eq!(
            format!("{}", OutputIntegrity::TruncatedByLimit),
            "truncated_by_limit"
        );
    }
}
