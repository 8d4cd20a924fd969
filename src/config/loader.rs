use crate::config::types::{AnalyzerConfig, GreenboxError, Result};
/// Configuration loading from greenbox.json
use std::path::Path;

/// Default configuration file name looked up in the current directory
pub const DEFAULT_CONFIG_FILE: &str = "greenbox.json";

impl AnalyzerConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_content = std::fs::read_to_string(path).map_err(|e| {
            GreenboxError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: AnalyzerConfig = serde_json::from_str(&config_content)
            .map_err(|e| GreenboxError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load ./greenbox.json when present, otherwise the built-in defaults
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| GreenboxError::Config(format!("Failed to get current directory: {}", e)))?
            .join(DEFAULT_CONFIG_FILE);

        if !config_path.exists() {
            log::debug!(
                "{} not found in current directory, using defaults",
                DEFAULT_CONFIG_FILE
            );
            return Ok(Self::default());
        }

        log::info!("Loading configuration from {}", config_path.display());
        Self::load_from_file(config_path)
    }

    /// Reject values the rewriter or harness cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.indent_unit.is_empty() || !self.indent_unit.chars().all(|c| c == ' ' || c == '\t')
        {
            return Err(GreenboxError::Config(format!(
                "indent_unit must be non-empty spaces or tabs, got {:?}",
                self.indent_unit
            )));
        }
        if self.max_output_chars == 0 {
            return Err(GreenboxError::Config(
                "max_output_chars must be greater than zero".to_string(),
            ));
        }
        if self.recursion_limit < 100 {
            return Err(GreenboxError::Config(format!(
                "recursion_limit {} is too small for the harness",
                self.recursion_limit
            )));
        }
        if self.interpreter.binary.as_os_str().is_empty() {
            return Err(GreenboxError::Config(
                "interpreter.binary must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
