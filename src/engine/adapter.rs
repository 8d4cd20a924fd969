use crate::config::types::AnalyzerConfig;

/// Interpreter adapter contract for launching harness workers.
pub trait InterpreterAdapter: Send + Sync {
    fn language(&self) -> &'static str;

    /// Full argv of a worker that speaks the line protocol on stdin/stdout.
    fn worker_command(&self, config: &AnalyzerConfig) -> Vec<String>;

    /// Argv that prints the interpreter version and exits.
    fn version_command(&self, config: &AnalyzerConfig) -> Vec<String>;

    /// Environment of the worker. Everything else is cleared.
    fn worker_environment(&self, config: &AnalyzerConfig) -> Vec<(String, String)> {
        config.interpreter.environment.clone()
    }
}
