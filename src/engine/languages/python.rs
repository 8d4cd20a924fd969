use crate::config::types::AnalyzerConfig;
use crate::core::harness::worker_source;
use crate::engine::adapter::InterpreterAdapter;

#[derive(Debug, Clone, Default)]
pub struct PythonAdapter;

impl InterpreterAdapter for PythonAdapter {
    fn language(&self) -> &'static str {
        "python"
    }

    fn worker_command(&self, config: &AnalyzerConfig) -> Vec<String> {
        // -I: ignore PYTHON* env and user site, -B: no .pyc, -u: unbuffered pipes
        let mut command = vec![
            config.interpreter.binary.to_string_lossy().to_string(),
            "-I".to_string(),
            "-B".to_string(),
            "-u".to_string(),
        ];
        command.extend(config.interpreter.extra_args.iter().cloned());
        command.push("-c".to_string());
        command.push(worker_source(config));
        command
    }

    fn version_command(&self, config: &AnalyzerConfig) -> Vec<String> {
        vec![
            config.interpreter.binary.to_string_lossy().to_string(),
            "--version".to_string(),
        ]
    }
}
