use crate::config::types::{GreenboxError, Result};
use crate::engine::adapter::InterpreterAdapter;
use crate::engine::languages::python::PythonAdapter;

pub fn adapter_for(language: &str) -> Result<Box<dyn InterpreterAdapter>> {
    match language {
        "python" | "python3" | "py" => Ok(Box::new(PythonAdapter)),
        _ => Err(GreenboxError::Config(format!(
            "unsupported interpreter adapter: {language}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_aliases_resolve() {
        for name in ["python", "python3", "py"] {
            assert_eq!(adapter_for(name).unwrap().language(), "python");
        }
    }

    #[test]
    fn unknown_language_is_a_config_error() {
        match adapter_for("ruby") {
            Err(GreenboxError::Config(msg)) => assert!(msg.contains("ruby")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("ruby should not resolve"),
        }
    }
}
