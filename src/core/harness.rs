//! Worker harness program.
//!
//! The harness is the long-lived interpreter-side loop: it announces
//! readiness, then for each request line runs the submission against a fresh
//! namespace and answers with exactly one result line. The protocol streams
//! are moved off fd 0/1 before any submission runs, so a script writing to
//! the process's real stdout cannot corrupt the framing.

use crate::config::types::AnalyzerConfig;
use crate::runtime::prelude::{library_source, TRACKER_NAME};

/// Render a string as a Python literal. JSON string escapes are a subset of
/// Python's.
fn py_str(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

const HARNESS_TEMPLATE: &str = r#"import builtins, io, json, os, sys, time

_LIBRARY = @LIBRARY@
_TRACKER = @TRACKER@
_PLACEHOLDER = @PLACEHOLDER@
_SENTINEL = @SENTINEL@
_INPUT_LIMIT = @INPUT_LIMIT@
_MAX_OUTPUT = @MAX_OUTPUT@
_RECURSION_LIMIT = @RECURSION_LIMIT@

_proto_in = os.fdopen(os.dup(0), "rb")
_proto_out = os.fdopen(os.dup(1), "wb")
_null = os.open(os.devnull, os.O_RDWR)
os.dup2(_null, 0)
os.dup2(_null, 1)


def _send(message):
    _proto_out.write(json.dumps(message).encode("ascii") + b"\n")
    _proto_out.flush()


def _counter(scope, key):
    try:
        return min(max(0, int(scope[_TRACKER][key])), 2**64 - 1)
    except BaseException:
        return 0


def _clean(text):
    return text.encode("utf-8", "replace").decode("utf-8")


def _describe(exc):
    name = type(exc).__name__
    try:
        message = str(exc)
    except BaseException:
        message = ""
    text = name + ": " + message if message else name
    return _clean(text[:_MAX_OUTPUT])


def _run(code):
    calls = [0]

    def automated_input(prompt=""):
        calls[0] += 1
        return _SENTINEL if calls[0] > _INPUT_LIMIT else _PLACEHOLDER

    namespace_builtins = dict(vars(builtins))
    namespace_builtins["input"] = automated_input
    scope = {
        "__name__": "__main__",
        "__builtins__": namespace_builtins,
        "input": automated_input,
    }
    captured = io.StringIO()
    error = None
    saved = (sys.stdout, sys.stderr, sys.stdin)
    sys.stdout = captured
    sys.stdin = io.StringIO("")
    sys.setrecursionlimit(_RECURSION_LIMIT)
    start = time.perf_counter()
    try:
        exec(compile(_LIBRARY + "\n" + code, "<submission>", "exec"), scope)
    except BaseException as exc:
        error = _describe(exc)
    finally:
        duration = time.perf_counter() - start
        sys.stdout, sys.stderr, sys.stdin = saved
    output = captured.getvalue()
    return {
        "output": _clean(output[:_MAX_OUTPUT]),
        "output_truncated": len(output) > _MAX_OUTPUT,
        "error": error,
        "ops": _counter(scope, "ops"),
        "memory_peak_bytes": _counter(scope, "peak_mem"),
        "duration_sec": max(0.0, duration),
    }


def _main():
    sys.setrecursionlimit(_RECURSION_LIMIT)
    _send({"type": "ready"})
    for raw in _proto_in:
        raw = raw.strip()
        if not raw:
            continue
        request = json.loads(raw)
        data = _run(request.get("code", ""))
        _send({"type": "result", "id": request.get("id"), "data": data})


_main()
"#;

/// Build the harness program for `config`.
pub fn worker_source(config: &AnalyzerConfig) -> String {
    HARNESS_TEMPLATE
        .replace("@LIBRARY@", &py_str(&library_source()))
        .replace("@TRACKER@", &py_str(TRACKER_NAME))
        .replace("@PLACEHOLDER@", &py_str(&config.input_stub.placeholder))
        .replace("@SENTINEL@", &py_str(&config.input_stub.sentinel))
        .replace("@INPUT_LIMIT@", &config.input_stub.limit.to_string())
        .replace("@MAX_OUTPUT@", &config.max_output_chars.to_string())
        .replace("@RECURSION_LIMIT@", &config.recursion_limit.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_placeholders_are_filled() {
        let source = worker_source(&AnalyzerConfig::default());
        assert!(!source.contains('@'));
        assert!(source.contains("_MAX_OUTPUT = 50000"));
        assert!(source.contains("_RECURSION_LIMIT = 5000"));
        assert!(source.contains("_INPUT_LIMIT = 50"));
        assert!(source.contains(r#"_PLACEHOLDER = "Rock""#));
        assert!(source.contains(r#"_SENTINEL = "End""#));
        assert!(source.contains(r#"_TRACKER = "__tracker__""#));
    }

    #[test]
    fn library_is_embedded_as_one_literal() {
        let source = worker_source(&AnalyzerConfig::default());
        let line = source
            .lines()
            .find(|l| l.starts_with("_LIBRARY = "))
            .unwrap();
        assert!(line.contains(r"class TrackedList(list):\n"));
    }

    #[test]
    fn error_text_is_capped_like_output() {
        let source = worker_source(&AnalyzerConfig::default());
        assert!(source.contains("return _clean(text[:_MAX_OUTPUT])"));
        assert!(source.contains(r#""output": _clean(output[:_MAX_OUTPUT])"#));
    }

    #[test]
    fn stub_strings_are_escaped() {
        let mut config = AnalyzerConfig::default();
        config.input_stub.placeholder = "say \"hi\"\n".to_string();
        let source = worker_source(&config);
        assert!(source.contains(r#"_PLACEHOLDER = "say \"hi\"\n""#));
    }
}
