//! Body indentation lookup for injected statements.

/// Leading whitespace of `line`.
pub fn leading_whitespace(line: &str) -> &str {
    let body = line.trim_start();
    &line[..line.len() - body.len()]
}

/// Indentation for a statement injected into the body opened at `index`.
///
/// Uses the leading whitespace of the next non-blank line. When that line is
/// not indented, or the header is the last non-blank line, falls back to the
/// header's own indentation plus `indent_unit`. The scan stops at the first
/// non-blank line whatever its nesting, so a blank-line-separated dedented
/// sibling can be picked up instead of the real body.
pub fn resolve_body_indent(lines: &[&str], index: usize, indent_unit: &str) -> String {
    if let Some(next) = lines
        .iter()
        .skip(index + 1)
        .find(|line| !line.trim().is_empty())
    {
        let indent = leading_whitespace(next);
        if !indent.is_empty() {
            return indent.to_string();
        }
    }

    let parent = lines.get(index).map(|l| leading_whitespace(l)).unwrap_or("");
    format!("{parent}{indent_unit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_next_non_blank_line() {
        let lines = ["for i in x:", "", "   ", "\tprint(i)"];
        assert_eq!(resolve_body_indent(&lines, 0, "    "), "\t");
    }

    #[test]
    fn nested_header_takes_inner_body_indent() {
        let lines = ["def f():", "    for i in x:", "        pass"];
        assert_eq!(resolve_body_indent(&lines, 1, "    "), "        ");
        assert_eq!(resolve_body_indent(&lines, 0, "    "), "    ");
    }

    #[test]
    fn falls_back_at_end_of_input() {
        let lines = ["x = 1", "  while True:", "", ""];
        assert_eq!(resolve_body_indent(&lines, 1, "    "), "      ");
    }

    #[test]
    fn falls_back_when_next_line_is_dedented() {
        let lines = ["    def g():", "print(1)"];
        assert_eq!(resolve_body_indent(&lines, 0, "  "), "      ");
    }

    #[test]
    fn blank_separated_sibling_is_taken_as_is() {
        // Header with an empty body followed by a shallower sibling: the
        // sibling's indentation wins.
        let lines = ["        for i in x:", "", "    y = 2"];
        assert_eq!(resolve_body_indent(&lines, 0, "    "), "    ");
    }

    #[test]
    fn out_of_range_index_still_yields_unit() {
        let lines: [&str; 0] = [];
        assert_eq!(resolve_body_indent(&lines, 3, "    "), "    ");
    }
}
