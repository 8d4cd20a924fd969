//! Line-oriented rewriter.
//!
//! Each line is classified with a cheap textual pattern, never parsed. Two
//! independent transforms run in one forward pass: list-literal assignments
//! are routed through the tracked container constructor, and block-opening
//! lines get an operation-counter increment as the first statement of their
//! body. Anything the patterns do not recognise passes through untouched.

use crate::instrument::indent::resolve_body_indent;
use crate::runtime::prelude::{ops_increment_statement, tracker_init_line, TRACKED_LIST_TYPE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Keywords that open a countable region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKeyword {
    For,
    While,
    Def,
}

impl BlockKeyword {
    const ALL: [BlockKeyword; 3] = [BlockKeyword::For, BlockKeyword::While, BlockKeyword::Def];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKeyword::For => "for",
            BlockKeyword::While => "while",
            BlockKeyword::Def => "def",
        }
    }
}

/// Classification of a single source line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    BlockOpener(BlockKeyword),
    Plain,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Classify `line`: a block opener starts (after indentation) with `for`,
/// `while` or `def` as a whole word and has a `:` somewhere after it.
pub fn classify_line(line: &str) -> LineKind {
    let stripped = line.trim_start();
    for keyword in BlockKeyword::ALL {
        let Some(rest) = stripped.strip_prefix(keyword.as_str()) else {
            continue;
        };
        let at_boundary = rest.chars().next().map_or(true, |c| !is_word_char(c));
        let before_break = rest.split(is_line_terminator).next().unwrap_or("");
        if at_boundary && before_break.contains(':') {
            return LineKind::BlockOpener(keyword);
        }
    }
    LineKind::Plain
}

/// Byte offset of the `]` that closes the `[` at `open`, skipping string
/// literals. `None` when the literal is not closed on this line or the
/// brackets do not pair up.
fn matching_bracket(line: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in line[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '#' => return None,
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (c == ']').then_some(open + i);
                }
            }
            c if is_line_terminator(c) => return None,
            _ => {}
        }
    }
    None
}

/// Rewrite each top-level `target = [elements]` in `line` to
/// `target = TrackedList([elements])`, elements verbatim. Only a plain
/// assignment outside any bracket qualifies: comparisons, keyword arguments,
/// tuple unpacking and literals not closed on this line pass through.
/// Returns the new line and the number of substitutions.
pub fn substitute_list_literals(line: &str) -> (String, usize) {
    let mut out = String::with_capacity(line.len() + 16);
    let mut cursor = 0;
    let mut replaced = 0;

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut unpacking = false;
    let mut prev: Option<char> = None;
    let mut chars = line.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            prev = Some(c);
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '#' => break,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => unpacking = true,
            ';' if depth == 0 => unpacking = false,
            '=' if depth == 0 && !unpacking => {
                let next = chars.peek().map(|&(_, n)| n);
                let is_operator =
                    matches!(prev, Some('=' | '!' | '<' | '>' | ':')) || next == Some('=');
                let after = &line[i + 1..];
                let open = i + 1 + (after.len() - after.trim_start().len());
                let close = if is_operator || !line[open..].starts_with('[') {
                    None
                } else {
                    matching_bracket(line, open)
                };
                if let Some(close) = close {
                    out.push_str(&line[cursor..i]);
                    out.push_str("= ");
                    out.push_str(TRACKED_LIST_TYPE);
                    out.push('(');
                    out.push_str(&line[open..=close]);
                    out.push(')');
                    cursor = close + 1;
                    replaced += 1;
                    while chars.peek().map_or(false, |&(j, _)| j <= close) {
                        chars.next();
                    }
                    prev = Some(']');
                    continue;
                }
            }
            _ => {}
        }
        prev = Some(c);
    }

    if replaced == 0 {
        return (line.to_string(), 0);
    }
    out.push_str(&line[cursor..]);
    (out, replaced)
}

/// Rewriter output: preamble followed by the rewritten user lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentedScript {
    lines: Vec<String>,
    preamble_len: usize,
    original_lines: usize,
    injected_counters: usize,
    tracked_literals: usize,
}

impl InstrumentedScript {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn preamble_len(&self) -> usize {
        self.preamble_len
    }

    pub fn original_lines(&self) -> usize {
        self.original_lines
    }

    /// Number of counter increments inserted (one per block-opening line).
    pub fn injected_counters(&self) -> usize {
        self.injected_counters
    }

    /// Number of list literals routed through the tracked container.
    pub fn tracked_literals(&self) -> usize {
        self.tracked_literals
    }

    /// Script text, lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Hex SHA-256 of [`Self::text`].
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Display for InstrumentedScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

/// Line rewriter configured with the fallback indent unit.
#[derive(Clone, Debug)]
pub struct LineRewriter {
    indent_unit: String,
}

impl Default for LineRewriter {
    fn default() -> Self {
        Self::new("    ")
    }
}

impl LineRewriter {
    pub fn new(indent_unit: impl Into<String>) -> Self {
        Self {
            indent_unit: indent_unit.into(),
        }
    }

    /// Rewrite `source`. Never fails.
    pub fn rewrite(&self, source: &str) -> InstrumentedScript {
        let lines: Vec<&str> = source.split('\n').collect();
        let counter = ops_increment_statement();

        let mut out = Vec::with_capacity(lines.len() + 8);
        out.push(tracker_init_line());
        let preamble_len = out.len();

        let mut injected_counters = 0;
        let mut tracked_literals = 0;

        for (index, line) in lines.iter().enumerate() {
            let (rewritten, replaced) = substitute_list_literals(line);
            tracked_literals += replaced;
            out.push(rewritten);

            if let LineKind::BlockOpener(keyword) = classify_line(line) {
                let indent = resolve_body_indent(&lines, index, &self.indent_unit);
                log::trace!("line {}: counting `{}` block", index + 1, keyword.as_str());
                out.push(format!("{indent}{counter}"));
                injected_counters += 1;
            }
        }

        log::debug!(
            "instrumented {} lines: {} counters, {} tracked literals",
            lines.len(),
            injected_counters,
            tracked_literals
        );

        InstrumentedScript {
            lines: out,
            preamble_len,
            original_lines: lines.len(),
            injected_counters,
            tracked_literals,
        }
    }
}

/// Rewrite with the default four-space indent unit.
pub fn instrument(source: &str) -> InstrumentedScript {
    LineRewriter::default().rewrite(source)
}
