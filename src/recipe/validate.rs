// src/recipe/validate.rs

//! Local recipe checks
//!
//! A recipe is Python source. Nothing here runs Python: a small tokenizer
//! checks string termination, bracket balance and block indentation, and a
//! line scan looks for the package class and the attributes every recipe is
//! expected to declare. This is a quick structural check, not a build.

use crate::recipe::naming::class_name_for;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)\s*[(:]").unwrap()
});

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One finding about a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    fn error(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            line,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Result of checking one recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub package_name: String,
    pub is_valid: bool,
    pub syntax_valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    /// Error diagnostics
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    /// Warning diagnostics
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}

/// Check recipe content for `package_name`
pub fn validate_recipe(content: &str, package_name: &str) -> ValidationReport {
    let mut diagnostics = check_syntax(content);
    let syntax_valid = diagnostics.is_empty();

    if syntax_valid {
        diagnostics.extend(check_structure(content, package_name));
    }

    let is_valid = !diagnostics.iter().any(|d| d.severity == Severity::Error);

    ValidationReport {
        package_name: package_name.to_string(),
        is_valid,
        syntax_valid,
        diagnostics,
    }
}

fn check_structure(content: &str, package_name: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let expected = class_name_for(package_name);

    let classes: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            CLASS_RE
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| (idx + 1, m.as_str()))
        })
        .collect();

    if classes.is_empty() {
        diagnostics.push(Diagnostic::error(None, "No package class definition found"));
    } else if !classes
        .iter()
        .any(|(_, name)| name.eq_ignore_ascii_case(&expected))
    {
        for (_, name) in &classes {
            diagnostics.push(Diagnostic::warning(format!(
                "Class name '{}' doesn't match expected pattern '{}'",
                name, expected
            )));
        }
    }

    let lower = content.to_lowercase();
    if !lower.contains("homepage") {
        diagnostics.push(Diagnostic::warning("No homepage attribute found"));
    }
    if !["url", "git", "pypi", "cran"]
        .iter()
        .any(|source| lower.contains(source))
    {
        diagnostics.push(Diagnostic::warning("No URL or Git repository found"));
    }
    if !lower.contains("version(") {
        diagnostics.push(Diagnostic::warning("No version definitions found"));
    }

    diagnostics
}

/// Tokenizer state while scanning source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single(char),
    Triple(char),
}

fn check_syntax(content: &str) -> Vec<Diagnostic> {
    if content.trim().is_empty() {
        return vec![Diagnostic::error(None, "Recipe content is empty")];
    }

    let mut diagnostics = Vec::new();
    let chars: Vec<char> = content.chars().collect();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut quote: Option<(Quote, usize)> = None;
    let mut line = 1;
    // Lines that begin a logical line (outside brackets and strings)
    let mut logical_starts = vec![true];

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if let Some((q, start_line)) = quote {
            match (q, c) {
                (_, '\\') => {
                    if chars.get(i + 1) == Some(&'\n') {
                        line += 1;
                        logical_starts.push(false);
                    }
                    i += 2;
                    continue;
                }
                (Quote::Single(_), '\n') => {
                    diagnostics.push(Diagnostic::error(
                        Some(start_line),
                        "unterminated string literal",
                    ));
                    return diagnostics;
                }
                (Quote::Single(d), ch) if ch == d => quote = None,
                (Quote::Triple(d), ch)
                    if ch == d
                        && chars.get(i + 1) == Some(&d)
                        && chars.get(i + 2) == Some(&d) =>
                {
                    quote = None;
                    i += 3;
                    continue;
                }
                (_, '\n') => {
                    line += 1;
                    logical_starts.push(false);
                }
                _ => {}
            }
            i += 1;
            continue;
        }

        match c {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '\'' | '"' => {
                if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                    quote = Some((Quote::Triple(c), line));
                    i += 3;
                    continue;
                }
                quote = Some((Quote::Single(c), line));
            }
            '(' | '[' | '{' => brackets.push((c, line)),
            ')' | ']' | '}' => {
                let expected_open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match brackets.pop() {
                    Some((open, _)) if open == expected_open => {}
                    Some((open, open_line)) => {
                        diagnostics.push(Diagnostic::error(
                            Some(line),
                            format!(
                                "closing '{}' does not match '{}' opened on line {}",
                                c, open, open_line
                            ),
                        ));
                        return diagnostics;
                    }
                    None => {
                        diagnostics.push(Diagnostic::error(
                            Some(line),
                            format!("unmatched '{}'", c),
                        ));
                        return diagnostics;
                    }
                }
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                line += 1;
                logical_starts.push(false);
                i += 2;
                continue;
            }
            '\n' => {
                line += 1;
                logical_starts.push(brackets.is_empty());
            }
            _ => {}
        }
        i += 1;
    }

    if let Some((_, start_line)) = quote {
        diagnostics.push(Diagnostic::error(
            Some(start_line),
            "unterminated triple-quoted string",
        ));
        return diagnostics;
    }
    if let Some((open, open_line)) = brackets.pop() {
        diagnostics.push(Diagnostic::error(
            Some(open_line),
            format!("'{}' was never closed", open),
        ));
        return diagnostics;
    }

    diagnostics.extend(check_indentation(content, &logical_starts));
    diagnostics
}

fn check_indentation(content: &str, logical_starts: &[bool]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    // (line number, indent width, opens a block)
    let mut previous: Option<(usize, usize, bool)> = None;

    for (idx, raw) in content.lines().enumerate() {
        if !logical_starts.get(idx).copied().unwrap_or(false) {
            continue;
        }
        let code = strip_comment(raw);
        if code.trim().is_empty() {
            continue;
        }

        let line_no = idx + 1;
        let indent: String = raw.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
        if indent.contains(' ') && indent.contains('\t') {
            diagnostics.push(Diagnostic::error(
                Some(line_no),
                "inconsistent use of tabs and spaces in indentation",
            ));
            return diagnostics;
        }
        let width = indent.chars().map(|c| if c == '\t' { 8 } else { 1 }).sum::<usize>();

        match previous {
            Some((opener_line, prev_width, true)) if width <= prev_width => {
                diagnostics.push(Diagnostic::error(
                    Some(line_no),
                    format!("expected an indented block after line {}", opener_line),
                ));
                return diagnostics;
            }
            None if width > 0 => {
                diagnostics.push(Diagnostic::error(Some(line_no), "unexpected indent"));
                return diagnostics;
            }
            _ => {}
        }

        let opens_block = code.trim_end().ends_with(':') && !is_one_line_lambda(code);
        previous = Some((line_no, width, opens_block));
    }

    if let Some((opener_line, _, true)) = previous {
        diagnostics.push(Diagnostic::error(
            Some(opener_line),
            format!("expected an indented block after line {}", opener_line),
        ));
    }

    diagnostics
}

/// Drop a trailing comment, ignoring `#` inside simple string literals
fn strip_comment(line: &str) -> &str {
    let mut in_quote: Option<char> = None;
    for (idx, c) in line.char_indices() {
        match (in_quote, c) {
            (None, '#') => return &line[..idx],
            (None, '\'' | '"') => in_quote = Some(c),
            (Some(q), ch) if ch == q => in_quote = None,
            _ => {}
        }
    }
    line
}

fn is_one_line_lambda(code: &str) -> bool {
    let trimmed = code.trim();
    trimmed.starts_with("lambda") && !trimmed.contains('\n')
}
