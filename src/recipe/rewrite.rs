// src/recipe/rewrite.rs

//! Textual rewrites applied to recipes copied from upstream
//!
//! Upstream recipes target a newer Spack than the session build tool. Four
//! rules bring them back, always applied in this order:
//!
//! 1. Comment out the `c`, `cxx` and `fortran` build dependencies
//! 2. Strip the `CompilerPackage` base class
//! 3. Drop `checked_by=` from `license(...)` calls
//! 4. Comment out imports from `spack_repo.builtin.build_systems`, adding
//!    `from spack.package import *` once if it is missing
//!
//! Every rule is idempotent: running it over its own output changes nothing.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static COMPILER_DEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^depends_on\(\s*["'](?:c|cxx|fortran)["']"#).unwrap()
});

static CLASS_BASES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?P<head>\s*class\s+\w+\s*\()(?P<bases>[^)]*)(?P<tail>\)\s*:)").unwrap()
});

static CHECKED_BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<call>\blicense\([^)]*?)\s*,\s*checked_by\s*=\s*(?:"[^"]*"|'[^']*'|\[[^\]]*\]|\([^)]*\))"#,
    )
    .unwrap()
});

static BUILD_SYSTEM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^from\s+spack_repo\.builtin\.build_systems(?:\.[\w.]+)?\s+import\b").unwrap()
});

const LEGACY_IMPORT: &str = "from spack.package import *";
const COMPILER_MIXIN: &str = "CompilerPackage";

/// One rewrite rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteRule {
    CommentBuildCompilerDeps,
    StripCompilerMixin,
    StripLicenseCheckedBy,
    CommentBuildSystemImports,
}

impl RewriteRule {
    /// All rules in application order
    pub const ORDERED: [RewriteRule; 4] = [
        RewriteRule::CommentBuildCompilerDeps,
        RewriteRule::StripCompilerMixin,
        RewriteRule::StripLicenseCheckedBy,
        RewriteRule::CommentBuildSystemImports,
    ];

    /// Stable rule name
    pub fn name(&self) -> &'static str {
        match self {
            Self::CommentBuildCompilerDeps => "comment_build_compiler_deps",
            Self::StripCompilerMixin => "strip_compiler_mixin",
            Self::StripLicenseCheckedBy => "strip_license_checked_by",
            Self::CommentBuildSystemImports => "comment_build_system_imports",
        }
    }

    /// Apply the rule; `None` when the text has nothing to rewrite
    pub fn apply(&self, content: &str) -> Option<String> {
        let rewritten = match self {
            Self::CommentBuildCompilerDeps => {
                comment_statements(content, |line| COMPILER_DEP_RE.is_match(line))
            }
            Self::StripCompilerMixin => strip_compiler_mixin(content),
            Self::StripLicenseCheckedBy => CHECKED_BY_RE.replace_all(content, "$call").into_owned(),
            Self::CommentBuildSystemImports => comment_build_system_imports(content),
        };

        (rewritten != content).then_some(rewritten)
    }
}

/// Outcome of running every rule over a recipe
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub content: String,
    pub applied: Vec<RewriteRule>,
}

/// Run all rules in order
pub fn rewrite_recipe(content: &str) -> Rewritten {
    let mut current = content.to_string();
    let mut applied = Vec::new();

    for rule in RewriteRule::ORDERED {
        if let Some(next) = rule.apply(&current) {
            current = next;
            applied.push(rule);
        }
    }

    Rewritten {
        content: current,
        applied,
    }
}

/// Comment out every statement that satisfies `matches`
///
/// A statement continues over following lines while its parentheses are
/// open; `matches` sees the whole statement joined onto one line.
fn comment_statements<F>(content: &str, matches: F) -> String
where
    F: Fn(&str) -> bool,
{
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let mut out = String::with_capacity(content.len() + 64);

    let mut i = 0;
    while i < lines.len() {
        let mut end = i;
        let mut depth = paren_delta(lines[i]);
        while depth > 0 && end + 1 < lines.len() {
            end += 1;
            depth += paren_delta(lines[end]);
        }

        let statement = lines[i..=end]
            .iter()
            .map(|l| l.trim())
            .collect::<Vec<_>>()
            .join(" ");
        let hit = matches(&statement);

        for line in &lines[i..=end] {
            if hit {
                let trimmed = line.trim_start();
                out.push_str(&line[..line.len() - trimmed.len()]);
                out.push_str("# ");
                out.push_str(trimmed);
            } else {
                out.push_str(line);
            }
        }
        i = end + 1;
    }

    out
}

/// Net parenthesis depth of one line, ignoring strings and comments
fn paren_delta(line: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for c in line.chars() {
        match (quote, c) {
            (None, '#') => break,
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), ch) if ch == q => quote = None,
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn strip_compiler_mixin(content: &str) -> String {
    CLASS_BASES_RE
        .replace_all(content, |caps: &regex::Captures| {
            let bases = &caps["bases"];
            let kept: Vec<&str> = bases
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .filter(|b| *b != COMPILER_MIXIN)
                .collect();

            if kept.len() == bases.split(',').filter(|b| !b.trim().is_empty()).count() {
                return caps[0].to_string();
            }

            let bases = if kept.is_empty() {
                "Package".to_string()
            } else {
                kept.join(", ")
            };
            format!("{}{}{}", &caps["head"], bases, &caps["tail"])
        })
        .into_owned()
}

fn comment_build_system_imports(content: &str) -> String {
    let commented = comment_statements(content, |line| BUILD_SYSTEM_IMPORT_RE.is_match(line));
    if commented == content {
        return commented;
    }

    let has_legacy = commented
        .lines()
        .any(|line| line.trim() == LEGACY_IMPORT);
    if has_legacy {
        return commented;
    }

    // Insert the legacy import ahead of the first commented build-system import
    let mut out = String::with_capacity(commented.len() + LEGACY_IMPORT.len() + 1);
    let mut inserted = false;
    for line in commented.split_inclusive('\n') {
        if !inserted && line.trim_start().starts_with("# from spack_repo.builtin.build_systems") {
            out.push_str(LEGACY_IMPORT);
            out.push('\n');
            inserted = true;
        }
        out.push_str(line);
    }
    out
}
