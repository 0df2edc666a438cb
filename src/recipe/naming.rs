// src/recipe/naming.rs

//! Package name to upstream directory mapping
//!
//! Spack package names use hyphens (`py-numpy`), but the upstream package
//! tree stores them as Python module directories (`py_numpy`). The mapping is
//! a static prefix table plus three general rules:
//!
//! - remaining hyphens become underscores
//! - a leading digit gains a `_` prefix (`7zip` -> `_7zip`)
//! - a Python keyword gains a `_` suffix (`pass` -> `pass_`)
//!
//! The table is data, not an exhaustive truth. [`NamingTable::audit`] checks
//! each prefix rule against a live upstream tree so stale entries show up in
//! the logs instead of as silent lookup misses.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// One ecosystem prefix rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixRule {
    /// Prefix as it appears in package names (e.g., `py-`)
    pub package_prefix: &'static str,
    /// Prefix as it appears in upstream directory names (e.g., `py_`)
    pub directory_prefix: &'static str,
}

const DEFAULT_PREFIXES: &[PrefixRule] = &[
    PrefixRule { package_prefix: "py-", directory_prefix: "py_" },
    PrefixRule { package_prefix: "r-", directory_prefix: "r_" },
    PrefixRule { package_prefix: "perl-", directory_prefix: "perl_" },
    PrefixRule { package_prefix: "lua-", directory_prefix: "lua_" },
    PrefixRule { package_prefix: "julia-", directory_prefix: "julia_" },
    PrefixRule { package_prefix: "rust-", directory_prefix: "rust_" },
    PrefixRule { package_prefix: "go-", directory_prefix: "go_" },
    PrefixRule { package_prefix: "ruby-", directory_prefix: "ruby_" },
    PrefixRule { package_prefix: "octave-", directory_prefix: "octave_" },
];

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Result of checking the table against an upstream tree
#[derive(Debug, Clone, Default, Serialize)]
pub struct NamingAudit {
    /// Prefix rules with at least one matching directory
    pub confirmed: Vec<String>,
    /// Prefix rules with no matching directory
    pub unused: Vec<String>,
}

/// Static mapping from package names to upstream directory names
#[derive(Debug, Clone)]
pub struct NamingTable {
    prefixes: Vec<PrefixRule>,
}

impl Default for NamingTable {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_PREFIXES.to_vec(),
        }
    }
}

impl NamingTable {
    /// Prefix rules in lookup order
    pub fn prefixes(&self) -> &[PrefixRule] {
        &self.prefixes
    }

    /// Map a package name to its upstream directory name
    pub fn directory_for(&self, package: &str) -> String {
        let mapped = match self
            .prefixes
            .iter()
            .find(|rule| package.starts_with(rule.package_prefix))
        {
            Some(rule) => format!(
                "{}{}",
                rule.directory_prefix,
                &package[rule.package_prefix.len()..]
            ),
            None => package.to_string(),
        };

        let mut dir = mapped.replace('-', "_");
        if dir.starts_with(|c: char| c.is_ascii_digit()) {
            dir.insert(0, '_');
        }
        if PYTHON_KEYWORDS.contains(&dir.as_str()) {
            dir.push('_');
        }
        dir
    }

    /// Directory names to try, most specific first
    ///
    /// The literal package name is kept as a fallback for upstream trees that
    /// still use the hyphenated layout.
    pub fn candidates(&self, package: &str) -> Vec<String> {
        let mapped = self.directory_for(package);
        if mapped == package {
            vec![mapped]
        } else {
            vec![mapped, package.to_string()]
        }
    }

    /// Check each prefix rule against the directories under `packages_dir`
    pub fn audit(&self, packages_dir: &Path) -> std::io::Result<NamingAudit> {
        let names: BTreeSet<String> = std::fs::read_dir(packages_dir)?
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();

        let mut audit = NamingAudit::default();
        for rule in &self.prefixes {
            if names.iter().any(|n| n.starts_with(rule.directory_prefix)) {
                audit.confirmed.push(rule.package_prefix.to_string());
            } else {
                audit.unused.push(rule.package_prefix.to_string());
            }
        }
        Ok(audit)
    }
}

/// Recipe class name for a package (`py-numpy` -> `PyNumpy`)
pub fn class_name_for(package: &str) -> String {
    let mut name: String = package
        .split(['-', '_', '.'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect();

    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_for() {
        let table = NamingTable::default();
        assert_eq!(table.directory_for("zlib"), "zlib");
        assert_eq!(table.directory_for("py-numpy"), "py_numpy");
        assert_eq!(table.directory_for("r-data-table"), "r_data_table");
        assert_eq!(table.directory_for("zlib-ng"), "zlib_ng");
        assert_eq!(table.directory_for("7zip"), "_7zip");
        assert_eq!(table.directory_for("pass"), "pass_");
    }

    #[test]
    fn test_candidates() {
        let table = NamingTable::default();
        assert_eq!(table.candidates("zlib"), vec!["zlib"]);
        assert_eq!(table.candidates("py-numpy"), vec!["py_numpy", "py-numpy"]);
    }

    #[test]
    fn test_class_name_for() {
        assert_eq!(class_name_for("zlib"), "Zlib");
        assert_eq!(class_name_for("py-numpy"), "PyNumpy");
        assert_eq!(class_name_for("r-data.table"), "RDataTable");
        assert_eq!(class_name_for("7zip"), "_7zip");
    }

    #[test]
    fn test_audit_reports_unused_prefixes() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("py_numpy")).unwrap();
        std::fs::create_dir(temp_dir.path().join("zlib")).unwrap();

        let audit = NamingTable::default().audit(temp_dir.path()).unwrap();
        assert_eq!(audit.confirmed, vec!["py-"]);
        assert!(audit.unused.contains(&"r-".to_string()));
    }
}
