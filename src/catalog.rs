// src/catalog.rs

//! Package catalog queries against the build tool
//!
//! Parses the plain-text output of `spack list` and `spack info` into typed
//! results. Queries run in a session's configuration scope, so recipes the
//! session has written are visible next to the shared repositories.

use serde::Serialize;

/// Matches for a `spack list` query
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    /// Number of matches before the limit was applied
    pub total: usize,
    pub packages: Vec<String>,
}

/// One version line from `spack info`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One variant from `spack info`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Variant {
    pub name: String,
    pub default: String,
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// `when @...` condition, if the variant is conditional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional: Option<String>,
}

/// Structured `spack info` output
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Build system class, e.g. `AutotoolsPackage`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_version: Option<VersionEntry>,
    pub safe_versions: Vec<VersionEntry>,
    pub deprecated_versions: Vec<VersionEntry>,
    pub variants: Vec<Variant>,
    pub build_dependencies: Vec<String>,
    pub link_dependencies: Vec<String>,
    pub run_dependencies: Vec<String>,
    pub licenses: Vec<String>,
    /// Union of all dependency kinds, sorted
    pub dependencies: Vec<String>,
}

/// Outcome of `spack uninstall`
#[derive(Debug, Clone, Serialize)]
pub struct UninstallResult {
    pub success: bool,
    /// `name` or `name@version`
    pub spec: String,
    pub force: bool,
    pub message: String,
    /// Tail of the tool's output when it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Package names from `spack list` output, in order
pub fn parse_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('='))
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Description,
    Preferred,
    Safe,
    Deprecated,
    Variants,
    Build,
    Link,
    Run,
    Licenses,
    Other,
}

/// Parse `spack info` output
///
/// Sections are headed by unindented `Name:` lines; their entries are the
/// indented lines that follow. Unknown sections are skipped.
pub fn parse_info(package: &str, version: Option<&str>, output: &str) -> PackageInfo {
    let mut info = PackageInfo {
        name: package.to_string(),
        version: version.map(str::to_string),
        ..Default::default()
    };
    let mut section = Section::Other;
    let mut seen_header = false;
    let mut description: Vec<String> = Vec::new();
    let mut variant: Option<Variant> = None;

    for raw in output.lines() {
        let line = raw.trim_end();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if !line.starts_with(char::is_whitespace) {
            if let Some(done) = variant.take() {
                info.variants.push(done);
            }
            let Some((head, rest)) = line.split_once(':') else {
                section = Section::Other;
                continue;
            };
            let rest = rest.trim();

            section = match head.trim() {
                "Description" => Section::Description,
                "Homepage" => {
                    if !rest.is_empty() {
                        info.homepage = Some(rest.to_string());
                    }
                    Section::Other
                }
                "Preferred version" => Section::Preferred,
                "Safe versions" => Section::Safe,
                "Deprecated versions" => Section::Deprecated,
                "Variants" => Section::Variants,
                "Build Dependencies" => Section::Build,
                "Link Dependencies" => Section::Link,
                "Run Dependencies" => Section::Run,
                "Licenses" => Section::Licenses,
                head if !seen_header && !head.contains(' ') => {
                    info.package_type = Some(head.to_string());
                    Section::Other
                }
                _ => Section::Other,
            };
            seen_header = true;

            // Some sections put their first entry on the header line
            if !rest.is_empty() && rest != "None" {
                match section {
                    Section::Description => description.push(rest.to_string()),
                    Section::Licenses => info.licenses.push(rest.to_string()),
                    _ => {}
                }
            }
            continue;
        }

        if trimmed == "None" {
            continue;
        }
        match section {
            Section::Description => description.push(trimmed.to_string()),
            Section::Preferred => {
                if info.preferred_version.is_none() {
                    info.preferred_version = version_entry(trimmed);
                }
            }
            Section::Safe => info.safe_versions.extend(version_entry(trimmed)),
            Section::Deprecated => info.deprecated_versions.extend(version_entry(trimmed)),
            Section::Variants => variant_line(trimmed, &mut variant, &mut info.variants),
            Section::Build => extend_words(&mut info.build_dependencies, trimmed),
            Section::Link => extend_words(&mut info.link_dependencies, trimmed),
            Section::Run => extend_words(&mut info.run_dependencies, trimmed),
            Section::Licenses => info.licenses.push(trimmed.to_string()),
            Section::Other => {}
        }
    }
    if let Some(done) = variant.take() {
        info.variants.push(done);
    }

    if !description.is_empty() {
        info.description = Some(description.join(" "));
    }

    let mut all: Vec<String> = info
        .build_dependencies
        .iter()
        .chain(&info.link_dependencies)
        .chain(&info.run_dependencies)
        .cloned()
        .collect();
    all.sort();
    all.dedup();
    info.dependencies = all;

    info
}

fn version_entry(line: &str) -> Option<VersionEntry> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    Some(VersionEntry {
        version: version.to_string(),
        url: parts.next().map(str::to_string),
    })
}

fn extend_words(into: &mut Vec<String>, line: &str) {
    into.extend(line.split_whitespace().map(str::to_string));
}

/// `name [default]  values` opens a variant; other lines describe it
fn variant_line(line: &str, current: &mut Option<Variant>, done: &mut Vec<Variant>) {
    if let (Some(open), Some(close)) = (line.find('['), line.find(']')) {
        if open > 0 && close > open {
            let name = line[..open].trim();
            // Column header of the tabular layout
            if name == "Name" {
                return;
            }
            if let Some(previous) = current.take() {
                done.push(previous);
            }
            let values = line[close + 1..]
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            *current = Some(Variant {
                name: name.to_string(),
                default: line[open + 1..close].trim().to_string(),
                values,
                ..Default::default()
            });
            return;
        }
    }

    let Some(variant) = current.as_mut() else {
        return;
    };
    if line.starts_with("when ") {
        variant.conditional = Some(line.to_string());
    } else if variant.description.is_empty() {
        variant.description = line.to_string();
    } else {
        variant.description.push(' ');
        variant.description.push_str(line);
    }
}
