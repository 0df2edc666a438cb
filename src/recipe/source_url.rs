// src/recipe/source_url.rs

//! Package name and version inference from download URLs
//!
//! Recognized shapes:
//!
//! | Hosting | Example |
//! |---------|---------|
//! | PyPI    | `https://files.pythonhosted.org/packages/.../requests-2.32.3.tar.gz` |
//! | CRAN    | `https://cran.r-project.org/src/contrib/Archive/dplyr/dplyr_1.1.4.tar.gz` |
//! | GitHub  | `https://github.com/owner/repo/archive/refs/tags/v1.2.0.tar.gz` |
//! | GitHub  | `https://github.com/owner/repo/releases/download/v1.2.0/repo-1.2.0.tar.xz` |
//! | Generic | `https://zlib.net/fossils/zlib-1.3.1.tar.gz` |
//!
//! Only http(s) source archives are accepted. Wheels, bare repository URLs
//! and anything without a version in the file name are rejected.

use crate::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use url::Url;

const ARCHIVE_EXT: &str = r"\.tar\.gz|\.tgz|\.tar\.bz2|\.tbz2|\.tar\.xz|\.txz|\.tar\.zst|\.tar|\.zip";

/// `<name>[-_]<version><ext>`
static ARCHIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<name>[A-Za-z0-9][A-Za-z0-9._+-]*?)[-_][vV]?(?P<version>\d[0-9A-Za-z.+_-]*?)(?P<ext>{})$",
        ARCHIVE_EXT
    ))
    .unwrap()
});

/// `<tag><ext>` for GitHub archive links
static TAG_ARCHIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?P<tag>.+?)(?P<ext>{})$", ARCHIVE_EXT)).unwrap()
});

const PYPI_HOSTS: &[&str] = &["files.pythonhosted.org", "pypi.io", "pypi.org", "pypi.python.org"];
const CRAN_HOSTS: &[&str] = &["cran.r-project.org", "cloud.r-project.org"];

/// Where an archive is hosted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pypi,
    Cran,
    Github,
    Generic,
}

/// What a URL says about the package it downloads
#[derive(Debug, Clone, Serialize)]
pub struct InferredSource {
    pub kind: SourceKind,
    /// Spack package name (`py-requests`, `r-dplyr`, `zlib`)
    pub package_name: String,
    pub version: String,
    pub homepage: String,
    pub url: String,
    /// Name as published upstream (`requests`, `dplyr`)
    pub project: String,
    /// Archive file name
    pub filename: String,
}

impl InferredSource {
    /// Fetch directive for the recipe body
    pub fn directive(&self) -> String {
        match self.kind {
            SourceKind::Pypi => format!("pypi = \"{}/{}\"", self.project, self.filename),
            SourceKind::Cran => format!("cran = \"{}\"", self.project),
            SourceKind::Github | SourceKind::Generic => format!("url = \"{}\"", self.url),
        }
    }
}

/// Infer package name and version from a download URL
pub fn infer_source(raw: &str) -> Result<InferredSource> {
    let unsupported = |why: &str| Error::UnsupportedUrl(format!("{}: {}", raw, why));

    let url = Url::parse(raw.trim()).map_err(|e| unsupported(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(unsupported("only http and https URLs are supported"));
    }
    let host = url
        .host_str()
        .ok_or_else(|| unsupported("URL has no host"))?
        .to_ascii_lowercase();

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let filename = segments
        .last()
        .copied()
        .ok_or_else(|| unsupported("URL has no file name"))?;

    if filename.ends_with(".whl") {
        return Err(unsupported("wheels are not source archives"));
    }

    let inferred = if PYPI_HOSTS.contains(&host.as_str()) {
        pypi(&url, filename)
    } else if CRAN_HOSTS.contains(&host.as_str()) {
        cran(&url, &segments, filename)
    } else if host == "github.com" {
        github(&url, &segments)
    } else {
        generic(&url, &host, filename)
    };

    let inferred = inferred.ok_or_else(|| unsupported("not a recognized archive URL"))?;
    if !is_package_name(&inferred.package_name) {
        return Err(unsupported(&format!(
            "inferred package name '{}' is not usable",
            inferred.package_name
        )));
    }
    Ok(inferred)
}

fn pypi(url: &Url, filename: &str) -> Option<InferredSource> {
    let caps = ARCHIVE_RE.captures(filename)?;
    let project = caps["name"].to_string();
    let normalized = normalize(&project);

    Some(InferredSource {
        kind: SourceKind::Pypi,
        package_name: format!("py-{}", normalized),
        version: caps["version"].to_string(),
        homepage: format!("https://pypi.org/project/{}/", normalized),
        url: url.to_string(),
        project,
        filename: filename.to_string(),
    })
}

fn cran(url: &Url, segments: &[&str], filename: &str) -> Option<InferredSource> {
    let contrib = segments.windows(2).any(|w| w == ["src", "contrib"]);
    if !contrib || !filename.ends_with(".tar.gz") {
        return None;
    }

    // CRAN archives are always `<name>_<version>.tar.gz`
    let stem = filename.strip_suffix(".tar.gz")?;
    let (project, version) = stem.rsplit_once('_')?;
    if !version.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    Some(InferredSource {
        kind: SourceKind::Cran,
        package_name: format!("r-{}", normalize(project)),
        version: version.to_string(),
        homepage: format!("https://cloud.r-project.org/package={}", project),
        url: url.to_string(),
        project: project.to_string(),
        filename: filename.to_string(),
    })
}

fn github(url: &Url, segments: &[&str]) -> Option<InferredSource> {
    let (owner, repo) = (*segments.first()?, *segments.get(1)?);

    let (tag, filename) = match &segments[2..] {
        ["archive", "refs", "tags", file] | ["archive", file] => {
            let caps = TAG_ARCHIVE_RE.captures(file)?;
            (caps["tag"].to_string(), file.to_string())
        }
        ["releases", "download", tag, file] => {
            TAG_ARCHIVE_RE.captures(file)?;
            (tag.to_string(), file.to_string())
        }
        _ => return None,
    };

    let version = version_from_tag(&tag, repo)?;

    Some(InferredSource {
        kind: SourceKind::Github,
        package_name: normalize(repo),
        version,
        homepage: format!("https://github.com/{}/{}", owner, repo),
        url: url.to_string(),
        project: repo.to_string(),
        filename,
    })
}

fn generic(url: &Url, host: &str, filename: &str) -> Option<InferredSource> {
    let caps = ARCHIVE_RE.captures(filename)?;
    let project = caps["name"].to_string();

    Some(InferredSource {
        kind: SourceKind::Generic,
        package_name: normalize(&project),
        version: caps["version"].to_string(),
        homepage: format!("{}://{}/", url.scheme(), host),
        url: url.to_string(),
        project,
        filename: filename.to_string(),
    })
}

/// `v1.2.0`, `repo-1.2.0` and `1.2.0` all give `1.2.0`
fn version_from_tag(tag: &str, repo: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let repo_prefix = format!("{}-", repo.to_ascii_lowercase());

    let mut version = tag;
    if lower.starts_with(&repo_prefix) {
        version = &tag[repo_prefix.len()..];
    }
    version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);

    version
        .starts_with(|c: char| c.is_ascii_digit())
        .then(|| version.to_string())
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase().replace(['_', '.'], "-")
}

fn is_package_name(name: &str) -> bool {
    !name.is_empty()
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pypi_sdist() {
        let src = infer_source(
            "https://files.pythonhosted.org/packages/63/70/abc/requests-2.32.3.tar.gz",
        )
        .unwrap();
        assert_eq!(src.kind, SourceKind::Pypi);
        assert_eq!(src.package_name, "py-requests");
        assert_eq!(src.version, "2.32.3");
        assert_eq!(src.directive(), "pypi = \"requests/requests-2.32.3.tar.gz\"");
    }

    #[test]
    fn test_pypi_underscore_project() {
        let src = infer_source("https://pypi.io/packages/source/t/typing_extensions/typing_extensions-4.12.2.tar.gz").unwrap();
        assert_eq!(src.package_name, "py-typing-extensions");
        assert_eq!(src.version, "4.12.2");
    }

    #[test]
    fn test_cran_archive() {
        let src = infer_source(
            "https://cran.r-project.org/src/contrib/Archive/data.table/data.table_1.15.4.tar.gz",
        )
        .unwrap();
        assert_eq!(src.kind, SourceKind::Cran);
        assert_eq!(src.package_name, "r-data-table");
        assert_eq!(src.version, "1.15.4");
        assert_eq!(src.directive(), "cran = \"data.table\"");
    }

    #[test]
    fn test_github_archive_shapes() {
        let tags = infer_source("https://github.com/samtools/htslib/archive/refs/tags/v1.21.tar.gz").unwrap();
        assert_eq!(tags.kind, SourceKind::Github);
        assert_eq!(tags.package_name, "htslib");
        assert_eq!(tags.version, "1.21");
        assert_eq!(tags.homepage, "https://github.com/samtools/htslib");

        let short = infer_source("https://github.com/madler/zlib/archive/zlib-1.3.1.zip").unwrap();
        assert_eq!(short.version, "1.3.1");

        let release = infer_source(
            "https://github.com/samtools/samtools/releases/download/1.21/samtools-1.21.tar.bz2",
        )
        .unwrap();
        assert_eq!(release.package_name, "samtools");
        assert_eq!(release.version, "1.21");
    }

    #[test]
    fn test_generic_archive() {
        let src = infer_source("https://zlib.net/fossils/zlib-1.3.1.tar.gz").unwrap();
        assert_eq!(src.kind, SourceKind::Generic);
        assert_eq!(src.package_name, "zlib");
        assert_eq!(src.version, "1.3.1");
        assert_eq!(src.homepage, "https://zlib.net/");
        assert_eq!(src.directive(), "url = \"https://zlib.net/fossils/zlib-1.3.1.tar.gz\"");
    }

    #[test]
    fn test_unsupported_urls() {
        for url in [
            "ftp://example.com/foo-1.0.tar.gz",
            "https://example.com/",
            "https://example.com/download.php",
            "https://files.pythonhosted.org/packages/xx/requests-2.32.3-py3-none-any.whl",
            "https://github.com/samtools/htslib",
            "https://github.com/samtools/htslib/archive/main.tar.gz",
            "not a url",
        ] {
            assert!(
                matches!(infer_source(url), Err(Error::UnsupportedUrl(_))),
                "{} should be unsupported",
                url
            );
        }
    }
}
