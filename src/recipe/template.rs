// src/recipe/template.rs

//! Skeleton recipes for packages with no upstream definition

use crate::recipe::naming::class_name_for;
use crate::recipe::source_url::InferredSource;
use serde::Serialize;
use std::fmt::Write;

/// First line of the maintainers placeholder block
pub const MAINTAINERS_MARKER: &str = "# FIXME: Add a list of GitHub accounts to";
/// First line of the versions placeholder block
pub const VERSIONS_MARKER: &str = "# FIXME: Add proper versions here.";

/// Base class of a generated recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BaseClass {
    Package,
    PythonPackage,
    RPackage,
}

impl BaseClass {
    /// Guess from the ecosystem prefix of a package name
    pub fn for_package(package: &str) -> Self {
        if package.starts_with("py-") {
            Self::PythonPackage
        } else if package.starts_with("r-") {
            Self::RPackage
        } else {
            Self::Package
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Package => "Package",
            Self::PythonPackage => "PythonPackage",
            Self::RPackage => "RPackage",
        }
    }
}

/// Inputs for a generated recipe
#[derive(Debug, Clone)]
pub struct RecipeTemplate {
    pub package_name: String,
    pub base: BaseClass,
    pub homepage: Option<String>,
    /// Fetch directive line (`url = "..."`, `pypi = "..."`)
    pub fetch: Option<String>,
    pub version: Option<String>,
}

impl RecipeTemplate {
    /// Placeholder recipe with FIXME markers only
    pub fn blank(package: &str) -> Self {
        Self {
            package_name: package.to_string(),
            base: BaseClass::for_package(package),
            homepage: None,
            fetch: None,
            version: None,
        }
    }

    /// Recipe seeded from an inferred download URL
    pub fn from_source(source: &InferredSource) -> Self {
        Self {
            package_name: source.package_name.clone(),
            base: BaseClass::for_package(&source.package_name),
            homepage: Some(source.homepage.clone()),
            fetch: Some(source.directive()),
            version: Some(source.version.clone()),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);
        out.push_str(HEADER);

        let _ = writeln!(out, "class {}({}):", class_name_for(&self.package_name), self.base.name());
        out.push_str("    \"\"\"FIXME: Put a proper description of your package here.\"\"\"\n\n");

        match &self.homepage {
            Some(homepage) => {
                let _ = writeln!(out, "    homepage = \"{}\"", homepage);
            }
            None => {
                out.push_str("    # FIXME: Add a proper url for your package's homepage here.\n");
                out.push_str("    homepage = \"https://www.example.com\"\n");
            }
        }
        match &self.fetch {
            Some(fetch) => {
                let _ = writeln!(out, "    {}", fetch);
            }
            None => out.push_str("    url = \"https://www.example.com/example-1.2.3.tar.gz\"\n"),
        }
        out.push('\n');

        let _ = writeln!(out, "    {}", MAINTAINERS_MARKER);
        out.push_str("    # notify when the package is updated.\n");
        out.push_str("    # maintainers(\"github_user1\", \"github_user2\")\n\n");

        out.push_str("    # FIXME: Add the SPDX identifier of the project's license below.\n");
        out.push_str("    # license(\"UNKNOWN\")\n\n");

        match &self.version {
            Some(version) => {
                out.push_str("    # FIXME: Add the sha256 checksum of the archive.\n");
                let _ = writeln!(out, "    version(\"{}\")", version);
            }
            None => {
                let _ = writeln!(out, "    {}", VERSIONS_MARKER);
                out.push_str("    # version(\"1.2.4\")\n");
            }
        }
        out.push('\n');

        out.push_str("    # FIXME: Add dependencies if required.\n");
        match self.base {
            BaseClass::PythonPackage => {
                out.push_str("    depends_on(\"py-setuptools\", type=\"build\")\n");
            }
            BaseClass::RPackage => out.push_str("    # depends_on(\"r-foo\", type=(\"build\", \"run\"))\n"),
            BaseClass::Package => {
                out.push_str("    # depends_on(\"foo\")\n\n");
                out.push_str("    def install(self, spec, prefix):\n");
                out.push_str("        # FIXME: Unknown build system\n");
                out.push_str("        make()\n");
                out.push_str("        make(\"install\")\n");
            }
        }

        out
    }
}

const HEADER: &str = "\
# Copyright Spack Project Developers. See COPYRIGHT file for details.
#
# SPDX-License-Identifier: (Apache-2.0 OR MIT)

# ----------------------------------------------------------------------------
# If you submit this package back to Spack as a pull request,
# please first remove this boilerplate and all FIXME comments.
# ----------------------------------------------------------------------------

from spack.package import *


";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::source_url::infer_source;
    use crate::recipe::validate::validate_recipe;

    #[test]
    fn test_blank_recipe_is_valid() {
        let text = RecipeTemplate::blank("my-tool").render();
        assert!(text.contains("class MyTool(Package):"));
        assert!(text.contains("def install(self, spec, prefix):"));

        let report = validate_recipe(&text, "my-tool");
        assert!(report.is_valid, "{:?}", report.diagnostics);
        assert_eq!(report.errors().count(), 0);
    }

    #[test]
    fn test_python_blank_uses_python_base() {
        let text = RecipeTemplate::blank("py-thing").render();
        assert!(text.contains("class PyThing(PythonPackage):"));
        assert!(!text.contains("def install"));
    }

    #[test]
    fn test_from_source_fills_fields() {
        let source = infer_source("https://zlib.net/fossils/zlib-1.3.1.tar.gz").unwrap();
        let text = RecipeTemplate::from_source(&source).render();
        assert!(text.contains("    homepage = \"https://zlib.net/\"\n"));
        assert!(text.contains("    url = \"https://zlib.net/fossils/zlib-1.3.1.tar.gz\"\n"));
        assert!(text.contains("    version(\"1.3.1\")\n"));
        assert!(!text.contains(VERSIONS_MARKER));

        let report = validate_recipe(&text, "zlib");
        assert!(report.is_valid);
        assert_eq!(report.warnings().count(), 0, "{:?}", report.diagnostics);
    }
}
