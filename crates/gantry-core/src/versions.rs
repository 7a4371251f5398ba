//! Dependency version graph and range matching.

use rustc_hash::FxHashMap;
use semver::{Version, VersionReq};

use crate::error::{CoreError, Result};

/// Read-only snapshot of every participating package's resolved version,
/// taken once at build start.
#[derive(Debug, Clone, Default)]
pub struct VersionGraph {
    versions: FxHashMap<String, Version>,
}

impl VersionGraph {
    /// Create an empty version graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a package's resolved installed version.
    pub fn insert(&mut self, package: impl Into<String>, version: &str) -> Result<()> {
        let package = package.into();
        let parsed = Version::parse(version).map_err(|source| CoreError::InvalidVersion {
            package: package.clone(),
            version: version.to_string(),
            source,
        })?;
        self.versions.insert(package, parsed);
        Ok(())
    }

    /// The resolved version of a package, if installed.
    pub fn version_of(&self, package: &str) -> Option<&Version> {
        self.versions.get(package)
    }

    /// Whether the installed version of `package` satisfies `range`.
    ///
    /// A package missing from the graph yields `false`, not an error.
    /// Prerelease versions only match when the range itself names one.
    pub fn satisfies(&self, package: &str, range: &str) -> Result<bool> {
        let Some(version) = self.versions.get(package) else {
            return Ok(false);
        };
        let req = parse_version_req(range)?;
        Ok(req.matches(version))
    }
}

/// Parse a version requirement string, accepting npm-style ranges.
fn parse_version_req(range: &str) -> Result<VersionReq> {
    let range = range.trim();

    // Bare exact versions pin with `=` rather than the default caret.
    if range.chars().next().map_or(false, |c| c.is_ascii_digit()) && Version::parse(range).is_ok() {
        return VersionReq::parse(&format!("={}", range)).map_err(|source| {
            CoreError::InvalidRange {
                range: range.to_string(),
                source,
            }
        });
    }

    // Handle x.x.x ranges
    let normalized = range.replace(".x", ".*").replace(".X", ".*");

    VersionReq::parse(&normalized).map_err(|source| CoreError::InvalidRange {
        range: range.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(entries: &[(&str, &str)]) -> VersionGraph {
        let mut graph = VersionGraph::new();
        for (name, version) in entries {
            graph.insert(*name, version).unwrap();
        }
        graph
    }

    #[test]
    fn test_satisfies_caret_range() {
        let graph = graph(&[("pkg", "2.3.1")]);
        assert!(graph.satisfies("pkg", "^2.0.0").unwrap());
        assert!(!graph.satisfies("pkg", "^3.0.0").unwrap());
    }

    #[test]
    fn test_satisfies_below_range() {
        let graph = graph(&[("pkg", "1.9.0")]);
        assert!(!graph.satisfies("pkg", "^2.0.0").unwrap());
    }

    #[test]
    fn test_missing_package_is_false() {
        let graph = VersionGraph::new();
        assert!(!graph.satisfies("absent", "^1.0.0").unwrap());
    }

    #[test]
    fn test_exact_and_x_ranges() {
        let graph = graph(&[("pkg", "1.2.0")]);
        assert!(graph.satisfies("pkg", "1.2.0").unwrap());
        assert!(!graph.satisfies("pkg", "1.2.1").unwrap());
        assert!(graph.satisfies("pkg", "1.x").unwrap());
        assert!(graph.satisfies("pkg", "*").unwrap());
    }

    #[test]
    fn test_prerelease_excluded_unless_requested() {
        let graph = graph(&[("pkg", "2.1.0-beta.1")]);
        assert!(!graph.satisfies("pkg", "^2.0.0").unwrap());
        assert!(graph.satisfies("pkg", "^2.1.0-beta").unwrap());
    }

    #[test]
    fn test_invalid_range_is_an_error() {
        let graph = graph(&[("pkg", "1.0.0")]);
        assert!(graph.satisfies("pkg", "not a range").is_err());
    }

    #[test]
    fn test_invalid_version_is_an_error() {
        let mut graph = VersionGraph::new();
        assert!(graph.insert("pkg", "one.two").is_err());
    }
}
