//! Per-build snapshot of discoverable legacy modules.
//!
//! The inventory is built by an enumeration pass over the participating
//! packages at build start. It backs both compile-time specifier resolution
//! and inventory-module synthesis; nothing in this crate touches the
//! filesystem.

use std::collections::{BTreeMap, BTreeSet};

/// Mapping from package identity to that package's legacy-style module
/// relative paths (extension included, e.g. `components/button.js`).
///
/// Iteration order is deterministic so synthesized content derived from the
/// inventory is byte-stable across runs.
#[derive(Debug, Clone, Default)]
pub struct ModuleInventory {
    packages: BTreeMap<String, BTreeSet<String>>,
}

impl ModuleInventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a participating package, with no modules yet.
    pub fn add_package(&mut self, package: impl Into<String>) {
        self.packages.entry(package.into()).or_default();
    }

    /// Record one module relative path under a package.
    pub fn add_module(&mut self, package: impl Into<String>, relative_path: impl Into<String>) {
        self.packages
            .entry(package.into())
            .or_default()
            .insert(relative_path.into());
    }

    /// Whether a package participates in this build.
    pub fn has_package(&self, package: &str) -> bool {
        self.packages.contains_key(package)
    }

    /// Whether a package contains the exact module relative path.
    pub fn contains(&self, package: &str, relative_path: &str) -> bool {
        self.packages
            .get(package)
            .is_some_and(|modules| modules.contains(relative_path))
    }

    /// The module relative paths of one package, sorted.
    pub fn modules_of(&self, package: &str) -> impl Iterator<Item = &str> {
        self.packages
            .get(package)
            .into_iter()
            .flat_map(|modules| modules.iter().map(String::as_str))
    }

    /// The participating package names, sorted.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Every legacy module id with its resolvable specifier, sorted by id.
    ///
    /// The id is `package/relative-path` minus the file extension; the
    /// specifier keeps the extension so downstream resolution is exact.
    pub fn module_ids(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (package, modules) in &self.packages {
            for relative_path in modules {
                let id = format!("{}/{}", package, strip_extension(relative_path));
                let specifier = format!("{}/{}", package, relative_path);
                out.push((id, specifier));
            }
        }
        out.sort();
        out
    }

    /// Total number of modules across all packages.
    pub fn len(&self) -> usize {
        self.packages.values().map(BTreeSet::len).sum()
    }

    /// Whether the inventory holds no modules.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strip a trailing file extension from a relative path, leaving directory
/// components untouched.
fn strip_extension(path: &str) -> &str {
    match path.rfind('.') {
        Some(dot) if dot > path.rfind('/').map_or(0, |s| s + 1) => &path[..dot],
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let mut inventory = ModuleInventory::new();
        inventory.add_module("addon-x", "components/button.js");
        inventory.add_package("addon-y");

        assert!(inventory.has_package("addon-x"));
        assert!(inventory.has_package("addon-y"));
        assert!(!inventory.has_package("addon-z"));
        assert!(inventory.contains("addon-x", "components/button.js"));
        assert!(!inventory.contains("addon-x", "components/button"));
    }

    #[test]
    fn test_module_ids_sorted_and_stripped() {
        let mut inventory = ModuleInventory::new();
        inventory.add_module("addon-x", "components/button.js");
        inventory.add_module("addon-x", "helpers/format.js");
        inventory.add_module("addon-a", "index.js");

        assert_eq!(
            inventory.module_ids(),
            vec![
                ("addon-a/index".to_string(), "addon-a/index.js".to_string()),
                (
                    "addon-x/components/button".to_string(),
                    "addon-x/components/button.js".to_string()
                ),
                (
                    "addon-x/helpers/format".to_string(),
                    "addon-x/helpers/format.js".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_strip_extension_ignores_directory_dots() {
        assert_eq!(strip_extension("components/button.js"), "components/button");
        assert_eq!(strip_extension("v1.2/helper.js"), "v1.2/helper");
        assert_eq!(strip_extension("no-extension"), "no-extension");
    }
}
