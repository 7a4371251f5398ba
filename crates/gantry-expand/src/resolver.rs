//! Compile-time specifier resolution for `importSync`.
//!
//! An in-memory replay of the usual resolution algorithm: candidates are
//! tested against the build's module inventory instead of the filesystem.

use gantry_core::ModuleInventory;
use tracing::trace;

/// Resolver for `importSync` specifiers against the module inventory.
pub struct CompileResolver<'a> {
    inventory: &'a ModuleInventory,
    extensions: Vec<String>,
}

impl<'a> CompileResolver<'a> {
    /// Create a resolver over `inventory` trying `extensions` in order.
    pub fn new(inventory: &'a ModuleInventory, extensions: Vec<String>) -> Self {
        Self {
            inventory,
            extensions,
        }
    }

    /// Resolve a specifier to `package/relative-path` form.
    ///
    /// Relative specifiers resolve against the owning package's root; parent
    /// traversal past the package root fails. Returns `None` when no
    /// candidate exists in the inventory.
    pub fn resolve(&self, specifier: &str, from_package: &str) -> Option<String> {
        let (package, subpath) = if specifier.starts_with("./") || specifier.starts_with("../") {
            (from_package, Some(normalize_relative(specifier)?))
        } else {
            let (package, subpath) = parse_package_specifier(specifier);
            (package, subpath.map(str::to_string))
        };

        let resolved = self.resolve_in_package(package, subpath.as_deref());
        match &resolved {
            Some(id) => trace!("Resolved {} to {}", specifier, id),
            None => trace!("Could not resolve {} from {}", specifier, from_package),
        }
        resolved
    }

    fn resolve_in_package(&self, package: &str, subpath: Option<&str>) -> Option<String> {
        if !self.inventory.has_package(package) {
            return None;
        }
        let relative = subpath.unwrap_or("index");

        // Try exact path first
        if self.inventory.contains(package, relative) {
            return Some(format!("{}/{}", package, relative));
        }

        // Try with extensions
        for ext in &self.extensions {
            let candidate = format!("{}{}", relative, ext);
            if self.inventory.contains(package, &candidate) {
                return Some(format!("{}/{}", package, candidate));
            }
        }

        // Try as directory with index file
        for ext in &self.extensions {
            let candidate = format!("{}/index{}", relative, ext);
            if self.inventory.contains(package, &candidate) {
                return Some(format!("{}/{}", package, candidate));
            }
        }

        None
    }
}

/// Parse a package specifier into name and optional subpath.
fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    if specifier.starts_with('@') {
        // Scoped package: @scope/name or @scope/name/subpath
        if let Some(slash_pos) = specifier[1..].find('/') {
            let after_scope = &specifier[slash_pos + 2..];
            if let Some(subpath_pos) = after_scope.find('/') {
                let name_end = slash_pos + 2 + subpath_pos;
                return (&specifier[..name_end], Some(&specifier[name_end + 1..]));
            }
        }
        (specifier, None)
    } else {
        // Regular package: name or name/subpath
        if let Some(slash_pos) = specifier.find('/') {
            (&specifier[..slash_pos], Some(&specifier[slash_pos + 1..]))
        } else {
            (specifier, None)
        }
    }
}

/// Collapse `.` and `..` segments of a relative specifier against the package
/// root. `None` when the path escapes the package.
fn normalize_relative(specifier: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}
