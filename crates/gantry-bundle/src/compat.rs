// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Detection of already-configured legacy build transforms.
//!
//! Orchestration inserts equivalent transforms into the pipeline unless the
//! host build configuration already carries them. Recognition is by path
//! suffix only; descriptor shapes without an extractable path (inline
//! functions, bare option objects) classify as "not a match", never as an
//! error.

use serde_json::Value;

/// The legacy transforms orchestration may need to insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Rewrites dynamic `import()` of legacy packages into bundler-visible
    /// requests
    DynamicImportBridge,
    /// Collapses chains of legacy re-export modules into direct exports
    ReexportFlatten,
}

/// One configured transform, in whatever shape the host build config uses.
#[derive(Debug, Clone)]
pub enum PluginDescriptor {
    /// Bare path to the transform implementation
    Path(String),
    /// Path plus an options value
    PathWithOptions(String, Value),
    /// Inline function or options object; carries no path
    Opaque,
}

impl PluginDescriptor {
    fn path(&self) -> Option<&str> {
        match self {
            PluginDescriptor::Path(path) => Some(path),
            PluginDescriptor::PathWithOptions(path, _) => Some(path),
            PluginDescriptor::Opaque => None,
        }
    }
}

// Install layouts differ across package managers, but the published file
// tails are stable.
const DYNAMIC_IMPORT_SUFFIXES: &[&str] = &[
    "gantry-dynamic-import/js/index.js",
    "gantry-dynamic-import/index.js",
];
const REEXPORT_FLATTEN_SUFFIXES: &[&str] = &[
    "gantry-flatten-reexports/js/index.js",
    "gantry-flatten-reexports/index.js",
];

/// Whether `descriptor` is a configured instance of the known transform
/// `kind`. Pure classification; never an error.
pub fn matches_known_transform(descriptor: &PluginDescriptor, kind: TransformKind) -> bool {
    let Some(path) = descriptor.path() else {
        return false;
    };
    let normalized = path.replace('\\', "/");
    suffixes(kind)
        .iter()
        .any(|suffix| normalized.ends_with(suffix))
}

fn suffixes(kind: TransformKind) -> &'static [&'static str] {
    match kind {
        TransformKind::DynamicImportBridge => DYNAMIC_IMPORT_SUFFIXES,
        TransformKind::ReexportFlatten => REEXPORT_FLATTEN_SUFFIXES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_path_matches() {
        let descriptor = PluginDescriptor::Path(
            "/repo/node_modules/gantry-dynamic-import/js/index.js".to_string(),
        );
        assert!(matches_known_transform(
            &descriptor,
            TransformKind::DynamicImportBridge
        ));
        assert!(!matches_known_transform(
            &descriptor,
            TransformKind::ReexportFlatten
        ));
    }

    #[test]
    fn test_path_with_options_matches() {
        let descriptor = PluginDescriptor::PathWithOptions(
            "/x/gantry-flatten-reexports/index.js".to_string(),
            json!({}),
        );
        assert!(matches_known_transform(
            &descriptor,
            TransformKind::ReexportFlatten
        ));
    }

    #[test]
    fn test_windows_separators_match() {
        let descriptor = PluginDescriptor::Path(
            "C:\\repo\\node_modules\\gantry-dynamic-import\\index.js".to_string(),
        );
        assert!(matches_known_transform(
            &descriptor,
            TransformKind::DynamicImportBridge
        ));
    }

    #[test]
    fn test_opaque_descriptor_never_matches() {
        assert!(!matches_known_transform(
            &PluginDescriptor::Opaque,
            TransformKind::DynamicImportBridge
        ));
        assert!(!matches_known_transform(
            &PluginDescriptor::Opaque,
            TransformKind::ReexportFlatten
        ));
    }

    #[test]
    fn test_unrelated_path_does_not_match() {
        let descriptor = PluginDescriptor::Path("/x/some-other-transform/index.js".to_string());
        assert!(!matches_known_transform(
            &descriptor,
            TransformKind::DynamicImportBridge
        ));
    }
}
