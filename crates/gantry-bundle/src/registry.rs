// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Virtual module registry - synthesized module content for bundler requests.
//!
//! Downstream bundlers hand any unresolved specifier to the registry: `owns`
//! answers whether the specifier is a virtual request token, `synthesize`
//! returns the final source text for it. Content is a pure function of the
//! decoded descriptor plus the build's module inventory and is memoized for
//! the life of the registry (one build).

use std::fmt::Write as _;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use gantry_core::ModuleInventory;

use crate::error::{BundleError, Result};

/// Specifier prefix owned by the registry.
pub const VIRTUAL_PREFIX: &str = "@gantry/virtual/";

const INVENTORY_TOKEN: &str = "inventory.js";
const REEXPORT_CATEGORY: &str = "reexport/";

/// Decoded descriptor for one virtual module request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualRequest {
    /// The per-build inventory of every discoverable legacy module.
    Inventory,
    /// Re-exports of a set of underlying modules belonging to one package.
    ReexportShim {
        /// The package the underlying modules belong to
        package: String,
        /// Module relative paths to re-export, in order
        modules: Vec<String>,
    },
}

#[derive(Serialize, Deserialize)]
struct ShimPayload {
    package: String,
    modules: Vec<String>,
}

impl VirtualRequest {
    /// Encode this descriptor as a specifier token.
    ///
    /// The token is a valid module specifier: payload fields are JSON inside
    /// a percent-encoded path segment, so downstream resolvers never see
    /// characters they would reject or reinterpret.
    pub fn encode(&self) -> String {
        match self {
            VirtualRequest::Inventory => format!("{}{}", VIRTUAL_PREFIX, INVENTORY_TOKEN),
            VirtualRequest::ReexportShim { package, modules } => {
                let payload = serde_json::json!({
                    "package": package,
                    "modules": modules,
                })
                .to_string();
                format!(
                    "{}{}{}.js",
                    VIRTUAL_PREFIX,
                    REEXPORT_CATEGORY,
                    urlencoding::encode(&payload)
                )
            }
        }
    }

    /// Decode a specifier token. Exact inverse of [`encode`](Self::encode).
    pub fn decode(token: &str) -> Result<Self> {
        let body = token
            .strip_prefix(VIRTUAL_PREFIX)
            .ok_or_else(|| malformed(token, "missing virtual module prefix"))?;

        if body == INVENTORY_TOKEN {
            return Ok(VirtualRequest::Inventory);
        }

        if let Some(rest) = body.strip_prefix(REEXPORT_CATEGORY) {
            let encoded = rest
                .strip_suffix(".js")
                .ok_or_else(|| malformed(token, "missing .js suffix"))?;
            let raw = urlencoding::decode(encoded)
                .map_err(|e| malformed(token, &format!("payload is not UTF-8: {}", e)))?;
            let payload: ShimPayload = serde_json::from_str(&raw)
                .map_err(|e| malformed(token, &format!("invalid payload: {}", e)))?;
            return Ok(VirtualRequest::ReexportShim {
                package: payload.package,
                modules: payload.modules,
            });
        }

        Err(malformed(token, "unknown virtual module category"))
    }
}

fn malformed(token: &str, reason: &str) -> BundleError {
    BundleError::MalformedRequest {
        token: token.to_string(),
        reason: reason.to_string(),
    }
}

/// Registry answering ownership and content queries for virtual specifiers.
///
/// Thread-safe: concurrent `synthesize` calls for the same token are
/// serialized on first access and every caller receives the same cached
/// content.
pub struct VirtualModules {
    inventory: Arc<ModuleInventory>,
    cache: DashMap<String, Arc<str>>,
}

impl VirtualModules {
    /// Create a registry over the build's module inventory.
    pub fn new(inventory: Arc<ModuleInventory>) -> Self {
        Self {
            inventory,
            cache: DashMap::new(),
        }
    }

    /// Whether this registry owns a specifier.
    pub fn owns(&self, token: &str) -> bool {
        token.starts_with(VIRTUAL_PREFIX)
    }

    /// Synthesized content for a token, memoized for the life of the build.
    pub fn synthesize(&self, token: &str) -> Result<Arc<str>> {
        if let Some(hit) = self.cache.get(token) {
            trace!("Virtual module cache hit: {}", token);
            return Ok(hit.value().clone());
        }

        // Decode before touching the cache so a malformed token cannot
        // disturb previously memoized entries.
        let request = VirtualRequest::decode(token)?;
        let entry = self.cache.entry(token.to_string()).or_insert_with(|| {
            debug!("Synthesizing virtual module: {}", token);
            Arc::from(self.render(&request))
        });
        Ok(entry.value().clone())
    }

    fn render(&self, request: &VirtualRequest) -> String {
        match request {
            VirtualRequest::Inventory => self.render_inventory(),
            VirtualRequest::ReexportShim { package, modules } => {
                render_reexports(package, modules)
            }
        }
    }

    /// One static entry point onto the dynamically-discovered module set: a
    /// lazy getter per legacy module id.
    fn render_inventory(&self) -> String {
        let mut out = String::from("export default {\n");
        for (id, specifier) in self.inventory.module_ids() {
            let _ = writeln!(
                out,
                "  get {:?}() {{ return require({:?}); }},",
                id, specifier
            );
        }
        out.push_str("};\n");
        out
    }
}

fn render_reexports(package: &str, modules: &[String]) -> String {
    let mut out = String::new();
    for module in modules {
        let _ = writeln!(out, "export * from {:?};", format!("{}/{}", package, module));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> Arc<ModuleInventory> {
        let mut inventory = ModuleInventory::new();
        inventory.add_module("addon-x", "components/button.js");
        inventory.add_module("addon-x", "helpers/format.js");
        inventory.add_module("addon-a", "index.js");
        Arc::new(inventory)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let requests = [
            VirtualRequest::Inventory,
            VirtualRequest::ReexportShim {
                package: "addon-x".to_string(),
                modules: vec![
                    "components/button.js".to_string(),
                    "helpers/format.js".to_string(),
                ],
            },
        ];
        for request in requests {
            let token = request.encode();
            assert_eq!(VirtualRequest::decode(&token).unwrap(), request);
        }
    }

    #[test]
    fn test_tokens_are_specifier_safe() {
        let token = VirtualRequest::ReexportShim {
            package: "@scope/addon".to_string(),
            modules: vec!["a b/c.js".to_string()],
        }
        .encode();
        assert!(!token.contains(' '));
        assert!(!token.contains('"'));
        assert!(!token.contains('{'));
    }

    #[test]
    fn test_decode_rejects_foreign_and_garbled_tokens() {
        assert!(VirtualRequest::decode("lodash/get").is_err());
        assert!(VirtualRequest::decode("@gantry/virtual/unknown/x.js").is_err());
        assert!(VirtualRequest::decode("@gantry/virtual/reexport/%7Bnope.js").is_err());
    }

    #[test]
    fn test_ownership() {
        let registry = VirtualModules::new(inventory());
        assert!(registry.owns(&VirtualRequest::Inventory.encode()));
        assert!(!registry.owns("addon-x/components/button"));
    }

    #[test]
    fn test_inventory_content_is_memoized_and_stable() {
        let registry = VirtualModules::new(inventory());
        let token = VirtualRequest::Inventory.encode();

        let first = registry.synthesize(&token).unwrap();
        let second = registry.synthesize(&token).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(first.contains(
            "get \"addon-x/components/button\"() { return require(\"addon-x/components/button.js\"); },"
        ));
        assert!(first.contains("get \"addon-a/index\"()"));
    }

    #[test]
    fn test_reexport_shim_content_in_request_order() {
        let registry = VirtualModules::new(inventory());
        let token = VirtualRequest::ReexportShim {
            package: "addon-x".to_string(),
            modules: vec![
                "helpers/format.js".to_string(),
                "components/button.js".to_string(),
            ],
        }
        .encode();

        let content = registry.synthesize(&token).unwrap();
        assert_eq!(
            content.as_ref(),
            "export * from \"addon-x/helpers/format.js\";\nexport * from \"addon-x/components/button.js\";\n"
        );
    }

    #[test]
    fn test_malformed_request_leaves_cache_intact() {
        let registry = VirtualModules::new(inventory());
        let token = VirtualRequest::Inventory.encode();
        let before = registry.synthesize(&token).unwrap();

        assert!(registry.synthesize("@gantry/virtual/unknown/x.js").is_err());

        let after = registry.synthesize(&token).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }
}
