// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Addon dependency rules - identifiers kept alive for dynamic lookup.
//!
//! Legacy packages invoke exports by name at runtime (markup resolved
//! against a registry, string-keyed service lookup), so those identifiers
//! look unused to a static reachability pass. The rule engine is a pure
//! oracle: it answers which identifiers of a module must be treated as
//! always-reachable roots. It performs no elimination itself.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a required identifier is referenced at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Invoked by name from markup as a component
    Component,
    /// Referenced as a plain value
    Plain,
}

fn default_kind() -> IdentifierKind {
    IdentifierKind::Plain
}

/// One identifier an elimination pass must treat as a live root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredIdentifier {
    /// The exported identifier text
    pub name: String,
    /// How the identifier is referenced
    #[serde(default = "default_kind")]
    pub kind: IdentifierKind,
}

impl RequiredIdentifier {
    /// A component-referenced identifier.
    pub fn component(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: IdentifierKind::Component,
        }
    }

    /// A plainly-referenced identifier.
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: IdentifierKind::Plain,
        }
    }
}

/// Rules for one package: module relative path -> required identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    /// The package the rules apply to
    pub package: String,
    /// Required identifiers per module relative path
    pub modules: BTreeMap<String, Vec<RequiredIdentifier>>,
}

/// Accumulated rule state for one build. Append-only.
#[derive(Default)]
pub struct PackageRules {
    entries: FxHashMap<String, FxHashMap<String, Vec<RequiredIdentifier>>>,
}

impl PackageRules {
    /// An empty rule registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in rule sets for well-known
    /// legacy packages. Built-ins register before any user-supplied set, so
    /// user rules append rather than precede them.
    pub fn with_builtins() -> Self {
        let mut rules = Self::new();
        for set in builtin_rule_sets() {
            rules.register(set);
        }
        rules
    }

    /// Merge a rule set into the accumulated state.
    ///
    /// For each (package, module) key the new identifiers are appended, then
    /// deduplicated by (name, kind); first-seen order is preserved.
    pub fn register(&mut self, set: RuleSet) {
        debug!(
            "Registering rules for {} ({} modules)",
            set.package,
            set.modules.len()
        );
        let package = self.entries.entry(set.package).or_default();
        for (module, identifiers) in set.modules {
            let slot = package.entry(module).or_default();
            for identifier in identifiers {
                if !slot.contains(&identifier) {
                    slot.push(identifier);
                }
            }
        }
    }

    /// The required identifiers for one module, empty if no rule exists.
    pub fn lookup(&self, package: &str, module: &str) -> &[RequiredIdentifier] {
        self.entries
            .get(package)
            .and_then(|modules| modules.get(module))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Rule sets shipped with gantry for legacy packages known to resolve their
/// exports dynamically.
fn builtin_rule_sets() -> Vec<RuleSet> {
    vec![
        RuleSet {
            package: "legacy-power-select".to_string(),
            modules: BTreeMap::from([(
                "components/power-select.js".to_string(),
                vec![
                    RequiredIdentifier::component("PowerSelect"),
                    RequiredIdentifier::component("PowerSelectMultiple"),
                ],
            )]),
        },
        RuleSet {
            package: "legacy-modal-dialog".to_string(),
            modules: BTreeMap::from([
                (
                    "components/modal-dialog.js".to_string(),
                    vec![RequiredIdentifier::component("ModalDialog")],
                ),
                (
                    "services/modal-stack.js".to_string(),
                    vec![RequiredIdentifier::plain("ModalStackService")],
                ),
            ]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(package: &str, module: &str, identifiers: Vec<RequiredIdentifier>) -> RuleSet {
        RuleSet {
            package: package.to_string(),
            modules: BTreeMap::from([(module.to_string(), identifiers)]),
        }
    }

    #[test]
    fn test_merge_dedups_preserving_first_seen_order() {
        let mut rules = PackageRules::new();
        rules.register(set(
            "pkg-a",
            "m.js",
            vec![RequiredIdentifier::component("CompA")],
        ));
        rules.register(set(
            "pkg-a",
            "m.js",
            vec![
                RequiredIdentifier::component("CompA"),
                RequiredIdentifier::component("CompB"),
            ],
        ));

        assert_eq!(
            rules.lookup("pkg-a", "m.js"),
            &[
                RequiredIdentifier::component("CompA"),
                RequiredIdentifier::component("CompB"),
            ]
        );
    }

    #[test]
    fn test_same_name_different_kind_both_kept() {
        let mut rules = PackageRules::new();
        rules.register(set(
            "pkg-a",
            "m.js",
            vec![
                RequiredIdentifier::component("Thing"),
                RequiredIdentifier::plain("Thing"),
            ],
        ));
        assert_eq!(rules.lookup("pkg-a", "m.js").len(), 2);
    }

    #[test]
    fn test_lookup_without_rules_is_empty() {
        let rules = PackageRules::new();
        assert!(rules.lookup("pkg-a", "m.js").is_empty());
    }

    #[test]
    fn test_builtins_precede_user_rules() {
        let mut rules = PackageRules::with_builtins();
        rules.register(set(
            "legacy-power-select",
            "components/power-select.js",
            vec![RequiredIdentifier::component("PowerSelectCustom")],
        ));

        let identifiers = rules.lookup("legacy-power-select", "components/power-select.js");
        assert_eq!(identifiers[0], RequiredIdentifier::component("PowerSelect"));
        assert_eq!(
            identifiers.last(),
            Some(&RequiredIdentifier::component("PowerSelectCustom"))
        );
    }

    #[test]
    fn test_rule_sets_deserialize_with_default_kind() {
        let set: RuleSet = serde_json::from_str(
            r#"{
                "package": "pkg-a",
                "modules": {
                    "m.js": [
                        { "name": "CompA", "kind": "component" },
                        { "name": "helper" }
                    ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(set.modules["m.js"][0], RequiredIdentifier::component("CompA"));
        assert_eq!(set.modules["m.js"][1], RequiredIdentifier::plain("helper"));
    }
}
