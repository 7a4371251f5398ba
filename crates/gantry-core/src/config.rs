//! Build-time and runtime configuration stores.
//!
//! `BuildConfig` is the read-only snapshot macro expansion bakes values out
//! of. `RuntimeConfig` is its mutable counterpart for targets whose final
//! environment is not known at compile time (a reusable library build): the
//! consuming application mutates it after the fact through an ordered list of
//! override functions.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Environment variable overriding the resolvable module file extensions
/// (comma-separated, e.g. `".js,.mjs"`).
pub const EXTENSIONS_ENV_VAR: &str = "GANTRY_RESOLVABLE_EXTENSIONS";

/// Default ordered list of resolvable module file extensions.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".json"];

/// Read-only configuration snapshot for one build.
///
/// Maps package identity to that package's own configuration value, plus the
/// global flags. A `None` flag means the value is not known at build time and
/// predicates over it must be deferred to runtime.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    packages: BTreeMap<String, Value>,
    is_testing: Option<bool>,
    is_developing_app: Option<bool>,
}

impl BuildConfig {
    /// Create an empty build configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a package's own configuration value.
    pub fn insert_package_config(&mut self, package: impl Into<String>, value: Value) {
        self.packages.insert(package.into(), value);
    }

    /// Fix the testing flag for this build.
    pub fn set_testing(&mut self, on: bool) {
        self.is_testing = Some(on);
    }

    /// Fix the app-development flag for this build.
    pub fn set_developing_app(&mut self, on: bool) {
        self.is_developing_app = Some(on);
    }

    /// The stored configuration value for a package, if any.
    pub fn package_config(&self, package: &str) -> Option<&Value> {
        self.packages.get(package)
    }

    /// Whether this build targets a test run, if known at build time.
    pub fn is_testing(&self) -> Option<bool> {
        self.is_testing
    }

    /// Whether this build is a development build of the app, if known.
    pub fn is_developing_app(&self) -> Option<bool> {
        self.is_developing_app
    }
}

/// An override function applied to the runtime package-config map.
pub type ConfigOverride = Box<dyn Fn(&mut BTreeMap<String, Value>) + Send + Sync>;

struct RuntimeState {
    base: BTreeMap<String, Value>,
    effective: BTreeMap<String, Value>,
    overrides: Vec<ConfigOverride>,
    is_testing: bool,
    is_developing_app: bool,
}

/// Mutable configuration for runtime-deferred macro evaluation.
///
/// Overrides are applied in strict registration order against the base map;
/// within that order the last write to a key wins. Registration and reads are
/// expected from a single-threaded startup sequence but are lock-guarded so
/// concurrent readers observe a consistent map.
pub struct RuntimeConfig {
    inner: RwLock<RuntimeState>,
}

impl RuntimeConfig {
    /// Create a runtime configuration seeded with `base` package values.
    pub fn new(base: BTreeMap<String, Value>) -> Self {
        let effective = base.clone();
        Self {
            inner: RwLock::new(RuntimeState {
                base,
                effective,
                overrides: Vec::new(),
                is_testing: false,
                is_developing_app: false,
            }),
        }
    }

    /// Append an override function and reapply the full override list.
    pub fn register_override(&self, f: ConfigOverride) {
        let mut state = self.inner.write();
        state.overrides.push(f);
        debug!("Applying {} runtime config overrides", state.overrides.len());
        let mut effective = state.base.clone();
        for apply in &state.overrides {
            apply(&mut effective);
        }
        state.effective = effective;
    }

    /// The effective configuration value for a package, if any.
    pub fn package_config(&self, package: &str) -> Option<Value> {
        self.inner.read().effective.get(package).cloned()
    }

    /// Flip the testing flag (the `setTesting` runtime equivalent).
    pub fn set_testing(&self, on: bool) {
        self.inner.write().is_testing = on;
    }

    /// Whether the running environment is a test run.
    pub fn is_testing(&self) -> bool {
        self.inner.read().is_testing
    }

    /// Flip the app-development flag.
    pub fn set_developing_app(&self, on: bool) {
        self.inner.write().is_developing_app = on;
    }

    /// Whether the running environment is a development build of the app.
    pub fn is_developing_app(&self) -> bool {
        self.inner.read().is_developing_app
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

/// The ordered list of resolvable module file extensions for this build.
///
/// Reads [`EXTENSIONS_ENV_VAR`] when set and non-empty, otherwise falls back
/// to [`DEFAULT_EXTENSIONS`].
pub fn resolvable_extensions() -> Vec<String> {
    match std::env::var(EXTENSIONS_ENV_VAR) {
        Ok(raw) if !raw.trim().is_empty() => {
            debug!("Resolvable extensions overridden: {}", raw);
            parse_extensions(&raw)
        }
        _ => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
    }
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .map(|e| {
            if e.starts_with('.') {
                e.to_string()
            } else {
                format!(".{}", e)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_config_lookup() {
        let mut config = BuildConfig::new();
        config.insert_package_config("addon-x", json!({ "mode": "fast" }));

        assert_eq!(
            config.package_config("addon-x"),
            Some(&json!({ "mode": "fast" }))
        );
        assert_eq!(config.package_config("addon-y"), None);
        assert_eq!(config.is_testing(), None);

        config.set_testing(true);
        assert_eq!(config.is_testing(), Some(true));
    }

    #[test]
    fn test_runtime_overrides_apply_in_order() {
        let mut base = BTreeMap::new();
        base.insert("addon-x".to_string(), json!({ "mode": "slow" }));
        let runtime = RuntimeConfig::new(base);

        runtime.register_override(Box::new(|map| {
            map.insert("addon-x".to_string(), json!({ "mode": "fast" }));
        }));
        runtime.register_override(Box::new(|map| {
            map.insert("addon-x".to_string(), json!({ "mode": "faster" }));
        }));

        // Last registered override wins for the key it writes.
        assert_eq!(
            runtime.package_config("addon-x"),
            Some(json!({ "mode": "faster" }))
        );
    }

    #[test]
    fn test_runtime_testing_flag() {
        let runtime = RuntimeConfig::default();
        assert!(!runtime.is_testing());
        runtime.set_testing(true);
        assert!(runtime.is_testing());
    }

    #[test]
    fn test_parse_extensions_normalizes_dots() {
        assert_eq!(parse_extensions(".js,mjs, .json"), vec![".js", ".mjs", ".json"]);
        assert_eq!(parse_extensions(""), Vec::<String>::new());
    }
}
