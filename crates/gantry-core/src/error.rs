//! Error types for gantry-core.

use thiserror::Error;

/// Result type for core snapshot operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while constructing or querying the per-build snapshots.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A package's resolved version string failed to parse
    #[error("Invalid version {version} for package {package}: {source}")]
    InvalidVersion {
        package: String,
        version: String,
        #[source]
        source: semver::Error,
    },

    /// A dependency range failed to parse
    #[error("Invalid version range {range}: {source}")]
    InvalidRange {
        range: String,
        #[source]
        source: semver::Error,
    },
}
