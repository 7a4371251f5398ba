// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for gantry-bundle.

use thiserror::Error;

/// Result type for bundler-facing operations.
pub type Result<T> = std::result::Result<T, BundleError>;

/// Errors raised by the bundler-facing components.
#[derive(Error, Debug)]
pub enum BundleError {
    /// A virtual request token failed to decode. Fatal for that request
    /// only; unrelated requests and cached entries are unaffected.
    #[error("Malformed virtual module request {token}: {reason}")]
    MalformedRequest {
        /// The offending token
        token: String,
        /// Why decoding failed
        reason: String,
    },
}
