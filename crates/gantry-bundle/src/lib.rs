// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # gantry-bundle
//!
//! The bundler-facing half of the gantry compatibility layer.
//!
//! ## Overview
//!
//! Three independent components, queried on demand by orchestration:
//! - the virtual module registry, which synthesizes content for specifiers
//!   that exist for one build only ([`registry`])
//! - the addon dependency rule engine, a declarative oracle naming the
//!   dynamically-invoked identifiers an external dead-code-elimination pass
//!   must keep ([`rules`])
//! - the pipeline compatibility detector, which recognizes already-configured
//!   legacy transforms so orchestration does not apply them twice ([`compat`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compat;
pub mod error;
pub mod registry;
pub mod rules;

// Re-exports for convenience
pub use compat::{PluginDescriptor, TransformKind, matches_known_transform};
pub use error::{BundleError, Result};
pub use registry::{VirtualModules, VirtualRequest};
pub use rules::{IdentifierKind, PackageRules, RequiredIdentifier, RuleSet};
