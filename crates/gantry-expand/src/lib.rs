// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # gantry-expand
//!
//! Compile-time macro expansion over JavaScript syntax trees.
//!
//! ## Overview
//!
//! Source files written against the legacy module convention use a small,
//! closed macro vocabulary (`macroCondition`, `dependencySatisfies`,
//! `getConfig`, `getOwnConfig`, `importSync`, `each`, `isTesting`,
//! `isDevelopingApp`) to describe conditional code paths. This crate rewrites
//! one file's tree at a time against the build's configuration and version
//! snapshots until no resolvable macro call sites remain, deleting discarded
//! branches outright so optional dependencies may appear in source without
//! breaking builds where they are absent.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gantry_core::{BuildConfig, ModuleInventory, VersionGraph, resolvable_extensions};
//! use gantry_expand::{Expander, FileContext};
//!
//! let expander = Expander::new(&config, &versions, &inventory, resolvable_extensions());
//! let file = FileContext {
//!     filename: "addon-x/index.js".into(),
//!     package: "addon-x".into(),
//! };
//! let rewritten = expander.expand(&file, tree)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod error;
pub mod eval;
pub mod expand;
pub mod resolver;

// Re-exports for convenience
pub use error::{ExpandError, Result};
pub use expand::{Expander, FileContext, MACRO_NAMES, RUNTIME_BINDING};
pub use resolver::CompileResolver;
