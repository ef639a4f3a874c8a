// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # dexweave
//!
//! A register-aware instrumentation substrate for Dalvik method bodies.
//!
//! Patches written on top of this crate find their targets with declarative fingerprints,
//! splice smali-like text into methods that are already compiled, and contribute to shared
//! arrays that are only laid out once every patch has run. The hard parts live here:
//!
//! - **Register allocation** without growing the register file: a liveness walk over a bounded
//!   window finds scratch registers, and callers move their code into a synthesized helper
//!   method when none are left.
//! - **Identity labels**: branch targets point at instructions, not offsets, so insertions never
//!   renumber anything. Control-flow-aware insertion moves existing branch targets onto the new
//!   block.
//! - **Aggregates**: a two-phase registry that hands out array slots while patches execute and
//!   emits the array routine when the build is finalized.
//! - **Version branches**: one instrumentation strategy is selected per build, and every hook
//!   point is located before the first edit.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use dexweave::prelude::*;
//!
//! let version: AppVersion = "20.22.1".parse()?;
//! let mut ctx = BuildContext::new(container, PatcherConfig::for_version(version));
//!
//! PatchScheduler::new()
//!     .with_patch(ComponentFilterPatch)
//!     .with_patch(FilterContributionPatch::named(
//!         "ads",
//!         ["Lapp/extension/patches/components/AdsFilter;"],
//!     ))
//!     .run(&mut ctx)?;
//!
//! log::info!("{}", ctx.events().summary());
//! let patched = ctx.into_container();
//! ```
//!
//! ## Editing a method directly
//!
//! ```rust
//! use dexweave::prelude::*;
//!
//! let mut method = MethodBuilder::new("run")
//!     .access(AccessFlags::PUBLIC | AccessFlags::STATIC)
//!     .registers(2)
//!     .body("const/4 v0, 0x1\nif-eqz v0, :skip\nnop\n:skip\nreturn-void")
//!     .build("Lapp/Main;")?;
//!
//! let mut editor = method.editor()?;
//! let skip = editor.label_for(3)?;
//! editor.add_instructions(3, "const/4 v1, 0x0\nconst/4 v1, 0x1")?;
//! assert_eq!(editor.instructions().resolve(skip)?, 5);
//! # Ok::<(), dexweave::Error>(())
//! ```
//!
//! ## Error handling
//!
//! Every fallible operation returns [`Result<T>`](Result). Register exhaustion is reported as
//! [`Error::RegisterExhausted`] and is meant to be handled, pattern and edit failures abort the
//! patch that caused them.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust
/// use dexweave::prelude::*;
///
/// let config = PatcherConfig::default();
/// assert_eq!(config.extension_class("Filter"), "Lapp/extension/patches/components/Filter;");
/// ```
pub mod prelude;

/// Dalvik opcodes, instructions, references and the mini-assembly parser.
pub mod assembly;

/// Classes, fields, methods and the container they live in.
pub mod metadata;

/// Instruction streams with identity labels and the method editor.
pub mod editor;

/// Control-flow successors and the register allocator.
pub mod analysis;

/// Fingerprints for locating methods and instructions.
pub mod matcher;

/// Two-phase aggregates collecting contributions into one array.
pub mod registry;

/// Version dependent instrumentation branches.
pub mod strategy;

/// Build context, patches and their scheduling.
pub mod patcher;

/// The component filter patches.
pub mod patches;

/// `dexweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// ```rust
/// use dexweave::{assembly::parse_block, Result};
///
/// fn count(text: &str) -> Result<usize> {
///     Ok(parse_block(text)?.instructions.len())
/// }
/// # assert_eq!(count("nop\nreturn-void").ok(), Some(2));
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dexweave` Error type
///
/// Every failure of the crate is one variant of this enum, see its documentation for the
/// conditions.
pub use error::Error;
