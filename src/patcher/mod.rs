//! Patch orchestration.
//!
//! A build runs a set of [`Patch`]es through a [`PatchScheduler`] against one
//! [`BuildContext`]:
//!
//! ```text
//! PatchScheduler::run
//!   ├─ order patches by dependencies
//!   ├─ Patch::execute         (context Executing: edits, registrations, hooks)
//!   ├─ Patch::finalize        (every registration done)
//!   └─ BuildContext::finalize (aggregates sealed, context Finalized)
//! ```
//!
//! Everything the build changes is recorded in the context's [`EventLog`].
//!
//! # Example
//!
//! ```rust,ignore
//! use dexweave::prelude::*;
//!
//! let mut ctx = BuildContext::new(container, PatcherConfig::for_version("20.22.1".parse()?));
//! PatchScheduler::new()
//!     .with_patch(ComponentFilterPatch::default())
//!     .with_patch(FilterContributionPatch::new(["Lapp/extension/patches/components/AdsFilter;"]))
//!     .run(&mut ctx)?;
//! println!("{}", ctx.events().summary());
//! ```

mod config;
mod context;
mod events;
mod hooks;
mod patch;
mod scheduler;

pub use config::{PatcherConfig, DEFAULT_EXTENSION_PACKAGE};
pub use context::{BuildContext, BuildPhase};
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use hooks::{HookPlacement, HookPoint};
pub use patch::Patch;
pub use scheduler::PatchScheduler;
