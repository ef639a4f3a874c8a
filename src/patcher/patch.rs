//! The [`Patch`] trait.

use crate::{patcher::BuildContext, Result};

/// A unit of instrumentation.
///
/// Patches run once each, in dependency order, against a shared [`BuildContext`]. A patch
/// that produces something other patches consume (an aggregate, a hook point, the selected
/// strategy) is listed in their [`Patch::dependencies`].
///
/// # Phases
///
/// 1. [`Patch::execute`] runs for every patch while the context is executing. Registrations
///    into aggregates happen here.
/// 2. [`Patch::finalize`] runs for every patch, in the same order, before the context seals its
///    aggregates. Work that needs every registration done goes here.
pub trait Patch {
    /// Unique name for logging, events and dependency declarations.
    fn name(&self) -> &'static str;

    /// Names of the patches that must execute first.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    /// One line description of what the patch does.
    fn description(&self) -> &'static str {
        ""
    }

    /// Applies the patch.
    ///
    /// # Errors
    ///
    /// Returns an error if a fingerprint did not match or an edit was rejected. The scheduler
    /// aborts the build on the first failing patch.
    fn execute(&self, ctx: &mut BuildContext) -> Result<()>;

    /// Runs after every patch executed, before aggregates are sealed.
    ///
    /// # Errors
    ///
    /// Returns an error if the finishing edits fail.
    fn finalize(&self, _ctx: &mut BuildContext) -> Result<()> {
        Ok(())
    }
}
