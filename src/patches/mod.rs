//! Concrete patches of the component pipeline.
//!
//! - [`ComponentFilterPatch`] selects the instrumentation branch, opens the filter aggregate
//!   and installs the filter call together with the buffer and executor hooks.
//! - [`FilterContributionPatch`] registers filter classes into that aggregate. Any number of
//!   them may run, each under its own name.

mod component_filter;
mod contribution;

pub use component_filter::ComponentFilterPatch;
pub use contribution::FilterContributionPatch;
