use crate::{
    patcher::{BuildContext, Patch},
    patches::ComponentFilterPatch,
    strategy::FILTER_AGGREGATE,
    Result,
};

/// Registers filter classes into the component filter aggregate.
///
/// ```rust
/// use dexweave::prelude::*;
///
/// let patch = FilterContributionPatch::named(
///     "ads-filter",
///     ["Lapp/extension/patches/components/AdsFilter;"],
/// );
/// assert_eq!(patch.name(), "ads-filter");
/// assert_eq!(patch.dependencies(), &["component-filter"]);
/// ```
#[derive(Debug, Clone)]
pub struct FilterContributionPatch {
    name: &'static str,
    filters: Vec<String>,
}

impl FilterContributionPatch {
    /// Contribution named `filter-contribution`.
    pub fn new<I, S>(filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::named("filter-contribution", filters)
    }

    /// Contribution with its own name, so several can be scheduled together.
    pub fn named<I, S>(name: &'static str, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            filters: filters.into_iter().map(Into::into).collect(),
        }
    }

    /// Class descriptors registered by this patch.
    #[must_use]
    pub fn filters(&self) -> &[String] {
        &self.filters
    }
}

impl Patch for FilterContributionPatch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn dependencies(&self) -> &[&'static str] {
        &[ComponentFilterPatch::NAME]
    }

    fn description(&self) -> &'static str {
        "Adds component filters."
    }

    fn execute(&self, ctx: &mut BuildContext) -> Result<()> {
        for filter in &self.filters {
            let slot = ctx.add_entry(FILTER_AGGREGATE, filter)?;
            log::debug!("{} registered {} at {}", self.name, filter, slot);
        }
        Ok(())
    }
}
