//! Configuration for a patching run.

use crate::{analysis::AllocatorPolicy, strategy::AppVersion};

/// Default package of the runtime extension classes.
pub const DEFAULT_EXTENSION_PACKAGE: &str = "Lapp/extension/patches/components";

/// Configuration for a patching run.
///
/// ```rust
/// use dexweave::prelude::*;
///
/// let config = PatcherConfig::for_version(AppVersion::new(20, 22, 0));
/// assert!(config.record_events);
/// assert_eq!(config.allocator, AllocatorPolicy::default());
/// ```
#[derive(Debug, Clone)]
pub struct PatcherConfig {
    /// Version of the app being patched. Unknown versions select the legacy code paths.
    pub target_version: Option<AppVersion>,

    /// Register allocator tuning, shared by every edit of the run.
    pub allocator: AllocatorPolicy,

    /// Keep an event log of every modification (default: true).
    pub record_events: bool,

    /// Package of the extension classes, without the trailing `;`.
    pub extension_package: String,
}

impl Default for PatcherConfig {
    fn default() -> Self {
        Self {
            target_version: None,
            allocator: AllocatorPolicy::default(),
            record_events: true,
            extension_package: DEFAULT_EXTENSION_PACKAGE.to_string(),
        }
    }
}

impl PatcherConfig {
    /// Default configuration targeting `version`.
    #[must_use]
    pub fn for_version(version: AppVersion) -> Self {
        Self {
            target_version: Some(version),
            ..Self::default()
        }
    }

    /// Small liveness windows and early helper methods, for very large methods.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            allocator: AllocatorPolicy::conservative(),
            ..Self::default()
        }
    }

    /// Type descriptor of the extension class `name` in the configured package.
    #[must_use]
    pub fn extension_class(&self, name: &str) -> String {
        format!("{}/{};", self.extension_package, name)
    }
}
