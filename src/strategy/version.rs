use std::{fmt, str::FromStr};

use crate::{Error, Result};

/// Version of the target app, `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AppVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch level
    pub patch: u32,
}

impl AppVersion {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

/// Version queries used to pick code paths.
pub trait VersionInfo {
    /// Returns true if the version is `major.minor` or newer.
    fn is_at_least(&self, major: u32, minor: u32) -> bool;
}

impl VersionInfo for AppVersion {
    fn is_at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl FromStr for AppVersion {
    type Err = Error;

    /// Parses `20.22`, `20.22.1` and tolerates suffixes like `20.22.1-beta`.
    fn from_str(s: &str) -> Result<Self> {
        let numeric = s.trim().split(['-', ' ', '+']).next().unwrap_or_default();
        let mut parts = numeric.split('.');
        let mut next = |required: bool| -> Result<u32> {
            match parts.next() {
                Some(part) => part
                    .parse::<u32>()
                    .map_err(|_| malformed_error!("Invalid version component '{}' in '{}'", part, s)),
                None if required => Err(malformed_error!("Version '{}' needs major.minor", s)),
                None => Ok(0),
            }
        };

        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;
        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}.{}", self.major, self.minor, self.patch)
    }
}
