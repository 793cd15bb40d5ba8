use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;

/// Extension of the manifest sidecar kept next to each backup directory.
pub const MANIFEST_SUFFIX: &str = ".manifest";

/// Name of a unit (a world directory) living directly under the server root.
///
/// A unit name is a single path component: it can never address anything
/// outside the root it is joined onto. Names ending in [`MANIFEST_SUFFIX`]
/// are refused, since their backup directory would collide with another
/// world's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitName(String);

impl UnitName {
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let bad = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
            || name.ends_with(MANIFEST_SUFFIX);
        if bad {
            return Err(ConfigError::InvalidUnitName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UnitName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UnitName> for String {
    fn from(value: UnitName) -> Self {
        value.0
    }
}

impl AsRef<str> for UnitName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}
