//! YAML configuration for a vault.
//!
//! ```yaml
//! root: /srv/minecraft
//! backup_dir: backup
//! worlds: [world, world_nether, world_the_end]
//! transient_suffix: .lock
//! grace_period_ms: 1000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::types::UnitName;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("no worlds configured")]
    NoUnits,
    #[error("invalid world name: {0:?}")]
    InvalidUnitName(String),
    #[error("world listed more than once: {0}")]
    DuplicateUnit(UnitName),
    #[error("backup root {} overlaps {what}", backup_root.display())]
    BackupOverlap {
        backup_root: PathBuf,
        what: String,
    },
}

/// Vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Server root holding the live world directories.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Backup root. Relative paths resolve against `root`.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    /// Worlds to back up, in processing order.
    #[serde(default)]
    pub worlds: Vec<UnitName>,
    /// Files whose name ends with this suffix are neither copied nor hashed.
    #[serde(default = "default_transient_suffix")]
    pub transient_suffix: String,
    /// Delay after evicting players before any file is removed.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backup")
}

fn default_transient_suffix() -> String {
    ".lock".into()
}

fn default_grace_period_ms() -> u64 {
    1000
}

impl VaultConfig {
    /// Config with defaults for every field except the world list.
    pub fn new(root: impl Into<PathBuf>, worlds: Vec<UnitName>) -> Self {
        Self {
            root: root.into(),
            backup_dir: default_backup_dir(),
            worlds,
            transient_suffix: default_transient_suffix(),
            grace_period_ms: default_grace_period_ms(),
        }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Check the world list (non-empty, unique) and that the backup root is
    /// disjoint from the server root itself and from every live world.
    ///
    /// Restoring removes the live world before copying the backup back, so a
    /// backup root inside a world would be deleted with it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worlds.is_empty() {
            return Err(ConfigError::NoUnits);
        }
        let root = normalize(&self.root)?;
        let backup_root = normalize(&self.backup_root())?;
        if backup_root == root {
            return Err(ConfigError::BackupOverlap {
                backup_root,
                what: "the server root".into(),
            });
        }

        let mut seen = BTreeSet::new();
        for world in &self.worlds {
            let live = root.join(world.as_str());
            if backup_root.starts_with(&live) || live.starts_with(&backup_root) {
                return Err(ConfigError::BackupOverlap {
                    backup_root,
                    what: format!("world {world}"),
                });
            }
            if !seen.insert(world) {
                return Err(ConfigError::DuplicateUnit(world.clone()));
            }
        }
        Ok(())
    }

    /// Absolute-or-root-relative backup root.
    pub fn backup_root(&self) -> PathBuf {
        if self.backup_dir.is_absolute() {
            self.backup_dir.clone()
        } else {
            self.root.join(&self.backup_dir)
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Absolute path with `.` and `..` resolved lexically. Symlinks are not
/// followed and nothing needs to exist yet.
fn normalize(path: &Path) -> Result<PathBuf, ConfigError> {
    let mut out = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
