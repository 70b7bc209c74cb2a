//! repository configuration, stored as TOML in the repo's `config` file

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::delta::{PartCompression, MAX_PART_SIZE};
use crate::error::{IoResultExt, Result};

/// repository configuration stored in `config`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub delta: DeltaConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub mode: RepoMode,
}

/// how file objects are laid out on disk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepoMode {
    /// real files carrying the object's ownership, mode and xattrs
    #[default]
    #[serde(rename = "bare")]
    Bare,
    /// compressed content streams (`.filez`)
    #[serde(rename = "archive-z2")]
    ArchiveZ2,
}

impl RepoMode {
    pub fn is_compressed(&self) -> bool {
        matches!(self, RepoMode::ArchiveZ2)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeltaConfig {
    /// parts larger than this, on the wire or once decompressed, are refused
    #[serde(default = "default_max_part_size")]
    pub max_part_size: u64,
    /// compression used when building parts
    #[serde(default)]
    pub compression: PartCompression,
}

fn default_max_part_size() -> u64 {
    MAX_PART_SIZE
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            max_part_size: MAX_PART_SIZE,
            compression: PartCompression::default(),
        }
    }
}

impl Config {
    pub fn new(mode: RepoMode) -> Self {
        Self {
            core: CoreConfig { mode },
            delta: DeltaConfig::default(),
        }
    }

    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }
}
