//! Configuration schema for Rampart
//!
//! Configuration is stored at `~/.config/rampart/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory where remote repositories are mirrored.
    ///
    /// The transport subtrees (`rsync/`, `https/`) and the `metadata.json`
    /// side-car document live directly under this directory.
    pub local_repository: PathBuf,

    /// Path to the SLURM file (validation-output filters and locally-added
    /// assertions). Unset means no overlay is applied.
    pub slurm: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_repository: default_repository(),
            slurm: None,
        }
    }
}

impl Config {
    /// Path of the persisted cache metadata document
    pub fn metadata_path(&self) -> PathBuf {
        self.local_repository.join("metadata.json")
    }
}

fn default_repository() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rampart")
        .join("repository")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_repository() {
        let config = Config::default();
        assert!(config.local_repository.ends_with("rampart/repository"));
        assert!(config.slurm.is_none());
    }

    #[test]
    fn metadata_path_under_repository() {
        let config = Config {
            local_repository: PathBuf::from("/var/cache/rampart"),
            slurm: None,
        };
        assert_eq!(
            config.metadata_path(),
            PathBuf::from("/var/cache/rampart/metadata.json")
        );
    }

    #[test]
    fn toml_roundtrip() {
        let config = Config {
            local_repository: PathBuf::from("/srv/rpki"),
            slurm: Some(PathBuf::from("/etc/rampart/slurm.json")),
        };

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed.local_repository, config.local_repository);
        assert_eq!(parsed.slurm, config.slurm);
    }
}
